//! Per-bank correction tables consumed by the packet decoder.

use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use crate::{
    calibration::Calibration,
    consts::{CHANNELS_PER_BLOCK, LASERS_PER_SENSOR},
    error::TableError,
    packet::Bank,
};

/// Precomputed corrections for one in-bank channel position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelCorrection {
    /// Added to the block rotation, radians.
    pub rotational_offset: f64,
    /// Elevation of the channel, radians.
    pub vertical_angle: f64,
    /// Quadratic range correction `offset1 * r^2 + offset2 * r + offset3`.
    pub offset1: f64,
    pub offset2: f64,
    pub offset3: f64,
}

impl ChannelCorrection {
    /// Passes range through unchanged, with no angular offsets.
    pub const IDENTITY: Self = Self {
        rotational_offset: 0.0,
        vertical_angle: 0.0,
        offset1: 0.0,
        offset2: 1.0,
        offset3: 0.0,
    };

    pub fn correct_range(&self, range: f64) -> f64 {
        self.offset1 * range * range + self.offset2 * range + self.offset3
    }
}

/// Source of per-bank corrections, indexed by in-bank channel position.
pub trait CorrectionProvider {
    fn bank(&self, bank: Bank) -> &[ChannelCorrection; CHANNELS_PER_BLOCK];
}

/// Correction tables for both banks of the sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionTable {
    lower: [ChannelCorrection; CHANNELS_PER_BLOCK],
    upper: [ChannelCorrection; CHANNELS_PER_BLOCK],
}

impl CorrectionTable {
    pub fn new(
        lower: [ChannelCorrection; CHANNELS_PER_BLOCK],
        upper: [ChannelCorrection; CHANNELS_PER_BLOCK],
    ) -> Self {
        Self { lower, upper }
    }

    pub fn identity() -> Self {
        Self::new(
            [ChannelCorrection::IDENTITY; CHANNELS_PER_BLOCK],
            [ChannelCorrection::IDENTITY; CHANNELS_PER_BLOCK],
        )
    }

    /// Derives both bank tables from a 64 laser calibration.
    ///
    /// Lasers 0..31 fill the lower bank and lasers 32..63 the upper bank. The
    /// range polynomial is linear with the laser's distance correction as
    /// constant term.
    pub fn from_calibration(calibration: &Calibration) -> Result<Self, TableError> {
        if calibration.num_lasers as usize != LASERS_PER_SENSOR {
            return Err(TableError::UnsupportedLaserCount(calibration.num_lasers));
        }

        let mut table = Self::identity();
        for bank in [Bank::Lower, Bank::Upper] {
            let entries = match bank {
                Bank::Lower => &mut table.lower,
                Bank::Upper => &mut table.upper,
            };
            for (position, entry) in entries.iter_mut().enumerate() {
                let laser_id = (bank.origin() + position) as u32;
                let laser = calibration
                    .laser(laser_id)
                    .ok_or(TableError::MissingLaser(laser_id))?;
                *entry = ChannelCorrection {
                    rotational_offset: laser.rotational_offset,
                    vertical_angle: laser.vertical_angle,
                    offset1: 0.0,
                    offset2: 1.0,
                    offset3: laser.distance_correction,
                };
            }
        }
        Ok(table)
    }

    pub fn bank_mut(&mut self, bank: Bank) -> &mut [ChannelCorrection; CHANNELS_PER_BLOCK] {
        match bank {
            Bank::Lower => &mut self.lower,
            Bank::Upper => &mut self.upper,
        }
    }
}

impl CorrectionProvider for CorrectionTable {
    fn bank(&self, bank: Bank) -> &[ChannelCorrection; CHANNELS_PER_BLOCK] {
        match bank {
            Bank::Lower => &self.lower,
            Bank::Upper => &self.upper,
        }
    }
}

impl<T: CorrectionProvider + ?Sized> CorrectionProvider for Arc<T> {
    fn bank(&self, bank: Bank) -> &[ChannelCorrection; CHANNELS_PER_BLOCK] {
        (**self).bank(bank)
    }
}

/// Handle to the correction tables in use, shared between decoding threads.
///
/// Readers take a snapshot and keep it for the whole packet. A new table is
/// only ever published complete, replacing the previous one.
#[derive(Debug, Clone)]
pub struct SharedCorrections {
    current: Arc<RwLock<Arc<CorrectionTable>>>,
}

impl SharedCorrections {
    pub fn new(table: CorrectionTable) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    pub fn snapshot(&self) -> Arc<CorrectionTable> {
        // The guarded value is replaced in a single assignment, a poisoned
        // lock still holds a complete table.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn publish(&self, table: CorrectionTable) {
        let table = Arc::new(table);
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = table;
        debug!("Published new correction tables");
    }

    /// Builds tables for `calibration` and publishes them. On failure the
    /// tables in use are kept.
    pub fn reload(&self, calibration: &Calibration) -> Result<(), TableError> {
        let table = CorrectionTable::from_calibration(calibration)?;
        self.publish(table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::thread;

    fn calibration() -> Calibration {
        let mut calibration = Calibration::default_profile(64);
        for (&id, laser) in calibration.lasers.iter_mut() {
            laser.rotational_offset = id as f64 * 0.01;
            laser.vertical_angle = -(id as f64) * 0.005;
            laser.distance_correction = 1.0 + id as f64 / 100.0;
        }
        calibration
    }

    #[test]
    fn banks_follow_laser_ids() {
        let table = CorrectionTable::from_calibration(&calibration()).unwrap();

        let lower = table.bank(Bank::Lower)[3];
        assert_eq!(lower.rotational_offset, 3.0 * 0.01);
        assert_relative_eq!(lower.offset3, 1.03);

        let upper = table.bank(Bank::Upper)[3];
        assert_eq!(upper.rotational_offset, 35.0 * 0.01);
        assert_eq!(upper.vertical_angle, -35.0 * 0.005);
        assert_eq!(upper.offset1, 0.0);
        assert_eq!(upper.offset2, 1.0);
        assert_relative_eq!(upper.offset3, 1.35);
    }

    #[test]
    fn missing_laser() {
        let mut calibration = calibration();
        calibration.lasers.remove(&40);
        assert_eq!(
            CorrectionTable::from_calibration(&calibration),
            Err(TableError::MissingLaser(40))
        );
    }

    #[test]
    fn wrong_laser_count() {
        assert_eq!(
            CorrectionTable::from_calibration(&Calibration::default_profile(32)),
            Err(TableError::UnsupportedLaserCount(32))
        );
    }

    #[test]
    fn default_profile_builds_identity() {
        let table = CorrectionTable::from_calibration(&Calibration::default_profile(64)).unwrap();
        assert_eq!(table, CorrectionTable::identity());
    }

    #[test]
    fn range_polynomial() {
        let correction = ChannelCorrection {
            offset1: 0.5,
            offset2: 2.0,
            offset3: -1.0,
            ..ChannelCorrection::IDENTITY
        };
        assert_eq!(correction.correct_range(2.0), 5.0);
        assert_eq!(ChannelCorrection::IDENTITY.correct_range(5.0), 5.0);
    }

    #[test]
    fn reload_replaces_whole_table() {
        let shared = SharedCorrections::new(CorrectionTable::identity());
        let before = shared.snapshot();

        shared.reload(&calibration()).unwrap();
        let after = shared.snapshot();

        assert_eq!(*before, CorrectionTable::identity());
        assert_relative_eq!(after.bank(Bank::Upper)[0].rotational_offset, 0.32);
    }

    #[test]
    fn failed_reload_keeps_table() {
        let shared = SharedCorrections::new(CorrectionTable::identity());
        assert!(shared.reload(&Calibration::default_profile(16)).is_err());
        assert_eq!(*shared.snapshot(), CorrectionTable::identity());
    }

    #[test]
    fn snapshots_across_threads() {
        let shared = SharedCorrections::new(CorrectionTable::identity());
        let full = CorrectionTable::from_calibration(&calibration()).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                let full = full.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let table = shared.snapshot();
                        assert!(*table == CorrectionTable::identity() || *table == full);
                    }
                })
            })
            .collect();

        shared.publish(full.clone());
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(*shared.snapshot(), full);
    }
}
