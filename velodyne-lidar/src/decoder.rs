//! Conversion of raw packets into calibrated measurements.

use std::sync::Arc;

use itertools::izip;
use measurements::{Angle, Length};
use num_traits::{Float, FloatConst};
use serde::Serialize;

use crate::{
    consts::{DISTANCE_RESOLUTION_MM, RAW_SCAN_SIZE, ROTATION_RESOLUTION, SCANS_PER_PACKET},
    corrections::{CorrectionProvider, CorrectionTable, SharedCorrections},
    error::PacketError,
    packet::RawPacket,
};

/// One calibrated laser return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    /// Laser number, 0..63.
    #[serde(rename = "channel_number")]
    pub channel: u8,
    /// Horizontal angle in radians, within (-pi, pi].
    #[serde(rename = "heading_angle")]
    pub heading: f64,
    /// Vertical angle in radians.
    #[serde(rename = "elevation_angle")]
    pub elevation: f64,
    /// Corrected range in meters.
    #[serde(rename = "range_m")]
    pub range: f64,
    /// Raw intensity as reported by the sensor.
    #[serde(rename = "intensity_raw")]
    pub intensity: u8,
    pub revolution: u16,
}

/// Maps `angle` into (-pi, pi].
pub fn normalize_angle<T: Float + FloatConst>(angle: T) -> T {
    let two_pi = T::PI() + T::PI();
    let positive = ((angle % two_pi) + two_pi) % two_pi;
    if positive > T::PI() {
        positive - two_pi
    } else {
        positive
    }
}

/// Decodes every return of `packet`, in block then channel order.
///
/// A packet with an unknown bank header is rejected as a whole.
pub fn decode_packet<C>(packet: &RawPacket, corrections: &C) -> Result<Vec<Measurement>, PacketError>
where
    C: CorrectionProvider + ?Sized,
{
    let mut measurements = Vec::with_capacity(SCANS_PER_PACKET);

    for (index, block) in packet.blocks.iter().enumerate() {
        let bank = block.bank().ok_or(PacketError::UnknownBank {
            block: index,
            header: block.header,
        })?;
        let rotation =
            Angle::from_degrees(f64::from(block.rotation) * ROTATION_RESOLUTION).as_radians();

        for (position, correction, scan) in izip!(
            0..,
            corrections.bank(bank).iter(),
            block.data.chunks_exact(RAW_SCAN_SIZE)
        ) {
            let raw_range = u16::from_le_bytes([scan[0], scan[1]]);
            let range =
                Length::from_millimeters(f64::from(raw_range) * DISTANCE_RESOLUTION_MM).as_meters();

            measurements.push(Measurement {
                channel: (bank.origin() + position) as u8,
                // the sensor turns clockwise
                heading: normalize_angle(-(rotation - correction.rotational_offset)),
                elevation: correction.vertical_angle,
                range: correction.correct_range(range),
                intensity: scan[2],
                revolution: packet.revolution,
            });
        }
    }

    if measurements.len() != SCANS_PER_PACKET {
        return Err(PacketError::MeasurementCount {
            expected: SCANS_PER_PACKET,
            actual: measurements.len(),
        });
    }
    Ok(measurements)
}

/// Packet decoder bound to one set of correction tables.
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    corrections: Arc<CorrectionTable>,
}

impl PacketDecoder {
    pub fn new(corrections: Arc<CorrectionTable>) -> Self {
        Self { corrections }
    }

    /// Decoder using the tables currently published on `shared`.
    pub fn from_shared(shared: &SharedCorrections) -> Self {
        Self::new(shared.snapshot())
    }

    pub fn corrections(&self) -> &CorrectionTable {
        &self.corrections
    }

    pub fn decode(&self, buf: &[u8]) -> Result<Vec<Measurement>, PacketError> {
        let packet = RawPacket::from_slice(buf)?;
        self.decode_packet(&packet)
    }

    pub fn decode_packet(&self, packet: &RawPacket) -> Result<Vec<Measurement>, PacketError> {
        decode_packet(packet, self.corrections.as_ref())
    }
}
