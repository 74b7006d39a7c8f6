//! Per-unit calibration profile and its YAML representation.
//!
//! The document layout is shared with existing profile files:
//!
//! ```yaml
//! num_lasers: 64
//! pitch: 0.0
//! roll: 0.0
//! lasers:
//!   - laser_id: 0
//!     rot_correction: -0.0785
//!     vert_correction: -0.1248
//!     dist_correction: 1.1402
//!     vert_offset_correction: 0.2155
//!     horiz_offset_correction: 0.026
//!     intensity:
//!       - a: 0.0
//!         b: 0.0
//!         c: 0.0
//!         d: 0.0
//! ```

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde_yaml::{Mapping, Value};

use crate::error::{CalibrationError, FormatError};

const NUM_LASERS: &str = "num_lasers";
const PITCH: &str = "pitch";
const ROLL: &str = "roll";
const LASERS: &str = "lasers";
const LASER_ID: &str = "laser_id";
const ROT_CORRECTION: &str = "rot_correction";
const VERT_CORRECTION: &str = "vert_correction";
const DIST_CORRECTION: &str = "dist_correction";
const VERT_OFFSET_CORRECTION: &str = "vert_offset_correction";
const HORIZ_OFFSET_CORRECTION: &str = "horiz_offset_correction";
const INTENSITY: &str = "intensity";
const A: &str = "a";
const B: &str = "b";
const C: &str = "c";
const D: &str = "d";

/// Coefficients of the intensity correction polynomial.
///
/// They are persisted with the profile but not applied by the packet decoder;
/// intensity leaves the decoder as the raw sensor byte.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntensityCorrection {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

/// Factory corrections of one laser. Angles in radians, distances in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LaserCorrection {
    pub rotational_offset: f64,
    pub vertical_angle: f64,
    pub distance_correction: f64,
    pub vertical_offset_correction: f64,
    pub horizontal_offset_correction: f64,
    pub intensity: IntensityCorrection,
}

/// Calibration profile of one sensor unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub num_lasers: u32,
    pub pitch: f64,
    pub roll: f64,
    /// Corrections keyed by laser id.
    pub lasers: BTreeMap<u32, LaserCorrection>,
}

impl Calibration {
    /// Profile with every correction zeroed, one entry per laser id.
    pub fn default_profile(num_lasers: u32) -> Self {
        Self {
            num_lasers,
            pitch: 0.0,
            roll: 0.0,
            lasers: (0..num_lasers)
                .map(|id| (id, LaserCorrection::default()))
                .collect(),
        }
    }

    pub fn laser(&self, laser_id: u32) -> Option<&LaserCorrection> {
        self.lasers.get(&laser_id)
    }

    /// Reads a profile from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.to_owned(),
            source,
        })?;
        let calibration = Self::from_yaml_str(&text)?;
        debug!(
            "Loaded calibration for {} lasers from '{}'",
            calibration.num_lasers,
            path.display()
        );
        Ok(calibration)
    }

    /// Parses a profile from YAML text.
    ///
    /// Exactly `num_lasers` entries are read from `lasers`. Entries sharing a
    /// `laser_id` overwrite each other, the last one wins.
    pub fn from_yaml_str(text: &str) -> Result<Self, FormatError> {
        let doc: Value = serde_yaml::from_str(text)?;
        calibration_from_node(&doc)
    }

    /// Renders the profile as YAML, lasers in ascending id order.
    ///
    /// Only complete profiles are rendered: ids must be exactly
    /// `0..num_lasers`, otherwise the document would not load back.
    pub fn to_yaml_string(&self) -> Result<String, FormatError> {
        self.check_complete()?;
        Ok(serde_yaml::to_string(&calibration_to_node(self))?)
    }

    fn check_complete(&self) -> Result<(), FormatError> {
        if self.num_lasers == 0 {
            return Err(FormatError::NoLasers);
        }
        if let Some(&laser_id) = self.lasers.keys().find(|&&id| id >= self.num_lasers) {
            return Err(FormatError::UnexpectedLaser {
                laser_id,
                num_lasers: self.num_lasers,
            });
        }
        match (0..self.num_lasers).find(|id| !self.lasers.contains_key(id)) {
            Some(laser_id) => Err(FormatError::MissingLaser(laser_id)),
            None => Ok(()),
        }
    }

    /// Writes the profile to `path`.
    ///
    /// The document goes to a sibling temporary file first and is renamed
    /// over `path` once complete, so a failed write leaves any previous file
    /// untouched.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let path = path.as_ref();
        let text = self.to_yaml_string()?;
        let tmp_path = temporary_path(path);

        let written = File::create(&tmp_path).and_then(|file| {
            let mut writer = BufWriter::new(file);
            writer.write_all(text.as_bytes())?;
            writer.flush()?;
            writer.get_ref().sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&tmp_path, path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(CalibrationError::Io {
                path: path.to_owned(),
                source: e,
            });
        }

        debug!(
            "Written calibration for {} lasers to '{}'",
            self.num_lasers,
            path.display()
        );
        Ok(())
    }
}

/// Writes a zeroed 64 laser profile, for use as a test fixture or fallback.
pub fn write_default_profile<P: AsRef<Path>>(path: P) -> Result<(), CalibrationError> {
    Calibration::default_profile(crate::consts::LASERS_PER_SENSOR as u32).save(path)
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn field<'a>(node: &'a Value, key: &str, context: &str) -> Result<&'a Value, FormatError> {
    node.get(key)
        .ok_or_else(|| FormatError::MissingField(format!("{context}{key}")))
}

fn float_field(node: &Value, key: &str, context: &str) -> Result<f64, FormatError> {
    field(node, key, context)?
        .as_f64()
        .ok_or_else(|| FormatError::InvalidField {
            field: format!("{context}{key}"),
            expected: "a number",
        })
}

fn u32_field(node: &Value, key: &str, context: &str) -> Result<u32, FormatError> {
    field(node, key, context)?
        .as_u64()
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| FormatError::InvalidField {
            field: format!("{context}{key}"),
            expected: "an unsigned 32-bit integer",
        })
}

fn intensity_from_node(node: &Value, context: &str) -> Result<IntensityCorrection, FormatError> {
    Ok(IntensityCorrection {
        a: float_field(node, A, context)?,
        b: float_field(node, B, context)?,
        c: float_field(node, C, context)?,
        d: float_field(node, D, context)?,
    })
}

fn laser_from_node(node: &Value, context: &str) -> Result<(u32, LaserCorrection), FormatError> {
    let laser_id = u32_field(node, LASER_ID, context)?;

    let intensity = field(node, INTENSITY, context)?
        .as_sequence()
        .ok_or_else(|| FormatError::InvalidField {
            field: format!("{context}{INTENSITY}"),
            expected: "a sequence",
        })?;
    let first = intensity
        .first()
        .ok_or_else(|| FormatError::MissingField(format!("{context}{INTENSITY}[0]")))?;
    if intensity.len() > 1 {
        warn!(
            "{context}{INTENSITY} has {} elements, only the first is used",
            intensity.len()
        );
    }

    let correction = LaserCorrection {
        rotational_offset: float_field(node, ROT_CORRECTION, context)?,
        vertical_angle: float_field(node, VERT_CORRECTION, context)?,
        distance_correction: float_field(node, DIST_CORRECTION, context)?,
        vertical_offset_correction: float_field(node, VERT_OFFSET_CORRECTION, context)?,
        horizontal_offset_correction: float_field(node, HORIZ_OFFSET_CORRECTION, context)?,
        intensity: intensity_from_node(first, &format!("{context}{INTENSITY}[0]."))?,
    };
    Ok((laser_id, correction))
}

fn calibration_from_node(doc: &Value) -> Result<Calibration, FormatError> {
    let num_lasers = u32_field(doc, NUM_LASERS, "")?;
    if num_lasers == 0 {
        return Err(FormatError::NoLasers);
    }
    let pitch = float_field(doc, PITCH, "")?;
    let roll = float_field(doc, ROLL, "")?;

    let entries = field(doc, LASERS, "")?
        .as_sequence()
        .ok_or_else(|| FormatError::InvalidField {
            field: LASERS.to_owned(),
            expected: "a sequence",
        })?;
    if entries.len() < num_lasers as usize {
        return Err(FormatError::TooFewLasers {
            declared: num_lasers,
            found: entries.len(),
        });
    }
    if entries.len() > num_lasers as usize {
        warn!(
            "{LASERS} has {} entries but {NUM_LASERS} is {num_lasers}; ignoring the rest",
            entries.len()
        );
    }

    let mut lasers = BTreeMap::new();
    for (index, entry) in entries.iter().take(num_lasers as usize).enumerate() {
        let (laser_id, correction) = laser_from_node(entry, &format!("{LASERS}[{index}]."))?;
        if lasers.insert(laser_id, correction).is_some() {
            warn!("{LASERS}[{index}] repeats {LASER_ID} {laser_id}; overwriting earlier entry");
        }
    }

    Ok(Calibration {
        num_lasers,
        pitch,
        roll,
        lasers,
    })
}

fn intensity_to_node(intensity: &IntensityCorrection) -> Value {
    let mut node = Mapping::new();
    node.insert(A.into(), intensity.a.into());
    node.insert(B.into(), intensity.b.into());
    node.insert(C.into(), intensity.c.into());
    node.insert(D.into(), intensity.d.into());
    Value::Mapping(node)
}

fn laser_to_node(laser_id: u32, correction: &LaserCorrection) -> Value {
    let mut node = Mapping::new();
    node.insert(LASER_ID.into(), laser_id.into());
    node.insert(ROT_CORRECTION.into(), correction.rotational_offset.into());
    node.insert(VERT_CORRECTION.into(), correction.vertical_angle.into());
    node.insert(DIST_CORRECTION.into(), correction.distance_correction.into());
    node.insert(
        VERT_OFFSET_CORRECTION.into(),
        correction.vertical_offset_correction.into(),
    );
    node.insert(
        HORIZ_OFFSET_CORRECTION.into(),
        correction.horizontal_offset_correction.into(),
    );
    node.insert(
        INTENSITY.into(),
        Value::Sequence(vec![intensity_to_node(&correction.intensity)]),
    );
    Value::Mapping(node)
}

fn calibration_to_node(calibration: &Calibration) -> Value {
    let mut node = Mapping::new();
    node.insert(NUM_LASERS.into(), calibration.num_lasers.into());
    node.insert(PITCH.into(), calibration.pitch.into());
    node.insert(ROLL.into(), calibration.roll.into());
    node.insert(
        LASERS.into(),
        Value::Sequence(
            calibration
                .lasers
                .iter()
                .map(|(&laser_id, correction)| laser_to_node(laser_id, correction))
                .collect(),
        ),
    );
    Value::Mapping(node)
}
