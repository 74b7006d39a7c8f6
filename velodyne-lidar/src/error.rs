use std::{io, path::PathBuf};

use thiserror::Error;

/// Failure to load or store a calibration profile.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("cannot access calibration file '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed calibration document: {0}")]
    Format(#[from] FormatError),
}

/// Calibration document content that does not describe a usable profile.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("cannot parse YAML")]
    Parse(#[from] serde_yaml::Error),
    #[error("missing field '{0}'")]
    MissingField(String),
    #[error("field '{field}' is not {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },
    #[error("'num_lasers' must be positive")]
    NoLasers,
    #[error("document declares {declared} lasers but contains only {found} entries")]
    TooFewLasers { declared: u32, found: usize },
    #[error("profile has no correction for laser {0}")]
    MissingLaser(u32),
    #[error("profile has a correction for laser {laser_id} but declares {num_lasers} lasers")]
    UnexpectedLaser { laser_id: u32, num_lasers: u32 },
}

/// Failure to derive correction tables from a calibration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("calibration has {0} lasers, the packet layout requires 64")]
    UnsupportedLaserCount(u32),
    #[error("calibration has no correction for laser {0}")]
    MissingLaser(u32),
}

/// Packet rejected by the decoder. No measurements are produced for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet is {actual} bytes, expected {expected}")]
    InvalidSize { expected: usize, actual: usize },
    #[error("block {block} has unknown bank header {header:#06x}")]
    UnknownBank { block: usize, header: u16 },
    #[error("decoded {actual} measurements, expected {expected}")]
    MeasurementCount { expected: usize, actual: usize },
    #[error("cannot parse packet: {0}")]
    Malformed(String),
}

impl From<bincode::Error> for PacketError {
    fn from(error: bincode::Error) -> Self {
        PacketError::Malformed(error.to_string())
    }
}

/// Failure to read the decoder configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
