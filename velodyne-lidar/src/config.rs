//! Configuration of the `velodyne-decode` application.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::ConfigError;

fn default_skip_invalid() -> bool {
    true
}

/// Files to decode and how to treat rejected packets.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct DecodeConfig {
    /// YAML calibration profile of the sensor.
    pub calibration: PathBuf,
    /// Recorded packets, back to back.
    pub packets: PathBuf,
    /// Drop rejected packets and continue instead of stopping.
    #[serde(default = "default_skip_invalid")]
    pub skip_invalid: bool,
}

impl DecodeConfig {
    /// Reads a TOML config. Relative paths are taken relative to the config
    /// file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;

        if let Some(dir) = path.parent() {
            config.calibration = dir.join(&config.calibration);
            config.packets = dir.join(&config.packets);
        }
        Ok(config)
    }
}
