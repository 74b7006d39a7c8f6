//! Decoding of Velodyne HDL-64E data packets with per-unit calibration.

pub mod calibration;
pub mod config;
pub mod consts;
pub mod corrections;
pub mod decoder;
pub mod error;
pub mod packet;

pub use calibration::{write_default_profile, Calibration, IntensityCorrection, LaserCorrection};
pub use config::DecodeConfig;
pub use corrections::{ChannelCorrection, CorrectionProvider, CorrectionTable, SharedCorrections};
pub use decoder::{decode_packet, normalize_angle, Measurement, PacketDecoder};
pub use error::{CalibrationError, ConfigError, FormatError, PacketError, TableError};
pub use packet::{Bank, RawBlock, RawPacket};
