//! Constants used by Velodyne data structures and calculations.

/// Number of firing blocks in one data packet.
pub const BLOCKS_PER_PACKET: usize = 12;

/// Number of laser returns in one block, i.e. the size of one bank.
pub const CHANNELS_PER_BLOCK: usize = 32;

/// Number of lasers covered by the lower and upper banks together.
pub const LASERS_PER_SENSOR: usize = 2 * CHANNELS_PER_BLOCK;

/// Number of measurements decoded from one packet.
pub const SCANS_PER_PACKET: usize = BLOCKS_PER_PACKET * CHANNELS_PER_BLOCK;

/// Size of one raw return: 2 bytes range, 1 byte intensity.
pub const RAW_SCAN_SIZE: usize = 3;

/// Size of the per-channel payload of one block.
pub const BLOCK_DATA_SIZE: usize = CHANNELS_PER_BLOCK * RAW_SCAN_SIZE;

/// Size of one block: bank header, rotation and payload.
pub const BLOCK_SIZE: usize = 4 + BLOCK_DATA_SIZE;

/// Size of the status trailer following the revolution counter.
pub const PACKET_STATUS_SIZE: usize = 4;

/// Size of one data packet on the wire.
pub const PACKET_SIZE: usize = BLOCKS_PER_PACKET * BLOCK_SIZE + 2 + PACKET_STATUS_SIZE;

/// Bank header tag of blocks carrying lasers 32..63.
pub const UPPER_BANK: u16 = 0xeeff;

/// Bank header tag of blocks carrying lasers 0..31.
pub const LOWER_BANK: u16 = 0xddff;

/// Rotation unit in degrees.
pub const ROTATION_RESOLUTION: f64 = 0.01;

/// Range unit in millimeters.
pub const DISTANCE_RESOLUTION_MM: f64 = 2.0;
