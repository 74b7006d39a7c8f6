//! Raw data packet layout of the HDL-64E.

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::{
    consts::{
        BLOCKS_PER_PACKET, BLOCK_DATA_SIZE, CHANNELS_PER_BLOCK, LOWER_BANK, PACKET_SIZE,
        PACKET_STATUS_SIZE, RAW_SCAN_SIZE, UPPER_BANK,
    },
    error::PacketError,
};

/// Laser group a block reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    /// Lasers 0..31.
    Lower,
    /// Lasers 32..63.
    Upper,
}

impl Bank {
    pub fn from_header(header: u16) -> Option<Self> {
        match header {
            LOWER_BANK => Some(Bank::Lower),
            UPPER_BANK => Some(Bank::Upper),
            _ => None,
        }
    }

    pub fn header(self) -> u16 {
        match self {
            Bank::Lower => LOWER_BANK,
            Bank::Upper => UPPER_BANK,
        }
    }

    /// Laser number of the first channel in this bank.
    pub fn origin(self) -> usize {
        match self {
            Bank::Lower => 0,
            Bank::Upper => CHANNELS_PER_BLOCK,
        }
    }
}

/// One firing block: a bank tag, the encoder rotation and 32 raw returns.
#[derive(Derivative, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[derivative(Debug, Default)]
pub struct RawBlock {
    pub header: u16,
    /// Rotation in hundredths of a degree.
    pub rotation: u16,
    /// Triplets of little endian range (u16) and intensity (u8).
    #[serde(with = "BigArray")]
    #[derivative(Debug = "ignore")]
    #[derivative(Default(value = "[0; BLOCK_DATA_SIZE]"))]
    pub data: [u8; BLOCK_DATA_SIZE],
}

impl RawBlock {
    pub fn bank(&self) -> Option<Bank> {
        Bank::from_header(self.header)
    }

    /// Raw range and intensity of the channel at `position` within the bank.
    pub fn scan(&self, position: usize) -> (u16, u8) {
        let offset = position * RAW_SCAN_SIZE;
        (
            u16::from_le_bytes([self.data[offset], self.data[offset + 1]]),
            self.data[offset + 2],
        )
    }

    pub fn set_scan(&mut self, position: usize, range: u16, intensity: u8) {
        let offset = position * RAW_SCAN_SIZE;
        self.data[offset..offset + 2].copy_from_slice(&range.to_le_bytes());
        self.data[offset + 2] = intensity;
    }
}

/// One data packet as sent by the sensor.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket {
    pub blocks: [RawBlock; BLOCKS_PER_PACKET],
    /// Revolution counter, wraps at 65536.
    pub revolution: u16,
    pub status: [u8; PACKET_STATUS_SIZE],
}

impl RawPacket {
    /// Parses exactly one packet. Any other buffer size is rejected.
    pub fn from_slice(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != PACKET_SIZE {
            return Err(PacketError::InvalidSize {
                expected: PACKET_SIZE,
                actual: buf.len(),
            });
        }
        Ok(bincode::deserialize(buf)?)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_SIZE);
        for block in &self.blocks {
            buf.extend_from_slice(&block.header.to_le_bytes());
            buf.extend_from_slice(&block.rotation.to_le_bytes());
            buf.extend_from_slice(&block.data);
        }
        buf.extend_from_slice(&self.revolution.to_le_bytes());
        buf.extend_from_slice(&self.status);
        buf
    }
}
