//! SAE J1939 view of extended CAN identifiers.

use std::fmt;

use crate::error::{CanError, Result, Unsupported};

/// A 29-bit identifier split into J1939 fields.
///
/// `destination` is the raw top byte of the identifier and so overlaps the
/// three priority bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanId {
    pub source: u8,
    pub pgn: u16,
    pub destination: u8,
    pub priority: u8,
}

impl CanId {
    pub fn from_id(id: u32, extended: bool) -> Result<Self> {
        if !extended {
            return Err(CanError::Unsupported(Unsupported::StandardJ1939Id));
        }
        Ok(CanId {
            source: (id & 0xFF) as u8,
            pgn: ((id >> 8) & 0xFFFF) as u16,
            destination: ((id >> 24) & 0xFF) as u8,
            priority: ((id >> 26) & 0x7) as u8,
        })
    }

    /// `source | pgn << 8 | priority << 26`, priority masked to 3 bits.
    pub fn compose(priority: u8, pgn: u16, source: u8) -> u32 {
        u32::from(source) | (u32::from(pgn) << 8) | ((u32::from(priority) & 0x7) << 26)
    }

    /// `(destination, pgn, source)`
    pub fn tuples(&self) -> (u8, u16, u8) {
        (self.destination, self.pgn, self.source)
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DA:0x{:02X} PGN:0x{:04X} SA:0x{:02X}",
            self.destination, self.pgn, self.source
        )
    }
}
