/*!
 * Conversions between the start-bit conventions used by CAN databases and
 * the start bit stored on a [`Signal`](crate::Signal).
 *
 * A stored start bit always addresses the first (most significant for
 * big-endian) bit of the signal, numbered LSB0 for little-endian signals
 * and MSB0 for big-endian ones. Description formats may use either
 * numbering for either byte order, and some address the signal by its
 * least significant bit instead.
 */

use serde::{Deserialize, Serialize};

use crate::error::{CanError, Result};

/// Bit numbering convention of an externally supplied start bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitNumbering {
    /// Bit 0 is the least significant bit of byte 0 (DBC, ARXML).
    Lsb0,
    /// Bit 0 is the most significant bit of byte 0.
    Msb0,
}

impl BitNumbering {
    pub fn is_lsb0(self) -> bool {
        matches!(self, BitNumbering::Lsb0)
    }
}

/// Mirror a bit inside its byte: bit 0 <-> bit 7, bit 1 <-> bit 6, ...
pub fn reflect_in_byte(bit: u32) -> u32 {
    bit - (bit % 8) + 7 - (bit % 8)
}

/// Convert an external start bit into the stored convention.
///
/// The numbering reflection applies when `numbering` disagrees with the
/// signal's byte order; the LSB-to-MSB shift applies to big-endian signals
/// addressed by their least significant bit.
pub fn normalize(
    start_bit: u32,
    size: u32,
    is_little_endian: bool,
    numbering: Option<BitNumbering>,
    start_is_lsb: bool,
) -> Result<u32> {
    let mut bit = i64::from(start_bit);
    if let Some(numbering) = numbering {
        if numbering.is_lsb0() != is_little_endian {
            bit = i64::from(reflect_in_byte(start_bit));
        }
    }
    if start_is_lsb && !is_little_endian {
        bit = bit + 1 - i64::from(size);
    }
    u32::try_from(bit).map_err(|_| CanError::NegativeStartBit {
        start_bit: bit,
        size,
    })
}

/// Inverse of [`normalize`]: express a stored start bit in an external convention.
pub fn denormalize(
    start_bit: u32,
    size: u32,
    is_little_endian: bool,
    numbering: Option<BitNumbering>,
    start_is_lsb: bool,
) -> u32 {
    let mut bit = start_bit;
    if start_is_lsb && !is_little_endian {
        bit = bit.saturating_add(size).saturating_sub(1);
    }
    if let Some(numbering) = numbering {
        if numbering.is_lsb0() != is_little_endian {
            bit = reflect_in_byte(bit);
        }
    }
    bit
}
