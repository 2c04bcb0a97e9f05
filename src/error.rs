//! Error type shared by every codec operation.

use std::fmt;

use thiserror::Error;

/// Features the codec deliberately does not implement.
///
/// Callers may probe for them; they come back as
/// [`CanError::Unsupported`] instead of an empty or partial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    /// More than one multiplexor interacting in one payload.
    ComplexMultiplexing,
    /// J1939 decomposition of an 11-bit standard identifier.
    StandardJ1939Id,
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unsupported::ComplexMultiplexing => write!(f, "complex multiplexing"),
            Unsupported::StandardJ1939Id => write!(f, "J1939 decomposition of a standard id"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CanError {
    #[error("start bit {start_bit} (size {size}) normalizes below zero")]
    NegativeStartBit { start_bit: i64, size: u32 },

    #[error("signal '{signal}' has invalid geometry: {reason}")]
    InvalidGeometry { signal: String, reason: String },

    #[error("signal '{signal}' (bits {start_bit}..{end_bit}) does not fit in the {frame_bits}-bit payload of frame '{frame}'")]
    SignalOutOfFrame {
        frame: String,
        signal: String,
        start_bit: u32,
        end_bit: u32,
        frame_bits: u32,
    },

    #[error("signals '{first}' and '{second}' overlap in frame '{frame}'")]
    OverlappingSignals {
        frame: String,
        first: String,
        second: String,
    },

    #[error("'{symbol}' is not a valid value choice for signal '{signal}'")]
    UnknownSymbol { signal: String, symbol: String },

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("unknown frame: {0}")]
    UnknownFrame(String),

    #[error("frame '{frame}' already contains a signal named '{signal}'")]
    DuplicateSignal { frame: String, signal: String },

    #[error("frame '{frame}' already has multiplexor '{existing}'")]
    DuplicateMultiplexor { frame: String, existing: String },

    #[error("payload for frame '{frame}' is {actual} bytes, expected {expected}")]
    PayloadTooShort {
        frame: String,
        expected: usize,
        actual: usize,
    },

    #[error("signal '{0}' has a zero factor")]
    ZeroFactor(String),

    #[error("decimal overflow while scaling signal '{0}'")]
    Overflow(String),

    #[error("float raw value {value} of signal '{signal}' has no decimal representation")]
    NonFiniteFloat { signal: String, value: f64 },

    #[error("attribute '{attribute}' of signal '{signal}' is not numeric: '{value}'")]
    InvalidAttribute {
        signal: String,
        attribute: String,
        value: String,
    },

    #[error("{0} is not supported")]
    Unsupported(Unsupported),
}

pub type Result<T> = std::result::Result<T, CanError>;
