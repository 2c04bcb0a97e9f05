//! CAN communication matrix model with a bit-exact signal codec.
//!
//! A [`CanMatrix`] holds [`Frame`]s, each holding [`Signal`]s. Frames encode
//! physical values into payload bytes and decode payloads back, including
//! simple multiplexing.
//!
//! ```
//! use cansig::{Frame, Signal, SignalValues, Value};
//!
//! let mut frame = Frame::new("Speed", 0x100, 2);
//! frame
//!     .add_signal(Signal::builder("Kph").size(16).signed(false).build()?)?;
//!
//! let mut values = SignalValues::new();
//! values.insert("Kph".into(), Value::from(300_i64));
//! let payload = frame.encode(&values)?;
//! assert_eq!(frame.decode(&payload, false)?, values);
//! # Ok::<(), cansig::CanError>(())
//! ```

pub mod bit_position;
pub mod can_decoder;
pub mod can_encoder;
pub mod can_id;
pub mod config;
pub mod defines;
pub mod error;
pub mod frame;
pub mod matrix;
pub mod signal;
pub mod signal_group;
pub mod signal_layout;
pub mod value;

#[cfg(test)]
mod fixtures;

pub use bit_position::BitNumbering;
pub use can_decoder::{AwaitingMultiplexor, ResolvedSubset};
pub use can_encoder::PayloadBuilder;
pub use can_id::CanId;
pub use config::CodecConfig;
pub use defines::AttributeDefine;
pub use error::{CanError, Result, Unsupported};
pub use frame::{DlcStrategy, Frame};
pub use matrix::{CanMatrix, FrameRef};
pub use signal::{Multiplex, Signal, SignalBuilder};
pub use signal_group::SignalGroup;
pub use signal_layout::FrameFormat;
pub use value::{RawValue, SignalValues, Value};
