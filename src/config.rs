//! Codec configuration threaded into signal construction.

use serde::{Deserialize, Serialize};

use crate::bit_position::BitNumbering;

/// Attribute holding the raw value encoded when a signal is not given one.
pub const DEFAULT_START_VALUE_ATTRIBUTE: &str = "GenSigStartValue";

/// Settings shared by every signal built for one matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Signal attribute read for the default raw value on encode.
    pub start_value_attribute: String,
    /// Derive `min` from the raw range when none is given.
    pub calc_min_for_none: bool,
    /// Derive `max` from the raw range when none is given.
    pub calc_max_for_none: bool,
    /// Numbering assumed for builder start bits when the builder sets none.
    /// `None` means "consistent with the signal's byte order".
    pub default_bit_numbering: Option<BitNumbering>,
    /// Round physical values decoded from float signals to this many places.
    pub float_decimal_places: Option<u32>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            start_value_attribute: DEFAULT_START_VALUE_ATTRIBUTE.to_owned(),
            calc_min_for_none: true,
            calc_max_for_none: true,
            default_bit_numbering: None,
            float_decimal_places: None,
        }
    }
}
