/*!
 * Signals: named values packed into a bit range of a frame payload.
 *
 * A [`Signal`] owns its bit geometry, its raw encoding (signedness, float)
 * and the linear scaling `physical = raw * factor + offset`. All scaling is
 * done in [`Decimal`] so that fixed-point round trips are exact.
 */

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use crate::bit_position::{self, BitNumbering};
use crate::config::CodecConfig;
use crate::error::{CanError, Result};
use crate::value::{RawValue, Value};

/// Widest raw value a signal may carry.
pub const MAX_SIGNAL_BITS: u32 = 64;

/// Bits in the largest (CAN FD) payload; no signal may reach past it.
pub const MAX_PAYLOAD_BITS: u32 = 64 * 8;

/// Multiplex role of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplex {
    /// Selects which multiplexed signals are present.
    Multiplexor,
    /// Present only while the multiplexor equals this value.
    Value(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Unsigned,
    Signed,
    Float,
}

/// How a signal's bits are laid out in the packed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub byte_order: ByteOrder,
    pub kind: FieldKind,
    pub width: u32,
}

/// Raw value range of a `size`-bit field: `[0, 2^size - 1]` unsigned,
/// `[-2^(size-1), 2^(size-1) - 1]` signed.
pub fn raw_range(size: u32, is_signed: bool) -> (Decimal, Decimal) {
    if size == 0 {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    let size = size.min(MAX_SIGNAL_BITS);
    let span = 1i128 << (size - u32::from(is_signed));
    let low = if is_signed { -span } else { 0 };
    (
        Decimal::from_i128_with_scale(low, 0),
        Decimal::from_i128_with_scale(span - 1, 0),
    )
}

#[derive(Debug, Clone)]
pub struct Signal {
    name: String,
    start_bit: u32,
    size: u32,
    is_little_endian: bool,
    is_signed: bool,
    is_float: bool,
    factor: Decimal,
    offset: Decimal,
    min: Option<Decimal>,
    max: Option<Decimal>,
    multiplex: Option<Multiplex>,
    pub unit: String,
    pub comment: Option<String>,
    pub receivers: Vec<String>,
    pub values: BTreeMap<i64, String>,
    pub attributes: BTreeMap<String, String>,
    config: Arc<CodecConfig>,
}

impl Signal {
    pub fn builder(name: impl Into<String>) -> SignalBuilder {
        SignalBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored start bit (LSB0 for little-endian, MSB0 for big-endian signals).
    pub fn start_bit(&self) -> u32 {
        self.start_bit
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// One past the last bit claimed, in stored numbering.
    pub fn end_bit(&self) -> u32 {
        self.start_bit + self.size
    }

    pub fn is_little_endian(&self) -> bool {
        self.is_little_endian
    }

    pub fn is_signed(&self) -> bool {
        self.is_signed
    }

    pub fn is_float(&self) -> bool {
        self.is_float
    }

    pub fn factor(&self) -> Decimal {
        self.factor
    }

    pub fn offset(&self) -> Decimal {
        self.offset
    }

    pub fn min(&self) -> Option<Decimal> {
        self.min
    }

    pub fn max(&self) -> Option<Decimal> {
        self.max
    }

    pub fn multiplex(&self) -> Option<Multiplex> {
        self.multiplex
    }

    pub fn is_multiplexor(&self) -> bool {
        self.multiplex == Some(Multiplex::Multiplexor)
    }

    /// Multiplexor value this signal belongs to, if it is multiplexed.
    pub fn mux_value(&self) -> Option<u64> {
        match self.multiplex {
            Some(Multiplex::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub(crate) fn shared_config(&self) -> Arc<CodecConfig> {
        Arc::clone(&self.config)
    }

    /// J1939 suspect parameter number, when the `SPN` attribute is set.
    pub fn spn(&self) -> Option<&str> {
        self.attribute("SPN")
    }

    pub fn set_factor(&mut self, factor: Decimal) {
        self.factor = factor;
    }

    pub fn set_offset(&mut self, offset: Decimal) {
        self.offset = offset;
    }

    /// Re-place the signal from an externally numbered start bit.
    pub fn set_start_bit(
        &mut self,
        start_bit: u32,
        numbering: Option<BitNumbering>,
        start_is_lsb: bool,
    ) -> Result<()> {
        let start_bit = bit_position::normalize(
            start_bit,
            self.size,
            self.is_little_endian,
            numbering,
            start_is_lsb,
        )?;
        check_extent(&self.name, start_bit, self.size)?;
        self.start_bit = start_bit;
        Ok(())
    }

    /// Start bit expressed in an external convention.
    pub fn start_bit_as(&self, numbering: Option<BitNumbering>, start_is_lsb: bool) -> u32 {
        bit_position::denormalize(
            self.start_bit,
            self.size,
            self.is_little_endian,
            numbering,
            start_is_lsb,
        )
    }

    pub fn raw_range(&self) -> (Decimal, Decimal) {
        raw_range(self.size, self.is_signed)
    }

    /// `offset + raw_min * factor`, or `None` if it overflows.
    pub fn calc_min(&self) -> Option<Decimal> {
        let (raw_min, _) = self.raw_range();
        raw_min
            .checked_mul(self.factor)
            .and_then(|v| v.checked_add(self.offset))
    }

    /// `offset + raw_max * factor`, or `None` if it overflows.
    pub fn calc_max(&self) -> Option<Decimal> {
        let (_, raw_max) = self.raw_range();
        raw_max
            .checked_mul(self.factor)
            .and_then(|v| v.checked_add(self.offset))
    }

    /// Set the physical minimum. `None` derives it from the raw range when
    /// the config allows it.
    pub fn set_min(&mut self, min: Option<Decimal>) -> Option<Decimal> {
        self.min = match min {
            Some(min) => Some(min),
            None if self.config.calc_min_for_none => self.calc_min(),
            None => None,
        };
        self.min
    }

    /// Set the physical maximum. `None` derives it from the raw range when
    /// the config allows it.
    pub fn set_max(&mut self, max: Option<Decimal>) -> Option<Decimal> {
        self.max = match max {
            Some(max) => Some(max),
            None if self.config.calc_max_for_none => self.calc_max(),
            None => None,
        };
        self.max
    }

    pub fn in_range(&self, value: Decimal) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    pub fn field_descriptor(&self) -> FieldDescriptor {
        let byte_order = if self.is_little_endian {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        };
        let kind = if self.is_float {
            FieldKind::Float
        } else if self.is_signed {
            FieldKind::Signed
        } else {
            FieldKind::Unsigned
        };
        FieldDescriptor {
            byte_order,
            kind,
            width: self.size,
        }
    }

    pub fn add_value(&mut self, value: i64, name: impl Into<String>) {
        self.values.insert(value, name.into());
    }

    /// Value-table key for a symbolic name.
    pub fn symbol_value(&self, symbol: &str) -> Result<Decimal> {
        self.values
            .iter()
            .find(|(_, name)| name.as_str() == symbol)
            .map(|(key, _)| Decimal::from(*key))
            .ok_or_else(|| CanError::UnknownSymbol {
                signal: self.name.clone(),
                symbol: symbol.to_owned(),
            })
    }

    /// Symbolic name for an integral physical value, if the table has one.
    pub fn symbol_for(&self, physical: Decimal) -> Option<&str> {
        if !physical.fract().is_zero() {
            return None;
        }
        let key = physical.to_i64()?;
        self.values.get(&key).map(String::as_str)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn del_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    pub fn add_receiver(&mut self, receiver: impl Into<String>) {
        let receiver = receiver.into();
        if !self.receivers.contains(&receiver) {
            self.receivers.push(receiver);
        }
    }

    pub fn del_receiver(&mut self, receiver: &str) {
        self.receivers.retain(|r| r != receiver);
    }

    /// Raw value used when encode is not given one: the start value
    /// attribute truncated to an integer, or zero.
    pub fn start_value(&self) -> Result<Decimal> {
        let attribute = &self.config.start_value_attribute;
        match self.attributes.get(attribute) {
            None => Ok(Decimal::ZERO),
            Some(text) => Decimal::from_str(text.trim())
                .map(|d| d.trunc())
                .map_err(|_| CanError::InvalidAttribute {
                    signal: self.name.clone(),
                    attribute: attribute.clone(),
                    value: text.clone(),
                }),
        }
    }

    /// Convert a physical value to the raw value put on the bus.
    ///
    /// Out-of-range values are logged and encoded anyway. The result is
    /// truncated toward zero unless the signal is a float.
    pub fn physical_to_raw(&self, value: Option<&Value>) -> Result<Decimal> {
        let value = match value {
            None => return self.start_value(),
            Some(Value::Numeric(v)) => *v,
            Some(Value::Symbol(symbol)) => self.symbol_value(symbol)?,
        };

        if !self.in_range(value) {
            warn!(
                signal = %self.name,
                %value,
                min = ?self.min,
                max = ?self.max,
                "value outside of signal range"
            );
        }

        if self.factor.is_zero() {
            return Err(CanError::ZeroFactor(self.name.clone()));
        }
        let raw = value
            .checked_sub(self.offset)
            .and_then(|v| v.checked_div(self.factor))
            .ok_or_else(|| CanError::Overflow(self.name.clone()))?;

        Ok(if self.is_float { raw } else { raw.trunc() })
    }

    /// Convert a raw value read from the bus to its physical value.
    ///
    /// With `to_symbol`, a physical value matching a value-table key is
    /// returned as its symbolic name.
    pub fn raw_to_physical(&self, raw: RawValue, to_symbol: bool) -> Result<Value> {
        let raw = match raw {
            RawValue::Unsigned(v) => Decimal::from(v),
            RawValue::Signed(v) => Decimal::from(v),
            RawValue::Float(v) => {
                let exact =
                    Decimal::from_f64_retain(v).ok_or_else(|| CanError::NonFiniteFloat {
                        signal: self.name.clone(),
                        value: v,
                    })?;
                match self.config.float_decimal_places {
                    Some(places) => exact.round_dp(places),
                    None => exact,
                }
            }
        };

        let physical = raw
            .checked_mul(self.factor)
            .and_then(|v| v.checked_add(self.offset))
            .ok_or_else(|| CanError::Overflow(self.name.clone()))?;

        if to_symbol {
            if let Some(symbol) = self.symbol_for(physical) {
                return Ok(Value::Symbol(symbol.to_owned()));
            }
        }
        Ok(Value::Numeric(physical))
    }

    /// Shape a raw decimal from [`physical_to_raw`](Self::physical_to_raw)
    /// into the representation its field is packed with.
    pub fn to_raw_value(&self, raw: Decimal) -> Result<RawValue> {
        let overflow = || CanError::Overflow(self.name.clone());
        match self.field_descriptor().kind {
            FieldKind::Float => raw.to_f64().map(RawValue::Float).ok_or_else(overflow),
            // Out-of-range values wrap here and are masked to the field width.
            FieldKind::Signed => raw
                .to_i128()
                .map(|v| RawValue::Signed(v as i64))
                .ok_or_else(overflow),
            FieldKind::Unsigned => raw
                .to_i128()
                .map(|v| RawValue::Unsigned(v as u64))
                .ok_or_else(overflow),
        }
    }
}

/// Builder for [`Signal`].
///
/// Defaults: little-endian, signed, factor 1, offset 0, start bit given
/// in the numbering set by [`bit_numbering`](Self::bit_numbering) or the
/// config default.
#[derive(Debug, Clone)]
pub struct SignalBuilder {
    name: String,
    start_bit: u32,
    size: u32,
    is_little_endian: bool,
    is_signed: bool,
    is_float: bool,
    factor: Decimal,
    offset: Decimal,
    min: Option<Decimal>,
    max: Option<Decimal>,
    multiplex: Option<Multiplex>,
    unit: String,
    comment: Option<String>,
    receivers: Vec<String>,
    values: BTreeMap<i64, String>,
    attributes: BTreeMap<String, String>,
    numbering: Option<BitNumbering>,
    start_is_lsb: bool,
    config: Arc<CodecConfig>,
}

impl SignalBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        SignalBuilder {
            name: name.into(),
            start_bit: 0,
            size: 0,
            is_little_endian: true,
            is_signed: true,
            is_float: false,
            factor: Decimal::ONE,
            offset: Decimal::ZERO,
            min: None,
            max: None,
            multiplex: None,
            unit: String::new(),
            comment: None,
            receivers: Vec::new(),
            values: BTreeMap::new(),
            attributes: BTreeMap::new(),
            numbering: None,
            start_is_lsb: false,
            config: Arc::default(),
        }
    }

    pub fn with_config(mut self, config: Arc<CodecConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn start_bit(mut self, start_bit: u32) -> Self {
        self.start_bit = start_bit;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn little_endian(mut self, is_little_endian: bool) -> Self {
        self.is_little_endian = is_little_endian;
        self
    }

    pub fn signed(mut self, is_signed: bool) -> Self {
        self.is_signed = is_signed;
        self
    }

    pub fn float(mut self, is_float: bool) -> Self {
        self.is_float = is_float;
        self
    }

    pub fn factor(mut self, factor: Decimal) -> Self {
        self.factor = factor;
        self
    }

    pub fn offset(mut self, offset: Decimal) -> Self {
        self.offset = offset;
        self
    }

    pub fn min(mut self, min: Decimal) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: Decimal) -> Self {
        self.max = Some(max);
        self
    }

    pub fn multiplex(mut self, multiplex: Multiplex) -> Self {
        self.multiplex = Some(multiplex);
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receivers.push(receiver.into());
        self
    }

    pub fn value(mut self, value: i64, name: impl Into<String>) -> Self {
        self.values.insert(value, name.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Numbering of the start bit passed to [`start_bit`](Self::start_bit).
    pub fn bit_numbering(mut self, numbering: BitNumbering) -> Self {
        self.numbering = Some(numbering);
        self
    }

    /// The start bit addresses the signal's least significant bit.
    pub fn start_is_lsb(mut self, start_is_lsb: bool) -> Self {
        self.start_is_lsb = start_is_lsb;
        self
    }

    pub fn build(self) -> Result<Signal> {
        if self.size > MAX_SIGNAL_BITS {
            return Err(CanError::InvalidGeometry {
                signal: self.name,
                reason: format!("{} bits exceeds the {MAX_SIGNAL_BITS}-bit limit", self.size),
            });
        }
        if self.is_float && self.size != 32 && self.size != 64 {
            return Err(CanError::InvalidGeometry {
                signal: self.name,
                reason: format!("float signals must be 32 or 64 bits, not {}", self.size),
            });
        }

        let numbering = self.numbering.or(self.config.default_bit_numbering);
        let start_bit = bit_position::normalize(
            self.start_bit,
            self.size,
            self.is_little_endian,
            numbering,
            self.start_is_lsb,
        )?;
        check_extent(&self.name, start_bit, self.size)?;

        let mut signal = Signal {
            name: self.name,
            start_bit,
            size: self.size,
            is_little_endian: self.is_little_endian,
            is_signed: self.is_signed,
            is_float: self.is_float,
            factor: self.factor,
            offset: self.offset,
            min: None,
            max: None,
            multiplex: self.multiplex,
            unit: self.unit,
            comment: self.comment,
            receivers: self.receivers,
            values: self.values,
            attributes: self.attributes,
            config: self.config,
        };
        signal.set_min(self.min);
        signal.set_max(self.max);
        Ok(signal)
    }
}

fn check_extent(name: &str, start_bit: u32, size: u32) -> Result<()> {
    match start_bit.checked_add(size) {
        Some(end) if end <= MAX_PAYLOAD_BITS => Ok(()),
        _ => Err(CanError::InvalidGeometry {
            signal: name.to_owned(),
            reason: format!(
                "bits {start_bit}+{size} reach past the {MAX_PAYLOAD_BITS}-bit payload limit"
            ),
        }),
    }
}
