use rust_decimal::Decimal;
use tracing::{debug, trace};

use crate::error::{CanError, Result};
use crate::frame::Frame;
use crate::signal::Signal;
use crate::value::{SignalValues, Value};

impl Frame {
    /// Encode physical values into a payload of exactly `size` bytes.
    ///
    /// Signals missing from `values` get their start value. Names unknown
    /// to the frame are an error; values for signals outside the active
    /// multiplex branch are ignored.
    pub fn encode(&self, values: &SignalValues) -> Result<Vec<u8>> {
        if let Some(unknown) = values.keys().find(|name| self.signal_index(name).is_none()) {
            return Err(CanError::UnknownSignal(unknown.clone()));
        }

        let subset = self.encode_subset(values)?;
        for name in values.keys() {
            if !subset.iter().any(|(_, s)| s.name() == name.as_str()) {
                debug!(frame = %self.name, signal = %name, "ignoring value of inactive multiplexed signal");
            }
        }

        let format = self.format_for(subset)?;
        let mut raws = Vec::new();
        for index in format.signal_indices() {
            let signal = &self.signals()[index];
            let raw = signal.physical_to_raw(values.get(signal.name()))?;
            let raw = signal.to_raw_value(raw)?;
            trace!(signal = signal.name(), ?raw, "packing signal");
            raws.push(raw);
        }
        Ok(format.pack(&raws))
    }

    /// Start building a payload signal by signal.
    pub fn payload_builder(&self) -> PayloadBuilder<'_> {
        PayloadBuilder::new(self)
    }

    fn encode_subset(&self, values: &SignalValues) -> Result<Vec<(usize, &Signal)>> {
        let Some((_, multiplexor)) = self.simple_multiplexor()? else {
            return Ok(self.signals().iter().enumerate().collect());
        };
        let selector = selector_value(multiplexor, values.get(multiplexor.name()))?;
        debug!(frame = %self.name, %selector, "encoding multiplexed branch");
        Ok(self.subset_for_selector(selector))
    }
}

/// Physical value of the multiplexor used to pick the branch to encode.
fn selector_value(multiplexor: &Signal, value: Option<&Value>) -> Result<Decimal> {
    match value {
        Some(Value::Numeric(v)) => Ok(*v),
        Some(Value::Symbol(symbol)) => multiplexor.symbol_value(symbol),
        None => {
            let raw = multiplexor.to_raw_value(multiplexor.start_value()?)?;
            match multiplexor.raw_to_physical(raw, false)? {
                Value::Numeric(v) => Ok(v),
                Value::Symbol(symbol) => multiplexor.symbol_value(&symbol),
            }
        }
    }
}

/// Collects physical values by name, then encodes them in one go.
pub struct PayloadBuilder<'a> {
    frame: &'a Frame,
    values: SignalValues,
}

impl<'a> PayloadBuilder<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        Self {
            frame,
            values: SignalValues::new(),
        }
    }

    /// Fails on names the frame does not define.
    pub fn set(mut self, signal_name: &str, value: impl Into<Value>) -> Result<Self> {
        if self.frame.signal_index(signal_name).is_none() {
            return Err(CanError::UnknownSignal(signal_name.to_owned()));
        }
        self.values.insert(signal_name.to_owned(), value.into());
        Ok(self)
    }

    pub fn build(self) -> Result<Vec<u8>> {
        self.frame.encode(&self.values)
    }
}
