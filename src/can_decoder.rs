/*!
 * Decoding frame payloads into physical signal values.
 *
 * Multiplexed frames decode in two stages: [`AwaitingMultiplexor`] reads
 * only the multiplexor, which yields a [`ResolvedSubset`] holding the
 * signals of the selected branch.
 */

use rust_decimal::Decimal;
use tracing::{debug, trace};

use crate::error::Result;
use crate::frame::Frame;
use crate::signal::Signal;
use crate::signal_layout::FrameFormat;
use crate::value::{SignalValues, Value};

impl Frame {
    /// Decode a payload into physical values keyed by signal name.
    ///
    /// With `to_symbol`, values found in a signal's value table are returned
    /// as their symbolic names. Bytes beyond the frame size are ignored.
    pub fn decode(&self, payload: &[u8], to_symbol: bool) -> Result<SignalValues> {
        match self.awaiting_multiplexor()? {
            Some(stage) => stage.resolve(payload)?.decode(payload, to_symbol),
            None => decode_with(self, &self.format()?, payload, to_symbol),
        }
    }

    /// First decode stage of a multiplexed frame, or `None` if the frame is
    /// not multiplexed.
    pub fn awaiting_multiplexor(&self) -> Result<Option<AwaitingMultiplexor<'_>>> {
        Ok(self
            .simple_multiplexor()?
            .map(|(index, multiplexor)| AwaitingMultiplexor {
                frame: self,
                index,
                multiplexor,
            }))
    }
}

fn decode_with(
    frame: &Frame,
    format: &FrameFormat,
    payload: &[u8],
    to_symbol: bool,
) -> Result<SignalValues> {
    let mut values = SignalValues::new();
    for (index, raw) in format.unpack(payload)? {
        let signal = &frame.signals()[index];
        trace!(signal = signal.name(), ?raw, "unpacked signal");
        values.insert(signal.name().to_owned(), signal.raw_to_physical(raw, to_symbol)?);
    }
    Ok(values)
}

/// A multiplexed frame whose branch is not known yet.
#[derive(Debug, Clone, Copy)]
pub struct AwaitingMultiplexor<'a> {
    frame: &'a Frame,
    index: usize,
    multiplexor: &'a Signal,
}

impl<'a> AwaitingMultiplexor<'a> {
    pub fn multiplexor(&self) -> &'a Signal {
        self.multiplexor
    }

    /// Read the multiplexor (numerically) and select the active branch.
    pub fn resolve(self, payload: &[u8]) -> Result<ResolvedSubset<'a>> {
        let format = self.frame.format_for([(self.index, self.multiplexor)])?;
        let mut selector = Decimal::ZERO;
        for (_, raw) in format.unpack(payload)? {
            if let Value::Numeric(v) = self.multiplexor.raw_to_physical(raw, false)? {
                selector = v;
            }
        }
        debug!(frame = %self.frame.name, %selector, "resolved multiplexor");
        Ok(ResolvedSubset {
            frame: self.frame,
            selector,
            subset: self.frame.subset_for_selector(selector),
        })
    }
}

/// A multiplexed frame with its active branch selected.
#[derive(Debug, Clone)]
pub struct ResolvedSubset<'a> {
    frame: &'a Frame,
    selector: Decimal,
    subset: Vec<(usize, &'a Signal)>,
}

impl<'a> ResolvedSubset<'a> {
    /// Physical value the multiplexor read.
    pub fn selector(&self) -> Decimal {
        self.selector
    }

    pub fn signals(&self) -> impl Iterator<Item = &'a Signal> + '_ {
        self.subset.iter().map(|(_, signal)| *signal)
    }

    /// Decode the multiplexor and every signal of the selected branch.
    pub fn decode(self, payload: &[u8], to_symbol: bool) -> Result<SignalValues> {
        let format = self.frame.format_for(self.subset)?;
        decode_with(self.frame, &format, payload, to_symbol)
    }
}
