/*!
 * Bit layouts used to pack/unpack signals into frame payload bytes.
 *
 * A payload is treated as a stream of `size * 8` bits. Stream bit 0 is the
 * most significant bit of byte 0, stream bit 8 the most significant bit of
 * byte 1, and so on. A signal with stored start bit `s` and size `w` owns
 * stream bits `s..s + w`. Big-endian fields are stored MSB first along the
 * stream, little-endian fields LSB first.
 */

use std::fmt;

use crate::error::{CanError, Result};
use crate::signal::{ByteOrder, FieldDescriptor, FieldKind, Signal};
use crate::value::RawValue;

/// One contiguous span of bits within a single byte of the payload.
///
/// Describes a mapping: "take `num_bits` consecutive bits starting at
/// `bit_offset` in `data[byte_index]`, and place them at `value_shift`
/// in the raw u64 value."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSpan {
    pub byte_index: usize,
    /// Lowest bit position within the byte (0..=7).
    pub bit_offset: u8,
    /// How many consecutive bits in this span (1..=8).
    pub num_bits: u8,
    /// Where these bits land in the raw u64, LSB-relative.
    pub value_shift: u8,
    /// The span holds value bits in reverse order (little-endian fields).
    pub reversed: bool,
}

impl BitSpan {
    fn mask(&self) -> u8 {
        ((1u16 << self.num_bits) - 1) as u8
    }

    fn reorder(&self, bits: u8) -> u8 {
        if self.reversed {
            bits.reverse_bits() >> (8 - self.num_bits)
        } else {
            bits
        }
    }
}

/// Precomputed mapping from one field's stream bits to payload bytes.
///
/// The same layout is used by both `extract` and `pack`, so they are
/// inverses by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalLayout {
    pub segments: Vec<BitSpan>,
    pub descriptor: FieldDescriptor,
}

impl SignalLayout {
    /// Lay out a field whose first stream bit is `stream_offset`.
    pub fn for_field(stream_offset: u32, descriptor: FieldDescriptor) -> Self {
        let reversed = descriptor.byte_order == ByteOrder::LittleEndian;
        let mut segments = Vec::new();
        let mut byte_index = (stream_offset / 8) as usize;
        // The stream walks each byte from its MSB down.
        let mut bit_index = 7 - (stream_offset % 8) as u8;
        let mut remaining = descriptor.width;
        let mut consumed = 0u32;

        while remaining > 0 {
            let num_bits = std::cmp::min(u32::from(bit_index) + 1, remaining) as u8;
            let bit_offset = bit_index + 1 - num_bits;
            remaining -= u32::from(num_bits);
            // Big-endian: first bits along the stream are the MSB of the value.
            // Little-endian: first bits along the stream are the LSB.
            let value_shift = if reversed { consumed } else { remaining };
            segments.push(BitSpan {
                byte_index,
                bit_offset,
                num_bits,
                value_shift: value_shift as u8,
                reversed,
            });
            consumed += u32::from(num_bits);
            byte_index += 1;
            bit_index = 7;
        }

        Self {
            segments,
            descriptor,
        }
    }

    /// Extract the field's bits, right-aligned.
    pub fn extract(&self, data: &[u8]) -> u64 {
        let mut result: u64 = 0;
        for span in &self.segments {
            let bits = (data[span.byte_index] >> span.bit_offset) & span.mask();
            result |= u64::from(span.reorder(bits)) << span.value_shift;
        }
        result
    }

    /// Write the low `width` bits of `raw` into the payload.
    ///
    /// Clears target bits before writing so that multiple fields can be
    /// packed into the same buffer.
    pub fn pack(&self, data: &mut [u8], raw: u64) {
        for span in &self.segments {
            let mask = span.mask();
            let bits = span.reorder(((raw >> span.value_shift) as u8) & mask);
            data[span.byte_index] &= !(mask << span.bit_offset);
            data[span.byte_index] |= bits << span.bit_offset;
        }
    }

    /// Extract and interpret the field according to its kind.
    pub fn read(&self, data: &[u8]) -> RawValue {
        let bits = self.extract(data);
        let width = self.descriptor.width;
        match self.descriptor.kind {
            FieldKind::Unsigned => RawValue::Unsigned(bits),
            FieldKind::Signed if width == 0 => RawValue::Signed(0),
            FieldKind::Signed => {
                let shift_len = 64 - width;
                RawValue::Signed(((bits as i64) << shift_len) >> shift_len)
            }
            FieldKind::Float if width == 32 => {
                RawValue::Float(f64::from(f32::from_bits(bits as u32)))
            }
            FieldKind::Float => RawValue::Float(f64::from_bits(bits)),
        }
    }

    /// Pack a raw value in the field's representation.
    pub fn write(&self, data: &mut [u8], raw: RawValue) {
        let bits = match self.descriptor.kind {
            FieldKind::Float => {
                let v = match raw {
                    RawValue::Float(v) => v,
                    RawValue::Unsigned(v) => v as f64,
                    RawValue::Signed(v) => v as f64,
                };
                if self.descriptor.width == 32 {
                    u64::from((v as f32).to_bits())
                } else {
                    v.to_bits()
                }
            }
            FieldKind::Unsigned | FieldKind::Signed => match raw {
                RawValue::Unsigned(v) => v,
                RawValue::Signed(v) => v as u64,
                RawValue::Float(v) => v as i64 as u64,
            },
        };
        self.pack(data, bits);
    }
}

/// One entry of a frame format, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatField {
    /// Bits not claimed by any signal.
    Padding { offset: u32, width: u32 },
    /// A signal, by its index in the frame's signal list.
    Signal {
        index: usize,
        offset: u32,
        descriptor: FieldDescriptor,
    },
}

impl FormatField {
    pub fn width(&self) -> u32 {
        match self {
            FormatField::Padding { width, .. } => *width,
            FormatField::Signal { descriptor, .. } => descriptor.width,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    index: usize,
    layout: SignalLayout,
}

/// The full bit layout of a frame payload for one set of signals.
///
/// Signals are ordered by start bit and every gap is covered by padding, so
/// the field widths always add up to the payload width. Zero-width signals
/// have no field but still decode (as zero).
#[derive(Debug, Clone)]
pub struct FrameFormat {
    frame: String,
    size: usize,
    fields: Vec<FormatField>,
    slots: Vec<Slot>,
}

impl FrameFormat {
    /// Lay out `signals` (paired with their index in the frame) inside a
    /// `size`-byte payload.
    pub fn build<'a>(
        frame: &str,
        size: usize,
        signals: impl IntoIterator<Item = (usize, &'a Signal)>,
    ) -> Result<Self> {
        let frame_bits = (size * 8) as u32;
        let mut placed: Vec<(usize, &Signal)> = signals.into_iter().collect();
        placed.sort_by_key(|(_, signal)| signal.start_bit());

        let mut fields = Vec::with_capacity(placed.len() * 2 + 1);
        let mut slots = Vec::with_capacity(placed.len());
        let mut cursor = 0u32;
        let mut last: Option<&Signal> = None;

        for (index, signal) in placed {
            let start = signal.start_bit();
            if signal.end_bit() > frame_bits {
                return Err(CanError::SignalOutOfFrame {
                    frame: frame.to_owned(),
                    signal: signal.name().to_owned(),
                    start_bit: start,
                    end_bit: signal.end_bit(),
                    frame_bits,
                });
            }
            let descriptor = signal.field_descriptor();
            slots.push(Slot {
                index,
                layout: SignalLayout::for_field(start, descriptor),
            });
            // Zero-width signals read as zero and occupy no payload bits.
            if signal.size() == 0 {
                continue;
            }
            if start < cursor {
                return Err(CanError::OverlappingSignals {
                    frame: frame.to_owned(),
                    first: last.map(|s| s.name().to_owned()).unwrap_or_default(),
                    second: signal.name().to_owned(),
                });
            }
            if start > cursor {
                fields.push(FormatField::Padding {
                    offset: cursor,
                    width: start - cursor,
                });
            }
            fields.push(FormatField::Signal {
                index,
                offset: start,
                descriptor,
            });
            cursor = signal.end_bit();
            last = Some(signal);
        }

        if cursor < frame_bits {
            fields.push(FormatField::Padding {
                offset: cursor,
                width: frame_bits - cursor,
            });
        }

        Ok(Self {
            frame: frame.to_owned(),
            size,
            fields,
            slots,
        })
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Total width in bits; always `size * 8`.
    pub fn width(&self) -> u32 {
        self.fields.iter().map(FormatField::width).sum()
    }

    pub fn fields(&self) -> &[FormatField] {
        &self.fields
    }

    /// Frame signal indices in stream order.
    pub fn signal_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().map(|slot| slot.index)
    }

    /// Pack raw values, given in [`signal_indices`](Self::signal_indices)
    /// order, into a zero-initialized payload.
    pub fn pack(&self, raws: &[RawValue]) -> Vec<u8> {
        debug_assert_eq!(raws.len(), self.slots.len());
        let mut data = vec![0u8; self.size];
        for (slot, raw) in self.slots.iter().zip(raws) {
            slot.layout.write(&mut data, *raw);
        }
        data
    }

    /// Read every signal's raw value, paired with its frame index.
    ///
    /// Bytes beyond the payload size are ignored.
    pub fn unpack(&self, payload: &[u8]) -> Result<Vec<(usize, RawValue)>> {
        if payload.len() < self.size {
            return Err(CanError::PayloadTooShort {
                frame: self.frame.clone(),
                expected: self.size,
                actual: payload.len(),
            });
        }
        Ok(self
            .slots
            .iter()
            .map(|slot| (slot.index, slot.layout.read(payload)))
            .collect())
    }
}

/// Compact description of the layout, e.g. `>u1p2<s12p1`.
impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            match field {
                FormatField::Padding { width, .. } => write!(f, "p{width}")?,
                FormatField::Signal { descriptor, .. } => {
                    let order = match descriptor.byte_order {
                        ByteOrder::BigEndian => '>',
                        ByteOrder::LittleEndian => '<',
                    };
                    let kind = match descriptor.kind {
                        FieldKind::Unsigned => 'u',
                        FieldKind::Signed => 's',
                        FieldKind::Float => 'f',
                    };
                    write!(f, "{order}{kind}{}", descriptor.width)?;
                }
            }
        }
        Ok(())
    }
}
