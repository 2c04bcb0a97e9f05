/*!
 * The communication matrix: every frame of a bus plus shared definitions.
 *
 * [`CanMatrix::encode`] and [`CanMatrix::decode`] are thin lookups that
 * delegate to [`Frame::encode`] and [`Frame::decode`].
 */

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CodecConfig;
use crate::defines::AttributeDefine;
use crate::error::{CanError, Result};
use crate::frame::{DlcStrategy, Frame, MAX_CLASSIC_SIZE};
use crate::signal::{Signal, SignalBuilder};
use crate::value::SignalValues;

/// Bit 31 of an identifier, commonly used to flag extended frames.
pub const EXTENDED_MARKER: u32 = 0x8000_0000;

/// How to find a frame in a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRef<'a> {
    Id(u32),
    Name(&'a str),
}

impl From<u32> for FrameRef<'_> {
    fn from(id: u32) -> Self {
        FrameRef::Id(id)
    }
}

impl<'a> From<&'a str> for FrameRef<'a> {
    fn from(name: &'a str) -> Self {
        FrameRef::Name(name)
    }
}

impl fmt::Display for FrameRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRef::Id(id) => write!(f, "0x{id:X}"),
            FrameRef::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CanMatrix {
    config: Arc<CodecConfig>,
    frames: Vec<Frame>,
    pub attributes: BTreeMap<String, String>,
    pub signal_defines: BTreeMap<String, AttributeDefine>,
    pub frame_defines: BTreeMap<String, AttributeDefine>,
}

impl Default for CanMatrix {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl CanMatrix {
    pub fn new(config: CodecConfig) -> Self {
        CanMatrix {
            config: Arc::new(config),
            frames: Vec::new(),
            attributes: BTreeMap::new(),
            signal_defines: BTreeMap::new(),
            frame_defines: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// A signal builder that uses this matrix's codec config.
    pub fn signal_builder(&self, name: impl Into<String>) -> SignalBuilder {
        Signal::builder(name).with_config(Arc::clone(&self.config))
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn add_frame(&mut self, frame: Frame) -> &mut Frame {
        if self.frame_by_name(&frame.name).is_some() {
            warn!(frame = %frame.name, "matrix already holds a frame with this name");
        }
        let index = self.frames.len();
        self.frames.push(frame);
        &mut self.frames[index]
    }

    pub fn remove_frame(&mut self, name: &str) -> Option<Frame> {
        let index = self.frames.iter().position(|f| f.name == name)?;
        Some(self.frames.remove(index))
    }

    /// Find a frame by arbitration id.
    ///
    /// `extended: None` matches either kind and also accepts extended ids
    /// flagged with bit 31.
    pub fn frame_by_id(&self, id: u32, extended: Option<bool>) -> Option<&Frame> {
        self.frames.iter().find(|f| match extended {
            Some(extended) => f.id == id && f.is_extended == extended,
            None => {
                f.id == id
                    || (f.is_extended && id & EXTENDED_MARKER != 0 && f.id == id & !EXTENDED_MARKER)
            }
        })
    }

    pub fn frame_by_name(&self, name: &str) -> Option<&Frame> {
        self.frames.iter().find(|f| f.name == name)
    }

    pub fn frame_by_name_mut(&mut self, name: &str) -> Option<&mut Frame> {
        self.frames.iter_mut().find(|f| f.name == name)
    }

    pub fn frame(&self, frame: FrameRef<'_>) -> Result<&Frame> {
        let found = match frame {
            FrameRef::Id(id) => self.frame_by_id(id, None),
            FrameRef::Name(name) => self.frame_by_name(name),
        };
        found.ok_or_else(|| CanError::UnknownFrame(frame.to_string()))
    }

    pub fn encode<'a>(&self, frame: impl Into<FrameRef<'a>>, values: &SignalValues) -> Result<Vec<u8>> {
        self.frame(frame.into())?.encode(values)
    }

    pub fn decode<'a>(
        &self,
        frame: impl Into<FrameRef<'a>>,
        payload: &[u8],
        to_symbol: bool,
    ) -> Result<SignalValues> {
        self.frame(frame.into())?.decode(payload, to_symbol)
    }

    /// Recompute the size of every frame.
    pub fn recalc_dlc(&mut self, strategy: DlcStrategy) {
        for frame in &mut self.frames {
            frame.recalc_dlc(strategy);
        }
    }

    /// Flag every frame longer than a classic payload as CAN FD.
    pub fn set_fd_type(&mut self) {
        for frame in &mut self.frames {
            if frame.size > MAX_CLASSIC_SIZE && !frame.is_fd {
                debug!(frame = %frame.name, size = frame.size, "marking frame as CAN FD");
                frame.is_fd = true;
            }
        }
    }

    pub fn contains_fd(&self) -> bool {
        self.frames.iter().any(|f| f.is_fd)
    }

    pub fn contains_j1939(&self) -> bool {
        self.frames.iter().any(Frame::is_j1939)
    }

    /// Remove zero-width signals from every frame.
    pub fn delete_zero_signals(&mut self) -> usize {
        self.frames
            .iter_mut()
            .map(Frame::delete_zero_signals)
            .sum()
    }

    /// A signal attribute, falling back to the define's default.
    pub fn signal_attribute<'a>(&'a self, signal: &'a Signal, name: &str) -> Option<&'a str> {
        signal
            .attribute(name)
            .or_else(|| self.signal_defines.get(name)?.default.as_deref())
    }

    /// A frame attribute, falling back to the define's default.
    pub fn frame_attribute<'a>(&'a self, frame: &'a Frame, name: &str) -> Option<&'a str> {
        frame
            .attribute(name)
            .or_else(|| self.frame_defines.get(name)?.default.as_deref())
    }

    /// Replace enum attribute indices with their labels.
    pub fn enum_attributes_to_labels(&mut self) {
        let frame_defines = &self.frame_defines;
        let signal_defines = &self.signal_defines;
        for frame in &mut self.frames {
            relabel(&mut frame.attributes, frame_defines, index_to_label);
            for name in signal_names(frame) {
                if let Some(signal) = frame.signal_by_name_mut(&name) {
                    relabel(&mut signal.attributes, signal_defines, index_to_label);
                }
            }
        }
    }

    /// Replace enum attribute labels with their indices.
    pub fn enum_attributes_to_indices(&mut self) {
        let frame_defines = &self.frame_defines;
        let signal_defines = &self.signal_defines;
        for frame in &mut self.frames {
            relabel(&mut frame.attributes, frame_defines, label_to_index);
            for name in signal_names(frame) {
                if let Some(signal) = frame.signal_by_name_mut(&name) {
                    relabel(&mut signal.attributes, signal_defines, label_to_index);
                }
            }
        }
    }
}

fn signal_names(frame: &Frame) -> Vec<String> {
    frame.signals().iter().map(|s| s.name().to_owned()).collect()
}

fn index_to_label(define: &AttributeDefine, value: &str) -> Option<String> {
    let index = value.trim().parse::<usize>().ok()?;
    define.enum_label(index).map(str::to_owned)
}

fn label_to_index(define: &AttributeDefine, value: &str) -> Option<String> {
    define.enum_index(value).map(|index| index.to_string())
}

/// Rewrite every enum attribute through `convert`, leaving values it
/// cannot map untouched.
fn relabel(
    attributes: &mut BTreeMap<String, String>,
    defines: &BTreeMap<String, AttributeDefine>,
    convert: fn(&AttributeDefine, &str) -> Option<String>,
) {
    for (name, value) in attributes.iter_mut() {
        let Some(define) = defines.get(name).filter(|d| d.is_enum()) else {
            continue;
        };
        match convert(define, value) {
            Some(converted) => *value = converted,
            None => warn!(attribute = %name, %value, "enum attribute value has no mapping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_position::BitNumbering;
    use crate::fixtures::{example_message, multiplexed_frame};
    use crate::value::Value;
    use rust_decimal_macros::dec;

    fn matrix() -> CanMatrix {
        let mut matrix = CanMatrix::default();
        matrix.add_frame(example_message());
        let mut extended = multiplexed_frame();
        extended.id = 0x1234_5678;
        extended.is_extended = true;
        matrix.add_frame(extended);
        matrix
    }

    // ---------------------------------------------------------------
    // lookup
    // ---------------------------------------------------------------

    #[test]
    fn test_frame_by_id() {
        let matrix = matrix();
        assert_eq!(matrix.frame_by_id(0x1F0, None).unwrap().name, "ExampleMessage");
        assert_eq!(matrix.frame_by_id(0x1F0, Some(false)).unwrap().name, "ExampleMessage");
        assert!(matrix.frame_by_id(0x1F0, Some(true)).is_none());
        assert!(matrix.frame_by_id(0x1F1, None).is_none());
    }

    #[test]
    fn test_frame_by_id_extended_marker() {
        let matrix = matrix();
        let frame = matrix.frame_by_id(0x9234_5678, None).unwrap();
        assert_eq!(frame.name, "Muxed");
        // The marker is only honoured when the caller does not filter.
        assert!(matrix.frame_by_id(0x9234_5678, Some(true)).is_none());
        // Standard frames never match through the marker.
        assert!(matrix.frame_by_id(0x8000_01F0, None).is_none());
    }

    #[test]
    fn test_remove_frame() {
        let mut matrix = matrix();
        assert!(matrix.remove_frame("ExampleMessage").is_some());
        assert!(matrix.remove_frame("ExampleMessage").is_none());
        assert_eq!(matrix.frames().len(), 1);
    }

    // ---------------------------------------------------------------
    // dispatch
    // ---------------------------------------------------------------

    #[test]
    fn test_encode_decode_by_id_and_name() {
        let matrix = matrix();
        let payload = [0xA5, 0xB6, 0xC0, 0, 0, 0, 0, 0];
        let by_id = matrix.decode(0x1F0_u32, &payload, false).unwrap();
        let by_name = matrix.decode("ExampleMessage", &payload, false).unwrap();
        assert_eq!(by_id, by_name);
        assert_eq!(by_id["Temperature"], Value::Numeric(dec!(244.14)));
        assert_eq!(matrix.encode(0x1F0_u32, &by_id).unwrap(), payload.to_vec());

        let muxed = matrix.decode(0x9234_5678_u32, &[0x5E], false).unwrap();
        assert_eq!(muxed["B"], Value::from(30_i64));
    }

    #[test]
    fn test_unknown_frame_is_error() {
        let matrix = matrix();
        let err = matrix.decode(0x7FF_u32, &[0; 8], false).unwrap_err();
        match err {
            CanError::UnknownFrame(what) => assert_eq!(what, "0x7FF"),
            other => panic!("unexpected error {other:?}"),
        }
        let err = matrix.encode("Nope", &SignalValues::new()).unwrap_err();
        assert!(matches!(err, CanError::UnknownFrame(name) if name == "Nope"));
    }

    // ---------------------------------------------------------------
    // housekeeping
    // ---------------------------------------------------------------

    #[test]
    fn test_signal_builder_uses_matrix_config() {
        let matrix = CanMatrix::new(CodecConfig {
            default_bit_numbering: Some(BitNumbering::Lsb0),
            calc_max_for_none: false,
            ..CodecConfig::default()
        });
        let signal = matrix
            .signal_builder("Msb")
            .start_bit(7)
            .size(8)
            .little_endian(false)
            .build()
            .unwrap();
        assert_eq!(signal.start_bit(), 0);
        assert_eq!(signal.max(), None);
        assert_eq!(signal.config(), matrix.config());
    }

    #[test]
    fn test_recalc_dlc_and_fd_type() {
        let mut matrix = CanMatrix::default();
        let mut wide = Frame::new("Wide", 0x10, 8);
        wide.add_signal(
            Signal::builder("Long")
                .start_bit(0)
                .size(64)
                .build()
                .unwrap(),
        )
        .unwrap();
        wide.add_signal(
            Signal::builder("Tail")
                .start_bit(64)
                .size(32)
                .build()
                .unwrap(),
        )
        .unwrap();
        matrix.add_frame(wide);
        let mut roomy = Frame::new("Roomy", 0x11, 8);
        roomy
            .add_signal(Signal::builder("A").size(4).build().unwrap())
            .unwrap();
        matrix.add_frame(roomy);

        matrix.recalc_dlc(DlcStrategy::Max);
        assert_eq!(matrix.frame_by_name("Wide").unwrap().size, 12);
        assert_eq!(matrix.frame_by_name("Roomy").unwrap().size, 8);

        assert!(!matrix.contains_fd());
        matrix.set_fd_type();
        assert!(matrix.contains_fd());
        assert!(matrix.frame_by_name("Wide").unwrap().is_fd);
        assert!(!matrix.frame_by_name("Roomy").unwrap().is_fd);

        matrix.recalc_dlc(DlcStrategy::Force);
        assert_eq!(matrix.frame_by_name("Roomy").unwrap().size, 1);
    }

    #[test]
    fn test_contains_j1939() {
        let mut matrix = matrix();
        assert!(!matrix.contains_j1939());
        matrix
            .frame_by_name_mut("ExampleMessage")
            .unwrap()
            .set_j1939(6, 0xFEF1, 0x00);
        assert!(matrix.contains_j1939());
    }

    #[test]
    fn test_delete_zero_signals() {
        let mut matrix = matrix();
        matrix
            .frame_by_name_mut("ExampleMessage")
            .unwrap()
            .add_signal(Signal::builder("Nothing").start_bit(40).size(0).build().unwrap())
            .unwrap();
        assert_eq!(matrix.delete_zero_signals(), 1);
        assert!(matrix
            .frame_by_name("ExampleMessage")
            .unwrap()
            .signal_by_name("Nothing")
            .is_none());
    }

    // ---------------------------------------------------------------
    // attribute defines
    // ---------------------------------------------------------------

    #[test]
    fn test_signal_attribute_falls_back_to_default() {
        let mut matrix = matrix();
        matrix.signal_defines.insert(
            "GenSigSendType".into(),
            AttributeDefine::enumeration(["Cyclic", "OnWrite"]).with_default("Cyclic"),
        );
        let frame = matrix.frame_by_name("ExampleMessage").unwrap();
        let signal = frame.signal_by_name("Enable").unwrap();
        assert_eq!(matrix.signal_attribute(signal, "GenSigSendType"), Some("Cyclic"));
        assert_eq!(matrix.signal_attribute(signal, "Unknown"), None);
    }

    #[test]
    fn test_frame_attribute_prefers_own_value() {
        let mut matrix = matrix();
        matrix
            .frame_defines
            .insert("GenMsgCycleTime".into(), AttributeDefine::new().with_default("0"));
        matrix
            .frame_by_name_mut("Muxed")
            .unwrap()
            .add_attribute("GenMsgCycleTime", "100");
        let muxed = matrix.frame_by_name("Muxed").unwrap();
        let example = matrix.frame_by_name("ExampleMessage").unwrap();
        assert_eq!(matrix.frame_attribute(muxed, "GenMsgCycleTime"), Some("100"));
        assert_eq!(matrix.frame_attribute(example, "GenMsgCycleTime"), Some("0"));
    }

    #[test]
    fn test_enum_attribute_conversion() {
        let mut matrix = matrix();
        matrix.frame_defines.insert(
            "GenMsgSendType".into(),
            AttributeDefine::enumeration(["Cyclic", "Event"]),
        );
        matrix.signal_defines.insert(
            "GenSigSendType".into(),
            AttributeDefine::enumeration(["Cyclic", "OnChange"]),
        );
        {
            let frame = matrix.frame_by_name_mut("ExampleMessage").unwrap();
            frame.add_attribute("GenMsgSendType", "1");
            frame
                .signal_by_name_mut("Enable")
                .unwrap()
                .add_attribute("GenSigSendType", "1");
        }

        matrix.enum_attributes_to_labels();
        let frame = matrix.frame_by_name("ExampleMessage").unwrap();
        assert_eq!(frame.attribute("GenMsgSendType"), Some("Event"));
        assert_eq!(
            frame.signal_by_name("Enable").unwrap().attribute("GenSigSendType"),
            Some("OnChange")
        );

        matrix.enum_attributes_to_indices();
        let frame = matrix.frame_by_name("ExampleMessage").unwrap();
        assert_eq!(frame.attribute("GenMsgSendType"), Some("1"));
        assert_eq!(
            frame.signal_by_name("Enable").unwrap().attribute("GenSigSendType"),
            Some("1")
        );
    }
}
