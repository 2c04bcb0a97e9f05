/*!
 * A CAN frame: identifier, payload size and the signals packed in it.
 *
 * Encoding and decoding live in [`can_encoder`](crate::can_encoder) and
 * [`can_decoder`](crate::can_decoder); this module owns the signal list and
 * everything derived from the geometry alone (formats, DLC, unused bits).
 */

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::bit_position::BitNumbering;
use crate::can_id::CanId;
use crate::error::{CanError, Result, Unsupported};
use crate::signal::{Multiplex, Signal};
use crate::signal_group::SignalGroup;
use crate::signal_layout::FrameFormat;

/// Payload size above which a frame must be CAN FD.
pub const MAX_CLASSIC_SIZE: u32 = 8;

/// Bit positions covered by [`Frame::find_unused_bits`].
pub const BITFIELD_LEN: usize = 64;

/// How [`Frame::recalc_dlc`] treats an existing size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlcStrategy {
    /// Grow to the minimal size, never shrink.
    Max,
    /// Set exactly the minimal size.
    Force,
}

/// J1939 parameters the identifier was composed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct J1939 {
    pub priority: u8,
    pub pgn: u16,
    pub source: u8,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub name: String,
    pub id: u32,
    pub is_extended: bool,
    /// Payload length in bytes.
    pub size: u32,
    pub is_fd: bool,
    pub is_complex_multiplexed: bool,
    pub transmitters: Vec<String>,
    pub receivers: Vec<String>,
    pub comment: Option<String>,
    pub attributes: BTreeMap<String, String>,
    signals: Vec<Signal>,
    signal_groups: Vec<SignalGroup>,
    j1939: Option<J1939>,
}

impl Frame {
    pub fn new(name: impl Into<String>, id: u32, size: u32) -> Self {
        Frame {
            name: name.into(),
            id,
            is_extended: false,
            size,
            is_fd: false,
            is_complex_multiplexed: false,
            transmitters: Vec::new(),
            receivers: Vec::new(),
            comment: None,
            attributes: BTreeMap::new(),
            signals: Vec::new(),
            signal_groups: Vec::new(),
            j1939: None,
        }
    }

    /// Signals in insertion order.
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn signal_by_name(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name() == name)
    }

    pub fn signal_by_name_mut(&mut self, name: &str) -> Option<&mut Signal> {
        self.signals.iter_mut().find(|s| s.name() == name)
    }

    pub(crate) fn signal_index(&self, name: &str) -> Option<usize> {
        self.signals.iter().position(|s| s.name() == name)
    }

    /// Append a signal. Names must be unique, and only complex-multiplexed
    /// frames may hold more than one multiplexor.
    pub fn add_signal(&mut self, signal: Signal) -> Result<&mut Signal> {
        if self.signal_by_name(signal.name()).is_some() {
            return Err(CanError::DuplicateSignal {
                frame: self.name.clone(),
                signal: signal.name().to_owned(),
            });
        }
        if signal.is_multiplexor() && !self.is_complex_multiplexed {
            if let Some((_, existing)) = self.multiplexor() {
                return Err(CanError::DuplicateMultiplexor {
                    frame: self.name.clone(),
                    existing: existing.name().to_owned(),
                });
            }
        }
        let index = self.signals.len();
        self.signals.push(signal);
        Ok(&mut self.signals[index])
    }

    /// Remove a signal by name, along with its signal-group memberships.
    pub fn remove_signal(&mut self, name: &str) -> Option<Signal> {
        let index = self.signal_index(name)?;
        for group in &mut self.signal_groups {
            group.del_signal(name);
        }
        Some(self.signals.remove(index))
    }

    /// Drop every zero-width signal, returning how many were removed.
    pub fn delete_zero_signals(&mut self) -> usize {
        let zero: Vec<String> = self
            .signals
            .iter()
            .filter(|s| s.size() == 0)
            .map(|s| s.name().to_owned())
            .collect();
        for name in &zero {
            self.remove_signal(name);
        }
        zero.len()
    }

    pub fn is_multiplexed(&self) -> bool {
        self.signals.iter().any(Signal::is_multiplexor)
    }

    /// The first multiplexor signal, with its index.
    pub fn multiplexor(&self) -> Option<(usize, &Signal)> {
        self.signals
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_multiplexor())
    }

    /// The multiplexor of a simply multiplexed frame.
    ///
    /// Complex multiplexing is reported as unsupported rather than guessed at.
    pub(crate) fn simple_multiplexor(&self) -> Result<Option<(usize, &Signal)>> {
        if self.is_complex_multiplexed {
            return Err(CanError::Unsupported(Unsupported::ComplexMultiplexing));
        }
        Ok(self.multiplexor())
    }

    /// Signals present when the multiplexor reads `selector`: the
    /// multiplexor itself, every unmultiplexed signal and the signals of
    /// that branch.
    pub fn active_subset(&self, selector: u64) -> Vec<(usize, &Signal)> {
        self.signals
            .iter()
            .enumerate()
            .filter(|(_, s)| match s.multiplex() {
                None | Some(Multiplex::Multiplexor) => true,
                Some(Multiplex::Value(v)) => v == selector,
            })
            .collect()
    }

    /// Active subset for a multiplexor's physical value. A value that is
    /// negative or too large to select a branch leaves only the signals that
    /// are always present.
    pub(crate) fn subset_for_selector(&self, physical: Decimal) -> Vec<(usize, &Signal)> {
        match physical.trunc().to_u64() {
            Some(selector) => self.active_subset(selector),
            None => {
                debug!(frame = %self.name, %physical, "multiplexor value selects no branch");
                self.signals
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.mux_value().is_none())
                    .collect()
            }
        }
    }

    /// Payload format covering every signal of the frame.
    pub fn format(&self) -> Result<FrameFormat> {
        self.format_for(self.signals.iter().enumerate())
    }

    /// Payload format covering only `subset`.
    pub fn format_for<'a>(
        &self,
        subset: impl IntoIterator<Item = (usize, &'a Signal)>,
    ) -> Result<FrameFormat> {
        let format = FrameFormat::build(&self.name, self.size as usize, subset)?;
        debug!(frame = %self.name, %format, "built frame format");
        Ok(format)
    }

    /// Bytes needed to hold every signal: `ceil(max(start + size) / 8)`.
    pub fn minimal_size(&self) -> u32 {
        self.signals
            .iter()
            .map(Signal::end_bit)
            .max()
            .unwrap_or(0)
            .div_ceil(8)
    }

    /// Grow the frame to at least its minimal size.
    pub fn calc_dlc(&mut self) {
        self.recalc_dlc(DlcStrategy::Max);
    }

    pub fn recalc_dlc(&mut self, strategy: DlcStrategy) {
        let minimal = self.minimal_size();
        let size = match strategy {
            DlcStrategy::Max => self.size.max(minimal),
            DlcStrategy::Force => minimal,
        };
        if size != self.size {
            debug!(frame = %self.name, from = self.size, to = size, "frame size changed");
        }
        self.size = size;
    }

    /// Claimed bit positions split by byte order, as signal indices.
    fn claims(&self) -> ([Option<usize>; BITFIELD_LEN], [Option<usize>; BITFIELD_LEN]) {
        let mut little = [None; BITFIELD_LEN];
        let mut big = [None; BITFIELD_LEN];
        for (index, signal) in self.signals.iter().enumerate() {
            let target = if signal.is_little_endian() {
                &mut little
            } else {
                &mut big
            };
            let end = signal.end_bit().min(BITFIELD_LEN as u32);
            for bit in signal.start_bit()..end {
                target[bit as usize] = Some(index);
            }
        }
        (little, big)
    }

    /// Owner of each of the first 64 bit positions; `None` marks an unused bit.
    ///
    /// Little-endian claims are mirrored within their byte and win over
    /// big-endian claims of the same position.
    pub fn find_unused_bits(&self) -> [Option<usize>; BITFIELD_LEN] {
        let (little, big) = self.claims();
        let mut bits = [None; BITFIELD_LEN];
        for byte in 0..BITFIELD_LEN / 8 {
            for j in 0..8 {
                bits[byte * 8 + j] = little[byte * 8 + 7 - j].or(big[byte * 8 + j]);
            }
        }
        bits
    }

    /// Add an unsigned big-endian `_Dummy_<frame>_<n>` signal for every
    /// contiguous run of payload bits no signal claims. Returns how many
    /// were added.
    pub fn create_dummy_signals(&mut self) -> Result<usize> {
        let limit = (self.size as usize * 8).min(BITFIELD_LEN);
        let (little, big) = self.claims();

        let mut runs = Vec::new();
        let mut run_start = None;
        for bit in 0..limit {
            let used = little[bit].is_some() || big[bit].is_some();
            match (used, run_start) {
                (false, None) => run_start = Some(bit),
                (true, Some(start)) => {
                    runs.push((start, bit));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            runs.push((start, limit));
        }

        let config = self
            .signals
            .first()
            .map(Signal::shared_config)
            .unwrap_or_default();
        for (n, (start, end)) in runs.iter().enumerate() {
            let dummy = Signal::builder(format!("_Dummy_{}_{n}", self.name))
                .start_bit(*start as u32)
                .size((end - start) as u32)
                .little_endian(false)
                .signed(false)
                .bit_numbering(BitNumbering::Msb0)
                .with_config(config.clone())
                .build()?;
            self.add_signal(dummy)?;
        }
        debug!(frame = %self.name, count = runs.len(), "created dummy signals");
        Ok(runs.len())
    }

    pub fn signal_groups(&self) -> &[SignalGroup] {
        &self.signal_groups
    }

    /// Add a group of the named signals. Blank and unknown names are skipped.
    pub fn add_signal_group<I, S>(&mut self, name: impl Into<String>, id: u32, signals: I) -> &SignalGroup
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut group = SignalGroup::new(name, id);
        for signal in signals {
            let signal = signal.as_ref().trim();
            if signal.is_empty() {
                continue;
            }
            if self.signal_by_name(signal).is_some() {
                group.add_signal(signal);
            } else {
                debug!(frame = %self.name, group = %group.name, signal, "skipping unknown signal");
            }
        }
        let index = self.signal_groups.len();
        self.signal_groups.push(group);
        &self.signal_groups[index]
    }

    pub fn signal_group_by_name(&self, name: &str) -> Option<&SignalGroup> {
        self.signal_groups.iter().find(|g| g.name == name)
    }

    /// Resolve a group to the signals it names.
    pub fn group_signals(&self, group: &str) -> Option<Vec<&Signal>> {
        let group = self.signal_group_by_name(group)?;
        Some(
            group
                .signals()
                .iter()
                .filter_map(|name| self.signal_by_name(name))
                .collect(),
        )
    }

    pub fn add_transmitter(&mut self, transmitter: impl Into<String>) {
        let transmitter = transmitter.into();
        if !self.transmitters.contains(&transmitter) {
            self.transmitters.push(transmitter);
        }
    }

    pub fn del_transmitter(&mut self, transmitter: &str) {
        self.transmitters.retain(|t| t != transmitter);
    }

    pub fn add_receiver(&mut self, receiver: impl Into<String>) {
        let receiver = receiver.into();
        if !self.receivers.contains(&receiver) {
            self.receivers.push(receiver);
        }
    }

    /// Collect the receivers of every signal into the frame's receivers.
    pub fn update_receivers(&mut self) {
        let receivers: Vec<String> = self
            .signals
            .iter()
            .flat_map(|s| s.receivers.iter().cloned())
            .collect();
        for receiver in receivers {
            self.add_receiver(receiver);
        }
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

    /// Recompose the identifier from J1939 fields and mark the frame
    /// extended.
    pub fn set_j1939(&mut self, priority: u8, pgn: u16, source: u8) {
        self.j1939 = Some(J1939 {
            priority: priority & 0x7,
            pgn,
            source,
        });
        self.id = CanId::compose(priority, pgn, source);
        self.is_extended = true;
    }

    pub fn j1939(&self) -> Option<J1939> {
        self.j1939
    }

    pub fn is_j1939(&self) -> bool {
        self.j1939.is_some()
    }

    /// PGN decomposed from the current identifier.
    pub fn pgn(&self) -> Result<u16> {
        CanId::from_id(self.id, self.is_extended).map(|can_id| can_id.pgn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal_layout::FormatField;

    fn unsigned(name: &str, start: u32, size: u32, little: bool) -> Signal {
        Signal::builder(name)
            .start_bit(start)
            .size(size)
            .little_endian(little)
            .signed(false)
            .build()
            .unwrap()
    }

    // ---------------------------------------------------------------
    // signal management
    // ---------------------------------------------------------------

    #[test]
    fn test_add_duplicate_signal_is_error() {
        let mut frame = Frame::new("Status", 0x100, 8);
        frame.add_signal(unsigned("A", 0, 8, true)).unwrap();
        let err = frame.add_signal(unsigned("A", 8, 8, true)).unwrap_err();
        assert!(matches!(err, CanError::DuplicateSignal { .. }));
        assert_eq!(frame.signals().len(), 1);
    }

    #[test]
    fn test_second_multiplexor_is_error_unless_complex() {
        let mux = |name: &str| {
            Signal::builder(name)
                .size(2)
                .multiplex(Multiplex::Multiplexor)
                .build()
                .unwrap()
        };
        let mut frame = Frame::new("Mux", 0x200, 1);
        frame.add_signal(mux("M1")).unwrap();
        let err = frame.add_signal(mux("M2")).unwrap_err();
        match err {
            CanError::DuplicateMultiplexor { existing, .. } => assert_eq!(existing, "M1"),
            other => panic!("unexpected error {other:?}"),
        }

        frame.is_complex_multiplexed = true;
        assert!(frame.add_signal(mux("M2")).is_ok());
    }

    #[test]
    fn test_remove_signal_updates_groups() {
        let mut frame = Frame::new("Status", 0x100, 8);
        frame.add_signal(unsigned("A", 0, 8, true)).unwrap();
        frame.add_signal(unsigned("B", 8, 8, true)).unwrap();
        frame.add_signal_group("G", 1, ["A", "B"]);

        let removed = frame.remove_signal("A").unwrap();
        assert_eq!(removed.name(), "A");
        assert!(frame.remove_signal("A").is_none());
        assert_eq!(
            frame.signal_group_by_name("G").unwrap().signals(),
            &["B".to_string()]
        );
    }

    #[test]
    fn test_delete_zero_signals() {
        let mut frame = Frame::new("Status", 0x100, 8);
        frame.add_signal(unsigned("Empty", 0, 0, true)).unwrap();
        frame.add_signal(unsigned("A", 0, 8, true)).unwrap();
        frame.add_signal(unsigned("AlsoEmpty", 9, 0, false)).unwrap();
        assert_eq!(frame.delete_zero_signals(), 2);
        assert_eq!(frame.signals().len(), 1);
        assert_eq!(frame.signals()[0].name(), "A");
    }

    #[test]
    fn test_active_subset() {
        let mut frame = Frame::new("Mux", 0x200, 1);
        frame
            .add_signal(
                Signal::builder("Mux")
                    .size(2)
                    .little_endian(false)
                    .multiplex(Multiplex::Multiplexor)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        frame
            .add_signal(
                Signal::builder("A")
                    .start_bit(2)
                    .size(4)
                    .multiplex(Multiplex::Value(0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        frame
            .add_signal(
                Signal::builder("B")
                    .start_bit(2)
                    .size(6)
                    .multiplex(Multiplex::Value(1))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert!(frame.is_multiplexed());
        assert_eq!(frame.multiplexor().unwrap().0, 0);
        let names = |selector| {
            frame
                .active_subset(selector)
                .into_iter()
                .map(|(_, s)| s.name().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(0), vec!["Mux", "A"]);
        assert_eq!(names(1), vec!["Mux", "B"]);
        assert_eq!(names(2), vec!["Mux"]);

        // The full frame overlaps; each branch alone does not.
        assert!(matches!(
            frame.format(),
            Err(CanError::OverlappingSignals { .. })
        ));
        assert_eq!(frame.format_for(frame.active_subset(1)).unwrap().width(), 8);
    }

    #[test]
    fn test_complex_multiplexing_is_unsupported() {
        let mut frame = Frame::new("Complex", 0x300, 8);
        frame.is_complex_multiplexed = true;
        assert!(matches!(
            frame.simple_multiplexor(),
            Err(CanError::Unsupported(Unsupported::ComplexMultiplexing))
        ));
    }

    // ---------------------------------------------------------------
    // DLC
    // ---------------------------------------------------------------

    #[test]
    fn test_minimal_size() {
        let mut frame = Frame::new("Status", 0x100, 8);
        assert_eq!(frame.minimal_size(), 0);
        frame.add_signal(unsigned("A", 0, 8, true)).unwrap();
        assert_eq!(frame.minimal_size(), 1);
        frame.add_signal(unsigned("B", 8, 9, true)).unwrap();
        assert_eq!(frame.minimal_size(), 3);
    }

    #[test]
    fn test_recalc_dlc_max_never_shrinks() {
        let mut frame = Frame::new("Status", 0x100, 8);
        frame.add_signal(unsigned("A", 0, 12, true)).unwrap();
        frame.recalc_dlc(DlcStrategy::Max);
        assert_eq!(frame.size, 8);

        let mut small = Frame::new("Small", 0x101, 1);
        small.add_signal(unsigned("A", 0, 12, true)).unwrap();
        small.calc_dlc();
        assert_eq!(small.size, 2);
    }

    #[test]
    fn test_recalc_dlc_force_sets_minimum() {
        let mut frame = Frame::new("Status", 0x100, 8);
        frame.add_signal(unsigned("A", 0, 12, true)).unwrap();
        frame.recalc_dlc(DlcStrategy::Force);
        assert_eq!(frame.size, 2);

        let mut empty = Frame::new("Empty", 0x102, 8);
        empty.recalc_dlc(DlcStrategy::Force);
        assert_eq!(empty.size, 0);
    }

    // ---------------------------------------------------------------
    // unused bits / dummy signals
    // ---------------------------------------------------------------

    #[test]
    fn test_find_unused_bits_empty_frame() {
        let frame = Frame::new("Empty", 0x100, 8);
        let bits = frame.find_unused_bits();
        assert_eq!(bits.iter().filter(|b| b.is_none()).count(), 64);
    }

    #[test]
    fn test_find_unused_bits_one_little_endian_byte() {
        let mut frame = Frame::new("Status", 0x100, 8);
        frame.add_signal(unsigned("A", 0, 8, true)).unwrap();
        let bits = frame.find_unused_bits();
        assert_eq!(bits.iter().filter(|b| b.is_some()).count(), 8);
        assert!(bits[..8].iter().all(|b| *b == Some(0)));
    }

    #[test]
    fn test_find_unused_bits_little_endian_mirrored() {
        let mut frame = Frame::new("Status", 0x100, 8);
        frame.add_signal(unsigned("Le", 0, 2, true)).unwrap();
        frame.add_signal(unsigned("Be", 8, 2, false)).unwrap();
        let bits = frame.find_unused_bits();
        // Little-endian bits 0..2 mirror to positions 6 and 7 of byte 0.
        assert_eq!(bits[6], Some(0));
        assert_eq!(bits[7], Some(0));
        assert_eq!(bits[0], None);
        // Big-endian claims stay where they are.
        assert_eq!(bits[8], Some(1));
        assert_eq!(bits[9], Some(1));
        assert_eq!(bits.iter().filter(|b| b.is_some()).count(), 4);
    }

    #[test]
    fn test_find_unused_bits_ignores_bits_past_64() {
        let mut frame = Frame::new("Fd", 0x100, 16);
        frame.add_signal(unsigned("High", 64, 16, false)).unwrap();
        assert!(frame.find_unused_bits().iter().all(Option::is_none));
    }

    #[test]
    fn test_create_dummy_signals_fills_gaps() {
        let mut frame = Frame::new("Gaps", 0x100, 2);
        frame.add_signal(unsigned("Be", 2, 3, false)).unwrap();
        frame.add_signal(unsigned("Le", 10, 2, true)).unwrap();

        assert_eq!(frame.create_dummy_signals().unwrap(), 3);
        let dummy = frame.signal_by_name("_Dummy_Gaps_1").unwrap();
        assert_eq!((dummy.start_bit(), dummy.size()), (5, 5));
        assert!(!dummy.is_little_endian());
        assert!(!dummy.is_signed());

        let format = frame.format().unwrap();
        assert!(format
            .fields()
            .iter()
            .all(|f| matches!(f, FormatField::Signal { .. })));

        // Nothing left to fill.
        assert_eq!(frame.create_dummy_signals().unwrap(), 0);
    }

    #[test]
    fn test_create_dummy_signals_empty_frame() {
        let mut frame = Frame::new("Empty", 0x100, 8);
        assert_eq!(frame.create_dummy_signals().unwrap(), 1);
        assert_eq!(frame.signals()[0].size(), 64);
    }

    // ---------------------------------------------------------------
    // groups, receivers, J1939
    // ---------------------------------------------------------------

    #[test]
    fn test_signal_group_skips_blank_and_unknown() {
        let mut frame = Frame::new("Status", 0x100, 8);
        frame.add_signal(unsigned("A", 0, 8, true)).unwrap();
        frame.add_signal(unsigned("B", 8, 8, true)).unwrap();
        let group = frame.add_signal_group("G", 7, [" A ", "", "Missing", "B"]);
        assert_eq!(group.id, 7);
        assert_eq!(group.signals(), &["A".to_string(), "B".to_string()]);

        let signals = frame.group_signals("G").unwrap();
        assert_eq!(signals.len(), 2);
        assert!(frame.group_signals("Nope").is_none());
    }

    #[test]
    fn test_update_receivers() {
        let mut frame = Frame::new("Status", 0x100, 8);
        let mut a = unsigned("A", 0, 8, true);
        a.add_receiver("Ecu1");
        let mut b = unsigned("B", 8, 8, true);
        b.add_receiver("Ecu2");
        b.add_receiver("Ecu1");
        frame.add_signal(a).unwrap();
        frame.add_signal(b).unwrap();
        frame.update_receivers();
        assert_eq!(frame.receivers, vec!["Ecu1", "Ecu2"]);
    }

    #[test]
    fn test_set_j1939() {
        let mut frame = Frame::new("Engine", 0, 8);
        assert!(!frame.is_j1939());
        frame.set_j1939(3, 0xF004, 0x12);
        assert!(frame.is_extended);
        assert!(frame.is_j1939());
        assert_eq!(frame.id, 0x0CF0_0412);
        assert_eq!(frame.pgn().unwrap(), 0xF004);
        assert_eq!(frame.j1939().unwrap().priority, 3);
    }

    #[test]
    fn test_pgn_of_standard_frame_is_unsupported() {
        let frame = Frame::new("Std", 0x123, 8);
        assert!(matches!(
            frame.pgn(),
            Err(CanError::Unsupported(Unsupported::StandardJ1939Id))
        ));
    }
}
