//! Frames shared by the unit tests.

use rust_decimal_macros::dec;

use crate::bit_position::BitNumbering;
use crate::frame::Frame;
use crate::signal::{Multiplex, Signal};

/// Three big-endian signals placed with DBC start bits.
///
/// Payload `A5 B6 D9 00 00 00 00 00` decodes to Enable=1 (Enabled),
/// AverageRadius=1.8 m, Temperature=244.14 degK.
pub fn example_message() -> Frame {
    let mut frame = Frame::new("ExampleMessage", 0x1F0, 8);
    frame
        .add_signal(
            Signal::builder("Enable")
                .start_bit(7)
                .size(1)
                .little_endian(false)
                .signed(false)
                .bit_numbering(BitNumbering::Lsb0)
                .value(0, "Disabled")
                .value(1, "Enabled")
                .build()
                .unwrap(),
        )
        .unwrap();
    frame
        .add_signal(
            Signal::builder("AverageRadius")
                .start_bit(6)
                .size(6)
                .little_endian(false)
                .signed(false)
                .factor(dec!(0.1))
                .max(dec!(5))
                .unit("m")
                .bit_numbering(BitNumbering::Lsb0)
                .build()
                .unwrap(),
        )
        .unwrap();
    frame
        .add_signal(
            Signal::builder("Temperature")
                .start_bit(0)
                .size(12)
                .little_endian(false)
                .signed(true)
                .factor(dec!(0.01))
                .offset(dec!(250))
                .unit("degK")
                .bit_numbering(BitNumbering::Lsb0)
                .build()
                .unwrap(),
        )
        .unwrap();
    frame
}

/// One-byte frame: `Mux` in bits 0..2, `A` (mux 0) in bits 2..6,
/// `B` (mux 1) in bits 2..8. All big-endian unsigned.
pub fn multiplexed_frame() -> Frame {
    let field = |name: &str, start: u32, size: u32| {
        Signal::builder(name)
            .start_bit(start)
            .size(size)
            .little_endian(false)
            .signed(false)
    };
    let mut frame = Frame::new("Muxed", 0x300, 1);
    frame
        .add_signal(
            field("Mux", 0, 2)
                .multiplex(Multiplex::Multiplexor)
                .value(0, "First")
                .value(1, "Second")
                .build()
                .unwrap(),
        )
        .unwrap();
    frame
        .add_signal(field("A", 2, 4).multiplex(Multiplex::Value(0)).build().unwrap())
        .unwrap();
    frame
        .add_signal(field("B", 2, 6).multiplex(Multiplex::Value(1)).build().unwrap())
        .unwrap();
    frame
}
