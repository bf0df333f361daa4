//! Fuzz target for frame decoding
//!
//! Feeds arbitrary bytes, in arbitrary pieces, to a multiplexer with the
//! plain cipher. Decoding may fail but must never panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rlpx_core::frame::{FrameHeader, decode_cmd_id};
use rlpx_core::{Multiplexer, MultiplexerConfig};

#[derive(Debug, Arbitrary)]
struct FrameInput {
    protocols: u8,
    splits: Vec<u16>,
    data: Vec<u8>,
}

fuzz_target!(|input: FrameInput| {
    let mut mux = Multiplexer::new(MultiplexerConfig {
        max_payload_size: 1 << 20,
        ..Default::default()
    });
    for id in 0..u16::from(input.protocols % 4) {
        let _ = mux.add_protocol(id);
    }

    let mut rest = &input.data[..];
    for split in input.splits {
        let at = usize::from(split).min(rest.len());
        let (piece, tail) = rest.split_at(at);
        if mux.decode(piece).is_err() {
            return;
        }
        rest = tail;
    }
    let _ = mux.decode(rest);

    // Header and body parsers on their own
    if let Ok(header) = <[u8; 16]>::try_from(input.data.get(..16).unwrap_or_default()) {
        let _ = FrameHeader::parse(&header);
    }
    let _ = decode_cmd_id(&input.data);
});
