//! Fuzz target: `codec::decode` / `codec::encode`
//!
//! Treats the first two bytes as an MTU and the rest as an inbound
//! characteristic value.  Asserts that decoding never panics and that
//! re-encoding the decoded text never exceeds `mtu - 3` bytes.
//!
//! cargo fuzz run fuzz_frame_codec

#![no_main]

use beamlink::link::codec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let mtu = u16::from_le_bytes([data[0], data[1]]);
    let payload = &data[2..];

    let Some(text) = codec::decode(payload) else {
        assert!(payload.is_empty(), "non-empty write must decode");
        return;
    };

    let frame = codec::encode(&text, mtu);
    assert!(frame.len() <= codec::max_payload(mtu), "frame exceeds MTU ceiling");
    assert!(text.as_bytes().starts_with(frame.as_bytes()));
    assert_eq!(frame.len() + frame.dropped(), text.len());
});
