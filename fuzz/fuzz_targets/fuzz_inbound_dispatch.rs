//! Fuzz target: inbound writes through `BeamLink`
//!
//! Splits the input on `0x00` and feeds each chunk as a characteristic
//! write to a connected link with an echo handler.  Counters must stay
//! consistent whatever arrives.
//!
//! cargo fuzz run fuzz_inbound_dispatch

#![no_main]

use beamlink::adapters::ble::BleAdapter;
use beamlink::adapters::time::ManualClock;
use beamlink::link::{BeamLink, LinkParams, StackEvents};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut link = BeamLink::new(BleAdapter::new(), ManualClock::new(0));
    if link.begin(&LinkParams::new("fuzz")).is_err() {
        return;
    }
    link.on_message(|msg, reply| reply.send(msg));
    link.stack_mut().inject_connect(247);
    link.tick();

    let mut frames = 0u32;
    let mut empty = 0u32;
    for chunk in data.split(|b| *b == 0) {
        link.on_write(chunk);
        if chunk.is_empty() {
            empty += 1;
        } else {
            frames += 1;
        }
    }
    assert_eq!(link.messages_received(), frames);
    assert_eq!(link.messages_sent(), frames);
    assert!(link.errors() >= empty);
});
