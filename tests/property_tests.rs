//! Property tests for the frame codec, statistics and state store.
//!
//! Runs on host (x86_64) only: proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use beamlink::adapters::ble::BleAdapter;
use beamlink::adapters::time::ManualClock;
use beamlink::link::codec::{self, DEFAULT_MTU, MAX_MTU};
use beamlink::link::stats::format_uptime;
use beamlink::link::{BeamLink, Delivery, LinkParams};
use beamlink::state::{OutputPolicy, StateStore, StoreConfig};
use proptest::prelude::*;

fn quiet_store() -> StateStore<ManualClock, fn(&str)> {
    let config = StoreConfig {
        policy: OutputPolicy {
            on_change: false,
            ..OutputPolicy::default()
        },
        ..StoreConfig::default()
    };
    let sink: fn(&str) = |_| {};
    StateStore::new(config, ManualClock::new(0), sink)
}

// ── Frame codec ───────────────────────────────────────────────

proptest! {
    /// Encoded frames never exceed `mtu - 3` and are always a prefix of
    /// the input.
    #[test]
    fn encode_respects_mtu(text in ".{0,600}", mtu in 0u16..=600) {
        let frame = codec::encode(&text, mtu);
        let limit = usize::from(mtu.max(DEFAULT_MTU)) - 3;
        prop_assert!(frame.len() <= limit);
        prop_assert!(text.as_bytes().starts_with(frame.as_bytes()));
        prop_assert_eq!(frame.is_truncated(), text.len() > limit);
        prop_assert_eq!(frame.len() + frame.dropped(), text.len());
    }

    /// Decoding accepts any non-empty byte string.
    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..600)) {
        let decoded = codec::decode(&bytes);
        prop_assert_eq!(decoded.is_none(), bytes.is_empty());
    }

    /// Oversized text goes out as its `mtu - 3` prefix and counts exactly
    /// one error.
    #[test]
    fn truncation_law(mtu in 23u16..=MAX_MTU, extra in 1usize..64) {
        let clock = ManualClock::new(0);
        let mut link = BeamLink::new(BleAdapter::new(), clock);
        link.begin(&LinkParams::new("prop")).unwrap();
        link.stack_mut().inject_connect(mtu);
        link.tick();

        let limit = usize::from(mtu) - 3;
        let text = "t".repeat(limit + extra);
        let errors = link.errors();
        prop_assert_eq!(link.notify(&text), Ok(Delivery::Truncated { dropped: extra }));
        prop_assert_eq!(link.errors(), errors + 1);
        prop_assert_eq!(&link.stack().sent()[0][..], &text.as_bytes()[..limit]);
    }

    /// Without a peer every non-empty notify fails and counts.
    #[test]
    fn notify_requires_connection(text in "[a-z]{1,40}") {
        let mut link = BeamLink::new(BleAdapter::new(), ManualClock::new(0));
        link.begin(&LinkParams::new("prop")).unwrap();
        prop_assert!(link.notify(&text).is_err());
        prop_assert_eq!(link.errors(), 1);
    }
}

// ── Statistics ────────────────────────────────────────────────

proptest! {
    /// Uptime text always ends in seconds and never shows a leading zero unit.
    #[test]
    fn uptime_format_shape(ms in any::<u64>()) {
        let s = format_uptime(ms);
        prop_assert!(s.ends_with('s'));
        let first = s.split(' ').next().unwrap_or("");
        if s.contains(' ') {
            prop_assert!(!first.starts_with('0'));
        }
        prop_assert_eq!(s.split(' ').count(), match ms / 1000 {
            0..=59 => 1,
            60..=3_599 => 2,
            3_600..=86_399 => 3,
            _ => 4,
        });
    }

    /// Uptime is non-decreasing in the clock.
    #[test]
    fn uptime_monotonic(steps in proptest::collection::vec(0u64..10_000, 1..20)) {
        let clock = ManualClock::new(0);
        let mut link = BeamLink::new(BleAdapter::new(), clock.clone());
        link.begin(&LinkParams::new("prop")).unwrap();
        let mut last = link.uptime_ms();
        for step in steps {
            clock.advance(step);
            let now = link.uptime_ms();
            prop_assert_eq!(now, last + step);
            last = now;
        }
    }
}

// ── State store ───────────────────────────────────────────────

proptest! {
    /// A changing set marks the key, mark_as_read clears it, an equal set
    /// leaves it clear.
    #[test]
    fn dirty_flag_law(a in any::<i32>(), b in any::<i32>()) {
        let mut store = quiet_store();
        store.set("k", a);
        prop_assert!(store.has_changed("k"));
        store.mark_as_read("k");
        prop_assert!(!store.has_changed("k"));
        store.set("k", a);
        prop_assert!(!store.has_changed("k"));
        store.set("k", b);
        prop_assert_eq!(store.has_changed("k"), a != b);
    }

    /// The JSON snapshot lists every key ever set, dirty or not.
    #[test]
    fn snapshot_completeness(keys in proptest::collection::btree_set("[a-z]{1,8}", 1..12)) {
        let mut store = quiet_store();
        for (i, k) in keys.iter().enumerate() {
            store.set(k, i as i32);
            if i % 2 == 0 {
                store.mark_as_read(k);
            }
        }
        let json: serde_json::Value = serde_json::from_str(&store.state_as_json()).unwrap();
        let state = json["state"].as_object().unwrap();
        prop_assert_eq!(state.len(), keys.len());
        for k in &keys {
            prop_assert!(state.contains_key(k));
        }
    }
}
