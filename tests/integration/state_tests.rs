//! Integration tests for the reactive state store: change tracking,
//! output policy and snapshot formats, configured through `BeamConfig`.

use std::cell::RefCell;
use std::rc::Rc;

use beamlink::adapters::time::ManualClock;
use beamlink::config::BeamConfig;
use beamlink::state::{OutputFormat, OutputPolicy, StateStore, StateValue, StoreConfig};

type Snapshots = Rc<RefCell<Vec<String>>>;

fn make_store(config: StoreConfig) -> (StateStore<ManualClock, impl FnMut(&str)>, ManualClock, Snapshots) {
    let clock = ManualClock::new(0);
    let snapshots: Snapshots = Rc::default();
    let out = Rc::clone(&snapshots);
    let store = StateStore::new(config, clock.clone(), move |s: &str| {
        out.borrow_mut().push(s.to_owned());
    });
    (store, clock, snapshots)
}

fn manual_config() -> StoreConfig {
    StoreConfig {
        policy: OutputPolicy {
            on_change: false,
            on_interval: false,
            ..OutputPolicy::default()
        },
        ..StoreConfig::default()
    }
}

#[test]
fn redundant_set_does_not_clear_pending_change() {
    let (mut store, _, snapshots) = make_store(manual_config());
    store.set("ledOn", true);
    assert!(store.has_changed("ledOn"));
    store.set("ledOn", true);
    assert!(store.has_changed("ledOn"));
    store.output_state();
    assert!(!store.has_changed("ledOn"));
    assert_eq!(snapshots.borrow().len(), 1);
}

#[test]
fn snapshot_contains_every_key_ever_set() {
    let (mut store, _, _) = make_store(manual_config());
    store.set("a", 1);
    store.set("b", false);
    store.set("c", 0.25f32);
    store.mark_all_as_read();
    store.set("a", 2);

    let json: serde_json::Value = serde_json::from_str(&store.state_as_json()).unwrap();
    let state = json["state"].as_object().unwrap();
    assert_eq!(state.len(), 3);
    assert_eq!(state["a"], 2);
    assert_eq!(state["b"], false);
    assert_eq!(state["c"], 0.25);
    assert_eq!(store.changed_keys(), vec!["a"]);
}

#[test]
fn config_drives_text_snapshots() {
    let cfg = BeamConfig::from_kv_str(
        "DEVICE_NAME=Lamp\nDEVICE_ID=L-1\nDEVICE_TYPE=Light\nFIRMWARE_VERSION=2.0\nSTATE_JSON=false",
    )
    .unwrap();
    let (mut store, _, snapshots) = make_store(cfg.store_config());
    store.set("ledOn", true);
    store.set("mode", "night");
    assert_eq!(
        snapshots.borrow().last().map(String::as_str),
        Some("Device: Lamp (ID: L-1, Type: Light, FW: 2.0) | State: ledOn=true, mode=night")
    );
}

#[test]
fn interval_policy_emits_even_without_changes() {
    let config = StoreConfig {
        policy: OutputPolicy {
            on_change: false,
            on_interval: true,
            interval_ms: 250,
            format: OutputFormat::Json,
        },
        ..StoreConfig::default()
    };
    let (mut store, clock, snapshots) = make_store(config);
    store.set("t", 20);
    for _ in 0..4 {
        clock.advance(250);
        store.update();
    }
    assert_eq!(snapshots.borrow().len(), 4);
    assert!(!store.has_any_changed());
}

#[test]
fn subscriber_replacement_takes_effect() {
    let (mut store, _, _) = make_store(manual_config());
    let first: Snapshots = Rc::default();
    let second: Snapshots = Rc::default();
    let f = Rc::clone(&first);
    store.subscribe(move |k, v| f.borrow_mut().push(format!("{k}:{v}")));
    store.set("x", 1);
    store.output_state();
    let s = Rc::clone(&second);
    store.subscribe(move |k, v| s.borrow_mut().push(format!("{k}:{v}")));
    store.set("x", 2);
    store.output_state();
    assert_eq!(*first.borrow(), vec!["x:1"]);
    assert_eq!(*second.borrow(), vec!["x:2"]);
}

#[test]
fn typed_reads_never_coerce() {
    let (mut store, _, _) = make_store(manual_config());
    store.set("n", 7);
    store.set("s", "7");
    assert_eq!(store.get("n", 0), 7);
    assert_eq!(store.get("s", 0), 0);
    assert_eq!(store.get("s", String::new()), "7");
    assert!((store.get("n", 1.5f32) - 1.5).abs() < f32::EPSILON);
    assert_eq!(store.value("missing"), None::<&StateValue>);
}
