//! End-to-end tests for the LED demo: BLE writes flow through BeamLink
//! into the LED controller, replies go back out as notifications and the
//! state store mirrors the LED.

use std::cell::RefCell;
use std::rc::Rc;

use beamlink::adapters::time::ManualClock;
use beamlink::app::led::{KEY_BLE_CONNECTED, KEY_LED_BLINKING, KEY_LED_ON, LedController};
use beamlink::app::ports::Clock;
use beamlink::config::BeamConfig;
use beamlink::link::BeamLink;
use beamlink::state::StateStore;

use crate::mock_stack::{MockLed, MockStack};

type Store = StateStore<ManualClock, Box<dyn FnMut(&str)>>;

struct Demo {
    link: BeamLink<MockStack, ManualClock>,
    store: Rc<RefCell<Store>>,
    controller: Rc<RefCell<LedController<MockLed>>>,
    snapshots: Rc<RefCell<Vec<String>>>,
    clock: ManualClock,
}

fn make_demo() -> Demo {
    let cfg = BeamConfig::default();
    let clock = ManualClock::new(0);
    let snapshots = Rc::new(RefCell::new(Vec::new()));
    let out = Rc::clone(&snapshots);
    let sink: Box<dyn FnMut(&str)> = Box::new(move |s: &str| out.borrow_mut().push(s.to_owned()));
    let store = Rc::new(RefCell::new(StateStore::new(cfg.store_config(), clock.clone(), sink)));
    let controller = Rc::new(RefCell::new(LedController::new(MockLed::default(), cfg.device_info())));

    let mut link = BeamLink::new(MockStack::new(), clock.clone());
    link.begin(&cfg.link_params()).unwrap();
    {
        let store = Rc::clone(&store);
        let controller = Rc::clone(&controller);
        let clock = clock.clone();
        link.on_message(move |msg, reply| {
            if msg == "stats" {
                let report = reply.stats_report();
                reply.send(&report);
                return;
            }
            let answer = controller
                .borrow_mut()
                .handle(msg, clock.now_ms(), &mut store.borrow_mut());
            reply.send(&answer);
        });
    }
    link.stack_mut().peer_connect(185);
    link.tick();

    Demo {
        link,
        store,
        controller,
        snapshots,
        clock,
    }
}

fn send(demo: &mut Demo, command: &str) -> String {
    demo.link.stack_mut().peer_write(command.as_bytes());
    demo.link.tick();
    demo.link.stack().notified().last().cloned().unwrap_or_default()
}

#[test]
fn led_commands_round_trip() {
    let mut demo = make_demo();
    assert_eq!(send(&mut demo, "led:on"), "LED ON");
    assert!(demo.controller.borrow().led().is_lit());
    assert!(demo.store.borrow().get(KEY_LED_ON, false));

    assert_eq!(send(&mut demo, "led:toggle"), "LED OFF");
    assert_eq!(send(&mut demo, "led:status"), "LED OFF");
    assert_eq!(send(&mut demo, "bogus"), "Unknown Command");
    assert_eq!(demo.link.messages_received(), 4);
    assert_eq!(demo.link.messages_sent(), 4);
}

#[test]
fn state_changes_produce_json_snapshots() {
    let mut demo = make_demo();
    send(&mut demo, "led:on");
    let last = demo.snapshots.borrow().last().cloned().unwrap();
    let json: serde_json::Value = serde_json::from_str(&last).unwrap();
    assert_eq!(json["device"], "BeamLink-ESP32");
    assert_eq!(json["id"], "BLX-01A2B3");
    assert_eq!(json["state"][KEY_LED_ON], true);
    assert_eq!(json["state"][KEY_LED_BLINKING], false);

    let count = demo.snapshots.borrow().len();
    send(&mut demo, "led:status");
    assert_eq!(demo.snapshots.borrow().len(), count);
}

#[test]
fn blink_runs_on_the_main_loop() {
    let mut demo = make_demo();
    assert_eq!(send(&mut demo, "led:blink"), "LED BLINKING");
    assert_eq!(send(&mut demo, "state:info"), "State: ON, Blinking: YES");
    for _ in 0..4 {
        demo.clock.advance(500);
        demo.controller.borrow_mut().tick(demo.clock.now_ms());
    }
    // on, then four phase flips
    assert_eq!(
        demo.controller.borrow().led().writes,
        vec![false, true, false, true, false, true]
    );
}

#[test]
fn stats_command_reports_link_counters() {
    let mut demo = make_demo();
    send(&mut demo, "info");
    demo.clock.advance(61_000);
    assert_eq!(
        send(&mut demo, "stats"),
        "Stats: RX=2, TX=1, Errors=0, Uptime=1m 1s"
    );
}

fn loop_pass(demo: &mut Demo) {
    demo.link.tick();
    let mut store = demo.store.borrow_mut();
    let controller = demo.controller.borrow();
    controller.publish_connection(demo.link.is_connected(), &mut store);
}

#[test]
fn ble_connection_is_mirrored_into_state() {
    let mut demo = make_demo();
    demo.controller.borrow().publish(&mut demo.store.borrow_mut());
    assert!(!demo.store.borrow().get(KEY_BLE_CONNECTED, true));

    loop_pass(&mut demo);
    assert!(demo.store.borrow().get(KEY_BLE_CONNECTED, false));
    let last = demo.snapshots.borrow().last().cloned().unwrap();
    let json: serde_json::Value = serde_json::from_str(&last).unwrap();
    assert_eq!(json["state"][KEY_BLE_CONNECTED], true);

    let count = demo.snapshots.borrow().len();
    loop_pass(&mut demo);
    assert_eq!(demo.snapshots.borrow().len(), count);

    demo.link.stack_mut().peer_disconnect();
    loop_pass(&mut demo);
    assert!(!demo.store.borrow().get(KEY_BLE_CONNECTED, true));
    assert_eq!(demo.snapshots.borrow().len(), count + 1);
}
