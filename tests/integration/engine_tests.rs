//! Integration tests for the BeamLink lifecycle, notify path and inbound
//! dispatch against a recording mock stack.

use std::cell::RefCell;
use std::rc::Rc;

use beamlink::adapters::ble::BleAdapter;
use beamlink::adapters::time::ManualClock;
use beamlink::error::{ErrorCode, LinkError};
use beamlink::link::stack::{
    AdvertisingParams, CharProperties, SecurityConfig, SecurityLevel, StackError, StackEvents,
};
use beamlink::link::uuid::{DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID, Uuid128};
use beamlink::link::{BeamLink, ConnectionState, Delivery, LinkParams};

use crate::mock_stack::{Fault, MockStack, StackCall};

type Link = BeamLink<MockStack, ManualClock>;

fn make_link(stack: MockStack) -> (Link, ManualClock) {
    let clock = ManualClock::new(10_000);
    (BeamLink::new(stack, clock.clone()), clock)
}

fn begun(name: &str) -> (Link, ManualClock) {
    let (mut link, clock) = make_link(MockStack::new());
    link.begin(&LinkParams::new(name).with_tx_power(9).with_adv_interval(100))
        .unwrap();
    (link, clock)
}

// ── Setup sequence ────────────────────────────────────────────

#[test]
fn begin_issues_setup_in_order() {
    let (link, _) = begun("Dev");
    let calls = &link.stack().calls;
    assert_eq!(
        calls[0],
        StackCall::Init {
            name: "Dev".into(),
            tx_power: 9
        }
    );
    assert_eq!(calls[1], StackCall::Security(SecurityConfig::default()));
    assert_eq!(
        calls[2],
        StackCall::CreateService {
            service: DEFAULT_SERVICE_UUID,
            characteristic: DEFAULT_CHARACTERISTIC_UUID,
            props: CharProperties::BEAMLINK,
        }
    );
    assert_eq!(calls[3], StackCall::SetLocalMtu(512));
    assert_eq!(
        calls[4],
        StackCall::StartAdvertising(AdvertisingParams {
            interval_ms: 100,
            service: DEFAULT_SERVICE_UUID
        })
    );
    assert_eq!(calls.len(), 5);
}

#[test]
fn custom_uuids_and_security_reach_the_stack() {
    let service: Uuid128 = "0000feed-0000-1000-8000-00805f9b34fb".parse().unwrap();
    let characteristic: Uuid128 = "0000beef-0000-1000-8000-00805f9b34fb".parse().unwrap();
    let security = SecurityConfig {
        level: SecurityLevel::PairingMitm,
        passkey: Some(246_810),
        bonding: true,
    };
    let (mut link, _) = make_link(MockStack::new());
    link.begin(
        &LinkParams::new("Custom")
            .with_uuids(service, characteristic)
            .with_security(security),
    )
    .unwrap();
    let calls = &link.stack().calls;
    assert!(calls.contains(&StackCall::Security(security)));
    assert!(calls.iter().any(|c| matches!(
        c,
        StackCall::CreateService { service: s, characteristic: ch, .. } if *s == service && *ch == characteristic
    )));
}

#[test]
fn invalid_passkey_fails_before_touching_the_stack() {
    let (mut link, _) = make_link(MockStack::new());
    let security = SecurityConfig {
        level: SecurityLevel::PairingMitm,
        passkey: Some(1_000_000),
        bonding: false,
    };
    let err = link
        .begin(&LinkParams::new("x").with_security(security))
        .unwrap_err();
    assert_eq!(err, LinkError::Stack(StackError::InvalidPasskey));
    assert_eq!(err.code(), ErrorCode::InvalidPasskey);
    assert!(link.stack().calls.is_empty());
}

#[test]
fn setup_failures_tear_down_and_leave_engine_idle() {
    for (fault, expected) in [
        (Fault::Init, StackError::InitFailed),
        (Fault::Service, StackError::CharacteristicCreateFailed),
        (Fault::Advertising, StackError::AdvertisingFailed),
    ] {
        let (mut link, _) = make_link(MockStack::failing(fault));
        assert_eq!(
            link.begin(&LinkParams::new("Dev")),
            Err(LinkError::Stack(expected)),
            "fault {:?}",
            fault
        );
        assert_eq!(link.stack().last_call(), Some(&StackCall::Deinit));
        assert!(!link.is_initialized());
        assert_eq!(link.connection_state(), ConnectionState::Idle);
        assert_eq!(link.device_name(), "");
    }
}

#[test]
fn rejected_local_mtu_is_not_fatal() {
    let (mut link, _) = make_link(MockStack::failing(Fault::Mtu));
    link.begin(&LinkParams::new("Dev")).unwrap();
    assert_eq!(link.connection_state(), ConnectionState::Advertising);
}

// ── Double init ───────────────────────────────────────────────

#[test]
fn second_begin_keeps_first_identity() {
    let (mut link, clock) = begun("First");
    link.stack_mut().peer_connect(23);
    link.tick();
    link.notify("x").unwrap();
    clock.advance(5_000);
    let calls_before = link.stack().calls.len();

    assert_eq!(
        link.begin(&LinkParams::new("Second")),
        Err(LinkError::AlreadyInitialized)
    );
    assert_eq!(link.device_name(), "First");
    assert_eq!(link.messages_sent(), 1);
    assert_eq!(link.uptime_ms(), 5_000);
    assert_eq!(link.stack().calls.len(), calls_before);
}

// ── Connection scenario ───────────────────────────────────────

#[test]
fn connect_notify_disconnect_scenario() {
    let (mut link, _) = begun("Dev");
    assert!(!link.is_connected());
    assert_eq!(link.notify("hi"), Err(LinkError::NotConnected));
    assert_eq!(link.errors(), 1);
    assert_eq!(link.last_error(), ErrorCode::NotConnected);

    link.stack_mut().peer_connect(23);
    link.tick();
    assert!(link.is_connected());
    assert_eq!(link.notify("hi"), Ok(Delivery::Full));
    assert_eq!(link.messages_sent(), 1);

    link.stack_mut().peer_disconnect();
    link.tick();
    assert!(!link.is_connected());
    assert_eq!(link.connection_state(), ConnectionState::Advertising);
    assert_eq!(link.stack().advertising_starts(), 2);
}

#[test]
fn failed_readvertise_is_counted() {
    let (mut link, _) = begun("Dev");
    link.stack_mut().peer_connect(23);
    link.tick();
    link.stack_mut().fault = Some(Fault::Advertising);
    link.stack_mut().peer_disconnect();
    link.tick();
    assert_eq!(link.connection_state(), ConnectionState::Advertising);
    assert_eq!(link.errors(), 1);
    assert_eq!(link.last_error(), ErrorCode::AdvertisingFailed);
}

#[test]
fn disconnect_behind_a_flooded_write_queue_rearms() {
    let clock = ManualClock::new(0);
    let mut link = BeamLink::new(BleAdapter::new(), clock);
    link.begin(&LinkParams::new("Flood")).unwrap();
    let received = Rc::new(RefCell::new(0u32));
    let seen = received.clone();
    link.on_message(move |_msg, _reply| *seen.borrow_mut() += 1);

    link.stack_mut().inject_connect(23);
    link.tick();
    assert!(link.is_connected());
    for _ in 0..8 {
        assert!(link.stack_mut().inject_write(b"x"));
    }
    assert!(!link.stack_mut().inject_write(b"x"));
    link.stack_mut().inject_disconnect();
    link.tick();
    link.tick();

    assert_eq!(link.connection_state(), ConnectionState::Advertising);
    assert_eq!(link.stack().advertising_starts(), 2);
    assert_eq!(*received.borrow(), 8);
    assert_eq!(link.messages_received(), 8);
    assert_eq!(link.errors(), 1);
    assert_eq!(link.last_error(), ErrorCode::BufferOverflow);
}

#[test]
fn events_can_be_fed_directly() {
    let (mut link, _) = begun("Dev");
    link.stack_mut().connected = true;
    link.on_connect();
    assert!(link.is_connected());
    link.on_disconnect();
    assert_eq!(link.connection_state(), ConnectionState::Advertising);
}

// ── Notify path ───────────────────────────────────────────────

#[test]
fn truncation_uses_negotiated_mtu() {
    let (mut link, _) = begun("Dev");
    link.stack_mut().peer_connect(100);
    link.tick();
    assert_eq!(link.mtu(), 100);
    let text = "a".repeat(150);
    assert_eq!(link.notify(&text), Ok(Delivery::Truncated { dropped: 53 }));
    assert_eq!(link.stack().notified(), vec!["a".repeat(97)]);
    assert_eq!(link.errors(), 1);
    assert_eq!(link.messages_sent(), 1);
}

#[test]
fn stack_notify_failure_is_counted() {
    let (mut link, _) = begun("Dev");
    link.stack_mut().peer_connect(23);
    link.tick();
    link.stack_mut().fault = Some(Fault::Notify);
    assert_eq!(
        link.notify("x"),
        Err(LinkError::Stack(StackError::NotifyFailed))
    );
    assert_eq!(link.last_error(), ErrorCode::NotifyFailed);
    assert_eq!(link.messages_sent(), 0);
}

// ── Inbound dispatch ──────────────────────────────────────────

#[test]
fn echo_handler_round_trip() {
    let (mut link, _) = begun("Dev");
    link.on_message(|msg, reply| reply.send(&format!("echo:{msg}")));
    link.stack_mut().peer_connect(23);
    link.stack_mut().peer_write(b"ping");
    link.stack_mut().peer_write(b"pong");
    link.tick();
    assert_eq!(link.messages_received(), 2);
    assert_eq!(link.messages_sent(), 2);
    assert_eq!(link.stack().notified(), vec!["echo:ping", "echo:pong"]);
}

#[test]
fn reply_after_peer_left_fails_silently() {
    let (mut link, _) = begun("Dev");
    link.on_message(|_, reply| reply.send("late"));
    link.stack_mut().peer_connect(23);
    link.tick();
    link.stack_mut().connected = false;
    link.on_disconnect();
    link.on_write(b"still-queued");
    assert_eq!(link.messages_received(), 1);
    assert_eq!(link.messages_sent(), 0);
    assert_eq!(link.errors(), 1);
}

#[test]
fn invalid_utf8_is_delivered_lossily() {
    let (mut link, _) = begun("Dev");
    let seen = Rc::new(RefCell::new(String::new()));
    let s = Rc::clone(&seen);
    link.on_message(move |msg, _| s.borrow_mut().push_str(msg));
    link.on_write(&[b'o', b'k', 0xff]);
    assert_eq!(*seen.borrow(), "ok\u{fffd}");
}

#[test]
fn reply_exposes_mtu_and_stats() {
    let (mut link, _) = begun("Dev");
    link.on_message(|msg, reply| {
        if msg == "stats" {
            let report = reply.stats_report();
            let _ = reply.try_send(&report[..report.len().min(reply.mtu() as usize - 3)]);
        }
    });
    link.stack_mut().peer_connect(185);
    link.stack_mut().peer_write(b"stats");
    link.tick();
    assert_eq!(
        link.stack().notified(),
        vec!["Stats: RX=1, TX=0, Errors=0, Uptime=0s"]
    );
}

// ── Statistics ────────────────────────────────────────────────

#[test]
fn reset_preserves_identity_and_connection() {
    let (mut link, clock) = begun("Keep");
    link.stack_mut().peer_connect(23);
    link.tick();
    link.on_write(b"a");
    link.notify("b").unwrap();
    let _ = link.notify("");
    clock.advance(3_723_000);
    assert_eq!(
        link.stats_report(),
        "Stats: RX=1, TX=1, Errors=1, Uptime=1h 2m 3s"
    );
    link.reset_stats();
    assert_eq!(
        (link.messages_received(), link.messages_sent(), link.errors()),
        (0, 0, 0)
    );
    assert_eq!(link.device_name(), "Keep");
    assert!(link.is_connected());
    assert_eq!(link.uptime_ms(), 0);
}

#[test]
fn end_releases_and_allows_restart() {
    let (mut link, _) = begun("Dev");
    link.stack_mut().peer_connect(23);
    link.tick();
    link.end();
    let calls = &link.stack().calls;
    assert_eq!(calls[calls.len() - 2], StackCall::StopAdvertising);
    assert_eq!(calls[calls.len() - 1], StackCall::Deinit);
    assert_eq!(link.connection_state(), ConnectionState::Idle);
    assert_eq!(link.notify("x"), Err(LinkError::NotInitialized));

    link.begin(&LinkParams::new("Again")).unwrap();
    assert_eq!(link.device_name(), "Again");
    assert_eq!(link.errors(), 0);
}
