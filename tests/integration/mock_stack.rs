//! Mock BLE stack for integration tests.
//!
//! Records every port call so tests can assert on the full setup and
//! teardown sequence without a radio.  Peer activity is queued with the
//! `peer_*` helpers and delivered on the next `BeamLink::tick`.

use std::collections::VecDeque;

use beamlink::app::ports::LedPort;
use beamlink::link::stack::{
    AdvertisingParams, BleStack, CharProperties, SecurityConfig, StackError, StackEvent,
};
use beamlink::link::uuid::Uuid128;

// ── Stack call record ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum StackCall {
    Init { name: String, tx_power: i8 },
    Security(SecurityConfig),
    CreateService { service: Uuid128, characteristic: Uuid128, props: CharProperties },
    SetLocalMtu(u16),
    StartAdvertising(AdvertisingParams),
    StopAdvertising,
    Notify(Vec<u8>),
    Deinit,
}

/// Which call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Init,
    Service,
    Mtu,
    Advertising,
    Notify,
}

// ── MockStack ─────────────────────────────────────────────────

pub struct MockStack {
    pub calls: Vec<StackCall>,
    pub events: VecDeque<StackEvent>,
    pub fault: Option<Fault>,
    pub connected: bool,
    pub peer_mtu: u16,
}

#[allow(dead_code)]
impl MockStack {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            events: VecDeque::new(),
            fault: None,
            connected: false,
            peer_mtu: 23,
        }
    }

    pub fn failing(fault: Fault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::new()
        }
    }

    pub fn peer_connect(&mut self, mtu: u16) {
        self.connected = true;
        self.peer_mtu = mtu;
        self.events.push_back(StackEvent::Connected);
    }

    pub fn peer_disconnect(&mut self) {
        self.connected = false;
        self.peer_mtu = 23;
        self.events.push_back(StackEvent::Disconnected);
    }

    pub fn peer_write(&mut self, bytes: &[u8]) {
        let mut frame = heapless::Vec::new();
        frame.extend_from_slice(bytes).expect("test frame fits");
        self.events.push_back(StackEvent::Write(frame));
    }

    pub fn notified(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                StackCall::Notify(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    pub fn advertising_starts(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, StackCall::StartAdvertising(_)))
            .count()
    }

    pub fn last_call(&self) -> Option<&StackCall> {
        self.calls.last()
    }

    fn check(&self, fault: Fault, err: StackError) -> Result<(), StackError> {
        if self.fault == Some(fault) { Err(err) } else { Ok(()) }
    }
}

impl BleStack for MockStack {
    fn init(&mut self, name: &str, tx_power_dbm: i8) -> Result<(), StackError> {
        self.calls.push(StackCall::Init {
            name: name.to_owned(),
            tx_power: tx_power_dbm,
        });
        self.check(Fault::Init, StackError::InitFailed)
    }

    fn configure_security(&mut self, security: &SecurityConfig) -> Result<(), StackError> {
        self.calls.push(StackCall::Security(*security));
        Ok(())
    }

    fn create_service(
        &mut self,
        service: Uuid128,
        characteristic: Uuid128,
        props: CharProperties,
    ) -> Result<(), StackError> {
        self.calls.push(StackCall::CreateService {
            service,
            characteristic,
            props,
        });
        self.check(Fault::Service, StackError::CharacteristicCreateFailed)
    }

    fn set_local_mtu(&mut self, mtu: u16) -> Result<(), StackError> {
        self.calls.push(StackCall::SetLocalMtu(mtu));
        self.check(Fault::Mtu, StackError::InitFailed)
    }

    fn mtu(&self) -> u16 {
        if self.connected { self.peer_mtu } else { 23 }
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), StackError> {
        self.calls.push(StackCall::StartAdvertising(*params));
        self.check(Fault::Advertising, StackError::AdvertisingFailed)
    }

    fn stop_advertising(&mut self) {
        self.calls.push(StackCall::StopAdvertising);
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), StackError> {
        self.check(Fault::Notify, StackError::NotifyFailed)?;
        if !self.connected {
            return Err(StackError::NotifyFailed);
        }
        self.calls.push(StackCall::Notify(payload.to_vec()));
        Ok(())
    }

    fn poll_event(&mut self) -> Option<StackEvent> {
        self.events.pop_front()
    }

    fn deinit(&mut self) {
        self.calls.push(StackCall::Deinit);
        self.connected = false;
        self.events.clear();
    }
}

// ── MockLed ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockLed {
    pub writes: Vec<bool>,
}

#[allow(dead_code)]
impl MockLed {
    pub fn is_lit(&self) -> bool {
        self.writes.last().copied().unwrap_or(false)
    }
}

impl LedPort for MockLed {
    fn set(&mut self, on: bool) {
        self.writes.push(on);
    }
}
