//! BLE stack port, the hexagonal boundary between the protocol engine
//! and the vendor Bluetooth stack.
//!
//! ```text
//!   Bluedroid / sim ──▶ BleStack ──▶ BeamLink (domain)
//!                  ◀── StackEvents ◀──
//! ```
//!
//! The engine drives the stack through [`BleStack`] (setup, advertising,
//! notify).  The stack reports peer activity as [`StackEvent`]s which the
//! engine drains on the main loop and feeds into its [`StackEvents`]
//! implementation.  Test doubles may call [`StackEvents`] directly.

use core::fmt;
use core::ops::BitOr;

use serde::{Deserialize, Serialize};

use super::codec::MAX_MTU;
use super::uuid::Uuid128;
use crate::error::ErrorCode;

// ───────────────────────────────────────────────────────────────
// Error type
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    InitFailed,
    ServerCreateFailed,
    ServiceCreateFailed,
    CharacteristicCreateFailed,
    AdvertisingFailed,
    NotifyFailed,
    SecurityFailed,
    InvalidPasskey,
}

impl StackError {
    pub const fn code(self) -> ErrorCode {
        match self {
            Self::InitFailed => ErrorCode::BleInitFailed,
            Self::ServerCreateFailed => ErrorCode::ServerCreateFailed,
            Self::ServiceCreateFailed => ErrorCode::ServiceCreateFailed,
            Self::CharacteristicCreateFailed => ErrorCode::CharacteristicCreateFailed,
            Self::AdvertisingFailed => ErrorCode::AdvertisingFailed,
            Self::NotifyFailed => ErrorCode::NotifyFailed,
            Self::SecurityFailed => ErrorCode::PairingFailed,
            Self::InvalidPasskey => ErrorCode::InvalidPasskey,
        }
    }
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed => write!(f, "BLE stack initialisation failed"),
            Self::ServerCreateFailed => write!(f, "GATT server registration failed"),
            Self::ServiceCreateFailed => write!(f, "GATT service creation failed"),
            Self::CharacteristicCreateFailed => write!(f, "GATT characteristic creation failed"),
            Self::AdvertisingFailed => write!(f, "advertising could not be started"),
            Self::NotifyFailed => write!(f, "notification rejected by stack"),
            Self::SecurityFailed => write!(f, "security parameters rejected"),
            Self::InvalidPasskey => write!(f, "passkey must be 0-999999"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Characteristic properties
// ───────────────────────────────────────────────────────────────

/// GATT characteristic property bits (Bluetooth core values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharProperties(u8);

impl CharProperties {
    pub const READ: Self = Self(0x02);
    pub const WRITE_NO_RESPONSE: Self = Self(0x04);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);

    /// The single BeamLink characteristic: read, both write kinds, notify.
    pub const BEAMLINK: Self =
        Self(Self::READ.0 | Self::WRITE.0 | Self::WRITE_NO_RESPONSE.0 | Self::NOTIFY.0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CharProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ───────────────────────────────────────────────────────────────
// Advertising
// ───────────────────────────────────────────────────────────────

/// Advertising interval bounds accepted by the controller (0.625 ms units).
const ADV_UNITS_MIN: u16 = 0x0020;
const ADV_UNITS_MAX: u16 = 0x4000;

/// Parameters recorded at `begin` and reused for every (re)start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParams {
    pub interval_ms: u16,
    pub service: Uuid128,
}

impl AdvertisingParams {
    /// Interval in controller units of 0.625 ms.
    pub fn interval_units(&self) -> u16 {
        let units = u32::from(self.interval_ms) * 16 / 10;
        units.clamp(u32::from(ADV_UNITS_MIN), u32::from(ADV_UNITS_MAX)) as u16
    }
}

// ───────────────────────────────────────────────────────────────
// Security pass-through
// ───────────────────────────────────────────────────────────────

/// Largest six-digit passkey.
pub const MAX_PASSKEY: u32 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// No pairing, plain-text link.
    #[default]
    None,
    /// Encrypted link, just-works pairing.
    Encryption,
    /// Pairing with bonding.
    Pairing,
    /// Pairing with MITM protection (passkey).
    PairingMitm,
    /// Pairing with MITM protection over LE Secure Connections.
    PairingMitmSc,
}

impl SecurityLevel {
    pub const fn requires_passkey(self) -> bool {
        matches!(self, Self::PairingMitm | Self::PairingMitmSc)
    }
}

/// Handed to the stack untouched; the engine only validates the passkey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub level: SecurityLevel,
    pub passkey: Option<u32>,
    pub bonding: bool,
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), StackError> {
        match self.passkey {
            Some(pk) if pk > MAX_PASSKEY => Err(StackError::InvalidPasskey),
            _ => Ok(()),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Events
// ───────────────────────────────────────────────────────────────

/// Largest characteristic value the stack hands up.
pub const MAX_WRITE_LEN: usize = MAX_MTU as usize;

/// Peer activity reported by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    Connected,
    Disconnected,
    Write(heapless::Vec<u8, MAX_WRITE_LEN>),
}

/// Capability the stack (or a test double) uses to report peer activity.
pub trait StackEvents {
    fn on_connect(&mut self);
    fn on_disconnect(&mut self);
    fn on_write(&mut self, bytes: &[u8]);
}

/// Route one event into its [`StackEvents`] method.
pub fn dispatch<E: StackEvents + ?Sized>(event: &StackEvent, sink: &mut E) {
    match event {
        StackEvent::Connected => sink.on_connect(),
        StackEvent::Disconnected => sink.on_disconnect(),
        StackEvent::Write(bytes) => sink.on_write(bytes),
    }
}

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

/// Vendor BLE stack, peripheral role, one service with one characteristic.
pub trait BleStack {
    /// Bring up the controller and host, set the GAP name and TX power.
    fn init(&mut self, name: &str, tx_power_dbm: i8) -> Result<(), StackError>;

    /// Apply pairing/encryption settings. Stacks without security accept anything.
    fn configure_security(&mut self, _security: &SecurityConfig) -> Result<(), StackError> {
        Ok(())
    }

    /// Register the GATT server with one service holding one characteristic.
    fn create_service(
        &mut self,
        service: Uuid128,
        characteristic: Uuid128,
        props: CharProperties,
    ) -> Result<(), StackError>;

    /// Preferred ATT MTU offered during exchange.
    fn set_local_mtu(&mut self, mtu: u16) -> Result<(), StackError>;

    /// MTU negotiated with the current peer (23 when none).
    fn mtu(&self) -> u16;

    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), StackError>;

    fn stop_advertising(&mut self);

    /// Send one notification on the characteristic.
    fn notify(&mut self, payload: &[u8]) -> Result<(), StackError>;

    /// Next pending peer event, if any. Never blocks.
    fn poll_event(&mut self) -> Option<StackEvent>;

    /// Inbound writes discarded since the last call (queue full or too long).
    fn take_dropped(&mut self) -> u32 {
        0
    }

    /// Release everything `init`/`create_service` acquired. Safe to call twice.
    fn deinit(&mut self);
}
