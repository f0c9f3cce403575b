//! Connection controller.
//!
//! ```text
//!            begin                connect
//!   Idle ───────────▶ Advertising ──────────▶ Connected
//!     ▲                    ▲                      │
//!     │ end                └──────────────────────┘
//!     └─────── (any)          disconnect (re-arm)
//! ```
//!
//! The state lives in one atomic byte so it can be read from any context
//! without tearing.  Only connect/disconnect events and `arm`/`shutdown`
//! move it.

use core::sync::atomic::{AtomicU8, Ordering};

use log::{info, warn};

use super::stack::{AdvertisingParams, BleStack, StackError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Not begun (or ended).
    Idle = 0,
    /// Discoverable, waiting for a central.
    Advertising = 1,
    /// One peer attached.
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Advertising,
            2 => Self::Connected,
            _ => Self::Idle,
        }
    }
}

pub struct ConnectionController {
    state: AtomicU8,
    advertising: Option<AdvertisingParams>,
}

impl Default for ConnectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionController {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Idle as u8),
            advertising: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Parameters recorded by the last successful [`arm`](Self::arm).
    pub fn advertising(&self) -> Option<&AdvertisingParams> {
        self.advertising.as_ref()
    }

    fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Start advertising and remember the parameters for later re-arms.
    pub fn arm<S: BleStack>(
        &mut self,
        stack: &mut S,
        params: AdvertisingParams,
    ) -> Result<(), StackError> {
        stack.start_advertising(&params)?;
        self.advertising = Some(params);
        self.set(ConnectionState::Advertising);
        Ok(())
    }

    /// Peer attached. Ignored while idle.
    pub fn on_connect(&self) -> bool {
        match self.state() {
            ConnectionState::Idle => {
                warn!("BeamLink: connect event while idle, ignored");
                false
            }
            ConnectionState::Advertising | ConnectionState::Connected => {
                self.set(ConnectionState::Connected);
                info!("BeamLink: client connected");
                true
            }
        }
    }

    /// Peer left: back to advertising and restart it with the recorded
    /// parameters.  The state is `Advertising` even if the restart fails.
    pub fn on_disconnect<S: BleStack>(&self, stack: &mut S) -> Result<(), StackError> {
        if self.state() == ConnectionState::Idle {
            return Ok(());
        }
        self.set(ConnectionState::Advertising);
        info!("BeamLink: client disconnected, restarting advertising");
        match &self.advertising {
            Some(params) => stack.start_advertising(params),
            None => Err(StackError::AdvertisingFailed),
        }
    }

    /// Stop advertising and forget the recorded parameters.
    pub fn shutdown<S: BleStack>(&mut self, stack: &mut S) {
        if self.state() != ConnectionState::Idle {
            stack.stop_advertising();
        }
        self.advertising = None;
        self.set(ConnectionState::Idle);
    }
}
