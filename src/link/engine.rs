//! Protocol engine: the public face of the link.
//!
//! [`BeamLink`] owns the stack adapter, the clock, the statistics and the
//! connection controller (`LinkCore`) plus one message handler slot.
//! The two halves are separate fields so the handler can be lent a
//! [`Reply`] that borrows only the core.
//!
//! ```text
//!   BleStack::poll_event ──▶ tick() ──▶ StackEvents ──▶ handler(text, reply)
//!                                                           │
//!   BleStack::notify ◀──────────── LinkCore::notify ◀───────┘
//! ```

use std::borrow::Cow;

use log::{debug, error, info, warn};

use super::codec::{self, DEFAULT_MTU, MAX_MTU};
use super::connection::{ConnectionController, ConnectionState};
use super::stack::{
    self, AdvertisingParams, BleStack, CharProperties, SecurityConfig, StackError, StackEvents,
};
use super::stats::{self, Statistics};
use super::uuid::{DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID, Uuid128};
use crate::app::ports::Clock;
use crate::error::{ErrorCode, LinkError};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

/// Longest GAP device name the advertising payload carries.
pub const MAX_NAME_LEN: usize = 32;

pub const TX_POWER_MIN_DBM: i8 = -12;
pub const TX_POWER_MAX_DBM: i8 = 9;
pub const DEFAULT_TX_POWER_DBM: i8 = 9;

pub const ADV_INTERVAL_MIN_MS: u16 = 20;
pub const ADV_INTERVAL_MAX_MS: u16 = 10_240;
pub const DEFAULT_ADV_INTERVAL_MS: u16 = 100;

// ───────────────────────────────────────────────────────────────
// Parameters
// ───────────────────────────────────────────────────────────────

/// Everything `begin` needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParams {
    pub name: String,
    pub tx_power_dbm: i8,
    pub adv_interval_ms: u16,
    pub service_uuid: Uuid128,
    pub characteristic_uuid: Uuid128,
    pub security: SecurityConfig,
}

impl LinkParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            adv_interval_ms: DEFAULT_ADV_INTERVAL_MS,
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            security: SecurityConfig::default(),
        }
    }

    #[must_use]
    pub fn with_tx_power(mut self, dbm: i8) -> Self {
        self.tx_power_dbm = dbm;
        self
    }

    #[must_use]
    pub fn with_adv_interval(mut self, ms: u16) -> Self {
        self.adv_interval_ms = ms;
        self
    }

    #[must_use]
    pub fn with_uuids(mut self, service: Uuid128, characteristic: Uuid128) -> Self {
        self.service_uuid = service;
        self.characteristic_uuid = characteristic;
        self
    }

    #[must_use]
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }
}

/// Outcome of a successful notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The whole text went out.
    Full,
    /// Only the first `mtu − 3` bytes went out.
    Truncated { dropped: usize },
}

// ───────────────────────────────────────────────────────────────
// Reply channel
// ───────────────────────────────────────────────────────────────

/// The part of the engine a reply needs.
pub(crate) trait Notifier {
    fn notify(&mut self, text: &str) -> Result<Delivery, LinkError>;
    fn mtu(&self) -> u16;
    fn stats_report(&self) -> String;
}

/// Handed to the message handler for the duration of one dispatch.
pub struct Reply<'a> {
    link: &'a mut dyn Notifier,
}

impl<'a> Reply<'a> {
    pub(crate) fn new(link: &'a mut dyn Notifier) -> Self {
        Self { link }
    }

    /// Send a response. Failures are counted by the engine and otherwise ignored.
    pub fn send(&mut self, text: &str) {
        if let Err(e) = self.link.notify(text) {
            debug!("BeamLink: reply dropped ({})", e);
        }
    }

    /// Send a response and report what happened.
    pub fn try_send(&mut self, text: &str) -> Result<Delivery, LinkError> {
        self.link.notify(text)
    }

    /// Current MTU, for handlers that size their own replies.
    pub fn mtu(&self) -> u16 {
        self.link.mtu()
    }

    /// Same text as [`BeamLink::stats_report`].
    pub fn stats_report(&self) -> String {
        self.link.stats_report()
    }
}

/// Application callback for inbound text.
pub type MessageHandler = Box<dyn FnMut(&str, &mut Reply<'_>)>;

// ───────────────────────────────────────────────────────────────
// Engine core
// ───────────────────────────────────────────────────────────────

struct LinkCore<S, C> {
    stack: S,
    clock: C,
    connection: ConnectionController,
    stats: Statistics,
    initialized: bool,
    device_name: heapless::String<MAX_NAME_LEN>,
    last_error: ErrorCode,
}

impl<S: BleStack, C: Clock> LinkCore<S, C> {
    fn record_error(&mut self, code: ErrorCode) {
        self.stats.increment_errors();
        self.last_error = code;
    }

    fn try_notify(&mut self, text: &str) -> Result<Delivery, LinkError> {
        if !self.initialized {
            return Err(LinkError::NotInitialized);
        }
        if !self.connection.is_connected() {
            return Err(LinkError::NotConnected);
        }
        if text.is_empty() {
            return Err(LinkError::MessageEmpty);
        }

        let mtu = self.stack.mtu();
        let frame = codec::encode(text, mtu);
        if frame.is_truncated() {
            warn!(
                "BeamLink: message truncated ({} > {} bytes)",
                text.len(),
                codec::max_payload(mtu)
            );
            self.record_error(ErrorCode::MessageTooLarge);
        }

        self.stack.notify(frame.as_bytes())?;
        self.stats.increment_sent();

        Ok(if frame.is_truncated() {
            Delivery::Truncated {
                dropped: frame.dropped(),
            }
        } else {
            Delivery::Full
        })
    }

    fn uptime_ms(&self) -> u64 {
        if self.initialized {
            self.stats.uptime_ms(self.clock.now_ms())
        } else {
            0
        }
    }

    fn mtu(&self) -> u16 {
        if self.initialized {
            self.stack.mtu()
        } else {
            DEFAULT_MTU
        }
    }
}

impl<S: BleStack, C: Clock> Notifier for LinkCore<S, C> {
    fn notify(&mut self, text: &str) -> Result<Delivery, LinkError> {
        let result = self.try_notify(text);
        if let Err(e) = result {
            self.record_error(e.code());
        }
        result
    }

    fn mtu(&self) -> u16 {
        LinkCore::mtu(self)
    }

    fn stats_report(&self) -> String {
        stats::format_stats(
            self.stats.received(),
            self.stats.sent(),
            self.stats.errors(),
            self.uptime_ms(),
        )
    }
}

// ───────────────────────────────────────────────────────────────
// Engine
// ───────────────────────────────────────────────────────────────

pub struct BeamLink<S, C> {
    core: LinkCore<S, C>,
    handler: Option<MessageHandler>,
}

impl<S: BleStack, C: Clock> BeamLink<S, C> {
    pub fn new(stack: S, clock: C) -> Self {
        let now = clock.now_ms();
        Self {
            core: LinkCore {
                stack,
                clock,
                connection: ConnectionController::new(),
                stats: Statistics::new(now),
                initialized: false,
                device_name: heapless::String::new(),
                last_error: ErrorCode::Ok,
            },
            handler: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring up the stack, create the service and start advertising.
    ///
    /// On any failure the engine is left exactly as it was and the stack
    /// is torn down again.
    pub fn begin(&mut self, params: &LinkParams) -> Result<(), LinkError> {
        if self.core.initialized {
            warn!("BeamLink: begin called while already initialised");
            return Err(LinkError::AlreadyInitialized);
        }

        let mut name = heapless::String::<MAX_NAME_LEN>::new();
        if params.name.is_empty() || name.push_str(&params.name).is_err() {
            error!("BeamLink: invalid device name (len={})", params.name.len());
            return Err(LinkError::InvalidDeviceName);
        }
        params.security.validate()?;

        let tx_power = clamp_tx_power(params.tx_power_dbm);
        let adv = AdvertisingParams {
            interval_ms: clamp_adv_interval(params.adv_interval_ms),
            service: params.service_uuid,
        };

        if let Err(e) = self.bring_up(&name, tx_power, params, adv) {
            error!("BeamLink: begin failed: {}", e);
            self.core.stack.deinit();
            return Err(e.into());
        }

        self.core.device_name = name;
        self.core.initialized = true;
        self.core.stats = Statistics::new(self.core.clock.now_ms());
        self.core.last_error = ErrorCode::Ok;
        info!(
            "BeamLink: advertising as '{}' (service {}, {} dBm, {} ms)",
            self.core.device_name, params.service_uuid, tx_power, adv.interval_ms
        );
        Ok(())
    }

    fn bring_up(
        &mut self,
        name: &str,
        tx_power: i8,
        params: &LinkParams,
        adv: AdvertisingParams,
    ) -> Result<(), StackError> {
        let core = &mut self.core;
        core.stack.init(name, tx_power)?;
        core.stack.configure_security(&params.security)?;
        core.stack.create_service(
            params.service_uuid,
            params.characteristic_uuid,
            CharProperties::BEAMLINK,
        )?;
        if let Err(e) = core.stack.set_local_mtu(MAX_MTU) {
            warn!("BeamLink: MTU {} not accepted ({}), keeping default", MAX_MTU, e);
        }
        core.connection.arm(&mut core.stack, adv)
    }

    /// Stop advertising and release the stack. No-op if not initialised.
    pub fn end(&mut self) {
        if !self.core.initialized {
            return;
        }
        self.core.connection.shutdown(&mut self.core.stack);
        self.core.stack.deinit();
        self.core.initialized = false;
        info!("BeamLink: stopped");
    }

    /// Main-loop housekeeping: drain pending stack events. Never blocks.
    ///
    /// Writes the stack had to discard count as errors
    /// ([`ErrorCode::BufferOverflow`]).
    pub fn tick(&mut self) {
        let dropped = self.core.stack.take_dropped();
        if dropped > 0 && self.core.initialized {
            warn!("BeamLink: {} inbound write(s) dropped by the stack", dropped);
            self.core.stats.add_errors(dropped);
            self.core.last_error = ErrorCode::BufferOverflow;
        }
        while let Some(event) = self.core.stack.poll_event() {
            stack::dispatch(&event, self);
        }
    }

    // ── Messaging ─────────────────────────────────────────────

    /// Install the inbound message handler, replacing any previous one.
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: FnMut(&str, &mut Reply<'_>) + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Remove the message handler; inbound frames are then counted and dropped.
    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    /// Send `text` to the connected peer.
    pub fn notify(&mut self, text: &str) -> Result<Delivery, LinkError> {
        Notifier::notify(&mut self.core, text)
    }

    // ── Status ────────────────────────────────────────────────

    pub fn is_initialized(&self) -> bool {
        self.core.initialized
    }

    pub fn is_connected(&self) -> bool {
        self.core.connection.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.core.connection.state()
    }

    /// Name from the last successful `begin` (empty before the first).
    pub fn device_name(&self) -> &str {
        &self.core.device_name
    }

    pub fn mtu(&self) -> u16 {
        self.core.mtu()
    }

    pub fn messages_received(&self) -> u32 {
        self.core.stats.received()
    }

    pub fn messages_sent(&self) -> u32 {
        self.core.stats.sent()
    }

    pub fn errors(&self) -> u32 {
        self.core.stats.errors()
    }

    /// Most recent failure recorded in the error counter.
    pub fn last_error(&self) -> ErrorCode {
        self.core.last_error
    }

    pub fn stats(&self) -> &Statistics {
        &self.core.stats
    }

    /// Milliseconds since `begin` or the last `reset_stats` (0 if not initialised).
    pub fn uptime_ms(&self) -> u64 {
        self.core.uptime_ms()
    }

    /// Zero the counters and restart the uptime clock. Connection state is untouched.
    pub fn reset_stats(&mut self) {
        let now = self.core.clock.now_ms();
        self.core.stats.reset(now);
        info!("BeamLink: statistics reset");
    }

    /// `Stats: RX=<r>, TX=<s>, Errors=<e>, Uptime=<formatted>`
    pub fn stats_report(&self) -> String {
        Notifier::stats_report(&self.core)
    }

    pub fn stack(&self) -> &S {
        &self.core.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.core.stack
    }
}

impl<S: BleStack, C: Clock> StackEvents for BeamLink<S, C> {
    fn on_connect(&mut self) {
        if !self.core.initialized {
            return;
        }
        self.core.connection.on_connect();
    }

    fn on_disconnect(&mut self) {
        if !self.core.initialized {
            return;
        }
        if let Err(e) = self.core.connection.on_disconnect(&mut self.core.stack) {
            error!("BeamLink: advertising restart failed: {}", e);
            self.core.record_error(e.code());
        }
    }

    fn on_write(&mut self, bytes: &[u8]) {
        if !self.core.initialized {
            debug!("BeamLink: write before begin ignored");
            return;
        }
        let Some(text) = codec::decode(bytes) else {
            warn!("BeamLink: empty write ignored");
            self.core.record_error(ErrorCode::MessageEmpty);
            return;
        };
        if matches!(text, Cow::Owned(_)) {
            debug!("BeamLink: inbound frame was not valid UTF-8");
        }
        self.core.stats.increment_received();

        match self.handler.as_mut() {
            Some(handler) => {
                let mut reply = Reply::new(&mut self.core);
                handler(&*text, &mut reply);
            }
            None => debug!("BeamLink: no handler, frame dropped"),
        }
    }
}

fn clamp_tx_power(dbm: i8) -> i8 {
    let clamped = dbm.clamp(TX_POWER_MIN_DBM, TX_POWER_MAX_DBM);
    if clamped != dbm {
        warn!(
            "BeamLink: TX power {} dBm out of range, using {} dBm",
            dbm, clamped
        );
    }
    clamped
}

fn clamp_adv_interval(ms: u16) -> u16 {
    let clamped = ms.clamp(ADV_INTERVAL_MIN_MS, ADV_INTERVAL_MAX_MS);
    if clamped != ms {
        warn!(
            "BeamLink: advertising interval {} ms out of range, using {} ms",
            ms, clamped
        );
    }
    clamped
}
