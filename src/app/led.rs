//! Status LED command handler.
//!
//! The demo device logic: text commands from a BLE client (or the serial
//! console) drive a single LED and mirror it into the state store.
//!
//! | Command      | Reply                                       | State store        |
//! |--------------|---------------------------------------------|--------------------|
//! | `led:on`     | `LED ON`                                    | `ledOn=true`       |
//! | `led:off`    | `LED OFF`                                   | `ledOn=false`      |
//! | `led:toggle` | `LED ON` / `LED OFF`                        | `ledOn=!ledOn`     |
//! | `led:status` | `LED ON` / `LED OFF`                        | -                  |
//! | `led:blink`  | `LED BLINKING`                              | `ledBlinking=true` |
//! | `state:info` | `State: ON, Blinking: NO`                   | -                  |
//! | `info`       | `Device: n, ID: i, Type: t, FW: f, State: s`| -                  |
//! | other        | `Unknown Command`                           | -                  |
//!
//! Any steady command (`on`, `off`, `toggle`) ends blinking.  The firmware
//! also mirrors the link into `bleConnected` on every loop pass.

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::app::ports::{Clock, LedPort, SnapshotSink};
use crate::state::{DeviceInfo, StateStore};

/// Half period of `led:blink`.
pub const BLINK_INTERVAL_MS: u64 = 500;

pub const KEY_LED_ON: &str = "ledOn";
pub const KEY_LED_BLINKING: &str = "ledBlinking";
pub const KEY_BLE_CONNECTED: &str = "bleConnected";

/// Flashes shown by [`LedController::boot_blink`].
pub const BOOT_BLINKS: u32 = 2;
/// Duration of each boot flash phase.
pub const BOOT_BLINK_MS: u32 = 150;

// ───────────────────────────────────────────────────────────────
// GPIO-backed LED
// ───────────────────────────────────────────────────────────────

/// Any `embedded-hal` output pin, with polarity handling.
pub struct GpioLed<P> {
    pin: P,
    active_high: bool,
}

impl<P: OutputPin> GpioLed<P> {
    /// Wraps `pin` and drives it to the off level.
    pub fn new(pin: P, active_high: bool) -> Self {
        let mut led = Self { pin, active_high };
        led.set(false);
        led
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> LedPort for GpioLed<P> {
    fn set(&mut self, on: bool) {
        let result = if on == self.active_high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if result.is_err() {
            warn!("LED: pin write failed");
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Command handler
// ───────────────────────────────────────────────────────────────

pub struct LedController<L> {
    led: L,
    device: DeviceInfo,
    on: bool,
    blinking: bool,
    /// Phase of the blink, independent of the logical `on` state.
    lit: bool,
    last_blink_ms: u64,
}

impl<L: LedPort> LedController<L> {
    pub fn new(mut led: L, device: DeviceInfo) -> Self {
        led.set(false);
        info!("LED: controller ready");
        Self {
            led,
            device,
            on: false,
            blinking: false,
            lit: false,
            last_blink_ms: 0,
        }
    }

    /// Start in the given steady state instead of OFF.
    pub fn with_initial_state(mut self, on: bool) -> Self {
        self.on = on;
        self.lit = on;
        self.led.set(on);
        self
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn is_blinking(&self) -> bool {
        self.blinking
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    /// Publish the initial LED state into `store`. No peer is attached yet.
    pub fn publish<C: Clock, K: SnapshotSink>(&self, store: &mut StateStore<C, K>) {
        store.set(KEY_LED_ON, self.on);
        store.set(KEY_LED_BLINKING, self.blinking);
        store.set(KEY_BLE_CONNECTED, false);
    }

    /// Mirror the link state. Unchanged values produce no snapshot.
    pub fn publish_connection<C: Clock, K: SnapshotSink>(
        &self,
        connected: bool,
        store: &mut StateStore<C, K>,
    ) {
        store.set(KEY_BLE_CONNECTED, connected);
    }

    /// Flash the LED [`BOOT_BLINKS`] times, then settle on the logical
    /// state.  `delay_ms` blocks the caller.
    pub fn boot_blink(&mut self, mut delay_ms: impl FnMut(u32)) {
        info!("LED: boot blink");
        for _ in 0..BOOT_BLINKS {
            self.led.set(true);
            delay_ms(BOOT_BLINK_MS);
            self.led.set(false);
            delay_ms(BOOT_BLINK_MS);
        }
        self.lit = self.on;
        self.led.set(self.on);
        info!("LED: boot blink done (LED {})", on_off(self.on));
    }

    /// Handle one client command and return the reply text.
    pub fn handle<C: Clock, K: SnapshotSink>(
        &mut self,
        message: &str,
        now_ms: u64,
        store: &mut StateStore<C, K>,
    ) -> String {
        match message {
            "led:on" => {
                self.steady(true, store);
                info!("LED: ON via BLE");
                "LED ON".into()
            }
            "led:off" => {
                self.steady(false, store);
                info!("LED: OFF via BLE");
                "LED OFF".into()
            }
            "led:toggle" => {
                self.steady(!self.on, store);
                info!("LED: toggled to {}", on_off(self.on));
                format!("LED {}", on_off(self.on))
            }
            "led:status" => format!("LED {}", on_off(self.on)),
            "led:blink" => {
                self.start_blink(now_ms, store);
                info!("LED: BLINKING via BLE");
                "LED BLINKING".into()
            }
            "state:info" => format!(
                "State: {}, Blinking: {}",
                on_off(self.on),
                if self.blinking { "YES" } else { "NO" }
            ),
            "info" => format!(
                "Device: {}, ID: {}, Type: {}, FW: {}, State: {}",
                self.device.name,
                self.device.id,
                self.device.device_type,
                self.device.firmware,
                on_off(self.on)
            ),
            _ => {
                warn!("LED: unknown command '{}'", message);
                "Unknown Command".into()
            }
        }
    }

    /// Serial console shortcuts: `on`/`1`, `off`/`0`, `blink`/`toggle`,
    /// `status`.  Returns `true` if the LED state changed.
    pub fn apply_serial<C: Clock, K: SnapshotSink>(
        &mut self,
        input: &str,
        now_ms: u64,
        store: &mut StateStore<C, K>,
    ) -> bool {
        match input.trim() {
            "on" | "1" => {
                self.steady(true, store);
                true
            }
            "off" | "0" => {
                self.steady(false, store);
                true
            }
            "blink" | "toggle" => {
                self.start_blink(now_ms, store);
                true
            }
            "status" => {
                info!(
                    "LED: status {} (blinking: {})",
                    on_off(self.on),
                    if self.blinking { "YES" } else { "NO" }
                );
                false
            }
            _ => false,
        }
    }

    /// Drive the blink cadence. Call from the main loop.
    pub fn tick(&mut self, now_ms: u64) {
        if !self.blinking {
            return;
        }
        if now_ms.saturating_sub(self.last_blink_ms) >= BLINK_INTERVAL_MS {
            self.lit = !self.lit;
            self.led.set(self.lit);
            self.last_blink_ms = now_ms;
        }
    }

    fn steady<C: Clock, K: SnapshotSink>(&mut self, on: bool, store: &mut StateStore<C, K>) {
        self.on = on;
        self.blinking = false;
        self.lit = on;
        self.led.set(on);
        store.set(KEY_LED_ON, on);
        store.set(KEY_LED_BLINKING, false);
    }

    fn start_blink<C: Clock, K: SnapshotSink>(&mut self, now_ms: u64, store: &mut StateStore<C, K>) {
        self.on = true;
        self.blinking = true;
        self.lit = true;
        self.led.set(true);
        self.last_blink_ms = now_ms;
        store.set(KEY_LED_ON, true);
        store.set(KEY_LED_BLINKING, true);
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}
