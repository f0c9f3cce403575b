//! BeamLink firmware: LED demo entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                       │
//! │                                                                  │
//! │  BleAdapter    Esp32TimeAdapter    LogSnapshotSink    GpioLed    │
//! │  (BleStack)    (Clock)             (SnapshotSink)     (LedPort)  │
//! │                                                                  │
//! │  ───────────────── Port Trait Boundary ─────────────────         │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │   BeamLink (protocol)  ·  StateStore  ·  LedController     │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, PinDriver};
use log::{error, info, warn};

use beamlink::adapters::ble::BleAdapter;
use beamlink::adapters::log_sink::LogSnapshotSink;
use beamlink::adapters::time::Esp32TimeAdapter;
use beamlink::app::led::{GpioLed, LedController};
use beamlink::app::ports::Clock;
use beamlink::app::report::StatsReporter;
use beamlink::config::BeamConfig;
use beamlink::{BeamLink, StateStore};

/// Compiled-in device configuration.
const BEAM_CONFIG: &str = include_str!("../config/beam.config");

/// Main-loop period.
const LOOP_DELAY_MS: u32 = 10;

fn load_config() -> BeamConfig {
    let cfg = match BeamConfig::from_kv_str(BEAM_CONFIG) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config parse failed ({}), using defaults", e);
            return BeamConfig::default();
        }
    };
    match cfg.validate() {
        Ok(()) => cfg,
        Err(e) => {
            warn!("Config rejected ({}), using defaults", e);
            BeamConfig::default()
        }
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  BeamLink v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let config = load_config();
    log::set_max_level(config.log_level());
    info!(
        "Config: name={} id={} ledPin={}",
        config.device_name, config.device_id, config.led_pin
    );

    // ── 3. Status LED ─────────────────────────────────────────
    // SAFETY: the configured pin is not claimed by any other driver.
    let pin = unsafe { AnyOutputPin::new(i32::from(config.led_pin)) };
    let led = GpioLed::new(PinDriver::output(pin)?, config.led_active_high);
    info!("GPIO{} set as OUTPUT (default OFF)", config.led_pin);

    // ── 4. State store ────────────────────────────────────────
    let store = Rc::new(RefCell::new(StateStore::new(
        config.store_config(),
        Esp32TimeAdapter::new(),
        LogSnapshotSink::new(),
    )));
    store
        .borrow_mut()
        .subscribe(|key, value| info!("State: {} = {}", key, value));

    let controller = Rc::new(RefCell::new(
        LedController::new(led, config.device_info()).with_initial_state(true),
    ));
    controller.borrow().publish(&mut store.borrow_mut());

    // ── 5. BeamLink ───────────────────────────────────────────
    let clock = Esp32TimeAdapter::new();
    let mut link = BeamLink::new(BleAdapter::new(), Esp32TimeAdapter::new());
    if let Err(e) = link.begin(&config.link_params()) {
        error!("BeamLink init failed: {} ({})", e, e.code());
        return Err(anyhow::anyhow!("BeamLink init failed: {}", e));
    }
    info!("BLE: advertising as {}", config.ble_name);
    info!("BLE: service UUID {}", config.ble_service_uuid);
    info!("BLE: characteristic UUID {}", config.ble_characteristic_uuid);

    {
        let store = Rc::clone(&store);
        let controller = Rc::clone(&controller);
        let handler_clock = Esp32TimeAdapter::new();
        link.on_message(move |message, reply| {
            info!("BLE RX: {}", message);
            if message == "stats" {
                let report = reply.stats_report();
                reply.send(&report);
                return;
            }
            let answer = controller.borrow_mut().handle(
                message,
                handler_clock.now_ms(),
                &mut store.borrow_mut(),
            );
            reply.send(&answer);
        });
    }

    controller.borrow_mut().boot_blink(FreeRtos::delay_ms);

    info!("Ready. Commands: led:on, led:off, led:status, led:toggle, led:blink, state:info, info, stats");

    // ── 6. Main loop ──────────────────────────────────────────
    let mut reporter = StatsReporter::new(u64::from(config.report_interval_ms), clock.now_ms());

    loop {
        link.tick();

        let now = clock.now_ms();
        {
            let mut controller = controller.borrow_mut();
            let mut store = store.borrow_mut();
            controller.publish_connection(link.is_connected(), &mut store);
            controller.tick(now);
            store.update();
        }

        reporter.poll(&mut link, now);

        FreeRtos::delay_ms(LOOP_DELAY_MS);
    }
}
