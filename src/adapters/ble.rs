//! BLE stack adapter.
//!
//! Implements [`BleStack`], the hexagonal boundary between the protocol
//! engine and the vendor Bluetooth stack.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: in-memory simulation with fault injection and
//!   a record of every notification, for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Attribute        | UUID (default)                           | Perms              |
//! |------------------|------------------------------------------|--------------------|
//! | BeamLink service | `12345678-1234-1234-1234-1234567890ab`   | primary            |
//! | Data             | `12345678-1234-1234-1234-1234567890ac`   | Read+Write+WriteNR+Notify |
//! | CCCD             | `0x2902`                                 | Read+Write         |
//!
//! ## Event bridge
//!
//! Bluedroid callbacks run in the Bluedroid task and only touch atomics
//! or the write queue:
//!
//! | Peer activity        | Carried by                                        |
//! |----------------------|---------------------------------------------------|
//! | connect / disconnect | link word: bit 0 connected, bits 1.. change count |
//! | characteristic write | bounded `embassy-sync` channel (lossy)            |
//! | write dropped        | overflow counter, drained by `take_dropped`       |
//!
//! [`BleStack::poll_event`] compares the link word against the last state
//! it reported, so a connection change is never lost to a full queue.
//! Writes still queued from a departing peer are delivered before its
//! `Disconnected`.

use log::{info, warn};

use crate::link::codec::DEFAULT_MTU;
use crate::link::engine::MAX_NAME_LEN;
use crate::link::stack::{
    AdvertisingParams, BleStack, CharProperties, SecurityConfig, StackError, StackEvent,
};
use crate::link::uuid::Uuid128;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

/// Pending inbound writes the bridge holds before dropping.
const EVENT_DEPTH: usize = 8;

/// Link word after one more connection change.
const fn next_link_word(word: u32, connected: bool) -> u32 {
    ((word >> 1).wrapping_add(1) << 1) | connected as u32
}

/// `(connected, change count)`.
const fn split_link_word(word: u32) -> (bool, u32) {
    (word & 1 == 1, word >> 1)
}

// ───────────────────────────────────────────────────────────────
// BLE state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    /// Controller off.
    Idle,
    /// Controller and host up, no GATT server yet.
    Ready,
    /// Service and characteristic registered.
    Serving,
    /// A setup step failed; `deinit` returns to `Idle`.
    Failed,
}

// ── ESP-IDF BLE static state (ISR-safe atomics) ───────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These statics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

#[cfg(target_os = "espidf")]
const APP_ID: u16 = 0x55;

/// Service declaration, characteristic declaration + value, CCCD.
#[cfg(target_os = "espidf")]
const SERVICE_NUM_HANDLES: u16 = 4;

#[cfg(target_os = "espidf")]
const CCCD_UUID16: u16 = 0x2902;

// GATT registration progress, advanced by the GATTS callback.
#[cfg(target_os = "espidf")]
const SETUP_IDLE: u32 = 0;
#[cfg(target_os = "espidf")]
const SETUP_REGISTERED: u32 = 1;
#[cfg(target_os = "espidf")]
const SETUP_SERVICE: u32 = 2;
#[cfg(target_os = "espidf")]
const SETUP_CHAR: u32 = 3;
#[cfg(target_os = "espidf")]
const SETUP_DONE: u32 = 4;
#[cfg(target_os = "espidf")]
const SETUP_FAILED: u32 = 0x100;

#[cfg(target_os = "espidf")]
const SETUP_POLL_MS: u32 = 10;
#[cfg(target_os = "espidf")]
const SETUP_POLL_LIMIT: u32 = 200;

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_LINK: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_DROPPED: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_MTU: AtomicU32 = AtomicU32::new(DEFAULT_MTU as u32);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_DATA_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CCCD_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_SETUP: AtomicU32 = AtomicU32::new(SETUP_IDLE);

// Service definition read by the REG/CREATE callbacks.
// GATTS callbacks run in the Bluedroid task (not ISR), so std Mutex is safe.
#[cfg(target_os = "espidf")]
static BLE_SERVICE_DEF: std::sync::Mutex<Option<(u128, u128, u8)>> = std::sync::Mutex::new(None);

#[cfg(target_os = "espidf")]
static BLE_EVENTS: Channel<CriticalSectionRawMutex, StackEvent, EVENT_DEPTH> = Channel::new();

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = Uuid128::from_u128(uuid).to_le_bytes();
    t
}

#[cfg(target_os = "espidf")]
fn uuid16_to_esp(uuid: u16) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 2;
    t.uuid.uuid16 = uuid;
    t
}

#[cfg(target_os = "espidf")]
fn push_write(data: &[u8]) {
    let mut frame = heapless::Vec::new();
    if frame.extend_from_slice(data).is_err() {
        warn!("BLE GATTS: write of {} bytes dropped (too long)", data.len());
        BLE_DROPPED.fetch_add(1, AtomicOrdering::AcqRel);
        return;
    }
    if BLE_EVENTS.try_send(StackEvent::Write(frame)).is_err() {
        warn!("BLE GATTS: write queue full, frame dropped");
        BLE_DROPPED.fetch_add(1, AtomicOrdering::AcqRel);
    }
}

/// Only the Bluedroid task writes the link word.
#[cfg(target_os = "espidf")]
fn record_link_change(connected: bool) {
    let word = BLE_LINK.load(AtomicOrdering::Acquire);
    BLE_LINK.store(next_link_word(word, connected), AtomicOrdering::Release);
}

#[cfg(target_os = "espidf")]
fn setup_failed_at(step: u32) {
    BLE_SETUP.store(SETUP_FAILED | step, AtomicOrdering::Release);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            let status = unsafe { (*param).adv_start_cmpl.status };
            if status == esp_bt_status_t_ESP_BT_STATUS_SUCCESS {
                log::info!("BLE GAP: advertising started");
            } else {
                log::warn!("BLE GAP: advertising start failed (status={})", status);
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising stopped");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SEC_REQ_EVT => unsafe {
            esp_ble_gap_security_rsp((*param).ble_security.ble_req.bd_addr.as_mut_ptr(), true);
        },
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_AUTH_CMPL_EVT => {
            let p = unsafe { &(*param).ble_security.auth_cmpl };
            if p.success {
                log::info!("BLE GAP: authentication complete");
            } else {
                log::warn!("BLE GAP: authentication failed (reason={})", p.fail_reason);
            }
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            let p = unsafe { &(*param).reg };
            if p.status != esp_gatt_status_t_ESP_GATT_OK {
                log::error!("BLE GATTS: app register failed (status={})", p.status);
                setup_failed_at(SETUP_IDLE);
                return;
            }
            BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Release);
            BLE_SETUP.store(SETUP_REGISTERED, AtomicOrdering::Release);
            log::info!("BLE GATTS: app registered (if={})", gatts_if);

            let Some((service, _, _)) = BLE_SERVICE_DEF.lock().ok().and_then(|d| *d) else {
                setup_failed_at(SETUP_REGISTERED);
                return;
            };
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(service),
                    inst_id: 0,
                },
                is_primary: true,
            };
            if unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, SERVICE_NUM_HANDLES) }
                != ESP_OK
            {
                setup_failed_at(SETUP_REGISTERED);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let p = unsafe { &(*param).create };
            if p.status != esp_gatt_status_t_ESP_GATT_OK {
                log::error!("BLE GATTS: service create failed (status={})", p.status);
                setup_failed_at(SETUP_REGISTERED);
                return;
            }
            let svc_handle = p.service_handle;
            BLE_SVC_HANDLE.store(svc_handle as u32, AtomicOrdering::Release);
            BLE_SETUP.store(SETUP_SERVICE, AtomicOrdering::Release);
            log::info!("BLE GATTS: service created (handle={})", svc_handle);

            let Some((_, characteristic, props)) = BLE_SERVICE_DEF.lock().ok().and_then(|d| *d)
            else {
                setup_failed_at(SETUP_SERVICE);
                return;
            };
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
            }
            let mut char_uuid = uuid128_to_esp(characteristic);
            let mut char_val = esp_attr_value_t {
                attr_max_len: crate::link::codec::MAX_MTU,
                attr_len: 0,
                attr_value: core::ptr::null_mut(),
            };
            let mut control = esp_attr_control_t {
                auto_rsp: ESP_GATT_AUTO_RSP as u8,
            };
            let ret = unsafe {
                esp_ble_gatts_add_char(
                    svc_handle,
                    &mut char_uuid,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    props as esp_gatt_char_prop_t,
                    &mut char_val,
                    &mut control,
                )
            };
            if ret != ESP_OK {
                setup_failed_at(SETUP_SERVICE);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let p = unsafe { &(*param).add_char };
            if p.status != esp_gatt_status_t_ESP_GATT_OK {
                log::error!("BLE GATTS: characteristic add failed (status={})", p.status);
                setup_failed_at(SETUP_SERVICE);
                return;
            }
            BLE_DATA_CHAR_HANDLE.store(p.attr_handle as u32, AtomicOrdering::Release);
            BLE_SETUP.store(SETUP_CHAR, AtomicOrdering::Release);
            log::info!("BLE GATTS: data char (handle={})", p.attr_handle);

            let mut cccd_uuid = uuid16_to_esp(CCCD_UUID16);
            let ret = unsafe {
                esp_ble_gatts_add_char_descr(
                    BLE_SVC_HANDLE.load(AtomicOrdering::Acquire) as u16,
                    &mut cccd_uuid,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    core::ptr::null_mut(),
                    core::ptr::null_mut(),
                )
            };
            if ret != ESP_OK {
                setup_failed_at(SETUP_CHAR);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            let p = unsafe { &(*param).add_char_descr };
            if p.status != esp_gatt_status_t_ESP_GATT_OK {
                setup_failed_at(SETUP_CHAR);
                return;
            }
            BLE_CCCD_HANDLE.store(p.attr_handle as u32, AtomicOrdering::Release);
            BLE_SETUP.store(SETUP_DONE, AtomicOrdering::Release);
            log::info!("BLE GATTS: CCCD (handle={}), service ready", p.attr_handle);
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            BLE_CONN_ID.store(p.conn_id as u32, AtomicOrdering::Release);
            record_link_change(true);
            log::info!("BLE GATTS: client connected (conn_id={})", p.conn_id);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            BLE_MTU.store(DEFAULT_MTU as u32, AtomicOrdering::Release);
            record_link_change(false);
            log::info!("BLE GATTS: client disconnected");
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            let p = unsafe { &(*param).mtu };
            BLE_MTU.store(p.mtu as u32, AtomicOrdering::Release);
            log::info!("BLE GATTS: MTU negotiated ({})", p.mtu);
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            if p.handle as u32 != BLE_DATA_CHAR_HANDLE.load(AtomicOrdering::Acquire) {
                // CCCD writes (notification enable) need no action.
                return;
            }
            let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
            push_write(data);
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation state
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, channel::Channel};

/// Fault switches for host tests.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default, Clone, Copy)]
struct SimFaults {
    init: bool,
    service: bool,
    advertising: bool,
    notify: bool,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
struct SimState {
    tx_power: i8,
    service: Option<(Uuid128, Uuid128, CharProperties)>,
    security: Option<SecurityConfig>,
    peer_mtu: u16,
    /// Same encoding as the target's link word.
    link: u32,
    dropped: u32,
    advertising: bool,
    advertising_starts: u32,
    last_advertising: Option<AdvertisingParams>,
    sent: Vec<Vec<u8>>,
    faults: SimFaults,
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<MAX_NAME_LEN>,
    local_mtu: u16,
    /// Connection state last handed out by `poll_event`.
    reported_connected: bool,
    /// Change count at which `reported_connected` caught up.
    seen_changes: u32,
    #[cfg(not(target_os = "espidf"))]
    sim: SimState,
    #[cfg(not(target_os = "espidf"))]
    events: Channel<NoopRawMutex, StackEvent, EVENT_DEPTH>,
}

impl Default for BleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BleAdapter {
    pub fn new() -> Self {
        Self {
            state: BleState::Idle,
            device_name: heapless::String::new(),
            local_mtu: DEFAULT_MTU,
            reported_connected: false,
            seen_changes: 0,
            #[cfg(not(target_os = "espidf"))]
            sim: SimState::default(),
            #[cfg(not(target_os = "espidf"))]
            events: Channel::new(),
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state != BleState::Idle
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// MTU offered to peers during exchange.
    pub fn local_mtu(&self) -> u16 {
        self.local_mtu
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_init(&mut self, tx_power_dbm: i8) -> Result<(), StackError> {
        use esp_idf_svc::sys::*;

        let check = |ret: esp_err_t, what: &str| {
            if ret == ESP_OK {
                Ok(())
            } else {
                log::error!("BLE: {} failed ({})", what, ret);
                Err(StackError::InitFailed)
            }
        };

        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
            check(
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                "bt_controller_enable",
            )?;
            check(esp_bluedroid_init(), "bluedroid_init")?;
            check(esp_bluedroid_enable(), "bluedroid_enable")?;

            check(
                esp_ble_gap_register_callback(Some(ble_gap_event_handler)),
                "gap_register_callback",
            )?;
            check(
                esp_ble_gatts_register_callback(Some(ble_gatts_event_handler)),
                "gatts_register_callback",
            )?;

            let mut cname: heapless::Vec<u8, { MAX_NAME_LEN + 1 }> = heapless::Vec::new();
            let _ = cname.extend_from_slice(self.device_name.as_bytes());
            let _ = cname.push(0);
            check(
                esp_ble_gap_set_device_name(cname.as_ptr() as *const _),
                "set_device_name",
            )?;

            // ESP_PWR_LVL_N12 .. ESP_PWR_LVL_P9 in 3 dB steps.
            let level = ((i32::from(tx_power_dbm) + 12) / 3) as esp_power_level_t;
            check(
                esp_ble_tx_power_set(esp_ble_power_type_t_ESP_BLE_PWR_TYPE_DEFAULT, level),
                "tx_power_set(default)",
            )?;
            check(
                esp_ble_tx_power_set(esp_ble_power_type_t_ESP_BLE_PWR_TYPE_ADV, level),
                "tx_power_set(adv)",
            )?;
        }
        info!(
            "BLE(espidf): Bluedroid up as '{}' ({} dBm)",
            self.device_name, tx_power_dbm
        );
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_init(&mut self, tx_power_dbm: i8) -> Result<(), StackError> {
        if self.sim.faults.init {
            return Err(StackError::InitFailed);
        }
        self.sim.tx_power = tx_power_dbm;
        self.sim.peer_mtu = DEFAULT_MTU;
        info!("BLE(sim): stack up as '{}' ({} dBm)", self.device_name, tx_power_dbm);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_security(&mut self, security: &SecurityConfig) -> Result<(), StackError> {
        use crate::link::stack::SecurityLevel;
        use esp_idf_svc::sys::*;

        let auth_req = match security.level {
            SecurityLevel::None => return Ok(()),
            SecurityLevel::Encryption => ESP_LE_AUTH_NO_BOND,
            SecurityLevel::Pairing => ESP_LE_AUTH_BOND,
            SecurityLevel::PairingMitm if security.bonding => ESP_LE_AUTH_REQ_MITM | ESP_LE_AUTH_BOND,
            SecurityLevel::PairingMitm => ESP_LE_AUTH_REQ_MITM,
            SecurityLevel::PairingMitmSc if security.bonding => ESP_LE_AUTH_REQ_SC_MITM_BOND,
            SecurityLevel::PairingMitmSc => ESP_LE_AUTH_REQ_SC_MITM,
        } as esp_ble_auth_req_t;
        let iocap = if security.level.requires_passkey() {
            ESP_IO_CAP_OUT
        } else {
            ESP_IO_CAP_NONE
        } as esp_ble_io_cap_t;
        let key_size: u8 = 16;
        let keys: u8 = (ESP_BLE_ENC_KEY_MASK | ESP_BLE_ID_KEY_MASK) as u8;

        let set = |param: esp_ble_sm_param_t, value: *const core::ffi::c_void, len: usize| {
            let ret = unsafe { esp_ble_gap_set_security_param(param, value as *mut _, len as u8) };
            if ret == ESP_OK {
                Ok(())
            } else {
                log::error!("BLE: set_security_param({}) failed ({})", param, ret);
                Err(StackError::SecurityFailed)
            }
        };

        set(
            esp_ble_sm_param_t_ESP_BLE_SM_AUTHEN_REQ_MODE,
            (&auth_req as *const esp_ble_auth_req_t).cast(),
            core::mem::size_of_val(&auth_req),
        )?;
        set(
            esp_ble_sm_param_t_ESP_BLE_SM_IOCAP_MODE,
            (&iocap as *const esp_ble_io_cap_t).cast(),
            core::mem::size_of_val(&iocap),
        )?;
        set(
            esp_ble_sm_param_t_ESP_BLE_SM_MAX_KEY_SIZE,
            (&key_size as *const u8).cast(),
            1,
        )?;
        set(
            esp_ble_sm_param_t_ESP_BLE_SM_SET_INIT_KEY,
            (&keys as *const u8).cast(),
            1,
        )?;
        set(
            esp_ble_sm_param_t_ESP_BLE_SM_SET_RSP_KEY,
            (&keys as *const u8).cast(),
            1,
        )?;
        if let Some(passkey) = security.passkey {
            set(
                esp_ble_sm_param_t_ESP_BLE_SM_SET_STATIC_PASSKEY,
                (&passkey as *const u32).cast(),
                core::mem::size_of::<u32>(),
            )?;
        }
        info!("BLE(espidf): security {:?} configured", security.level);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_security(&mut self, security: &SecurityConfig) -> Result<(), StackError> {
        info!("BLE(sim): security {:?} (bonding={})", security.level, security.bonding);
        self.sim.security = Some(*security);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_create_service(
        &mut self,
        service: Uuid128,
        characteristic: Uuid128,
        props: CharProperties,
    ) -> Result<(), StackError> {
        use esp_idf_hal::delay::FreeRtos;
        use esp_idf_svc::sys::*;

        match BLE_SERVICE_DEF.lock() {
            Ok(mut def) => *def = Some((service.as_u128(), characteristic.as_u128(), props.bits())),
            Err(_) => return Err(StackError::ServerCreateFailed),
        }
        BLE_SETUP.store(SETUP_IDLE, AtomicOrdering::Release);

        if unsafe { esp_ble_gatts_app_register(APP_ID) } != ESP_OK {
            return Err(StackError::ServerCreateFailed);
        }

        // Registration completes asynchronously in the GATTS callback.
        let mut step = SETUP_IDLE;
        for _ in 0..SETUP_POLL_LIMIT {
            step = BLE_SETUP.load(AtomicOrdering::Acquire);
            if step == SETUP_DONE || step & SETUP_FAILED != 0 {
                break;
            }
            FreeRtos::delay_ms(SETUP_POLL_MS);
        }

        match step & !SETUP_FAILED {
            SETUP_DONE if step & SETUP_FAILED == 0 => Ok(()),
            SETUP_IDLE => Err(StackError::ServerCreateFailed),
            SETUP_REGISTERED => Err(StackError::ServiceCreateFailed),
            _ => Err(StackError::CharacteristicCreateFailed),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_create_service(
        &mut self,
        service: Uuid128,
        characteristic: Uuid128,
        props: CharProperties,
    ) -> Result<(), StackError> {
        if self.sim.faults.service {
            return Err(StackError::ServiceCreateFailed);
        }
        self.sim.service = Some((service, characteristic, props));
        info!("BLE(sim): service {} / char {}", service, characteristic);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_local_mtu(&mut self, mtu: u16) -> Result<(), StackError> {
        if unsafe { esp_idf_svc::sys::esp_ble_gatt_set_local_mtu(mtu) } == esp_idf_svc::sys::ESP_OK {
            Ok(())
        } else {
            Err(StackError::InitFailed)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set_local_mtu(&mut self, _mtu: u16) -> Result<(), StackError> {
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), StackError> {
        use esp_idf_svc::sys::*;

        let mut service = params.service.to_le_bytes();
        let units = params.interval_units();
        unsafe {
            // Advertising packet: flags + 128-bit service UUID.
            let mut adv_data = esp_ble_adv_data_t {
                set_scan_rsp: false,
                include_name: false,
                include_txpower: false,
                min_interval: 0x0006,
                max_interval: 0x0010,
                service_uuid_len: service.len() as u16,
                p_service_uuid: service.as_mut_ptr(),
                flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
                ..core::mem::zeroed()
            };
            // Scan response: complete device name.
            let mut scan_rsp = esp_ble_adv_data_t {
                set_scan_rsp: true,
                include_name: true,
                include_txpower: true,
                ..core::mem::zeroed()
            };
            if esp_ble_gap_config_adv_data(&mut adv_data) != ESP_OK
                || esp_ble_gap_config_adv_data(&mut scan_rsp) != ESP_OK
            {
                return Err(StackError::AdvertisingFailed);
            }

            let mut adv_params = esp_ble_adv_params_t {
                adv_int_min: units,
                adv_int_max: units,
                adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..core::mem::zeroed()
            };
            if esp_ble_gap_start_advertising(&mut adv_params) != ESP_OK {
                return Err(StackError::AdvertisingFailed);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), StackError> {
        if self.sim.faults.advertising {
            return Err(StackError::AdvertisingFailed);
        }
        self.sim.advertising = true;
        self.sim.advertising_starts += 1;
        self.sim.last_advertising = Some(*params);
        info!(
            "BLE(sim): advertising '{}' every {} units",
            self.device_name,
            params.interval_units()
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop_advertising(&mut self) {
        unsafe {
            esp_idf_svc::sys::esp_ble_gap_stop_advertising();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop_advertising(&mut self) {
        self.sim.advertising = false;
    }

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self, payload: &[u8]) -> Result<(), StackError> {
        use esp_idf_svc::sys::*;

        let handle = BLE_DATA_CHAR_HANDLE.load(AtomicOrdering::Acquire);
        let (connected, _) = split_link_word(BLE_LINK.load(AtomicOrdering::Acquire));
        if handle == 0 || !connected {
            return Err(StackError::NotifyFailed);
        }
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Acquire) as esp_gatt_if_t,
                BLE_CONN_ID.load(AtomicOrdering::Acquire) as u16,
                handle as u16,
                payload.len() as u16,
                payload.as_ptr() as *mut u8,
                false,
            )
        };
        if ret == ESP_OK {
            Ok(())
        } else {
            Err(StackError::NotifyFailed)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self, payload: &[u8]) -> Result<(), StackError> {
        if self.sim.faults.notify || !self.sim_connected() {
            return Err(StackError::NotifyFailed);
        }
        self.sim.sent.push(payload.to_vec());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_mtu(&self) -> u16 {
        BLE_MTU.load(AtomicOrdering::Acquire) as u16
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_mtu(&self) -> u16 {
        if self.sim_connected() {
            self.sim.peer_mtu
        } else {
            DEFAULT_MTU
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_link_word(&self) -> u32 {
        BLE_LINK.load(AtomicOrdering::Acquire)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_link_word(&self) -> u32 {
        self.sim.link
    }

    #[cfg(target_os = "espidf")]
    fn platform_next_write(&mut self) -> Option<StackEvent> {
        BLE_EVENTS.try_receive().ok()
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_next_write(&mut self) -> Option<StackEvent> {
        self.events.try_receive().ok()
    }

    #[cfg(target_os = "espidf")]
    fn platform_take_dropped(&mut self) -> u32 {
        BLE_DROPPED.swap(0, AtomicOrdering::AcqRel)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_take_dropped(&mut self) -> u32 {
        core::mem::take(&mut self.sim.dropped)
    }

    #[cfg(target_os = "espidf")]
    fn platform_deinit(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            let gatts_if = BLE_GATTS_IF.load(AtomicOrdering::Acquire);
            if gatts_if != 0 {
                esp_ble_gatts_app_unregister(gatts_if as esp_gatt_if_t);
            }
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        BLE_GATTS_IF.store(0, AtomicOrdering::Release);
        BLE_CONN_ID.store(0, AtomicOrdering::Release);
        BLE_LINK.store(0, AtomicOrdering::Release);
        BLE_DROPPED.store(0, AtomicOrdering::Release);
        BLE_MTU.store(DEFAULT_MTU as u32, AtomicOrdering::Release);
        BLE_SVC_HANDLE.store(0, AtomicOrdering::Release);
        BLE_DATA_CHAR_HANDLE.store(0, AtomicOrdering::Release);
        BLE_CCCD_HANDLE.store(0, AtomicOrdering::Release);
        BLE_SETUP.store(SETUP_IDLE, AtomicOrdering::Release);
        if let Ok(mut def) = BLE_SERVICE_DEF.lock() {
            *def = None;
        }
        BLE_EVENTS.clear();
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_deinit(&mut self) {
        let faults = self.sim.faults;
        let sent = core::mem::take(&mut self.sim.sent);
        let starts = self.sim.advertising_starts;
        self.sim = SimState {
            faults,
            sent,
            advertising_starts: starts,
            ..SimState::default()
        };
        self.events.clear();
        info!("BLE(sim): stopped");
    }

    // ── Simulation controls ───────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn sim_connected(&self) -> bool {
        split_link_word(self.sim.link).0
    }

    /// Simulate a central connecting with `mtu` (capped at the local MTU).
    /// While a peer is attached only the MTU changes.
    #[cfg(not(target_os = "espidf"))]
    pub fn inject_connect(&mut self, mtu: u16) {
        self.sim.peer_mtu = mtu.clamp(DEFAULT_MTU, self.local_mtu.max(DEFAULT_MTU));
        if self.sim_connected() {
            return;
        }
        self.sim.advertising = false;
        self.sim.link = next_link_word(self.sim.link, true);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn inject_disconnect(&mut self) {
        if !self.sim_connected() {
            return;
        }
        self.sim.peer_mtu = DEFAULT_MTU;
        self.sim.link = next_link_word(self.sim.link, false);
    }

    /// Simulate a characteristic write. Returns `false` if it was dropped.
    #[cfg(not(target_os = "espidf"))]
    pub fn inject_write(&mut self, bytes: &[u8]) -> bool {
        let mut frame = heapless::Vec::new();
        if frame.extend_from_slice(bytes).is_err() {
            warn!("BLE(sim): write of {} bytes dropped (too long)", bytes.len());
            self.sim.dropped += 1;
            return false;
        }
        if self.events.try_send(StackEvent::Write(frame)).is_err() {
            warn!("BLE(sim): write queue full, frame dropped");
            self.sim.dropped += 1;
            return false;
        }
        true
    }

    /// Every payload handed to `notify`, oldest first.
    #[cfg(not(target_os = "espidf"))]
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sim.sent
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.sim.sent)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn tx_power(&self) -> i8 {
        self.sim.tx_power
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn service(&self) -> Option<(Uuid128, Uuid128, CharProperties)> {
        self.sim.service
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn security(&self) -> Option<SecurityConfig> {
        self.sim.security
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn is_advertising(&self) -> bool {
        self.sim.advertising
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn advertising_starts(&self) -> u32 {
        self.sim.advertising_starts
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn last_advertising(&self) -> Option<AdvertisingParams> {
        self.sim.last_advertising
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn fail_init(&mut self, fail: bool) {
        self.sim.faults.init = fail;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn fail_service(&mut self, fail: bool) {
        self.sim.faults.service = fail;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn fail_advertising(&mut self, fail: bool) {
        self.sim.faults.advertising = fail;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn fail_notify(&mut self, fail: bool) {
        self.sim.faults.notify = fail;
    }
}

// ───────────────────────────────────────────────────────────────
// BleStack implementation
// ───────────────────────────────────────────────────────────────

impl BleStack for BleAdapter {
    fn init(&mut self, name: &str, tx_power_dbm: i8) -> Result<(), StackError> {
        self.device_name.clear();
        if self.device_name.push_str(name).is_err() {
            return Err(StackError::InitFailed);
        }
        match self.platform_init(tx_power_dbm) {
            Ok(()) => {
                self.state = BleState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = BleState::Failed;
                Err(e)
            }
        }
    }

    fn configure_security(&mut self, security: &SecurityConfig) -> Result<(), StackError> {
        self.platform_security(security)
    }

    fn create_service(
        &mut self,
        service: Uuid128,
        characteristic: Uuid128,
        props: CharProperties,
    ) -> Result<(), StackError> {
        if self.state != BleState::Ready {
            return Err(StackError::ServerCreateFailed);
        }
        match self.platform_create_service(service, characteristic, props) {
            Ok(()) => {
                self.state = BleState::Serving;
                Ok(())
            }
            Err(e) => {
                self.state = BleState::Failed;
                Err(e)
            }
        }
    }

    fn set_local_mtu(&mut self, mtu: u16) -> Result<(), StackError> {
        self.platform_set_local_mtu(mtu)?;
        self.local_mtu = mtu;
        Ok(())
    }

    fn mtu(&self) -> u16 {
        self.platform_mtu()
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), StackError> {
        if self.state != BleState::Serving {
            return Err(StackError::AdvertisingFailed);
        }
        self.platform_start_advertising(params)
    }

    fn stop_advertising(&mut self) {
        self.platform_stop_advertising();
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), StackError> {
        self.platform_notify(payload)
    }

    fn poll_event(&mut self) -> Option<StackEvent> {
        let (connected, changes) = split_link_word(self.platform_link_word());
        if changes == self.seen_changes && connected == self.reported_connected {
            return self.platform_next_write();
        }
        if self.reported_connected {
            if let Some(write) = self.platform_next_write() {
                return Some(write);
            }
        }
        // Step one transition at a time; a disconnect/reconnect between two
        // polls still yields both events.
        self.reported_connected = !self.reported_connected;
        if self.reported_connected == connected {
            self.seen_changes = changes;
        }
        Some(if self.reported_connected {
            StackEvent::Connected
        } else {
            StackEvent::Disconnected
        })
    }

    fn take_dropped(&mut self) -> u32 {
        self.platform_take_dropped()
    }

    fn deinit(&mut self) {
        if self.state == BleState::Idle {
            return;
        }
        self.platform_deinit();
        self.local_mtu = DEFAULT_MTU;
        self.reported_connected = false;
        self.seen_changes = 0;
        self.state = BleState::Idle;
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
