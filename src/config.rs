//! Device configuration.
//!
//! All tunable parameters for a BeamLink device.  Two sources are
//! accepted:
//!
//! - `KEY=VALUE` lines (the `beam.config` format), `#` starts a comment,
//!   values may be double-quoted.
//! - The serde JSON form of [`BeamConfig`]; missing fields keep their
//!   defaults.

use core::fmt;

use log::{LevelFilter, warn};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::link::engine::{LinkParams, MAX_NAME_LEN};
use crate::link::stack::{MAX_PASSKEY, SecurityConfig, SecurityLevel};
use crate::link::uuid::{DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID, Uuid128};
use crate::state::{DeviceInfo, OutputFormat, OutputPolicy, StoreConfig};

// ───────────────────────────────────────────────────────────────
// Error type
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Line without `=`.
    MissingSeparator { line: usize },
    /// Value could not be parsed for its key.
    InvalidValue { key: String, value: String },
    /// JSON document rejected.
    Json(String),
    /// Parsed fine but out of range.
    Invalid(&'static str),
}

impl ConfigError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MissingSeparator { .. } | Self::Json(_) => ErrorCode::ConfigParseError,
            Self::InvalidValue { .. } | Self::Invalid(_) => ErrorCode::InvalidConfigValue,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator { line } => write!(f, "line {}: expected KEY=VALUE", line),
            Self::InvalidValue { key, value } => write!(f, "{}: invalid value '{}'", key, value),
            Self::Json(e) => write!(f, "config JSON: {}", e),
            Self::Invalid(why) => write!(f, "invalid config: {}", why),
        }
    }
}

impl std::error::Error for ConfigError {}

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamConfig {
    // --- Identity ---
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    pub fw_version: String,

    // --- BLE ---
    /// Advertised GAP name
    pub ble_name: String,
    /// Out-of-range values are clamped when the link starts.
    pub ble_power_dbm: i32,
    pub ble_adv_interval_ms: u32,
    pub ble_service_uuid: Uuid128,
    pub ble_characteristic_uuid: Uuid128,

    // --- Hardware ---
    pub led_pin: u8,
    pub led_active_high: bool,

    // --- Behaviour ---
    /// Period of the status report pushed to a connected client
    pub report_interval_ms: u32,
    pub log_level: String,

    // --- Security ---
    pub encryption: bool,
    /// Static six-digit passkey; enables MITM pairing when set
    pub passkey: Option<u32>,

    // --- State output ---
    /// JSON snapshots when true, plain text otherwise
    pub state_json: bool,
    pub state_on_change: bool,
    pub state_on_interval: bool,
    pub state_interval_ms: u64,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            // Identity
            device_id: "BLX-01A2B3".into(),
            device_name: "BeamLink-ESP32".into(),
            device_type: "BLE-Controller".into(),
            fw_version: "1.0.0".into(),

            // BLE
            ble_name: "BeamLink-ESP32".into(),
            ble_power_dbm: 9,
            ble_adv_interval_ms: 100,
            ble_service_uuid: DEFAULT_SERVICE_UUID,
            ble_characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,

            // Hardware
            led_pin: 2,
            led_active_high: true,

            // Behaviour
            report_interval_ms: 5_000,
            log_level: "INFO".into(),

            // Security
            encryption: false,
            passkey: None,

            // State output
            state_json: true,
            state_on_change: true,
            state_on_interval: false,
            state_interval_ms: 1_000,
        }
    }
}

impl BeamConfig {
    /// Parse `KEY=VALUE` lines on top of the defaults.  Unknown keys are
    /// logged and skipped.
    pub fn from_kv_str(text: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::MissingSeparator { line: idx + 1 });
            };
            cfg.apply(key.trim(), unquote(value.trim()))?;
        }
        Ok(cfg)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Json(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(|e| ConfigError::Json(e.to_string()))
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let bad = || ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        };
        match key {
            "DEVICE_ID" => self.device_id = value.to_owned(),
            "DEVICE_NAME" => self.device_name = value.to_owned(),
            "DEVICE_TYPE" => self.device_type = value.to_owned(),
            "FIRMWARE_VERSION" => self.fw_version = value.to_owned(),
            "BLE_NAME" => self.ble_name = value.to_owned(),
            "BLE_POWER_DBM" => self.ble_power_dbm = value.parse().map_err(|_| bad())?,
            "BLE_ADV_INTERVAL_MS" => self.ble_adv_interval_ms = value.parse().map_err(|_| bad())?,
            "BLE_SERVICE_UUID" => self.ble_service_uuid = value.parse().map_err(|_| bad())?,
            "BLE_CHARACTERISTIC_UUID" | "BLE_RX_UUID" => {
                self.ble_characteristic_uuid = value.parse().map_err(|_| bad())?;
            }
            "LED_PIN" => self.led_pin = value.parse().map_err(|_| bad())?,
            "LED_ACTIVE_HIGH" => self.led_active_high = parse_bool(value).ok_or_else(bad)?,
            "REPORT_INTERVAL_MS" => self.report_interval_ms = value.parse().map_err(|_| bad())?,
            "LOG_LEVEL" => self.log_level = value.to_owned(),
            "ENCRYPTION_ENABLED" => self.encryption = parse_bool(value).ok_or_else(bad)?,
            "BLE_PASSKEY" if value.is_empty() => self.passkey = None,
            "BLE_PASSKEY" => self.passkey = Some(value.parse().map_err(|_| bad())?),
            "STATE_JSON" => self.state_json = parse_bool(value).ok_or_else(bad)?,
            "STATE_ON_CHANGE" => self.state_on_change = parse_bool(value).ok_or_else(bad)?,
            "STATE_ON_INTERVAL" => self.state_on_interval = parse_bool(value).ok_or_else(bad)?,
            "STATE_INTERVAL_MS" => self.state_interval_ms = value.parse().map_err(|_| bad())?,
            _ => warn!("Config: unknown key '{}' ignored", key),
        }
        Ok(())
    }

    /// Range checks that parsing alone does not cover.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ble_name.is_empty() || self.ble_name.len() > MAX_NAME_LEN {
            return Err(ConfigError::Invalid("BLE name must be 1-32 bytes"));
        }
        if self.device_name.is_empty() {
            return Err(ConfigError::Invalid("device name must not be empty"));
        }
        if self.passkey.is_some_and(|pk| pk > MAX_PASSKEY) {
            return Err(ConfigError::Invalid("passkey must be 0-999999"));
        }
        if self.state_on_interval && self.state_interval_ms == 0 {
            return Err(ConfigError::Invalid("state interval must be non-zero"));
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::Invalid("report interval must be non-zero"));
        }
        if parse_level(&self.log_level).is_none() {
            return Err(ConfigError::Invalid("unknown log level"));
        }
        Ok(())
    }

    // ── Projections ───────────────────────────────────────────

    pub fn security(&self) -> SecurityConfig {
        if !self.encryption {
            return SecurityConfig::default();
        }
        SecurityConfig {
            level: if self.passkey.is_some() {
                SecurityLevel::PairingMitm
            } else {
                SecurityLevel::Encryption
            },
            passkey: self.passkey,
            bonding: true,
        }
    }

    pub fn link_params(&self) -> LinkParams {
        LinkParams::new(self.ble_name.clone())
            .with_tx_power(self.ble_power_dbm.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8)
            .with_adv_interval(self.ble_adv_interval_ms.min(u32::from(u16::MAX)) as u16)
            .with_uuids(self.ble_service_uuid, self.ble_characteristic_uuid)
            .with_security(self.security())
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.device_name.clone(),
            id: self.device_id.clone(),
            device_type: self.device_type.clone(),
            firmware: self.fw_version.clone(),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            policy: OutputPolicy {
                on_change: self.state_on_change,
                on_interval: self.state_on_interval,
                interval_ms: self.state_interval_ms,
                format: if self.state_json {
                    OutputFormat::Json
                } else {
                    OutputFormat::Text
                },
            },
            device: self.device_info(),
        }
    }

    /// `LOG_LEVEL` as a filter; unknown names fall back to `Info`.
    pub fn log_level(&self) -> LevelFilter {
        parse_level(&self.log_level).unwrap_or(LevelFilter::Info)
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.to_ascii_uppercase().as_str() {
        "NONE" | "OFF" => Some(LevelFilter::Off),
        "ERROR" => Some(LevelFilter::Error),
        "WARN" | "WARNING" => Some(LevelFilter::Warn),
        "INFO" => Some(LevelFilter::Info),
        "DEBUG" => Some(LevelFilter::Debug),
        "VERBOSE" | "TRACE" => Some(LevelFilter::Trace),
        _ => None,
    }
}
