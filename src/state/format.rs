//! Snapshot formatting.
//!
//! | Format | Shape                                                                   |
//! |--------|-------------------------------------------------------------------------|
//! | Json   | `{"device":"..","id":"..","type":"..","fw":"..","state":{"k":v,..}}`    |
//! | Text   | `Device: n (ID: i, Type: t, FW: f) \| State: k=v, ..`                   |
//!
//! Both are full dumps of every key, in insertion order.

use core::fmt::Write as _;

use log::warn;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use super::value::StateValue;

/// Identity printed in the snapshot header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub id: String,
    pub device_type: String,
    pub firmware: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: "BeamLink-ESP32".into(),
            id: "BLX-01A2B3".into(),
            device_type: "BLE-Controller".into(),
            firmware: "1.0.0".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

pub fn render<'a, I>(format: OutputFormat, device: &DeviceInfo, entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a StateValue)>,
{
    match format {
        OutputFormat::Json => render_json(device, entries),
        OutputFormat::Text => render_text(device, entries),
    }
}

/// Wire shape of a JSON snapshot. Field order is the output order.
#[derive(Serialize)]
struct Snapshot<'a> {
    device: &'a str,
    id: &'a str,
    #[serde(rename = "type")]
    device_type: &'a str,
    fw: &'a str,
    state: StateMap<'a>,
}

/// Keys in insertion order.
struct StateMap<'a>(Vec<(&'a str, &'a StateValue)>);

impl Serialize for StateMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

pub fn render_json<'a, I>(device: &DeviceInfo, entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a StateValue)>,
{
    let snapshot = Snapshot {
        device: &device.name,
        id: &device.id,
        device_type: &device.device_type,
        fw: &device.firmware,
        state: StateMap(entries.into_iter().collect()),
    };
    serde_json::to_string(&snapshot).unwrap_or_else(|e| {
        warn!("State: snapshot serialisation failed: {}", e);
        String::from("{}")
    })
}

pub fn render_text<'a, I>(device: &DeviceInfo, entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a StateValue)>,
{
    let mut out = String::with_capacity(96);
    let _ = write!(
        out,
        "Device: {} (ID: {}, Type: {}, FW: {}) | State: ",
        device.name, device.id, device.device_type, device.firmware
    );
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}={}", key, value);
    }
    out
}
