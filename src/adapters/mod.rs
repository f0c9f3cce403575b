//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements     | Connects to               |
//! |------------|----------------|---------------------------|
//! | `ble`      | BleStack       | Bluedroid GATT server     |
//! | `log_sink` | SnapshotSink   | Serial log output         |
//! | `time`     | Clock          | ESP32 system timer        |

pub mod ble;
pub mod log_sink;
pub mod time;
