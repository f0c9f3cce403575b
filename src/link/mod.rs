//! BeamLink: one bidirectional text protocol over a BLE peripheral.
//!
//! | Module       | Role                                                |
//! |--------------|-----------------------------------------------------|
//! | `codec`      | text ⇄ characteristic value, MTU ceiling            |
//! | `stats`      | RX/TX/error counters, uptime formatting             |
//! | `connection` | Idle / Advertising / Connected, advertising re-arm  |
//! | `stack`      | [`BleStack`] port + [`StackEvents`] capability      |
//! | `uuid`       | 128-bit GATT UUIDs                                  |
//! | `engine`     | [`BeamLink`]: lifecycle, handler slot, notify       |

pub mod codec;
pub mod connection;
pub mod engine;
pub mod stack;
pub mod stats;
pub mod uuid;

pub use connection::ConnectionState;
pub use engine::{BeamLink, Delivery, LinkParams, MessageHandler, Reply};
pub use stack::{BleStack, SecurityConfig, SecurityLevel, StackError, StackEvent, StackEvents};
pub use stats::Statistics;
pub use uuid::Uuid128;
