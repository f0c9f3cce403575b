//! BeamLink firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.
//!
//! | Module     | Role                                              |
//! |------------|---------------------------------------------------|
//! | `link`     | BLE text protocol: codec, stats, connection, engine |
//! | `state`    | Reactive key/value store with snapshot output     |
//! | `app`      | Port traits and the status LED command handler    |
//! | `adapters` | Bluedroid, timer and log implementations of ports |
//! | `config`   | `BeamConfig` defaults, parsing, projections       |
//! | `error`    | Numeric error taxonomy and `LinkError`            |

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod link;
pub mod state;
pub mod utils;

pub use error::{ErrorCode, LinkError};
pub use link::{BeamLink, LinkParams, Reply};
pub use state::StateStore;
