//! Application core: device logic on top of the link, zero I/O.
//!
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real peripherals.

pub mod led;
pub mod ports;
pub mod report;
