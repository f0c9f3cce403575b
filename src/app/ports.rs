//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ BeamLink / StateStore / LedController
//! ```
//!
//! The BLE stack port lives next to the engine in
//! [`link::stack`](crate::link::stack); everything else the domain needs
//! from the platform is here.

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: platform timer → domain)
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

// ───────────────────────────────────────────────────────────────
// Snapshot sink port (driven adapter: domain → serial / host)
// ───────────────────────────────────────────────────────────────

/// Destination for rendered state snapshots.  Adapters decide where they
/// go (serial log, BLE notify, file).
pub trait SnapshotSink {
    fn emit(&mut self, snapshot: &str);
}

impl<F: FnMut(&str)> SnapshotSink for F {
    fn emit(&mut self, snapshot: &str) {
        self(snapshot);
    }
}

// ───────────────────────────────────────────────────────────────
// Status LED port (driven adapter: domain → GPIO)
// ───────────────────────────────────────────────────────────────

/// A single on/off indicator.
pub trait LedPort {
    /// Drive the LED. `true` means lit, whatever the pin polarity.
    fn set(&mut self, on: bool);
}
