//! Log-based snapshot sink adapter.
//!
//! Implements [`SnapshotSink`] by writing every rendered state snapshot to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::info;

use crate::app::ports::SnapshotSink;

/// Adapter that logs every snapshot to the serial console.
#[derive(Debug, Default)]
pub struct LogSnapshotSink {
    emitted: u32,
}

impl LogSnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots written so far.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl SnapshotSink for LogSnapshotSink {
    fn emit(&mut self, snapshot: &str) {
        self.emitted = self.emitted.saturating_add(1);
        info!("STATE | {}", snapshot);
    }
}
