//! Link statistics: message counters and uptime.
//!
//! Counters saturate at `u32::MAX` instead of wrapping.  Only the main
//! loop touches them, so they are plain integers.

use core::fmt::Write as _;

/// Snapshot of the link counters plus the instant they were last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    received: u32,
    sent: u32,
    errors: u32,
    start_ms: u64,
}

impl Statistics {
    /// Zeroed counters starting at `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            start_ms: now_ms,
            ..Self::default()
        }
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn increment_received(&mut self) {
        self.received = self.received.saturating_add(1);
    }

    pub fn increment_sent(&mut self) {
        self.sent = self.sent.saturating_add(1);
    }

    pub fn increment_errors(&mut self) {
        self.errors = self.errors.saturating_add(1);
    }

    pub fn add_errors(&mut self, count: u32) {
        self.errors = self.errors.saturating_add(count);
    }

    /// Milliseconds since the last reset. A clock that went backwards yields 0.
    pub fn uptime_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.start_ms)
    }

    /// Zero all counters and rebase the start instant.
    pub fn reset(&mut self, now_ms: u64) {
        *self = Self::new(now_ms);
    }

    /// `Stats: RX=<r>, TX=<s>, Errors=<e>, Uptime=<formatted>`
    pub fn report(&self, now_ms: u64) -> String {
        format_stats(self.received, self.sent, self.errors, self.uptime_ms(now_ms))
    }
}

/// Render counters the way the host console expects them.
pub fn format_stats(received: u32, sent: u32, errors: u32, uptime_ms: u64) -> String {
    format!(
        "Stats: RX={}, TX={}, Errors={}, Uptime={}",
        received,
        sent,
        errors,
        format_uptime(uptime_ms)
    )
}

/// `1d 2h 3m 4s`, leading zero units omitted (`90000` → `1m 30s`).
pub fn format_uptime(uptime_ms: u64) -> String {
    let total_secs = uptime_ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = (total_secs / 3600) % 24;
    let days = total_secs / 86_400;

    let mut out = String::new();
    if days > 0 {
        let _ = write!(out, "{days}d ");
    }
    if days > 0 || hours > 0 {
        let _ = write!(out, "{hours}h ");
    }
    if days > 0 || hours > 0 || mins > 0 {
        let _ = write!(out, "{mins}m ");
    }
    let _ = write!(out, "{secs}s");
    out
}
