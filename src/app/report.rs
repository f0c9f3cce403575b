//! Periodic link statistics pushed to the connected client.
//!
//! A report goes out only when it fits one notification at the current
//! MTU.  At the 23-byte default the line would be truncated and counted as
//! an error, so it is skipped until the peer negotiates a larger MTU.

use log::{debug, warn};

use crate::app::ports::Clock;
use crate::link::codec;
use crate::link::stack::BleStack;
use crate::link::BeamLink;

pub struct StatsReporter {
    interval_ms: u64,
    last_ms: u64,
}

impl StatsReporter {
    pub fn new(interval_ms: u64, now_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: now_ms,
        }
    }

    /// Send the stats line if the interval elapsed. Returns `true` when a
    /// report went out.
    pub fn poll<S: BleStack, C: Clock>(&mut self, link: &mut BeamLink<S, C>, now_ms: u64) -> bool {
        if !link.is_connected() || now_ms.saturating_sub(self.last_ms) < self.interval_ms {
            return false;
        }
        self.last_ms = now_ms;

        let report = link.stats_report();
        let room = codec::max_payload(link.mtu());
        if report.len() > room {
            debug!(
                "Report: {} bytes, MTU {} leaves {}, skipped",
                report.len(),
                link.mtu(),
                room
            );
            return false;
        }
        match link.notify(&report) {
            Ok(_) => true,
            Err(e) => {
                warn!("Report not sent: {}", e);
                false
            }
        }
    }
}
