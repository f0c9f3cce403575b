//! Reactive state store.
//!
//! Typed key/value state with per-key change tracking.  Snapshots are
//! rendered through [`format`] and handed to a [`SnapshotSink`]; an
//! optional subscriber hears about each changed key individually.
//!
//! ```text
//!   set ──▶ entry (dirty?) ──▶ on_change ──▶ output_state ──▶ sink(snapshot)
//!                                               │
//!   update ──▶ interval elapsed? ───────────────┘──▶ subscriber(key, value)
//! ```
//!
//! Keys keep the order in which they were first set.

pub mod format;
pub mod value;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::app::ports::{Clock, SnapshotSink};

pub use format::{DeviceInfo, OutputFormat};
pub use value::{StateEntry, StateKind, StateValue};

/// Called once per changed key during [`StateStore::output_state`] with
/// the key and its plain-rendered value.
pub type Subscriber = Box<dyn FnMut(&str, &str)>;

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// When snapshots are produced, and in which shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPolicy {
    pub on_change: bool,
    pub on_interval: bool,
    pub interval_ms: u64,
    pub format: OutputFormat,
}

impl Default for OutputPolicy {
    fn default() -> Self {
        Self {
            on_change: true,
            on_interval: false,
            interval_ms: 1_000,
            format: OutputFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub policy: OutputPolicy,
    pub device: DeviceInfo,
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

pub struct StateStore<C, K> {
    entries: Vec<(String, StateEntry)>,
    config: StoreConfig,
    clock: C,
    sink: K,
    subscriber: Option<Subscriber>,
    last_output_ms: u64,
}

impl<C: Clock, K: SnapshotSink> StateStore<C, K> {
    pub fn new(config: StoreConfig, clock: C, sink: K) -> Self {
        let now = clock.now_ms();
        Self {
            entries: Vec::new(),
            config,
            clock,
            sink,
            subscriber: None,
            last_output_ms: now,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    fn entry(&self, key: &str) -> Option<&StateEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    // ── Writes ────────────────────────────────────────────────

    /// Insert or overwrite `key`.  With `on_change` set, any pending
    /// change triggers an [`output_state`](Self::output_state).
    pub fn set(&mut self, key: &str, value: impl Into<StateValue>) {
        let value = value.into();
        let changed = match self.position(key) {
            Some(i) => self.entries[i].1.assign(value),
            None => {
                self.entries.push((key.to_owned(), StateEntry::new(value)));
                true
            }
        };
        if changed {
            debug!("State: '{}' changed", key);
        }
        if self.config.policy.on_change && self.has_any_changed() {
            self.output_state();
        }
    }

    /// Drop every key. No snapshot is produced.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // ── Reads ─────────────────────────────────────────────────

    /// Typed read.  Absent key or a different kind yields `default`.
    pub fn get<T: StateKind>(&self, key: &str, default: T) -> T {
        self.entry(key)
            .and_then(|e| T::from_value(e.current()))
            .unwrap_or(default)
    }

    pub fn value(&self, key: &str) -> Option<&StateValue> {
        self.entry(key).map(StateEntry::current)
    }

    pub fn previous(&self, key: &str) -> Option<&StateValue> {
        self.entry(key).and_then(StateEntry::previous)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Change tracking ───────────────────────────────────────

    pub fn has_changed(&self, key: &str) -> bool {
        self.entry(key).is_some_and(StateEntry::is_dirty)
    }

    pub fn has_any_changed(&self) -> bool {
        self.entries.iter().any(|(_, e)| e.is_dirty())
    }

    pub fn changed_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_dirty())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn mark_as_read(&mut self, key: &str) {
        if let Some(i) = self.position(key) {
            self.entries[i].1.mark_read();
        }
    }

    pub fn mark_all_as_read(&mut self) {
        for (_, e) in &mut self.entries {
            e.mark_read();
        }
    }

    // ── Output ────────────────────────────────────────────────

    /// Replace the change subscriber.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&str, &str) + 'static,
    {
        self.subscriber = Some(Box::new(callback));
    }

    pub fn unsubscribe(&mut self) {
        self.subscriber = None;
    }

    /// Emit a full snapshot, notify the subscriber of every changed key,
    /// then clear all change flags and restart the interval timer.
    pub fn output_state(&mut self) {
        let snapshot = format::render(
            self.config.policy.format,
            &self.config.device,
            self.iter_values(),
        );
        self.sink.emit(&snapshot);

        if let Some(subscriber) = self.subscriber.as_mut() {
            for (key, entry) in self.entries.iter().filter(|(_, e)| e.is_dirty()) {
                subscriber(key.as_str(), &entry.current().to_string());
            }
        }
        self.mark_all_as_read();
        self.last_output_ms = self.clock.now_ms();
    }

    /// Periodic driver for `on_interval` output. Call from the main loop.
    pub fn update(&mut self) {
        let policy = self.config.policy;
        if !policy.on_interval {
            return;
        }
        let elapsed = self.clock.now_ms().saturating_sub(self.last_output_ms);
        if elapsed >= policy.interval_ms {
            self.output_state();
        }
    }

    pub fn state_as_json(&self) -> String {
        format::render_json(&self.config.device, self.iter_values())
    }

    pub fn state_as_text(&self) -> String {
        format::render_text(&self.config.device, self.iter_values())
    }

    fn iter_values(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e.current()))
    }
}
