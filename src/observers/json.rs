//! JSON observer for serializing counter entries.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! mmsperf = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use mmsperf::block::PerfBlock;
//! use mmsperf::layout::{Category, CounterId};
//! use mmsperf::observers::json::JsonObserver;
//!
//! let block = PerfBlock::new();
//! block.add(CounterId::SeRetrysProcessed, 12).unwrap();
//!
//! let observer = JsonObserver::new();
//! let json = observer
//!     .to_json(block.category_observables(Category::SyncEngine).into_iter())
//!     .unwrap();
//!
//! assert!(json.starts_with(r#"[{"name":"MMSPERF_SE_RETRYS_PROCESSED","kind":"counter","value":12}"#));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block::PerfBlock;
use crate::counters::{CounterValue, MetricKind, Observable, ObservableEntry};
use crate::observers::Result;
use crate::snapshot::BlockSnapshot;

/// One serialized entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntrySnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub kind: MetricKind,
    pub value: CounterValue,
}

impl From<ObservableEntry> for EntrySnapshot {
    fn from(entry: ObservableEntry) -> Self {
        Self {
            name: if entry.name.is_empty() {
                "(unnamed)".to_string()
            } else {
                entry.name.to_string()
            },
            labels: entry.labels.into_iter().collect(),
            kind: entry.metric_kind,
            value: entry.value,
        }
    }
}

/// Entries wrapped with an optional timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntriesSnapshot {
    /// Milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    pub entries: Vec<EntrySnapshot>,
}

impl EntriesSnapshot {
    /// First entry named `name`.
    pub fn get(&self, name: &str) -> Option<&EntrySnapshot> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
    /// Whether to include a timestamp in the output.
    pub include_timestamp: bool,
    /// Whether to wrap entries in an [`EntriesSnapshot`] object.
    pub wrap_in_snapshot: bool,
}

/// An observer that serializes counters to JSON.
///
/// By default the output is a bare array of entries. With
/// [`wrap_in_snapshot`](Self::wrap_in_snapshot) it becomes an object with an
/// `entries` array and, if enabled, a `timestamp_ms` field.
///
/// ```rust
/// use mmsperf::block::PerfBlock;
/// use mmsperf::observers::json::JsonObserver;
///
/// let block = PerfBlock::new();
/// let json = JsonObserver::new()
///     .wrap_in_snapshot(true)
///     .include_timestamp(true)
///     .to_json(block.observables().into_iter())
///     .unwrap();
///
/// assert!(json.contains("timestamp_ms"));
/// assert!(json.contains(r#""entries":["#));
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Only has effect when `wrap_in_snapshot` is also enabled.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    pub fn wrap_in_snapshot(mut self, enabled: bool) -> Self {
        self.config.wrap_in_snapshot = enabled;
        self
    }

    /// Expands every counter into [`EntrySnapshot`]s.
    pub fn collect<'a>(
        &self,
        counters: impl Iterator<Item = &'a dyn Observable>,
    ) -> Vec<EntrySnapshot> {
        counters
            .flat_map(|c| c.expand())
            .map(EntrySnapshot::from)
            .collect()
    }

    /// Like [`collect`](Self::collect), resetting counters that support it.
    pub fn collect_and_reset<'a>(
        &self,
        counters: impl Iterator<Item = &'a dyn Observable>,
    ) -> Vec<EntrySnapshot> {
        counters
            .flat_map(|c| c.expand_and_reset())
            .map(EntrySnapshot::from)
            .collect()
    }

    pub fn to_json<'a>(&self, counters: impl Iterator<Item = &'a dyn Observable>) -> Result<String> {
        self.render(self.collect(counters))
    }

    pub fn to_json_and_reset<'a>(
        &self,
        counters: impl Iterator<Item = &'a dyn Observable>,
    ) -> Result<String> {
        self.render(self.collect_and_reset(counters))
    }

    /// Serializes a whole block as a [`BlockSnapshot`], with offsets and
    /// categories.
    pub fn block_to_json(&self, block: &PerfBlock) -> Result<String> {
        self.serialize(&BlockSnapshot::capture(block))
    }

    fn render(&self, entries: Vec<EntrySnapshot>) -> Result<String> {
        if self.config.wrap_in_snapshot {
            let snapshot = EntriesSnapshot {
                timestamp_ms: self.config.include_timestamp.then(current_timestamp_ms),
                entries,
            };
            self.serialize(&snapshot)
        } else {
            self.serialize(&entries)
        }
    }

    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = if self.config.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}

/// Returns the current timestamp in milliseconds since Unix epoch.
fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
