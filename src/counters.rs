//! Sharded live counters backing the performance-counter block.
//!
//! Every non-base slot of the layout owns one of the counter types defined
//! here. They share the same storage strategy: a fixed array of
//! cache-line-padded atomics ("shards"), one of which is picked per thread,
//! so that concurrent updates from the synchronization workers land on
//! different cache lines. Reads aggregate every shard.
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │         Counter Structure           │
//!                          ├─────────────────────────────────────┤
//!   Thread 0 ──writes──►   │ [Slot 0] ████████ (CachePadded)     │
//!   Thread 1 ──writes──►   │ [Slot 1] ████████ (CachePadded)     │
//!        ...               │    ...                              │
//!   Thread 63 ─writes──►   │ [Slot 63] ███████ (CachePadded)     │
//!                          └─────────────────────────────────────┘
//!                                          │
//!                                          ▼
//!                                   value() aggregates
//!                                   all slots on read
//! ```
//!
//! # Thread Slot Assignment
//!
//! Slots are assigned round-robin: the first thread that touches any counter
//! gets slot 0, the second slot 1, and so on, wrapping after
//! [`NUM_COMPONENTS`] threads. The assignment is stable for the lifetime of
//! the thread.

pub(crate) mod average;
pub mod monotone;
pub mod rate;
pub mod signed;
pub mod timer;

use atomic_traits::Atomic;
use std::{
    fmt::Debug,
    fmt::Display,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Number of shards used by each counter.
///
/// Each shard is cache-line padded, so a counter costs roughly
/// `64 slots × 64 bytes = 4KB`.
pub(crate) const NUM_COMPONENTS: usize = 64;

static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Shard index assigned to the current thread, lazily on first use.
    pub(crate) static THREAD_SLOT_INDEX: usize = get_next_slot_id();
}

/// Assigns the next shard index, in the range `[0, NUM_COMPONENTS)`.
pub fn get_next_slot_id() -> usize {
    NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed) % NUM_COMPONENTS
}

/// The value read from a counter.
///
/// # Examples
///
/// ```rust
/// use mmsperf::counters::CounterValue;
///
/// assert!(CounterValue::Unsigned(0).is_zero());
/// assert!(!CounterValue::Signed(-1).is_zero());
/// assert_eq!(CounterValue::Float(2.5).as_f64(), 2.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum CounterValue {
    /// An unsigned 64-bit counter value.
    Unsigned(u64),
    /// A signed 64-bit counter value.
    Signed(i64),
    /// A floating point value, used by rates.
    Float(f64),
}

impl Display for CounterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterValue::Unsigned(v) => write!(f, "{}", v),
            CounterValue::Signed(v) => write!(f, "{}", v),
            CounterValue::Float(v) => write!(f, "{:.2}", v),
        }
    }
}

impl CounterValue {
    /// Returns `true` if the counter value is zero.
    pub fn is_zero(&self) -> bool {
        match self {
            CounterValue::Unsigned(v) => *v == 0,
            CounterValue::Signed(v) => *v == 0,
            CounterValue::Float(v) => *v == 0.0,
        }
    }

    /// Returns the value as a `u64`. Negative values clamp to zero.
    pub fn as_u64(&self) -> u64 {
        match self {
            CounterValue::Unsigned(v) => *v,
            CounterValue::Signed(v) => (*v).max(0) as u64,
            CounterValue::Float(v) => v.max(0.0) as u64,
        }
    }

    /// Returns the value as an `i64`.
    pub fn as_i64(&self) -> i64 {
        match self {
            CounterValue::Unsigned(v) => *v as i64,
            CounterValue::Signed(v) => *v,
            CounterValue::Float(v) => *v as i64,
        }
    }

    /// Returns the value as an `f64`.
    pub fn as_f64(&self) -> f64 {
        match self {
            CounterValue::Unsigned(v) => *v as f64,
            CounterValue::Signed(v) => *v as f64,
            CounterValue::Float(v) => *v,
        }
    }
}

/// How an exporter should present a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetricKind {
    /// Cumulative, never decreases.
    Counter,
    /// May go up and down.
    #[default]
    Gauge,
}

/// One exported value of an observable.
///
/// Most counters expand to a single entry. A [`Timer`](timer::Timer)
/// expands to several entries distinguished by a `stat` label.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservableEntry {
    /// Name of the counter.
    pub name: &'static str,
    /// Labels attached to this entry, in insertion order.
    pub labels: Vec<(String, String)>,
    /// The value of this entry.
    pub value: CounterValue,
    /// How the value should be exported.
    pub metric_kind: MetricKind,
}

impl ObservableEntry {
    /// Returns the labels formatted as `k=v,k=v`.
    pub fn labels_string(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Common read interface of every counter type.
///
/// # Examples
///
/// ```rust
/// use mmsperf::counters::monotone::Monotone;
/// use mmsperf::counters::{CounterValue, Observable};
///
/// let counter = Monotone::new().with_name("MMSPERF_MA_OBJECTS_IMPORTED");
/// counter.add(5);
///
/// assert_eq!(counter.name(), "MMSPERF_MA_OBJECTS_IMPORTED");
/// assert_eq!(counter.value(), CounterValue::Unsigned(5));
/// ```
pub trait Observable: Debug {
    /// Returns the name of this counter, or an empty string.
    fn name(&self) -> &'static str;

    /// Returns the current aggregated value of the counter.
    fn value(&self) -> CounterValue;

    /// Returns the current value and resets the counter, where the counter
    /// supports it. Cumulative counters return their value unchanged.
    ///
    /// Each shard is reset atomically, the aggregate is not: concurrent
    /// updates may land in either collection period.
    fn value_and_reset(&self) -> CounterValue;

    /// Returns how this counter should be exported.
    fn metric_kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    /// Returns the labels attached to this counter.
    fn labels(&self) -> &[(String, String)] {
        &[]
    }

    /// Expands this counter into exportable entries.
    fn expand(&self) -> Vec<ObservableEntry> {
        vec![ObservableEntry {
            name: self.name(),
            labels: self.labels().to_vec(),
            value: self.value(),
            metric_kind: self.metric_kind(),
        }]
    }

    /// Like [`expand`](Observable::expand), reading each value with
    /// [`value_and_reset`](Observable::value_and_reset).
    fn expand_and_reset(&self) -> Vec<ObservableEntry> {
        vec![ObservableEntry {
            name: self.name(),
            labels: self.labels().to_vec(),
            value: self.value_and_reset(),
            metric_kind: self.metric_kind(),
        }]
    }
}

impl Display for dyn Observable + '_ {
    /// Formats the counter as `name:value` if named, or just `value` otherwise.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.name().is_empty() {
            write!(f, "{}:{}", self.name(), self.value())
        } else {
            write!(f, "{}", self.value())
        }
    }
}

/// Access to the current thread's shard of a sharded counter.
pub trait GetComponentCounter {
    /// The atomic type used for individual shards.
    type CounterType: Atomic;

    /// Returns a reference to the current thread's shard.
    fn get_component_counter(&self) -> &Self::CounterType;
}
