//! Per-second rate counter for the `..._RATE` slots.
//!
//! A rate slot sits two offsets after the raw counter it derives from. The
//! block feeds both with the same increments; the rate slot reports how much
//! its total grew per second since the baseline.
//!
//! ```text
//! rate = (current_total - last_total) / elapsed_seconds
//! ```
//!
//! The first read establishes the baseline and returns `0.0`. Plain reads
//! leave the baseline where it is; only [`Rate::rate_and_reset`] moves it.

use atomic_time::AtomicOptionInstant;
use crossbeam_utils::CachePadded;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use crate::counters::{
    CounterValue, GetComponentCounter, MetricKind, Observable, NUM_COMPONENTS, THREAD_SLOT_INDEX,
};

/// Sharded counter that reports its growth per second.
///
/// Can be built in a `const` context:
///
/// ```rust
/// use mmsperf::counters::rate::Rate;
///
/// static RETRIES_RATE: Rate = Rate::new().with_name("MMSPERF_SE_RETRYS_PROCESSED_RATE");
/// RETRIES_RATE.add(1);
/// assert!(RETRIES_RATE.total_value() >= 1);
/// ```
pub struct Rate {
    name: &'static str,
    components: [CachePadded<AtomicUsize>; NUM_COMPONENTS],
    last_value: AtomicU64,
    /// `None` until the first read.
    last_instant: AtomicOptionInstant,
}

impl GetComponentCounter for Rate {
    type CounterType = AtomicUsize;

    #[inline]
    fn get_component_counter(&self) -> &AtomicUsize {
        THREAD_SLOT_INDEX.with(|idx| &self.components[*idx])
    }
}

impl Rate {
    /// Creates a new rate counter with no baseline.
    pub const fn new() -> Self {
        const ZERO: CachePadded<AtomicUsize> = CachePadded::new(AtomicUsize::new(0));
        Rate {
            name: "",
            components: [ZERO; NUM_COMPONENTS],
            last_value: AtomicU64::new(0),
            last_instant: AtomicOptionInstant::none(),
        }
    }

    /// Sets the name of this counter, returning `self` for method chaining.
    pub const fn with_name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Adds `value` to the current thread's shard.
    #[inline]
    pub fn add(&self, value: usize) {
        self.get_component_counter()
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Sums all shards. This is the absolute count, not the rate.
    #[inline]
    pub fn total_value(&self) -> usize {
        self.components
            .iter()
            .fold(0usize, |acc, shard| {
                acc.wrapping_add(shard.load(Ordering::Relaxed))
            })
    }

    /// Returns units per second since the baseline without moving it.
    ///
    /// ```rust
    /// use mmsperf::counters::rate::Rate;
    /// use std::thread;
    /// use std::time::Duration;
    ///
    /// let counter = Rate::new();
    /// assert_eq!(counter.rate(), 0.0);
    ///
    /// counter.add(1000);
    /// thread::sleep(Duration::from_millis(50));
    /// assert!(counter.rate() > 0.0);
    /// ```
    pub fn rate(&self) -> f64 {
        self.compute(false)
    }

    /// Returns units per second since the baseline and moves the baseline
    /// to now.
    pub fn rate_and_reset(&self) -> f64 {
        self.compute(true)
    }

    fn compute(&self, advance: bool) -> f64 {
        let now = Instant::now();
        let current_value = self.total_value() as u64;

        let Some(last_time) = self.last_instant.load(Ordering::Relaxed) else {
            self.last_value.store(current_value, Ordering::Relaxed);
            self.last_instant.store(Some(now), Ordering::Relaxed);
            return 0.0;
        };

        let elapsed_secs = now.duration_since(last_time).as_secs_f64();
        let last_val = if advance {
            let last_val = self.last_value.swap(current_value, Ordering::Relaxed);
            self.last_instant.store(Some(now), Ordering::Relaxed);
            last_val
        } else {
            self.last_value.load(Ordering::Relaxed)
        };

        if elapsed_secs > 0.0 {
            current_value.saturating_sub(last_val) as f64 / elapsed_secs
        } else {
            0.0
        }
    }

    /// Zeroes every shard and forgets the baseline.
    pub(crate) fn clear(&self) {
        for shard in self.components.iter() {
            shard.store(0, Ordering::Relaxed);
        }
        self.last_value.store(0, Ordering::Relaxed);
        self.last_instant.store(None, Ordering::Relaxed);
    }
}

impl Observable for Rate {
    #[inline]
    fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    fn value(&self) -> CounterValue {
        CounterValue::Float(self.rate())
    }

    /// Moves the rate baseline.
    #[inline]
    fn value_and_reset(&self) -> CounterValue {
        CounterValue::Float(self.rate_and_reset())
    }

    #[inline]
    fn metric_kind(&self) -> MetricKind {
        MetricKind::Gauge
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, shard) in self.components.iter().enumerate() {
            let val = shard.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(
            f,
            " | last_value:{} }}",
            self.last_value.load(Ordering::Relaxed)
        )
    }
}
