//! Cumulative counter for the raw count slots of the layout
//! (`MMSPERF_CS_FIX_BACKLINKS_OBJECTS`, `MMSPERF_MA_OBJECTS_IMPORTED`, ...).
//!
//! Exported as [`MetricKind::Counter`]: it only ever grows.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::counters::{
    CounterValue, GetComponentCounter, MetricKind, Observable, NUM_COMPONENTS, THREAD_SLOT_INDEX,
};

/// An add-only counter with sharded atomic storage.
///
/// # Examples
///
/// ```rust
/// use mmsperf::counters::monotone::Monotone;
/// use mmsperf::counters::{CounterValue, Observable};
/// use std::sync::Arc;
/// use std::thread;
///
/// let imported = Arc::new(Monotone::new().with_name("MMSPERF_MA_OBJECTS_IMPORTED"));
/// let workers: Vec<_> = (0..4)
///     .map(|_| {
///         let c = Arc::clone(&imported);
///         thread::spawn(move || {
///             for _ in 0..250 {
///                 c.add(1);
///             }
///         })
///     })
///     .collect();
/// for w in workers {
///     w.join().unwrap();
/// }
///
/// assert_eq!(imported.value(), CounterValue::Unsigned(1000));
/// ```
pub struct Monotone {
    name: &'static str,
    components: [CachePadded<AtomicUsize>; NUM_COMPONENTS],
}

impl GetComponentCounter for Monotone {
    type CounterType = AtomicUsize;

    #[inline]
    fn get_component_counter(&self) -> &AtomicUsize {
        THREAD_SLOT_INDEX.with(|idx| &self.components[*idx])
    }
}

impl Monotone {
    /// Creates a new counter initialized to zero.
    pub const fn new() -> Self {
        const ZERO: CachePadded<AtomicUsize> = CachePadded::new(AtomicUsize::new(0));
        Monotone {
            name: "",
            components: [ZERO; NUM_COMPONENTS],
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

    /// Returns this thread's contribution to the total.
    #[inline]
    pub fn local_value(&self) -> usize {
        self.get_component_counter().load(Ordering::Relaxed)
    }

    /// Sums all shards, wrapping on overflow.
    #[inline]
    pub fn total(&self) -> u64 {
        self.components
            .iter()
            .fold(0u64, |acc, shard| {
                acc.wrapping_add(shard.load(Ordering::Relaxed) as u64)
            })
    }

    /// Zeroes every shard. Only meant for starting a new run.
    pub(crate) fn clear(&self) {
        for shard in self.components.iter() {
            shard.store(0, Ordering::Relaxed);
        }
    }
}

impl Observable for Monotone {
    #[inline]
    fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    fn value(&self) -> CounterValue {
        CounterValue::Unsigned(self.total())
    }

    /// Cumulative counters are never reset by a collection.
    #[inline]
    fn value_and_reset(&self) -> CounterValue {
        self.value()
    }

    #[inline]
    fn metric_kind(&self) -> MetricKind {
        MetricKind::Counter
    }
}

impl Default for Monotone {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Monotone {
    /// Output format: `name{ [slot]:value ... }`, non-zero shards only.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, shard) in self.components.iter().enumerate() {
            let val = shard.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new() {
        let counter = Monotone::new();
        assert_eq!(counter.value(), CounterValue::Unsigned(0));
        assert_eq!(counter.name(), "");
    }

    #[test]
    fn test_add() {
        let counter = Monotone::new();
        counter.add(1);
        counter.add(4);
        assert_eq!(counter.value(), CounterValue::Unsigned(5));
        assert_eq!(counter.local_value(), 5);
    }

    #[test]
    fn test_value_and_reset_keeps_total() {
        let counter = Monotone::new();
        counter.add(3);
        assert_eq!(counter.value_and_reset(), CounterValue::Unsigned(3));
        assert_eq!(counter.value(), CounterValue::Unsigned(3));
    }

    #[test]
    fn test_clear() {
        let counter = Monotone::new();
        counter.add(3);
        counter.clear();
        assert_eq!(counter.total(), 0);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_total_wraps_across_shards() {
        let counter = Arc::new(Monotone::new());
        counter.add(usize::MAX);
        let other = Arc::clone(&counter);
        thread::spawn(move || other.add(1)).join().unwrap();
        assert_eq!(counter.total(), 0);
    }

    #[test]
    fn test_metric_kind() {
        assert_eq!(Monotone::new().metric_kind(), MetricKind::Counter);
    }

    #[test]
    fn test_dyn_format() {
        let counter = Monotone::new().with_name("MMSPERF_CS_OBJECTS_PRUNED");
        counter.add(1);
        let formatted = format!("{}", &counter as &dyn Observable);
        assert_eq!(formatted, "MMSPERF_CS_OBJECTS_PRUNED:1");
    }

    #[test]
    fn test_debug_shows_shards() {
        let counter = Monotone::new().with_name("pruned");
        counter.add(2);
        let debug_str = format!("{:?}", counter);
        assert!(debug_str.starts_with("pruned{"));
        assert!(debug_str.contains(":2"));
    }

    #[test]
    fn test_multiple_threads() {
        let counter = Arc::new(Monotone::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..100 {
                        c.add(1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.value(), CounterValue::Unsigned(400));
    }
}
