//! Up/down gauge with sharded atomic storage.
//!
//! Backs `MMSPERF_CS_PRUNE_RECURSION_LEVEL`: the pruning walk increments it
//! on the way down and decrements it on the way back up, possibly from
//! different worker threads, so individual shards may go negative while the
//! aggregate stays meaningful.

use std::fmt::Debug;
use std::sync::atomic::{AtomicIsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::counters::{
    CounterValue, GetComponentCounter, MetricKind, Observable, NUM_COMPONENTS, THREAD_SLOT_INDEX,
};

/// A signed gauge using sharded atomic storage.
///
/// ```rust
/// use mmsperf::counters::signed::Signed;
/// use mmsperf::counters::{CounterValue, Observable};
///
/// let level = Signed::new().with_name("MMSPERF_CS_PRUNE_RECURSION_LEVEL");
/// level.add(1);
/// level.add(1);
/// level.sub(1);
///
/// assert_eq!(level.value(), CounterValue::Signed(1));
/// ```
pub struct Signed {
    name: &'static str,
    components: [CachePadded<AtomicIsize>; NUM_COMPONENTS],
}

impl GetComponentCounter for Signed {
    type CounterType = AtomicIsize;

    #[inline]
    fn get_component_counter(&self) -> &AtomicIsize {
        THREAD_SLOT_INDEX.with(|idx| &self.components[*idx])
    }
}

impl Signed {
    /// Creates a new gauge at zero.
    pub const fn new() -> Self {
        const ZERO: CachePadded<AtomicIsize> = CachePadded::new(AtomicIsize::new(0));
        Signed {
            name: "",
            components: [ZERO; NUM_COMPONENTS],
        }
    }

    /// Sets the name of this gauge, returning `self` for method chaining.
    pub const fn with_name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Adds `value` (may be negative).
    #[inline]
    pub fn add(&self, value: isize) {
        self.get_component_counter()
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Subtracts `value`.
    #[inline]
    pub fn sub(&self, value: isize) {
        self.get_component_counter()
            .fetch_sub(value, Ordering::Relaxed);
    }

    /// Sums all shards, wrapping on overflow.
    #[inline]
    pub fn total(&self) -> i64 {
        self.components
            .iter()
            .fold(0i64, |acc, shard| {
                acc.wrapping_add(shard.load(Ordering::Relaxed) as i64)
            })
    }

    pub(crate) fn clear(&self) {
        for shard in self.components.iter() {
            shard.store(0, Ordering::Relaxed);
        }
    }
}

impl Observable for Signed {
    #[inline]
    fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    fn value(&self) -> CounterValue {
        CounterValue::Signed(self.total())
    }

    /// A level is current state, not an accumulation: collecting it does
    /// not reset it.
    #[inline]
    fn value_and_reset(&self) -> CounterValue {
        self.value()
    }

    #[inline]
    fn metric_kind(&self) -> MetricKind {
        MetricKind::Gauge
    }
}

impl Default for Signed {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Signed {
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
    fn test_add_sub() {
        let gauge = Signed::new();
        gauge.add(5);
        gauge.sub(7);
        assert_eq!(gauge.value(), CounterValue::Signed(-2));
    }

    #[test]
    fn test_value_and_reset_keeps_level() {
        let gauge = Signed::new();
        gauge.add(3);
        assert_eq!(gauge.value_and_reset(), CounterValue::Signed(3));
        assert_eq!(gauge.value(), CounterValue::Signed(3));
    }

    #[test]
    fn test_clear() {
        let gauge = Signed::new();
        gauge.add(3);
        gauge.clear();
        assert_eq!(gauge.total(), 0);
    }

    #[test]
    fn test_balanced_across_threads() {
        let gauge = Arc::new(Signed::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let g = Arc::clone(&gauge);
                thread::spawn(move || {
                    for _ in 0..100 {
                        g.add(1);
                    }
                    for _ in 0..100 {
                        g.sub(1);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(gauge.value(), CounterValue::Signed(0));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_total_wraps_across_shards() {
        let gauge = Arc::new(Signed::new());
        gauge.add(isize::MAX);
        let other = Arc::clone(&gauge);
        thread::spawn(move || other.add(1)).join().unwrap();
        assert_eq!(gauge.total(), i64::MIN);
    }

    #[test]
    fn test_with_name() {
        let gauge = Signed::new().with_name("level");
        assert_eq!(gauge.name(), "level");
        assert_eq!(gauge.metric_kind(), MetricKind::Gauge);
    }
}
