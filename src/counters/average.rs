//! Running sum and count with sharded atomic storage.
//!
//! The sum and the count of a shard share one padded cache line, so an
//! observation touches a single line. The timer slots build on this to
//! track elapsed time per timed operation.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::counters::{NUM_COMPONENTS, THREAD_SLOT_INDEX};

struct SumCount {
    sum: AtomicUsize,
    count: AtomicUsize,
}

impl SumCount {
    const fn new() -> Self {
        SumCount {
            sum: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
        }
    }
}

/// Sharded sum and count of observed values.
///
/// Shard updates wrap on overflow, and so do the aggregated reads.
pub(crate) struct Average {
    components: [CachePadded<SumCount>; NUM_COMPONENTS],
}

impl Average {
    pub(crate) const fn new() -> Self {
        const ZERO: CachePadded<SumCount> = CachePadded::new(SumCount::new());
        Average {
            components: [ZERO; NUM_COMPONENTS],
        }
    }

    #[inline]
    fn get_local_component(&self) -> &SumCount {
        THREAD_SLOT_INDEX.with(|idx| &*self.components[*idx])
    }

    /// Adds one observation of `value`.
    #[inline]
    pub(crate) fn observe(&self, value: usize) {
        let component = self.get_local_component();
        component.sum.fetch_add(value, Ordering::Relaxed);
        component.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Total of all observed values.
    #[inline]
    pub(crate) fn sum(&self) -> usize {
        self.components
            .iter()
            .fold(0usize, |acc, c| acc.wrapping_add(c.sum.load(Ordering::Relaxed)))
    }

    /// Number of observations.
    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.components
            .iter()
            .fold(0usize, |acc, c| acc.wrapping_add(c.count.load(Ordering::Relaxed)))
    }

    /// Truncated average, `None` without observations.
    #[inline]
    pub(crate) fn average(&self) -> Option<usize> {
        self.sum().checked_div(self.count())
    }

    /// Returns sum and count and zeroes every shard.
    pub(crate) fn sum_count_and_reset(&self) -> (usize, usize) {
        let mut total_sum = 0usize;
        let mut total_count = 0usize;
        for component in self.components.iter() {
            total_sum = total_sum.wrapping_add(component.sum.swap(0, Ordering::Relaxed));
            total_count = total_count.wrapping_add(component.count.swap(0, Ordering::Relaxed));
        }
        (total_sum, total_count)
    }
}
