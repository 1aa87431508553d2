//! Elapsed-time accumulator for the `..._TIMER` slots.
//!
//! Durations are stored as whole microseconds in a sharded sum and count,
//! so a timer knows both how long a stage took in total and how many times
//! it ran. The reported unit is
//! chosen with [`TimerUnit`].

use std::fmt::Debug;
use std::time::Duration;

use crate::config::TimerUnit;
use crate::counters::average::Average;
use crate::counters::{CounterValue, MetricKind, Observable, ObservableEntry};

/// Label key distinguishing the entries a timer expands to.
pub const STAT_LABEL: &str = "stat";

/// Sharded total/count of elapsed time.
///
/// `value()` is the mean duration. `expand()` yields three entries labelled
/// `stat=avg`, `stat=total` and `stat=count`.
///
/// ```rust
/// use mmsperf::counters::timer::Timer;
/// use mmsperf::counters::{CounterValue, Observable};
/// use std::time::Duration;
///
/// let stage = Timer::new().with_name("MMSPERF_HS_STAGE_TIMER");
/// stage.record(Duration::from_micros(100));
/// stage.record(Duration::from_micros(300));
///
/// assert_eq!(stage.count(), 2);
/// assert_eq!(stage.value(), CounterValue::Unsigned(200));
/// ```
pub struct Timer {
    name: &'static str,
    unit: TimerUnit,
    micros: Average,
}

impl Timer {
    /// Creates an empty timer reporting microseconds.
    pub const fn new() -> Self {
        Timer {
            name: "",
            unit: TimerUnit::Micros,
            micros: Average::new(),
        }
    }

    /// Sets the name of this timer, returning `self` for method chaining.
    pub const fn with_name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Sets the unit values are reported in.
    pub const fn with_unit(self, unit: TimerUnit) -> Self {
        Self { unit, ..self }
    }

    /// Returns the unit values are reported in.
    pub fn unit(&self) -> TimerUnit {
        self.unit
    }

    /// Records one timed run. Sub-microsecond remainders are dropped.
    #[inline]
    pub fn record(&self, elapsed: Duration) {
        let micros = elapsed.as_micros().min(usize::MAX as u128) as usize;
        self.micros.observe(micros);
    }

    /// Number of recorded runs.
    pub fn count(&self) -> u64 {
        self.micros.count() as u64
    }

    /// Total recorded time.
    pub fn total(&self) -> Duration {
        Duration::from_micros(self.micros.sum() as u64)
    }

    /// Mean recorded time, `None` before the first run.
    pub fn mean(&self) -> Option<Duration> {
        self.micros
            .average()
            .map(|us| Duration::from_micros(us as u64))
    }

    pub(crate) fn clear(&self) {
        let _ = self.micros.sum_count_and_reset();
    }

    fn entries(&self, sum_us: u64, count: u64) -> Vec<ObservableEntry> {
        let avg_us = sum_us.checked_div(count).unwrap_or(0);
        [
            ("avg", self.unit.scale(avg_us)),
            ("total", self.unit.scale(sum_us)),
            ("count", count),
        ]
        .into_iter()
        .map(|(stat, value)| ObservableEntry {
            name: self.name,
            labels: vec![(STAT_LABEL.to_string(), stat.to_string())],
            value: CounterValue::Unsigned(value),
            metric_kind: MetricKind::Gauge,
        })
        .collect()
    }
}

impl Observable for Timer {
    #[inline]
    fn name(&self) -> &'static str {
        self.name
    }

    /// Mean duration in the configured unit, `0` before the first run.
    fn value(&self) -> CounterValue {
        let avg_us = self.micros.average().unwrap_or(0) as u64;
        CounterValue::Unsigned(self.unit.scale(avg_us))
    }

    fn value_and_reset(&self) -> CounterValue {
        let (sum, count) = self.micros.sum_count_and_reset();
        let avg_us = sum.checked_div(count).unwrap_or(0) as u64;
        CounterValue::Unsigned(self.unit.scale(avg_us))
    }

    fn metric_kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn expand(&self) -> Vec<ObservableEntry> {
        self.entries(self.micros.sum() as u64, self.micros.count() as u64)
    }

    fn expand_and_reset(&self) -> Vec<ObservableEntry> {
        let (sum, count) = self.micros.sum_count_and_reset();
        self.entries(sum as u64, count as u64)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{{ total_us={} count={} }}",
            self.name,
            self.micros.sum(),
            self.micros.count()
        )
    }
}
