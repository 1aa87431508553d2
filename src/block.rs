//! The live counter-data block addressed by the layout offsets.
//!
//! A [`PerfBlock`] owns one sharded counter per non-base slot of the
//! layout, stored at index `offset / 2`. The kind of the slot decides the
//! storage and the operations it accepts:
//!
//! | Kind | Storage | Operations |
//! |---|---|---|
//! | counter | [`Monotone`] | [`add`](PerfBlock::add), [`increment`](PerfBlock::increment) |
//! | rate | [`Rate`] | fed by the counter two offsets before it |
//! | gauge | [`Signed`] | [`adjust`](PerfBlock::adjust), [`enter`](PerfBlock::enter) |
//! | timer | [`Timer`] | [`record`](PerfBlock::record), [`start_timer`](PerfBlock::start_timer), [`time`](PerfBlock::time) |
//!
//! Calling an operation on a slot of another kind returns
//! [`PerfError::WrongKind`]. Slots of categories disabled in the
//! [`PerfConfig`] have no storage: updates to them are accepted and dropped.
//!
//! # Example
//!
//! ```rust
//! use mmsperf::block::PerfBlock;
//! use mmsperf::counters::CounterValue;
//! use mmsperf::layout::CounterId;
//!
//! let block = PerfBlock::new();
//! block.add(CounterId::MaObjectsImported, 10).unwrap();
//!
//! {
//!     let _stage = block.start_timer(CounterId::HsStageTimer).unwrap();
//!     // stage the object
//! }
//!
//! assert_eq!(
//!     block.value(CounterId::MaObjectsImported),
//!     Some(CounterValue::Unsigned(10))
//! );
//! assert!(block.add(CounterId::HsStageTimer, 1).is_err());
//! ```

use std::fmt::{self, Debug};
use std::time::{Duration, Instant};

use crate::adapters::Labeled;
use crate::config::{PerfConfig, TimerUnit};
use crate::counters::monotone::Monotone;
use crate::counters::rate::Rate;
use crate::counters::signed::Signed;
use crate::counters::timer::Timer;
use crate::counters::{CounterValue, MetricKind, Observable, ObservableEntry};
use crate::error::{PerfError, Result};
use crate::layout::{Category, CounterId, CounterSlot, SlotKind, SLOTS};

/// Label key carrying the instance name.
pub const INSTANCE_LABEL: &str = "instance";

/// Storage of one live slot.
pub enum SlotCounter {
    Counter(Monotone),
    Rate(Rate),
    Gauge(Signed),
    Timer(Timer),
}

impl SlotCounter {
    /// Storage for `slot`, `None` for base slots.
    fn for_slot(slot: &CounterSlot, unit: TimerUnit) -> Option<Self> {
        let counter = match slot.kind {
            SlotKind::ObjectBase => return None,
            SlotKind::Counter => SlotCounter::Counter(Monotone::new().with_name(slot.name)),
            SlotKind::Rate => SlotCounter::Rate(Rate::new().with_name(slot.name)),
            SlotKind::Gauge => SlotCounter::Gauge(Signed::new().with_name(slot.name)),
            SlotKind::Timer => {
                SlotCounter::Timer(Timer::new().with_name(slot.name).with_unit(unit))
            }
        };
        Some(counter)
    }

    pub fn kind(&self) -> SlotKind {
        match self {
            SlotCounter::Counter(_) => SlotKind::Counter,
            SlotCounter::Rate(_) => SlotKind::Rate,
            SlotCounter::Gauge(_) => SlotKind::Gauge,
            SlotCounter::Timer(_) => SlotKind::Timer,
        }
    }

    fn as_observable(&self) -> &dyn Observable {
        match self {
            SlotCounter::Counter(c) => c,
            SlotCounter::Rate(c) => c,
            SlotCounter::Gauge(c) => c,
            SlotCounter::Timer(c) => c,
        }
    }

    fn clear(&self) {
        match self {
            SlotCounter::Counter(c) => c.clear(),
            SlotCounter::Rate(c) => c.clear(),
            SlotCounter::Gauge(c) => c.clear(),
            SlotCounter::Timer(c) => c.clear(),
        }
    }
}

impl Observable for SlotCounter {
    fn name(&self) -> &'static str {
        self.as_observable().name()
    }

    fn value(&self) -> CounterValue {
        self.as_observable().value()
    }

    fn value_and_reset(&self) -> CounterValue {
        self.as_observable().value_and_reset()
    }

    fn metric_kind(&self) -> MetricKind {
        self.as_observable().metric_kind()
    }

    fn expand(&self) -> Vec<ObservableEntry> {
        self.as_observable().expand()
    }

    fn expand_and_reset(&self) -> Vec<ObservableEntry> {
        self.as_observable().expand_and_reset()
    }
}

impl Debug for SlotCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self.as_observable(), f)
    }
}

/// One live counter per named slot, indexed by offset.
pub struct PerfBlock {
    config: PerfConfig,
    slots: Vec<Option<Labeled<SlotCounter>>>,
}

impl PerfBlock {
    /// A block with every category enabled.
    pub fn new() -> Self {
        Self::with_config(PerfConfig::default())
    }

    pub fn with_config(config: PerfConfig) -> Self {
        let slots: Vec<_> = SLOTS
            .iter()
            .map(|slot| {
                if !config.is_enabled(slot.category) {
                    return None;
                }
                let counter = SlotCounter::for_slot(slot, config.timer_unit)?;
                let mut labeled = Labeled::new(counter);
                if let Some(instance) = &config.instance {
                    labeled.add_label(INSTANCE_LABEL, instance.as_str());
                }
                Some(labeled)
            })
            .collect();

        tracing::debug!(
            instance = ?config.instance,
            live_slots = slots.iter().filter(|s| s.is_some()).count(),
            "created perf block"
        );
        Self { config, slots }
    }

    pub fn config(&self) -> &PerfConfig {
        &self.config
    }

    /// The instance name, if the block has one.
    pub fn instance(&self) -> Option<&str> {
        self.config.instance.as_deref()
    }

    /// The live storage of `id`; `None` for base slots and disabled categories.
    pub fn slot(&self, id: CounterId) -> Option<&Labeled<SlotCounter>> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn check_kind(id: CounterId, expected: SlotKind) -> Result<()> {
        if id.kind() == expected {
            Ok(())
        } else {
            Err(PerfError::WrongKind {
                counter: id.name(),
                expected,
                actual: id.kind(),
            })
        }
    }

    /// Adds `n` to a counter slot and to the rate slot paired with it.
    pub fn add(&self, id: CounterId, n: u64) -> Result<()> {
        Self::check_kind(id, SlotKind::Counter)?;
        let n = usize::try_from(n).unwrap_or(usize::MAX);
        if let Some(SlotCounter::Counter(counter)) = self.slot(id).map(Labeled::inner) {
            counter.add(n);
        }
        let paired = id.rate().and_then(|rate| self.slot(rate));
        if let Some(SlotCounter::Rate(rate)) = paired.map(Labeled::inner) {
            rate.add(n);
        }
        Ok(())
    }

    /// Adds one to a counter slot.
    #[inline]
    pub fn increment(&self, id: CounterId) -> Result<()> {
        self.add(id, 1)
    }

    /// Moves a gauge slot by `delta`.
    pub fn adjust(&self, id: CounterId, delta: i64) -> Result<()> {
        Self::check_kind(id, SlotKind::Gauge)?;
        if let Some(level) = self.gauge(id) {
            level.add(delta.clamp(isize::MIN as i64, isize::MAX as i64) as isize);
        }
        Ok(())
    }

    /// Raises a gauge slot by one until the guard is dropped.
    ///
    /// ```rust
    /// use mmsperf::block::PerfBlock;
    /// use mmsperf::counters::CounterValue;
    /// use mmsperf::layout::CounterId;
    ///
    /// let block = PerfBlock::new();
    /// let level = CounterId::CsPruneRecursionLevel;
    /// {
    ///     let _outer = block.enter(level).unwrap();
    ///     let _inner = block.enter(level).unwrap();
    ///     assert_eq!(block.value(level), Some(CounterValue::Signed(2)));
    /// }
    /// assert_eq!(block.value(level), Some(CounterValue::Signed(0)));
    /// ```
    pub fn enter(&self, id: CounterId) -> Result<LevelGuard<'_>> {
        Self::check_kind(id, SlotKind::Gauge)?;
        let level = self.gauge(id);
        if let Some(level) = level {
            level.add(1);
        }
        Ok(LevelGuard { level })
    }

    fn gauge(&self, id: CounterId) -> Option<&Signed> {
        match self.slot(id).map(Labeled::inner) {
            Some(SlotCounter::Gauge(level)) => Some(level),
            _ => None,
        }
    }

    fn timer(&self, id: CounterId) -> Result<Option<&Timer>> {
        Self::check_kind(id, SlotKind::Timer)?;
        match self.slot(id).map(Labeled::inner) {
            Some(SlotCounter::Timer(timer)) => Ok(Some(timer)),
            _ => Ok(None),
        }
    }

    /// Records one run of a timed operation.
    pub fn record(&self, id: CounterId, elapsed: Duration) -> Result<()> {
        if let Some(timer) = self.timer(id)? {
            timer.record(elapsed);
        }
        Ok(())
    }

    /// Starts timing an operation; the time is recorded when the guard drops.
    pub fn start_timer(&self, id: CounterId) -> Result<TimerGuard<'_>> {
        Ok(TimerGuard {
            timer: self.timer(id)?,
            start: Instant::now(),
        })
    }

    /// Runs `f` and records how long it took.
    ///
    /// ```rust
    /// use mmsperf::block::PerfBlock;
    /// use mmsperf::layout::CounterId;
    ///
    /// let block = PerfBlock::new();
    /// let linked = block.time(CounterId::HsLinkMvTimer, || 2 + 2).unwrap();
    /// assert_eq!(linked, 4);
    /// ```
    pub fn time<R>(&self, id: CounterId, f: impl FnOnce() -> R) -> Result<R> {
        let _guard = self.start_timer(id)?;
        Ok(f())
    }

    /// Current value of `id`; `None` for base slots and disabled categories.
    ///
    /// The first read of a rate slot sets its baseline; later reads leave it.
    pub fn value(&self, id: CounterId) -> Option<CounterValue> {
        self.slot(id).map(Observable::value)
    }

    /// Like [`value`](Self::value), addressed by raw offset.
    pub fn value_at(&self, offset: u16) -> Result<Option<CounterValue>> {
        let id = CounterId::try_from(offset)?;
        Ok(self.value(id))
    }

    /// Every live slot in offset order.
    pub fn observables(&self) -> Vec<&dyn Observable> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| slot as &dyn Observable)
            .collect()
    }

    /// The live slots of one category in offset order.
    pub fn category_observables(&self, category: Category) -> Vec<&dyn Observable> {
        category
            .counters()
            .filter_map(|id| self.slot(id))
            .map(|slot| slot as &dyn Observable)
            .collect()
    }

    /// Expands every live slot into exportable entries.
    pub fn entries(&self) -> Vec<ObservableEntry> {
        self.slots.iter().flatten().flat_map(Observable::expand).collect()
    }

    /// Like [`entries`](Self::entries), resetting timers and moving rate
    /// baselines as they are read.
    pub fn entries_and_reset(&self) -> Vec<ObservableEntry> {
        self.slots
            .iter()
            .flatten()
            .flat_map(Observable::expand_and_reset)
            .collect()
    }

    /// Zeroes every slot, including counters and gauges.
    pub fn reset(&self) {
        for slot in self.slots.iter().flatten() {
            slot.inner().clear();
        }
        tracing::debug!(instance = ?self.config.instance, "reset perf block");
    }
}

impl Default for PerfBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for PerfBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerfBlock")
            .field("config", &self.config)
            .field("live_slots", &self.slots.iter().flatten().count())
            .finish()
    }
}

/// Records the time since [`PerfBlock::start_timer`] when dropped.
#[must_use = "the time is recorded when the guard is dropped"]
pub struct TimerGuard<'a> {
    timer: Option<&'a Timer>,
    start: Instant,
}

impl TimerGuard<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Records now and returns the elapsed time.
    pub fn stop(mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if let Some(timer) = self.timer.take() {
            timer.record(elapsed);
        }
        elapsed
    }

    /// Drops the guard without recording.
    pub fn cancel(mut self) {
        self.timer = None;
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.record(self.start.elapsed());
        }
    }
}

/// Lowers the gauge raised by [`PerfBlock::enter`] when dropped.
#[must_use = "the level drops back when the guard is dropped"]
pub struct LevelGuard<'a> {
    level: Option<&'a Signed>,
}

impl Drop for LevelGuard<'_> {
    fn drop(&mut self) {
        if let Some(level) = self.level.take() {
            level.sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::timer::STAT_LABEL;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_every_non_base_slot_is_live() {
        let block = PerfBlock::new();
        for id in CounterId::ALL {
            assert_eq!(
                block.slot(*id).is_some(),
                id.kind() != SlotKind::ObjectBase,
                "{id}"
            );
        }
        assert_eq!(block.observables().len(), 52);
    }

    #[test]
    fn test_observables_in_offset_order() {
        let block = PerfBlock::new();
        let names: Vec<_> = block.observables().iter().map(|o| o.name()).collect();
        let expected: Vec<_> = SLOTS
            .iter()
            .filter(|s| s.kind != SlotKind::ObjectBase)
            .map(|s| s.name)
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_add_feeds_rate() {
        let block = PerfBlock::new();
        block.add(CounterId::CsObjectsPruned, 7).unwrap();
        block.increment(CounterId::CsObjectsPruned).unwrap();

        assert_eq!(
            block.value(CounterId::CsObjectsPruned),
            Some(CounterValue::Unsigned(8))
        );
        match block.slot(CounterId::CsObjectsPrunedRate).map(Labeled::inner) {
            Some(SlotCounter::Rate(rate)) => assert_eq!(rate.total_value(), 8),
            other => panic!("unexpected slot {other:?}"),
        }
    }

    fn rate_entry(entries: &[ObservableEntry], name: &str) -> f64 {
        match entries.iter().find(|e| e.name == name).map(|e| &e.value) {
            Some(CounterValue::Float(rate)) => *rate,
            other => panic!("no rate entry for {name}: {other:?}"),
        }
    }

    #[test]
    fn test_repeated_collection_sees_same_rate() {
        let block = PerfBlock::new();
        let _ = block.entries();

        block.add(CounterId::MaObjectsImported, 1000).unwrap();
        thread::sleep(Duration::from_millis(50));

        let first = rate_entry(&block.entries(), "MMSPERF_MA_OBJECTS_IMPORTED_RATE");
        let second = rate_entry(&block.entries(), "MMSPERF_MA_OBJECTS_IMPORTED_RATE");
        assert!(first > 0.0);
        assert!(second > 0.0, "second collection saw {second}");

        let _ = block.entries_and_reset();
        thread::sleep(Duration::from_millis(5));
        let after = rate_entry(&block.entries(), "MMSPERF_MA_OBJECTS_IMPORTED_RATE");
        assert_eq!(after, 0.0);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_huge_counts_wrap_instead_of_panicking() {
        let block = Arc::new(PerfBlock::new());
        block.add(CounterId::MaObjectsImported, u64::MAX).unwrap();
        let other = Arc::clone(&block);
        thread::spawn(move || other.add(CounterId::MaObjectsImported, 1).unwrap())
            .join()
            .unwrap();

        assert_eq!(
            block.value(CounterId::MaObjectsImported),
            Some(CounterValue::Unsigned(0))
        );
        assert!(block.value(CounterId::MaObjectsImportedRate).is_some());
        assert_eq!(block.entries().len(), 17 + 35 * 3);
    }

    #[test]
    fn test_wrong_kind() {
        let block = PerfBlock::new();
        let err = block.add(CounterId::MaObjectsImportedRate, 1).unwrap_err();
        assert!(matches!(
            err,
            PerfError::WrongKind {
                expected: SlotKind::Counter,
                actual: SlotKind::Rate,
                ..
            }
        ));
        assert!(block.adjust(CounterId::MaObjectsImported, 1).is_err());
        assert!(block.record(CounterId::ObjHolisticSync, Duration::ZERO).is_err());
        assert!(block.start_timer(CounterId::SeRetrysProcessed).is_err());
    }

    #[test]
    fn test_base_slots_hold_no_value() {
        let block = PerfBlock::new();
        assert_eq!(block.value(CounterId::ObjManagementAgent), None);
        assert_eq!(block.value_at(24).unwrap(), None);
    }

    #[test]
    fn test_value_at() {
        let block = PerfBlock::new();
        block.add(CounterId::SeRetrysProcessed, 3).unwrap();
        assert_eq!(block.value_at(44).unwrap(), Some(CounterValue::Unsigned(3)));
        assert!(matches!(block.value_at(45), Err(PerfError::UnknownOffset(45))));
        assert!(matches!(block.value_at(112), Err(PerfError::UnknownOffset(112))));
    }

    #[test]
    fn test_adjust_gauge() {
        let block = PerfBlock::new();
        block.adjust(CounterId::CsPruneRecursionLevel, 3).unwrap();
        block.adjust(CounterId::CsPruneRecursionLevel, -5).unwrap();
        assert_eq!(
            block.value(CounterId::CsPruneRecursionLevel),
            Some(CounterValue::Signed(-2))
        );
    }

    #[test]
    fn test_record_and_timer_guard() {
        let block = PerfBlock::new();
        block
            .record(CounterId::HsProvisionTimer, Duration::from_micros(100))
            .unwrap();
        let guard = block.start_timer(CounterId::HsProvisionTimer).unwrap();
        thread::sleep(Duration::from_millis(2));
        let elapsed = guard.stop();
        assert!(elapsed >= Duration::from_millis(2));

        match block.slot(CounterId::HsProvisionTimer).map(Labeled::inner) {
            Some(SlotCounter::Timer(timer)) => {
                assert_eq!(timer.count(), 2);
                assert!(timer.total() >= Duration::from_micros(2_100));
            }
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_timer_records_nothing() {
        let block = PerfBlock::new();
        block.start_timer(CounterId::HsRetryTimer).unwrap().cancel();
        assert_eq!(
            block.value(CounterId::HsRetryTimer),
            Some(CounterValue::Unsigned(0))
        );
    }

    #[test]
    fn test_time_returns_result() {
        let block = PerfBlock::new();
        let out = block.time(CounterId::HsMvPersistTimer, || "persisted").unwrap();
        assert_eq!(out, "persisted");
        let count = block
            .entries()
            .into_iter()
            .find(|e| {
                e.name == "MMSPERF_HS_MV_PERSIST_TIMER"
                    && e.labels.iter().any(|(k, v)| k == STAT_LABEL && v == "count")
            })
            .map(|e| e.value);
        assert_eq!(count, Some(CounterValue::Unsigned(1)));
    }

    #[test]
    fn test_disabled_category_is_noop() {
        let block = PerfBlock::with_config(
            PerfConfig::new().with_categories([Category::ManagementAgent]),
        );
        block.add(CounterId::CsObjectsPruned, 5).unwrap();
        block.record(CounterId::HsStageTimer, Duration::from_millis(1)).unwrap();
        let _level = block.enter(CounterId::CsPruneRecursionLevel).unwrap();

        assert_eq!(block.value(CounterId::CsObjectsPruned), None);
        assert!(block.category_observables(Category::HolisticSync).is_empty());
        assert_eq!(block.category_observables(Category::ManagementAgent).len(), 8);
        // kind errors are still reported for disabled slots
        assert!(block.add(CounterId::HsStageTimer, 1).is_err());
    }

    #[test]
    fn test_instance_label() {
        let block = PerfBlock::with_config(PerfConfig::new().with_instance("ADMA"));
        assert_eq!(block.instance(), Some("ADMA"));
        for entry in block.entries() {
            assert_eq!(entry.labels[0], (INSTANCE_LABEL.to_string(), "ADMA".to_string()));
        }
    }

    #[test]
    fn test_timer_unit_from_config() {
        let block =
            PerfBlock::with_config(PerfConfig::new().with_timer_unit(TimerUnit::Millis));
        block
            .record(CounterId::HsSynchronizeTimer, Duration::from_millis(4))
            .unwrap();
        assert_eq!(
            block.value(CounterId::HsSynchronizeTimer),
            Some(CounterValue::Unsigned(4))
        );
    }

    #[test]
    fn test_entries_count() {
        let block = PerfBlock::new();
        // 17 single-entry slots plus 35 timers with three entries each
        assert_eq!(block.entries().len(), 17 + 35 * 3);
    }

    #[test]
    fn test_entries_and_reset_clears_timers_only() {
        let block = PerfBlock::new();
        block.add(CounterId::MaObjectsExported, 2).unwrap();
        block
            .record(CounterId::HsExportToCdTimer, Duration::from_micros(10))
            .unwrap();
        let _ = block.entries_and_reset();

        assert_eq!(
            block.value(CounterId::MaObjectsExported),
            Some(CounterValue::Unsigned(2))
        );
        assert_eq!(
            block.value(CounterId::HsExportToCdTimer),
            Some(CounterValue::Unsigned(0))
        );
    }

    #[test]
    fn test_reset() {
        let block = PerfBlock::new();
        block.add(CounterId::MaObjectsExported, 2).unwrap();
        block.adjust(CounterId::CsPruneRecursionLevel, 1).unwrap();
        block.reset();
        assert_eq!(
            block.value(CounterId::MaObjectsExported),
            Some(CounterValue::Unsigned(0))
        );
        assert_eq!(
            block.value(CounterId::CsPruneRecursionLevel),
            Some(CounterValue::Signed(0))
        );
    }

    #[test]
    fn test_concurrent_updates_sum_exactly() {
        let block = Arc::new(PerfBlock::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&block);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        b.increment(CounterId::MaObjectsImported).unwrap();
                        let _level = b.enter(CounterId::CsPruneRecursionLevel).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            block.value(CounterId::MaObjectsImported),
            Some(CounterValue::Unsigned(8000))
        );
        assert_eq!(
            block.value(CounterId::CsPruneRecursionLevel),
            Some(CounterValue::Signed(0))
        );
    }
}
