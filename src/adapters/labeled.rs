//! Labeled wrapper attaching key-value dimensions to a counter.
//!
//! A [`PerfBlock`](crate::block::PerfBlock) wraps every live slot in a
//! [`Labeled`] so that exporters can tell instances apart: two blocks for
//! two management agents publish the same counter names with a different
//! `instance` label.
//!
//! # Example
//!
//! ```rust
//! use mmsperf::adapters::Labeled;
//! use mmsperf::counters::monotone::Monotone;
//! use mmsperf::counters::Observable;
//!
//! let imported = Labeled::new(Monotone::new().with_name("MMSPERF_MA_OBJECTS_IMPORTED"))
//!     .with_label("instance", "ADMA");
//!
//! imported.add(3);
//!
//! let entries = imported.expand();
//! assert_eq!(entries[0].labels_string(), "instance=ADMA");
//! ```

use crate::counters::{CounterValue, MetricKind, Observable, ObservableEntry};
use std::fmt::{self, Debug};
use std::ops::Deref;

/// A counter with labels.
///
/// Labels keep insertion order. Setting a key twice replaces its value.
/// When the inner counter expands to several entries (a timer's `stat`
/// entries), the wrapper's labels come first on each of them.
///
/// ```rust
/// use mmsperf::adapters::Labeled;
/// use mmsperf::counters::timer::Timer;
/// use mmsperf::counters::Observable;
/// use std::time::Duration;
///
/// let provision = Labeled::new(Timer::new().with_name("MMSPERF_HS_PROVISION_TIMER"))
///     .with_label("instance", "ADMA");
/// provision.record(Duration::from_micros(40));
///
/// let labels: Vec<String> = provision.expand().iter().map(|e| e.labels_string()).collect();
/// assert_eq!(
///     labels,
///     ["instance=ADMA,stat=avg", "instance=ADMA,stat=total", "instance=ADMA,stat=count"]
/// );
/// ```
pub struct Labeled<T> {
    inner: T,
    labels: Vec<(String, String)>,
}

impl<T> Labeled<T> {
    /// Wraps `inner` with no labels.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            labels: Vec::new(),
        }
    }

    /// Wraps `inner` with the given labels.
    pub fn with_labels(inner: T, labels: Vec<(String, String)>) -> Self {
        let mut labeled = Self::new(inner);
        for (key, value) in labels {
            labeled.add_label(key, value);
        }
        labeled
    }

    /// Adds or replaces a label, returning `self` for method chaining.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_label(key, value);
        self
    }

    /// Adds or replaces a label.
    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        if let Some(pos) = self.labels.iter().position(|(k, _)| *k == key) {
            self.labels[pos].1 = value;
        } else {
            self.labels.push((key, value));
        }
    }

    /// Removes a label, returning its previous value.
    pub fn remove_label(&mut self, key: &str) -> Option<String> {
        let pos = self.labels.iter().position(|(k, _)| k == key)?;
        Some(self.labels.remove(pos).1)
    }

    pub fn get_label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_labels(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn prefix(&self, entries: Vec<ObservableEntry>) -> Vec<ObservableEntry> {
        if self.labels.is_empty() {
            return entries;
        }
        entries
            .into_iter()
            .map(|mut entry| {
                let mut labels = self.labels.clone();
                labels.extend(
                    entry
                        .labels
                        .into_iter()
                        .filter(|(k, _)| self.get_label(k).is_none()),
                );
                entry.labels = labels;
                entry
            })
            .collect()
    }
}

impl<T: Observable> Observable for Labeled<T> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn value(&self) -> CounterValue {
        self.inner.value()
    }

    fn value_and_reset(&self) -> CounterValue {
        self.inner.value_and_reset()
    }

    fn metric_kind(&self) -> MetricKind {
        self.inner.metric_kind()
    }

    fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    fn expand(&self) -> Vec<ObservableEntry> {
        self.prefix(self.inner.expand())
    }

    fn expand_and_reset(&self) -> Vec<ObservableEntry> {
        self.prefix(self.inner.expand_and_reset())
    }
}

impl<T: Debug> Debug for Labeled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Labeled")
            .field("inner", &self.inner)
            .field("labels", &self.labels)
            .finish()
    }
}

impl<T> Deref for Labeled<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::monotone::Monotone;
    use crate::counters::signed::Signed;
    use crate::counters::timer::{Timer, STAT_LABEL};
    use std::time::Duration;

    #[test]
    fn test_new() {
        let counter = Labeled::new(Monotone::new().with_name("test"));
        assert_eq!(counter.name(), "test");
        assert!(!counter.has_labels());
    }

    #[test]
    fn test_with_label() {
        let counter = Labeled::new(Monotone::new())
            .with_label("instance", "ADMA")
            .with_label("host", "sync01");

        assert_eq!(counter.get_label("instance"), Some("ADMA"));
        assert_eq!(counter.get_label("host"), Some("sync01"));
        assert_eq!(counter.labels().len(), 2);
    }

    #[test]
    fn test_label_update() {
        let counter = Labeled::new(Monotone::new())
            .with_label("instance", "old")
            .with_label("instance", "new");

        assert_eq!(counter.get_label("instance"), Some("new"));
        assert_eq!(counter.labels().len(), 1);
    }

    #[test]
    fn test_with_labels_dedups() {
        let counter = Labeled::with_labels(
            Monotone::new(),
            vec![
                ("a".to_string(), "1".to_string()),
                ("a".to_string(), "2".to_string()),
            ],
        );
        assert_eq!(counter.get_label("a"), Some("2"));
        assert_eq!(counter.labels().len(), 1);
    }

    #[test]
    fn test_remove_label() {
        let mut counter = Labeled::new(Monotone::new()).with_label("key", "value");
        assert_eq!(counter.remove_label("key"), Some("value".to_string()));
        assert_eq!(counter.remove_label("key"), None);
    }

    #[test]
    fn test_deref_reaches_inner_operations() {
        let level = Labeled::new(Signed::new()).with_label("instance", "x");
        level.add(2);
        level.sub(1);
        assert_eq!(level.value(), CounterValue::Signed(1));
    }

    #[test]
    fn test_expand_single_entry() {
        let counter = Labeled::new(Monotone::new().with_name("objects")).with_label("instance", "A");
        counter.add(5);
        let entries = counter.expand();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "objects");
        assert_eq!(entries[0].value, CounterValue::Unsigned(5));
        assert_eq!(entries[0].metric_kind, MetricKind::Counter);
        assert_eq!(entries[0].labels_string(), "instance=A");
    }

    #[test]
    fn test_expand_prefixes_inner_labels() {
        let timer = Labeled::new(Timer::new()).with_label("instance", "A");
        timer.record(Duration::from_micros(10));
        for entry in timer.expand() {
            assert_eq!(entry.labels[0], ("instance".to_string(), "A".to_string()));
            assert_eq!(entry.labels[1].0, STAT_LABEL);
        }
    }

    #[test]
    fn test_outer_label_wins_on_conflict() {
        let timer = Labeled::new(Timer::new()).with_label(STAT_LABEL, "fixed");
        let entries = timer.expand();
        assert!(entries.iter().all(|e| e.labels_string() == "stat=fixed"));
    }

    #[test]
    fn test_expand_and_reset_delegates() {
        let timer = Labeled::new(Timer::new()).with_label("instance", "A");
        timer.record(Duration::from_micros(10));
        let _ = timer.expand_and_reset();
        assert_eq!(timer.count(), 0);
    }

    #[test]
    fn test_debug() {
        let counter = Labeled::new(Monotone::new().with_name("debug_test")).with_label("key", "value");
        let debug_str = format!("{:?}", counter);
        assert!(debug_str.contains("Labeled"));
        assert!(debug_str.contains("key"));
    }
}
