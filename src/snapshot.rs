//! Serializable snapshots of a counter block.
//!
//! # Feature Flag
//!
//! This module requires the `serde` feature:
//!
//! ```toml
//! [dependencies]
//! mmsperf = { version = "0.1", features = ["serde"] }
//! ```
//!
//! A [`BlockSnapshot`] records one [`SlotSnapshot`] per exported entry of
//! a [`PerfBlock`], keeping the slot's offset and category next to its
//! value so the snapshot can be read back without the layout at hand.
//!
//! ```rust
//! use mmsperf::block::PerfBlock;
//! use mmsperf::counters::CounterValue;
//! use mmsperf::layout::CounterId;
//! use mmsperf::snapshot::BlockSnapshot;
//!
//! let block = PerfBlock::new();
//! block.add(CounterId::SeRetrysProcessed, 4).unwrap();
//!
//! let snapshot = BlockSnapshot::capture(&block);
//! assert_eq!(snapshot.at(44).unwrap().value, CounterValue::Unsigned(4));
//! assert_eq!(
//!     snapshot.get("MMSPERF_SE_RETRYS_PROCESSED").unwrap().offset,
//!     44
//! );
//! ```

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::block::PerfBlock;
use crate::counters::timer::STAT_LABEL;
use crate::counters::{CounterValue, Observable, ObservableEntry};
use crate::instances::InstanceSet;
use crate::layout::{Category, CounterId, SlotKind};

/// One exported value of one slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotSnapshot {
    pub name: String,
    pub offset: u16,
    pub category: Category,
    pub kind: SlotKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub value: CounterValue,
}

impl SlotSnapshot {
    fn from_entry(id: CounterId, entry: ObservableEntry) -> Self {
        Self {
            name: entry.name.to_string(),
            offset: id.offset(),
            category: id.category(),
            kind: id.kind(),
            labels: entry.labels.into_iter().collect(),
            value: entry.value,
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Point-in-time capture of a whole block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockSnapshot {
    /// Milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub slots: Vec<SlotSnapshot>,
}

impl BlockSnapshot {
    /// Reads every live slot of `block`.
    pub fn capture(block: &PerfBlock) -> Self {
        Self::build(block, |slot| slot.expand())
    }

    /// Reads every live slot of `block`, resetting timers as they are read.
    pub fn capture_and_reset(block: &PerfBlock) -> Self {
        Self::build(block, |slot| slot.expand_and_reset())
    }

    /// One snapshot per instance, sorted by instance name.
    pub fn capture_instances(set: &InstanceSet) -> Vec<Self> {
        set.blocks().iter().map(|b| Self::capture(b)).collect()
    }

    fn build(block: &PerfBlock, read: impl Fn(&dyn Observable) -> Vec<ObservableEntry>) -> Self {
        let slots = CounterId::ALL
            .iter()
            .filter_map(|id| block.slot(*id).map(|slot| (*id, slot)))
            .flat_map(|(id, slot)| {
                read(slot as &dyn Observable)
                    .into_iter()
                    .map(move |entry| SlotSnapshot::from_entry(id, entry))
            })
            .collect();

        Self {
            timestamp_ms: Some(now_ms()),
            instance: block.instance().map(str::to_string),
            slots,
        }
    }

    /// First entry named `name`. For timers this is the `avg` entry.
    pub fn get(&self, name: &str) -> Option<&SlotSnapshot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// The entry of `name` carrying `stat=<stat>`.
    pub fn get_stat(&self, name: &str, stat: &str) -> Option<&SlotSnapshot> {
        self.slots
            .iter()
            .find(|s| s.name == name && s.label(STAT_LABEL) == Some(stat))
    }

    /// First entry at `offset`.
    pub fn at(&self, offset: u16) -> Option<&SlotSnapshot> {
        self.slots.iter().find(|s| s.offset == offset)
    }

    /// Entries of one category.
    pub fn category(&self, category: Category) -> impl Iterator<Item = &SlotSnapshot> {
        self.slots.iter().filter(move |s| s.category == category)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerfConfig;
    use std::time::Duration;

    #[test]
    fn test_capture_counter() {
        let block = PerfBlock::new();
        block.add(CounterId::MaObjectsImported, 9).unwrap();

        let snapshot = BlockSnapshot::capture(&block);
        let slot = snapshot.get("MMSPERF_MA_OBJECTS_IMPORTED").unwrap();
        assert_eq!(slot.offset, 26);
        assert_eq!(slot.category, Category::ManagementAgent);
        assert_eq!(slot.kind, SlotKind::Counter);
        assert_eq!(slot.value, CounterValue::Unsigned(9));
        assert!(slot.labels.is_empty());
        assert!(snapshot.timestamp_ms.is_some());
    }

    #[test]
    fn test_capture_skips_base_slots() {
        let snapshot = BlockSnapshot::capture(&PerfBlock::new());
        assert!(snapshot.slots.iter().all(|s| s.kind != SlotKind::ObjectBase));
        assert!(snapshot.at(0).is_none());
        assert!(snapshot.at(2).is_some());
    }

    #[test]
    fn test_timer_stats() {
        let block = PerfBlock::new();
        block
            .record(CounterId::HsStageTimer, Duration::from_micros(30))
            .unwrap();
        block
            .record(CounterId::HsStageTimer, Duration::from_micros(10))
            .unwrap();

        let snapshot = BlockSnapshot::capture(&block);
        let name = "MMSPERF_HS_STAGE_TIMER";
        assert_eq!(snapshot.get_stat(name, "avg").unwrap().value, CounterValue::Unsigned(20));
        assert_eq!(snapshot.get_stat(name, "total").unwrap().value, CounterValue::Unsigned(40));
        assert_eq!(snapshot.get_stat(name, "count").unwrap().value, CounterValue::Unsigned(2));
        assert_eq!(snapshot.get(name), snapshot.get_stat(name, "avg"));
    }

    #[test]
    fn test_capture_and_reset() {
        let block = PerfBlock::new();
        block
            .record(CounterId::HsRetryTimer, Duration::from_micros(5))
            .unwrap();

        let first = BlockSnapshot::capture_and_reset(&block);
        let second = BlockSnapshot::capture(&block);
        let name = "MMSPERF_HS_RETRY_TIMER";
        assert_eq!(first.get_stat(name, "count").unwrap().value, CounterValue::Unsigned(1));
        assert_eq!(second.get_stat(name, "count").unwrap().value, CounterValue::Unsigned(0));
    }

    #[test]
    fn test_capture_instances() {
        let set = InstanceSet::with_config(
            PerfConfig::new().with_categories([Category::SyncEngine]),
        );
        set.get_or_create("ADMA");
        set.get_or_create("AADMA");

        let snapshots = BlockSnapshot::capture_instances(&set);
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].instance.as_deref(), Some("AADMA"));
        assert_eq!(snapshots[0].slots.len(), 2);
        assert_eq!(snapshots[0].slots[0].label("instance"), Some("AADMA"));
    }

    #[test]
    fn test_category_filter() {
        let snapshot = BlockSnapshot::capture(&PerfBlock::new());
        assert_eq!(snapshot.category(Category::SyncEngine).count(), 2);
        assert_eq!(snapshot.category(Category::ConnectorSpace).count(), 11);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_serialize_slot() {
        let slot = SlotSnapshot {
            name: "MMSPERF_SE_RETRYS_PROCESSED".to_string(),
            offset: 44,
            category: Category::SyncEngine,
            kind: SlotKind::Counter,
            labels: BTreeMap::new(),
            value: CounterValue::Unsigned(3),
        };
        let json = serde_json::to_string(&slot).unwrap();
        assert_eq!(
            json,
            r#"{"name":"MMSPERF_SE_RETRYS_PROCESSED","offset":44,"category":"sync_engine","kind":"counter","value":3}"#
        );
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_deserialize_block() {
        let json = r#"{
            "timestamp_ms": 1234567890,
            "slots": [
                {"name":"MMSPERF_CS_PRUNE_RECURSION_LEVEL","offset":22,"category":"connector_space",
                 "kind":"gauge","labels":{"instance":"ADMA"},"value":-1}
            ]
        }"#;
        let snapshot: BlockSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.timestamp_ms, Some(1234567890));
        assert_eq!(snapshot.instance, None);
        let slot = snapshot.at(22).unwrap();
        assert_eq!(slot.value, CounterValue::Signed(-1));
        assert_eq!(slot.label("instance"), Some("ADMA"));
    }
}
