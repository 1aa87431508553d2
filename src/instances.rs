//! Named blocks, one per counter instance.
//!
//! The service publishes one copy of the counter block per management
//! agent. [`InstanceSet`] hands out a shared [`PerfBlock`] per instance
//! name, creating it on first use from a template [`PerfConfig`]. Every
//! block carries its name in the `instance` label so exporters can merge
//! all of them into one output.
//!
//! ```rust
//! use mmsperf::instances::InstanceSet;
//! use mmsperf::layout::CounterId;
//!
//! let agents = InstanceSet::new();
//! agents.get_or_create("ADMA").add(CounterId::MaObjectsImported, 5).unwrap();
//! agents.get_or_create("AADMA").add(CounterId::MaObjectsExported, 2).unwrap();
//!
//! assert_eq!(agents.names(), ["AADMA", "ADMA"]);
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::block::PerfBlock;
use crate::config::PerfConfig;
use crate::counters::ObservableEntry;

/// A set of named [`PerfBlock`]s sharing one configuration.
#[derive(Debug, Default)]
pub struct InstanceSet {
    template: PerfConfig,
    blocks: RwLock<BTreeMap<String, Arc<PerfBlock>>>,
}

impl InstanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks created by this set use `template`, with the instance name
    /// replaced.
    pub fn with_config(template: PerfConfig) -> Self {
        Self {
            template,
            blocks: RwLock::default(),
        }
    }

    /// The block of `name`, created if missing.
    pub fn get_or_create(&self, name: &str) -> Arc<PerfBlock> {
        if let Some(block) = self.get(name) {
            return block;
        }

        let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
        let block = blocks.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(instance = name, "creating perf instance");
            Arc::new(PerfBlock::with_config(
                self.template.clone().with_instance(name),
            ))
        });
        Arc::clone(block)
    }

    pub fn get(&self, name: &str) -> Option<Arc<PerfBlock>> {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        blocks.get(name).cloned()
    }

    /// Removes an instance. Holders of its `Arc` keep a working block.
    pub fn remove(&self, name: &str) -> Option<Arc<PerfBlock>> {
        let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
        let removed = blocks.remove(name);
        if removed.is_some() {
            tracing::debug!(instance = name, "removed perf instance");
        }
        removed
    }

    /// Instance names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        blocks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every block, sorted by instance name.
    pub fn blocks(&self) -> Vec<Arc<PerfBlock>> {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        blocks.values().cloned().collect()
    }

    /// The entries of every block, instance by instance.
    pub fn collect(&self) -> Vec<ObservableEntry> {
        self.blocks().iter().flat_map(|b| b.entries()).collect()
    }

    /// Like [`collect`](Self::collect), resetting timers as they are read.
    pub fn collect_and_reset(&self) -> Vec<ObservableEntry> {
        self.blocks()
            .iter()
            .flat_map(|b| b.entries_and_reset())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::INSTANCE_LABEL;
    use crate::counters::CounterValue;
    use crate::layout::{Category, CounterId};
    use std::thread;

    #[test]
    fn test_get_or_create_returns_same_block() {
        let set = InstanceSet::new();
        let a = set.get_or_create("ADMA");
        let b = set.get_or_create("ADMA");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(set.len(), 1);
        assert_eq!(a.instance(), Some("ADMA"));
    }

    #[test]
    fn test_get_missing() {
        let set = InstanceSet::new();
        assert!(set.get("nope").is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn test_remove() {
        let set = InstanceSet::new();
        let block = set.get_or_create("ADMA");
        block.add(CounterId::MaObjectsImported, 1).unwrap();

        let removed = set.remove("ADMA").unwrap();
        assert!(Arc::ptr_eq(&block, &removed));
        assert!(set.remove("ADMA").is_none());
        assert!(set.is_empty());
        // the detached block keeps working
        block.add(CounterId::MaObjectsImported, 1).unwrap();
        assert_eq!(
            block.value(CounterId::MaObjectsImported),
            Some(CounterValue::Unsigned(2))
        );
    }

    #[test]
    fn test_template_config_applies() {
        let set = InstanceSet::with_config(
            PerfConfig::new().with_categories([Category::ManagementAgent]),
        );
        let block = set.get_or_create("ADMA");
        assert!(block.config().is_enabled(Category::ManagementAgent));
        assert!(!block.config().is_enabled(Category::HolisticSync));
    }

    #[test]
    fn test_collect_labels_each_instance() {
        let set = InstanceSet::with_config(
            PerfConfig::new().with_categories([Category::SyncEngine]),
        );
        set.get_or_create("b").add(CounterId::SeRetrysProcessed, 2).unwrap();
        set.get_or_create("a").add(CounterId::SeRetrysProcessed, 1).unwrap();

        let retries: Vec<_> = set
            .collect()
            .into_iter()
            .filter(|e| e.name == "MMSPERF_SE_RETRYS_PROCESSED")
            .map(|e| (e.labels[0].clone(), e.value))
            .collect();
        assert_eq!(
            retries,
            vec![
                ((INSTANCE_LABEL.to_string(), "a".to_string()), CounterValue::Unsigned(1)),
                ((INSTANCE_LABEL.to_string(), "b".to_string()), CounterValue::Unsigned(2)),
            ]
        );
    }

    #[test]
    fn test_concurrent_get_or_create() {
        let set = Arc::new(InstanceSet::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&set);
                thread::spawn(move || {
                    s.get_or_create("shared")
                        .increment(CounterId::CsObjectsPruned)
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get("shared").unwrap().value(CounterId::CsObjectsPruned),
            Some(CounterValue::Unsigned(8))
        );
    }
}
