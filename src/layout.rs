//! The counter offset table of the synchronization service.
//!
//! Every counter the service publishes is addressed by a fixed, even offset
//! into its counter-data block. The table is grouped into four categories,
//! each introduced by a `PRFOBJ_MMS_*` base slot:
//!
//! | Category | Base | Offsets |
//! |---|---|---|
//! | connector space | `PRFOBJ_MMS_CS` | 0 - 22 |
//! | management agent | `PRFOBJ_MMS_MA` | 24 - 40 |
//! | synchronization engine | `PRFOBJ_MMS_SE` | 42 - 46 |
//! | holistic sync | `PRFOBJ_MMS_HS` | 48 - 110 |
//!
//! Offsets step by 2. The odd offset after each slot is reserved for it
//! (see [`CounterId::reserved_offset`]) and the highest offset equals
//! [`offsets::PERF_MAX_COUNTER`]. External readers may address the block
//! positionally, so offsets are never renumbered.
//!
//! ```rust
//! use mmsperf::layout::{Category, CounterId, SlotKind};
//!
//! let id: CounterId = "MMSPERF_MA_OBJECTS_IMPORTED".parse().unwrap();
//! assert_eq!(id.offset(), 26);
//! assert_eq!(id.category(), Category::ManagementAgent);
//! assert_eq!(id.kind(), SlotKind::Counter);
//! assert_eq!(id.rate(), Some(CounterId::MaObjectsImportedRate));
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::counters::MetricKind;
use crate::error::{LayoutError, PerfError};

/// One of the four counter groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Category {
    /// Connector-space maintenance: backlink fixing and pruning.
    ConnectorSpace,
    /// Management-agent import/export.
    ManagementAgent,
    /// Synchronization-engine retries.
    SyncEngine,
    /// End-to-end object staging, sync, provisioning and export timers.
    HolisticSync,
}

impl Category {
    /// All categories in layout order.
    pub const ALL: [Category; 4] = [
        Category::ConnectorSpace,
        Category::ManagementAgent,
        Category::SyncEngine,
        Category::HolisticSync,
    ];

    /// The `PRFOBJ_MMS_*` slot that opens this category.
    pub const fn base(self) -> CounterId {
        match self {
            Category::ConnectorSpace => CounterId::ObjConnectorSpace,
            Category::ManagementAgent => CounterId::ObjManagementAgent,
            Category::SyncEngine => CounterId::ObjSyncEngine,
            Category::HolisticSync => CounterId::ObjHolisticSync,
        }
    }

    /// Two-letter name used in configuration and exporter subsystems.
    pub const fn short_name(self) -> &'static str {
        match self {
            Category::ConnectorSpace => "cs",
            Category::ManagementAgent => "ma",
            Category::SyncEngine => "se",
            Category::HolisticSync => "hs",
        }
    }

    /// Human readable title.
    pub const fn title(self) -> &'static str {
        match self {
            Category::ConnectorSpace => "Connector Space",
            Category::ManagementAgent => "Management Agent",
            Category::SyncEngine => "Synchronization Engine",
            Category::HolisticSync => "Holistic Sync",
        }
    }

    /// The non-base slots of this category, in offset order.
    pub fn counters(self) -> impl Iterator<Item = CounterId> {
        CounterId::ALL
            .iter()
            .copied()
            .filter(move |id| id.category() == self && id.kind() != SlotKind::ObjectBase)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Category {
    type Err = PerfError;

    /// Accepts the short name (`cs`, `ma`, `se`, `hs`, any case) or the
    /// base constant name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| {
                c.short_name().eq_ignore_ascii_case(trimmed) || c.base().name() == trimmed
            })
            .ok_or_else(|| PerfError::UnknownCategory(s.to_string()))
    }
}

/// What a slot holds, derived from its name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SlotKind {
    /// `PRFOBJ_MMS_*`: opens a category, holds no value.
    ObjectBase,
    /// Raw cumulative count.
    Counter,
    /// Per-second rate of the counter two offsets before it.
    Rate,
    /// Current level that moves both ways.
    Gauge,
    /// Accumulated elapsed time of an operation.
    Timer,
}

impl SlotKind {
    /// How a live value of this kind is exported; `None` for base slots.
    pub const fn metric_kind(self) -> Option<MetricKind> {
        match self {
            SlotKind::ObjectBase => None,
            SlotKind::Counter => Some(MetricKind::Counter),
            SlotKind::Rate | SlotKind::Gauge | SlotKind::Timer => Some(MetricKind::Gauge),
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotKind::ObjectBase => "base",
            SlotKind::Counter => "counter",
            SlotKind::Rate => "rate",
            SlotKind::Gauge => "gauge",
            SlotKind::Timer => "timer",
        })
    }
}

/// One named offset of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSlot {
    pub id: CounterId,
    pub name: &'static str,
    pub offset: u16,
    pub category: Category,
    pub kind: SlotKind,
    pub description: Option<&'static str>,
}

macro_rules! perf_counters {
    ($(
        $variant:ident = $offset:literal => $name:ident, $category:ident, $kind:ident, $desc:expr;
    )*) => {
        /// Raw offsets, one constant per header `#define`.
        pub mod offsets {
            $(
                pub const $name: u16 = $offset;
            )*

            /// Highest defined offset.
            pub const PERF_MAX_COUNTER: u16 = 110;
        }

        /// Typed identifier of a slot. The discriminant is the offset.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum CounterId {
            $(
                $variant = $offset,
            )*
        }

        impl CounterId {
            /// Every slot in declaration order.
            pub const ALL: &'static [CounterId] = &[$(CounterId::$variant,)*];

            /// The symbolic name, as in the header.
            pub const fn name(self) -> &'static str {
                match self {
                    $(CounterId::$variant => stringify!($name),)*
                }
            }

            pub const fn category(self) -> Category {
                match self {
                    $(CounterId::$variant => Category::$category,)*
                }
            }

            pub const fn kind(self) -> SlotKind {
                match self {
                    $(CounterId::$variant => SlotKind::$kind,)*
                }
            }

            /// What the slot measures, where the header documents it.
            pub const fn description(self) -> Option<&'static str> {
                match self {
                    $(CounterId::$variant => $desc,)*
                }
            }
        }

        /// The table in declaration order; `SLOTS[i].offset == 2 * i`.
        pub static SLOTS: &[CounterSlot] = &[
            $(
                CounterSlot {
                    id: CounterId::$variant,
                    name: stringify!($name),
                    offset: $offset,
                    category: Category::$category,
                    kind: SlotKind::$kind,
                    description: $desc,
                },
            )*
        ];
    };
}

perf_counters! {
    ObjConnectorSpace = 0 => PRFOBJ_MMS_CS, ConnectorSpace, ObjectBase, None;
    CsFixBacklinksObjects = 2 => MMSPERF_CS_FIX_BACKLINKS_OBJECTS, ConnectorSpace, Counter, None;
    CsFixBacklinksObjectsRate = 4 => MMSPERF_CS_FIX_BACKLINKS_OBJECTS_RATE, ConnectorSpace, Rate, None;
    CsFixBacklinksLinks = 6 => MMSPERF_CS_FIX_BACKLINKS_LINKS, ConnectorSpace, Counter, None;
    CsFixBacklinksLinksRate = 8 => MMSPERF_CS_FIX_BACKLINKS_LINKS_RATE, ConnectorSpace, Rate, None;
    CsPruneCacheReads = 10 => MMSPERF_CS_PRUNE_CACHE_READS, ConnectorSpace, Counter, None;
    CsPruneCacheReadsRate = 12 => MMSPERF_CS_PRUNE_CACHE_READS_RATE, ConnectorSpace, Rate, None;
    CsPruneCacheWrites = 14 => MMSPERF_CS_PRUNE_CACHE_WRITES, ConnectorSpace, Counter, None;
    CsPruneCacheWritesRate = 16 => MMSPERF_CS_PRUNE_CACHE_WRITES_RATE, ConnectorSpace, Rate, None;
    CsObjectsPruned = 18 => MMSPERF_CS_OBJECTS_PRUNED, ConnectorSpace, Counter, None;
    CsObjectsPrunedRate = 20 => MMSPERF_CS_OBJECTS_PRUNED_RATE, ConnectorSpace, Rate, None;
    CsPruneRecursionLevel = 22 => MMSPERF_CS_PRUNE_RECURSION_LEVEL, ConnectorSpace, Gauge, None;

    ObjManagementAgent = 24 => PRFOBJ_MMS_MA, ManagementAgent, ObjectBase, None;
    MaObjectsImported = 26 => MMSPERF_MA_OBJECTS_IMPORTED, ManagementAgent, Counter, None;
    MaObjectsImportedRate = 28 => MMSPERF_MA_OBJECTS_IMPORTED_RATE, ManagementAgent, Rate, None;
    MaObjectsExported = 30 => MMSPERF_MA_OBJECTS_EXPORTED, ManagementAgent, Counter, None;
    MaObjectsExportedRate = 32 => MMSPERF_MA_OBJECTS_EXPORTED_RATE, ManagementAgent, Rate, None;
    MaExtensionWriteExportFileTimer = 34 => MMSPERF_MA_EXTENSION_WRITE_EXPORT_FILE_TIMER, ManagementAgent, Timer, None;
    MaExtensionDeliverExportFileTimer = 36 => MMSPERF_MA_EXTENSION_DELIVER_EXPORT_FILE_TIMER, ManagementAgent, Timer, None;
    MaExtensionCallBasedExportTimer = 38 => MMSPERF_MA_EXTENSION_CALL_BASED_EXPORT_TIMER, ManagementAgent, Timer, None;
    MaExtensionGenerateImportFileTimer = 40 => MMSPERF_MA_EXTENSION_GENERATE_IMPORT_FILE_TIMER, ManagementAgent, Timer, None;

    ObjSyncEngine = 42 => PRFOBJ_MMS_SE, SyncEngine, ObjectBase, None;
    SeRetrysProcessed = 44 => MMSPERF_SE_RETRYS_PROCESSED, SyncEngine, Counter, None;
    SeRetrysProcessedRate = 46 => MMSPERF_SE_RETRYS_PROCESSED_RATE, SyncEngine, Rate, None;

    ObjHolisticSync = 48 => PRFOBJ_MMS_HS, HolisticSync, ObjectBase, None;
    HsRebuildLinkTimer = 50 => MMSPERF_HS_REBUILD_LINK_TIMER, HolisticSync, Timer,
        Some("Time in Rebuild_Links in CS Object");
    HsCsPersistTimer = 52 => MMSPERF_HS_CS_PERSIST_TIMER, HolisticSync, Timer,
        Some("Time in Persist in CS Object");
    HsUpdateAnchorTimer = 54 => MMSPERF_HS_UPDATE_ANCHOR_TIMER, HolisticSync, Timer, None;
    HsPutAnchorTimer = 56 => MMSPERF_HS_PUT_ANCHOR_TIMER, HolisticSync, Timer, None;
    HsObjectsConvertedTimer = 58 => MMSPERF_HS_OBJECTS_CONVERTED_TIMER, HolisticSync, Timer,
        Some("Time in MA to convert object to image");
    HsStageTimer = 60 => MMSPERF_HS_STAGE_TIMER, HolisticSync, Timer,
        Some("Time to stage an object, including stage create, add DImage, setup links and CS persist");
    HsCsToMvTimer = 62 => MMSPERF_HS_CS_TO_MV_TIMER, HolisticSync, Timer,
        Some("Time in import attribute flow, including setup links");
    HsSetupLinksTimer = 64 => MMSPERF_HS_SETUP_LINKS_TIMER, HolisticSync, Timer,
        Some("Time in SetupLinks in CS");
    HsProvisionTimer = 66 => MMSPERF_HS_PROVISION_TIMER, HolisticSync, Timer,
        Some("Time in Provisioning");
    HsMvToCsTimer = 68 => MMSPERF_HS_MV_TO_CS_TIMER, HolisticSync, Timer,
        Some("Time in export attribute flow, including CS persist");
    HsMvPersistTimer = 70 => MMSPERF_HS_MV_PERSIST_TIMER, HolisticSync, Timer,
        Some("Time to persist MV object");
    HsStageCreateTimer = 72 => MMSPERF_HS_STAGE_CREATE_TIMER, HolisticSync, Timer,
        Some("Time to create a staging image");
    HsRetryTimer = 74 => MMSPERF_HS_RETRY_TIMER, HolisticSync, Timer,
        Some("Time in retry");
    HsStageAddDimageTimer = 76 => MMSPERF_HS_STAGE_ADD_DIMAGE_TIMER, HolisticSync, Timer,
        Some("Time to add a DImage to pending import");
    HsFindCsObjectTimer = 78 => MMSPERF_HS_FIND_CS_OBJECT_TIMER, HolisticSync, Timer,
        Some("Time to find a CS Object for Import + Sync");
    HsObjectsReadTimer = 80 => MMSPERF_HS_OBJECTS_READ_TIMER, HolisticSync, Timer,
        Some("Time in MA to read object, may overlap with objects converted");
    HsSynchronizeTimer = 82 => MMSPERF_HS_SYNCHRONIZE_TIMER, HolisticSync, Timer,
        Some("Time in sync, including find CS object, link MV, CS to MV, provision, MV to CS and MV persist");
    HsLinkMvTimer = 84 => MMSPERF_HS_LINK_MV_TIMER, HolisticSync, Timer,
        Some("Time in linking to MV including join + project");
    HsGetExportImageTimer = 86 => MMSPERF_HS_GET_EXPORT_IMAGE_TIMER, HolisticSync, Timer,
        Some("Time in Loading Image for export");
    HsExportParentsTimer = 88 => MMSPERF_HS_EXPORT_PARENTS_TIMER, HolisticSync, Timer,
        Some("Time in exporting parents");
    HsExportToCdTimer = 90 => MMSPERF_HS_EXPORT_TO_CD_TIMER, HolisticSync, Timer,
        Some("Time in export to connected directory");
    HsPostExportProcTimer = 92 => MMSPERF_HS_POST_EXPORT_PROC_TIMER, HolisticSync, Timer,
        Some("Time in processing export updates (anchors, failures, etc...)");
    HsPutImportsTimer = 94 => MMSPERF_HS_PUT_IMPORTS_TIMER, HolisticSync, Timer,
        Some("PutImports");
    HsImportStartTransTimer = 96 => MMSPERF_HS_IMPORT_START_TRANS_TIMER, HolisticSync, Timer,
        Some("Import->Start Transaction");
    HsImportEndTransTimer = 98 => MMSPERF_HS_IMPORT_END_TRANS_TIMER, HolisticSync, Timer,
        Some("Import->End Transaction");
    HsSyncStartTransTimer = 100 => MMSPERF_HS_SYNC_START_TRANS_TIMER, HolisticSync, Timer,
        Some("Sync->Start Transaction");
    HsSyncEndTransTimer = 102 => MMSPERF_HS_SYNC_END_TRANS_TIMER, HolisticSync, Timer,
        Some("Sync->End Transaction");
    HsObjectsPrunedTimer = 104 => MMSPERF_HS_OBJECTS_PRUNED_TIMER, HolisticSync, Timer,
        Some("Object Whacking");
    HsPreExportProcTimer = 106 => MMSPERF_HS_PRE_EXPORT_PROC_TIMER, HolisticSync, Timer,
        Some("Time in processing pre-export updates (anchors, failures, etc...)");
    HsStampAnchorTimer = 108 => MMSPERF_HS_STAMP_ANCHOR_TIMER, HolisticSync, Timer,
        Some("Time to stamp anchor on CS/Tower");
    HsEscrowChangeTimer = 110 => MMSPERF_HS_ESCROW_CHANGE_TIMER, HolisticSync, Timer,
        Some("Time to push pending to escrowed");
}

impl CounterId {
    /// Position of this slot in [`SLOTS`] and in the live block.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize / 2
    }

    /// The offset of this slot in the counter-data block.
    #[inline]
    pub const fn offset(self) -> u16 {
        self as u16
    }

    /// The odd offset paired with this slot. Never addressed by a name.
    #[inline]
    pub const fn reserved_offset(self) -> u16 {
        self as u16 + 1
    }

    /// The full table entry of this slot.
    #[inline]
    pub fn slot(self) -> &'static CounterSlot {
        &SLOTS[self.index()]
    }

    /// Looks a slot up by its offset. Odd and out-of-range offsets are `None`.
    pub fn from_offset(offset: u16) -> Option<CounterId> {
        if offset % 2 != 0 || offset > offsets::PERF_MAX_COUNTER {
            return None;
        }
        CounterId::ALL.get(offset as usize / 2).copied()
    }

    /// For a raw counter, the rate slot derived from it.
    pub fn rate(self) -> Option<CounterId> {
        if self.kind() != SlotKind::Counter {
            return None;
        }
        CounterId::from_offset(self.offset() + 2).filter(|next| next.kind() == SlotKind::Rate)
    }

    /// For a rate slot, the raw counter it derives from.
    pub fn source(self) -> Option<CounterId> {
        if self.kind() != SlotKind::Rate {
            return None;
        }
        self.offset()
            .checked_sub(2)
            .and_then(CounterId::from_offset)
            .filter(|prev| prev.kind() == SlotKind::Counter)
    }

    /// Timers whose time is already contained in this timer.
    pub const fn includes(self) -> &'static [CounterId] {
        use CounterId::*;
        match self {
            HsStageTimer => &[
                HsStageCreateTimer,
                HsStageAddDimageTimer,
                HsSetupLinksTimer,
                HsCsPersistTimer,
            ],
            HsCsToMvTimer => &[HsSetupLinksTimer],
            HsMvToCsTimer => &[HsCsPersistTimer],
            HsSynchronizeTimer => &[
                HsFindCsObjectTimer,
                HsLinkMvTimer,
                HsCsToMvTimer,
                HsProvisionTimer,
                HsMvToCsTimer,
                HsMvPersistTimer,
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CounterId {
    type Err = PerfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CounterId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == s)
            .ok_or_else(|| PerfError::UnknownCounter(s.to_string()))
    }
}

impl TryFrom<u16> for CounterId {
    type Error = PerfError;

    fn try_from(offset: u16) -> Result<Self, Self::Error> {
        CounterId::from_offset(offset).ok_or(PerfError::UnknownOffset(offset))
    }
}

/// Checks a counter table against the offset contract.
///
/// The table must be non-empty, every offset even and within `max`, names
/// and offsets unique, consecutive offsets exactly 2 apart, the last offset
/// equal to `max`, and each slot inside the run opened by its category base.
pub fn validate(slots: &[CounterSlot], max: u16) -> Result<(), LayoutError> {
    let last = slots.last().ok_or(LayoutError::Empty)?;

    let mut names = HashSet::with_capacity(slots.len());
    let mut by_offset: HashMap<u16, &str> = HashMap::with_capacity(slots.len());
    for slot in slots {
        if slot.offset % 2 != 0 {
            return Err(LayoutError::OddOffset {
                name: slot.name.to_string(),
                offset: slot.offset,
            });
        }
        if slot.offset > max {
            return Err(LayoutError::OutOfRange {
                name: slot.name.to_string(),
                offset: slot.offset,
                max,
            });
        }
        if !names.insert(slot.name) {
            return Err(LayoutError::DuplicateName {
                name: slot.name.to_string(),
            });
        }
        if let Some(first) = by_offset.insert(slot.offset, slot.name) {
            return Err(LayoutError::DuplicateOffset {
                first: first.to_string(),
                second: slot.name.to_string(),
                offset: slot.offset,
            });
        }
    }

    for pair in slots.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.offset.checked_add(2) != Some(next.offset) {
            return Err(LayoutError::BadStep {
                name: next.name.to_string(),
                offset: next.offset,
                previous: prev.offset,
            });
        }
    }

    if last.offset != max {
        return Err(LayoutError::MaxMismatch {
            declared: max,
            actual: last.offset,
        });
    }

    let mut current: Option<Category> = None;
    for slot in slots {
        if slot.kind == SlotKind::ObjectBase {
            current = Some(slot.category);
        } else if current != Some(slot.category) {
            return Err(LayoutError::OutsideCategory {
                name: slot.name.to_string(),
                base: slot.category.base().name().to_string(),
            });
        }
    }

    Ok(())
}
