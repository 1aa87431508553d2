//! # mmsperf - synchronization service performance counters
//!
//! The synchronization service publishes its performance counters as one
//! flat data block. Every counter lives at a fixed, even offset between
//! `0` and [`PERF_MAX_COUNTER`](layout::offsets::PERF_MAX_COUNTER), grouped
//! into four categories:
//!
//! | Category | Base | Offsets |
//! |----------|------|---------|
//! | connector space | `PRFOBJ_MMS_CS` | 0 - 22 |
//! | management agent | `PRFOBJ_MMS_MA` | 24 - 40 |
//! | synchronization engine | `PRFOBJ_MMS_SE` | 42 - 46 |
//! | holistic sync | `PRFOBJ_MMS_HS` | 48 - 110 |
//!
//! This crate carries that table and the block it indexes:
//!
//! - [`layout`]: the offset constants, [`CounterId`](layout::CounterId) and
//!   layout validation
//! - [`header`]: parse, render and check the C `#define` header
//! - [`block`]: [`PerfBlock`](block::PerfBlock), one live counter per slot
//! - [`instances`]: one block per named instance
//! - [`counters`]: the sharded counter types behind each slot
//! - [`observers`]: table, JSON and Prometheus exporters
//!
//! ## Sharded counters
//!
//! Each live slot is a counter sharded across 64 cache-padded atomics.
//! Every thread is assigned a shard through a `thread_local!` index, so
//! concurrent updates rarely touch the same cache line. Updates use
//! `Ordering::Relaxed`; reads sum every shard.
//!
//! ## Quick start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use mmsperf::block::PerfBlock;
//! use mmsperf::counters::CounterValue;
//! use mmsperf::layout::CounterId;
//!
//! let block = PerfBlock::new();
//!
//! // counters feed their paired rate slot too
//! block.add(CounterId::MaObjectsImported, 250).unwrap();
//!
//! // timers record elapsed time when the guard drops
//! {
//!     let _t = block.start_timer(CounterId::HsStageTimer).unwrap();
//! }
//! block.record(CounterId::HsRetryTimer, Duration::from_millis(3)).unwrap();
//!
//! assert_eq!(block.value_at(26).unwrap(), Some(CounterValue::Unsigned(250)));
//! ```
//!
//! ## Configuration
//!
//! [`PerfConfig`](config::PerfConfig) selects the live categories, the
//! instance name and the timer unit. It can be read from `MMSPERF_CATEGORIES`,
//! `MMSPERF_INSTANCE` and `MMSPERF_TIMER_UNIT`:
//!
//! ```rust
//! use mmsperf::block::PerfBlock;
//! use mmsperf::config::PerfConfig;
//!
//! let block = PerfBlock::with_config(PerfConfig::from_env().unwrap_or_default());
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `table` | [`observers::table`] |
//! | `serde` | `Serialize`/`Deserialize` derives and [`snapshot`] |
//! | `json` | [`observers::json`] (implies `serde`) |
//! | `prometheus` | [`observers::prometheus`] |
//! | `full` | all of the above |
//!
//! Logging goes through `tracing`. The crate never installs a subscriber.

pub mod adapters;
pub mod block;
pub mod config;
pub mod counters;
pub mod error;
pub mod header;
pub mod instances;
pub mod layout;
pub mod observers;

#[cfg(feature = "serde")]
pub mod snapshot;

pub use block::PerfBlock;
pub use error::{PerfError, Result};
pub use layout::{Category, CounterId};
