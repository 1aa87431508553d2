//! Exporters for counter blocks.
//!
//! - [`table`] prints counters as text tables with `tabled`
//! - [`json`] serializes entries and block snapshots with `serde_json`
//! - [`prometheus`] renders the Prometheus exposition format
//!
//! Each exporter sits behind the feature flag of the same name; `full`
//! enables all three. They share one [`ObserverError`].
//!
//! # Example
//!
//! ```rust
//! use mmsperf::block::PerfBlock;
//! use mmsperf::layout::CounterId;
//! use mmsperf::observers::Result;
//!
//! fn export(block: &PerfBlock) -> Result<()> {
//!     #[cfg(feature = "prometheus")]
//!     {
//!         use mmsperf::observers::prometheus::PrometheusObserver;
//!         println!("{}", PrometheusObserver::new().render_block(block)?);
//!     }
//!
//!     #[cfg(feature = "json")]
//!     {
//!         use mmsperf::observers::json::JsonObserver;
//!         println!("{}", JsonObserver::new().block_to_json(block)?);
//!     }
//!
//!     Ok(())
//! }
//!
//! let block = PerfBlock::new();
//! block.increment(CounterId::CsObjectsPruned).unwrap();
//! export(&block).unwrap();
//! ```

mod error;

pub use error::{ObserverError, Result};

#[cfg(feature = "prometheus")]
pub use error::PrometheusError;

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "prometheus")]
pub mod prometheus;
