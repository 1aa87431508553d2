//! Wrappers that extend counters while keeping them [`Observable`].
//!
//! [`Labeled`] attaches key-value labels to any counter. Every slot of a
//! [`PerfBlock`](crate::block::PerfBlock) is wrapped in one, which is how
//! the `instance` label reaches the exporters.
//!
//! ```rust
//! use mmsperf::adapters::Labeled;
//! use mmsperf::counters::monotone::Monotone;
//! use mmsperf::counters::Observable;
//!
//! let imported = Labeled::new(Monotone::new().with_name("MMSPERF_MA_OBJECTS_IMPORTED"))
//!     .with_label("instance", "ADMA");
//! imported.add(3);
//!
//! assert_eq!(imported.labels(), &[("instance".to_string(), "ADMA".to_string())]);
//! ```
//!
//! [`Observable`]: crate::counters::Observable

mod labeled;

pub use labeled::Labeled;
