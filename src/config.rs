//! Block configuration.
//!
//! A [`PerfConfig`] selects which categories a [`PerfBlock`](crate::block::PerfBlock)
//! records, the instance name attached to its entries, and the unit timer
//! values are reported in. It can be built in code, read from the
//! environment, or deserialized with the `serde` feature.
//!
//! | Variable | Meaning | Example |
//! |---|---|---|
//! | `MMSPERF_CATEGORIES` | enabled categories, comma separated | `ma,hs` or `all` |
//! | `MMSPERF_INSTANCE` | instance label value | `ADMA` |
//! | `MMSPERF_TIMER_UNIT` | `us` or `ms` | `ms` |

use std::fmt;
use std::str::FromStr;

use crate::error::{PerfError, Result};
use crate::layout::Category;

pub const CATEGORIES_ENV: &str = "MMSPERF_CATEGORIES";
pub const INSTANCE_ENV: &str = "MMSPERF_INSTANCE";
pub const TIMER_UNIT_ENV: &str = "MMSPERF_TIMER_UNIT";

/// Unit timer values are reported in. Storage is always microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TimerUnit {
    #[default]
    Micros,
    Millis,
}

impl TimerUnit {
    /// Converts a microsecond value to this unit, truncating.
    #[inline]
    pub const fn scale(self, micros: u64) -> u64 {
        match self {
            TimerUnit::Micros => micros,
            TimerUnit::Millis => micros / 1_000,
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            TimerUnit::Micros => "us",
            TimerUnit::Millis => "ms",
        }
    }
}

impl fmt::Display for TimerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for TimerUnit {
    type Err = PerfError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "us" | "micros" => Ok(TimerUnit::Micros),
            "ms" | "millis" => Ok(TimerUnit::Millis),
            _ => Err(PerfError::InvalidTimerUnit(s.to_string())),
        }
    }
}

/// Configuration of a [`PerfBlock`](crate::block::PerfBlock).
///
/// # Example
///
/// ```rust
/// use mmsperf::config::{PerfConfig, TimerUnit};
/// use mmsperf::layout::Category;
///
/// let config = PerfConfig::new()
///     .with_categories([Category::ManagementAgent])
///     .with_instance("ADMA")
///     .with_timer_unit(TimerUnit::Millis);
///
/// assert!(config.is_enabled(Category::ManagementAgent));
/// assert!(!config.is_enabled(Category::HolisticSync));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PerfConfig {
    /// Categories that record updates.
    pub enabled: Vec<Category>,
    /// Value of the `instance` label, if any.
    pub instance: Option<String>,
    pub timer_unit: TimerUnit,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            enabled: Category::ALL.to_vec(),
            instance: None,
            timer_unit: TimerUnit::default(),
        }
    }
}

impl PerfConfig {
    /// All categories enabled, no instance, microsecond timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the enabled categories.
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.enabled = categories.into_iter().collect();
        self.enabled.sort();
        self.enabled.dedup();
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_timer_unit(mut self, unit: TimerUnit) -> Self {
        self.timer_unit = unit;
        self
    }

    /// Returns `true` if updates to `category` are recorded.
    #[inline]
    pub fn is_enabled(&self, category: Category) -> bool {
        self.enabled.contains(&category)
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, starting from the defaults.
    /// Blank variables count as unset.
    ///
    /// ```rust
    /// use mmsperf::config::{PerfConfig, TimerUnit};
    /// use mmsperf::layout::Category;
    ///
    /// let config = PerfConfig::from_lookup(|key| match key {
    ///     "MMSPERF_CATEGORIES" => Some("cs, se".to_string()),
    ///     "MMSPERF_TIMER_UNIT" => Some("ms".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.enabled, vec![Category::ConnectorSpace, Category::SyncEngine]);
    /// assert_eq!(config.timer_unit, TimerUnit::Millis);
    /// ```
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(CATEGORIES_ENV).filter(|s| !s.trim().is_empty()) {
            config = config.with_categories(parse_categories(&raw)?);
        }
        if let Some(instance) = lookup(INSTANCE_ENV).filter(|s| !s.trim().is_empty()) {
            config.instance = Some(instance.trim().to_string());
        }
        if let Some(unit) = lookup(TIMER_UNIT_ENV).filter(|s| !s.trim().is_empty()) {
            config.timer_unit = unit.parse()?;
        }

        tracing::debug!(
            enabled = ?config.enabled,
            instance = ?config.instance,
            timer_unit = %config.timer_unit,
            "loaded perf config"
        );
        Ok(config)
    }
}

/// Parses a comma separated category list; `all` or `*` selects every category.
fn parse_categories(raw: &str) -> Result<Vec<Category>> {
    let mut categories = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part == "*" || part.eq_ignore_ascii_case("all") {
            return Ok(Category::ALL.to_vec());
        }
        categories.push(part.parse()?);
    }
    Ok(categories)
}
