//! Prometheus observer built on the official `prometheus` crate.
//!
//! [`PrometheusObserver`] turns [`Observable`] counters into metric
//! families of a fresh [`Registry`] and encodes them with the
//! [`TextEncoder`]. Entries sharing a name become one family: the three
//! entries of a timer are one family labelled by `stat`, and the same slot
//! across several instances is one family labelled by `instance`.
//!
//! # Feature Flag
//!
//! This module requires the `prometheus` feature:
//!
//! ```toml
//! [dependencies]
//! mmsperf = { version = "0.1", features = ["prometheus"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use mmsperf::block::PerfBlock;
//! use mmsperf::layout::CounterId;
//! use mmsperf::observers::prometheus::PrometheusObserver;
//!
//! let block = PerfBlock::new();
//! block.add(CounterId::MaObjectsImported, 12).unwrap();
//!
//! let output = PrometheusObserver::new()
//!     .with_namespace("aadsync")
//!     .render_block(&block)
//!     .unwrap();
//!
//! assert!(output.contains("aadsync_MMSPERF_MA_OBJECTS_IMPORTED 12"));
//! ```
//!
//! Help text defaults to the slot description, and can be overridden per
//! metric:
//!
//! ```rust
//! use mmsperf::observers::prometheus::{MetricConfig, MetricType, PrometheusObserver};
//!
//! let observer = PrometheusObserver::new()
//!     .with_const_label("host", "sync01")
//!     .with_metric_config("MMSPERF_CS_PRUNE_RECURSION_LEVEL", MetricConfig {
//!         metric_type: Some(MetricType::Gauge),
//!         help: Some("Current prune depth".into()),
//!         ..Default::default()
//!     });
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use prometheus::{
    CounterVec, Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::block::PerfBlock;
use crate::counters::{CounterValue, MetricKind, Observable, ObservableEntry};
use crate::instances::InstanceSet;
use crate::layout::CounterId;
use crate::observers::{PrometheusError, Result};

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetricType {
    /// Only ever goes up.
    #[default]
    Counter,
    /// Can go up and down.
    Gauge,
}

impl From<MetricKind> for MetricType {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricType::Counter,
            MetricKind::Gauge => MetricType::Gauge,
        }
    }
}

/// Configuration for a specific metric.
#[derive(Debug, Clone, Default)]
pub struct MetricConfig {
    /// Overrides the kind reported by the counter.
    pub metric_type: Option<MetricType>,
    /// Help text describing the metric.
    pub help: Option<String>,
    /// Constant labels specific to this metric.
    pub labels: HashMap<String, String>,
}

/// Observer that exports counters in the Prometheus text format.
pub struct PrometheusObserver {
    registry: Registry,
    namespace: Option<String>,
    subsystem: Option<String>,
    const_labels: HashMap<String, String>,
    metric_configs: HashMap<String, MetricConfig>,
}

impl Default for PrometheusObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusObserver {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Uses `registry` for [`register`](Self::register). Rendering always
    /// goes through a fresh registry.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            namespace: None,
            subsystem: None,
            const_labels: HashMap::new(),
            metric_configs: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prefix joined to every metric name with an underscore.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Placed between the namespace and the metric name.
    pub fn with_subsystem(mut self, subsystem: &str) -> Self {
        self.subsystem = Some(subsystem.to_string());
        self
    }

    /// Adds a label to every metric.
    pub fn with_const_label(mut self, name: &str, value: &str) -> Self {
        self.const_labels
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_metric_config(mut self, name: &str, config: MetricConfig) -> Self {
        self.metric_configs.insert(name.to_string(), config);
        self
    }

    pub fn with_type(mut self, name: &str, metric_type: MetricType) -> Self {
        self.metric_configs
            .entry(name.to_string())
            .or_default()
            .metric_type = Some(metric_type);
        self
    }

    pub fn with_help(mut self, name: &str, help: &str) -> Self {
        self.metric_configs
            .entry(name.to_string())
            .or_default()
            .help = Some(help.to_string());
        self
    }

    /// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    fn sanitize_name(name: &str) -> String {
        let mut result = String::with_capacity(name.len());
        for c in name.chars() {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                result.push(c);
            } else if c == '-' || c == '.' || c == ' ' {
                result.push('_');
            }
        }
        if result.is_empty() {
            result.push_str("unnamed");
        }
        if result.starts_with(|c: char| c.is_ascii_digit()) {
            result.insert(0, '_');
        }
        result
    }

    fn build_full_name(&self, name: &str) -> String {
        let sanitized = Self::sanitize_name(name);
        match (&self.namespace, &self.subsystem) {
            (Some(ns), Some(ss)) => format!("{}_{}_{}", ns, ss, sanitized),
            (Some(ns), None) => format!("{}_{}", ns, sanitized),
            (None, Some(ss)) => format!("{}_{}", ss, sanitized),
            (None, None) => sanitized,
        }
    }

    fn help_for(&self, raw_name: &str) -> String {
        self.metric_configs
            .get(raw_name)
            .and_then(|c| c.help.clone())
            .or_else(|| {
                raw_name
                    .parse::<CounterId>()
                    .ok()
                    .and_then(CounterId::description)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("{} metric", raw_name))
    }

    /// Renders counters to the Prometheus exposition format.
    pub fn render<'a>(&self, counters: impl Iterator<Item = &'a dyn Observable>) -> Result<String> {
        let entries: Vec<ObservableEntry> = counters.flat_map(|c| c.expand()).collect();
        self.render_entries(entries)
    }

    /// Like [`render`](Self::render), resetting counters that support it.
    pub fn render_and_reset<'a>(
        &self,
        counters: impl Iterator<Item = &'a dyn Observable>,
    ) -> Result<String> {
        let entries: Vec<ObservableEntry> = counters.flat_map(|c| c.expand_and_reset()).collect();
        self.render_entries(entries)
    }

    /// Renders counters to bytes, for HTTP responses.
    pub fn render_bytes<'a>(
        &self,
        counters: impl Iterator<Item = &'a dyn Observable>,
    ) -> Result<Vec<u8>> {
        Ok(self.render(counters)?.into_bytes())
    }

    /// Renders every live slot of `block`.
    pub fn render_block(&self, block: &PerfBlock) -> Result<String> {
        self.render_entries(block.entries())
    }

    /// Renders all instances as one output, one family per slot name.
    pub fn render_instances(&self, set: &InstanceSet) -> Result<String> {
        self.render_entries(set.collect())
    }

    /// Registers the current values of `counters` in the observer's own
    /// registry. Registering the same name twice fails.
    pub fn register<'a>(&self, counters: impl Iterator<Item = &'a dyn Observable>) -> Result<()> {
        let entries: Vec<ObservableEntry> = counters.flat_map(|c| c.expand()).collect();
        self.register_entries(&self.registry, entries)
    }

    /// Encodes the observer's own registry.
    pub fn gather(&self) -> Result<String> {
        encode_registry(&self.registry)
    }

    /// Renders pre-expanded entries through a fresh registry.
    pub fn render_entries(&self, entries: Vec<ObservableEntry>) -> Result<String> {
        let registry = Registry::new();
        self.register_entries(&registry, entries)?;
        encode_registry(&registry)
    }

    fn register_entries(&self, registry: &Registry, entries: Vec<ObservableEntry>) -> Result<()> {
        let mut families: BTreeMap<&'static str, Vec<ObservableEntry>> = BTreeMap::new();
        for entry in entries {
            let raw_name = if entry.name.is_empty() {
                "unnamed"
            } else {
                entry.name
            };
            families.entry(raw_name).or_default().push(entry);
        }

        for (raw_name, entries) in families {
            self.register_family(registry, raw_name, &entries)?;
        }
        Ok(())
    }

    fn register_family(
        &self,
        registry: &Registry,
        raw_name: &str,
        entries: &[ObservableEntry],
    ) -> Result<()> {
        let config = self.metric_configs.get(raw_name);
        let metric_type = config
            .and_then(|c| c.metric_type)
            .unwrap_or_else(|| MetricType::from(entries[0].metric_kind));

        let mut const_labels = self.const_labels.clone();
        if let Some(cfg) = config {
            const_labels.extend(cfg.labels.clone());
        }
        let opts = Opts::new(self.build_full_name(raw_name), self.help_for(raw_name))
            .const_labels(const_labels);

        let label_names: Vec<&str> = entries
            .iter()
            .flat_map(|e| e.labels.iter().map(|(k, _)| k.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let label_values = |entry: &ObservableEntry| -> Vec<String> {
            label_names
                .iter()
                .map(|name| {
                    entry
                        .labels
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                })
                .collect()
        };
        let has_float = entries
            .iter()
            .any(|e| matches!(e.value, CounterValue::Float(_)));

        match (metric_type, has_float) {
            (MetricType::Counter, false) => {
                let counter = IntCounterVec::new(opts, &label_names)?;
                for entry in entries {
                    let values = label_values(entry);
                    counter
                        .get_metric_with_label_values(&as_strs(&values))?
                        .inc_by(entry.value.as_u64());
                }
                registry.register(Box::new(counter))?;
            }
            (MetricType::Counter, true) => {
                let counter = CounterVec::new(opts, &label_names)?;
                for entry in entries {
                    let values = label_values(entry);
                    counter
                        .get_metric_with_label_values(&as_strs(&values))?
                        .inc_by(entry.value.as_f64().max(0.0));
                }
                registry.register(Box::new(counter))?;
            }
            (MetricType::Gauge, false) => {
                let gauge = IntGaugeVec::new(opts, &label_names)?;
                for entry in entries {
                    let values = label_values(entry);
                    gauge
                        .get_metric_with_label_values(&as_strs(&values))?
                        .set(entry.value.as_i64());
                }
                registry.register(Box::new(gauge))?;
            }
            (MetricType::Gauge, true) => {
                let gauge = GaugeVec::new(opts, &label_names)?;
                for entry in entries {
                    let values = label_values(entry);
                    gauge
                        .get_metric_with_label_values(&as_strs(&values))?
                        .set(entry.value.as_f64());
                }
                registry.register(Box::new(gauge))?;
            }
        }
        Ok(())
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn encode_registry(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| PrometheusError::EncodeError(e.to_string()))?;
    Ok(String::from_utf8(buffer).map_err(PrometheusError::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerfConfig;
    use crate::counters::monotone::Monotone;
    use crate::counters::rate::Rate;
    use crate::counters::signed::Signed;
    use crate::counters::timer::Timer;
    use crate::layout::Category;
    use std::time::Duration;

    #[test]
    fn test_render_empty() {
        let counters: Vec<&dyn Observable> = vec![];
        let output = PrometheusObserver::new()
            .render(counters.into_iter())
            .unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_render_counter() {
        let counter = Monotone::new().with_name("MMSPERF_CS_OBJECTS_PRUNED");
        counter.add(42);

        let counters: Vec<&dyn Observable> = vec![&counter];
        let output = PrometheusObserver::new()
            .render(counters.into_iter())
            .unwrap();
        assert!(output.contains("# TYPE MMSPERF_CS_OBJECTS_PRUNED counter"));
        assert!(output.contains("MMSPERF_CS_OBJECTS_PRUNED 42"));
    }

    #[test]
    fn test_help_defaults_to_description() {
        let timer = Timer::new().with_name("MMSPERF_HS_RETRY_TIMER");
        let counters: Vec<&dyn Observable> = vec![&timer];
        let output = PrometheusObserver::new()
            .render(counters.into_iter())
            .unwrap();
        assert!(output.contains("# HELP MMSPERF_HS_RETRY_TIMER Time in retry"));
    }

    #[test]
    fn test_help_fallback_and_override() {
        let a = Monotone::new().with_name("custom_total");
        let b = Monotone::new().with_name("other_total");
        let counters: Vec<&dyn Observable> = vec![&a, &b];
        let output = PrometheusObserver::new()
            .with_help("other_total", "Something else")
            .render(counters.into_iter())
            .unwrap();
        assert!(output.contains("# HELP custom_total custom_total metric"));
        assert!(output.contains("# HELP other_total Something else"));
    }

    #[test]
    fn test_namespace_and_subsystem() {
        let counter = Monotone::new().with_name("imports");
        counter.add(1);
        let counters: Vec<&dyn Observable> = vec![&counter];
        let output = PrometheusObserver::new()
            .with_namespace("aadsync")
            .with_subsystem("ma")
            .render(counters.into_iter())
            .unwrap();
        assert!(output.contains("aadsync_ma_imports 1"));
    }

    #[test]
    fn test_const_labels() {
        let counter = Monotone::new().with_name("imports");
        counter.add(3);
        let counters: Vec<&dyn Observable> = vec![&counter];
        let output = PrometheusObserver::new()
            .with_const_label("host", "sync01")
            .render(counters.into_iter())
            .unwrap();
        assert!(output.contains(r#"imports{host="sync01"} 3"#));
    }

    #[test]
    fn test_signed_is_gauge() {
        let level = Signed::new().with_name("level");
        level.sub(2);
        let counters: Vec<&dyn Observable> = vec![&level];
        let output = PrometheusObserver::new()
            .render(counters.into_iter())
            .unwrap();
        assert!(output.contains("# TYPE level gauge"));
        assert!(output.contains("level -2"));
    }

    #[test]
    fn test_type_override() {
        let counter = Monotone::new().with_name("depth");
        counter.add(5);
        let counters: Vec<&dyn Observable> = vec![&counter];
        let output = PrometheusObserver::new()
            .with_type("depth", MetricType::Gauge)
            .render(counters.into_iter())
            .unwrap();
        assert!(output.contains("# TYPE depth gauge"));
    }

    #[test]
    fn test_rate_is_float_gauge() {
        let rate = Rate::new().with_name("per_sec");
        let counters: Vec<&dyn Observable> = vec![&rate];
        let output = PrometheusObserver::new()
            .render(counters.into_iter())
            .unwrap();
        assert!(output.contains("# TYPE per_sec gauge"));
        assert!(output.contains("per_sec 0"));
    }

    #[test]
    fn test_timer_family() {
        let timer = Timer::new().with_name("MMSPERF_HS_STAGE_TIMER");
        timer.record(Duration::from_micros(10));
        timer.record(Duration::from_micros(30));
        let counters: Vec<&dyn Observable> = vec![&timer];
        let output = PrometheusObserver::new()
            .render(counters.into_iter())
            .unwrap();
        assert_eq!(output.matches("# TYPE MMSPERF_HS_STAGE_TIMER").count(), 1);
        assert!(output.contains(r#"MMSPERF_HS_STAGE_TIMER{stat="avg"} 20"#));
        assert!(output.contains(r#"MMSPERF_HS_STAGE_TIMER{stat="total"} 40"#));
        assert!(output.contains(r#"MMSPERF_HS_STAGE_TIMER{stat="count"} 2"#));
    }

    #[test]
    fn test_render_and_reset() {
        let timer = Timer::new().with_name("t");
        timer.record(Duration::from_micros(5));
        let counters: Vec<&dyn Observable> = vec![&timer];
        let observer = PrometheusObserver::new();
        let output = observer.render_and_reset(counters.into_iter()).unwrap();
        assert!(output.contains(r#"t{stat="count"} 1"#));
        assert_eq!(timer.count(), 0);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(PrometheusObserver::sanitize_name("a.b-c d"), "a_b_c_d");
        assert_eq!(PrometheusObserver::sanitize_name("9lives"), "_9lives");
        assert_eq!(PrometheusObserver::sanitize_name(""), "unnamed");
        assert_eq!(
            PrometheusObserver::sanitize_name("MMSPERF_MA_OBJECTS_IMPORTED"),
            "MMSPERF_MA_OBJECTS_IMPORTED"
        );
    }

    #[test]
    fn test_unnamed_counter() {
        let counter = Monotone::new();
        let counters: Vec<&dyn Observable> = vec![&counter];
        let output = PrometheusObserver::new()
            .render(counters.into_iter())
            .unwrap();
        assert!(output.contains("unnamed 0"));
    }

    #[test]
    fn test_render_instances() {
        let set = InstanceSet::with_config(
            PerfConfig::new().with_categories([Category::SyncEngine]),
        );
        set.get_or_create("ADMA")
            .add(CounterId::SeRetrysProcessed, 4)
            .unwrap();
        set.get_or_create("AADMA");

        let output = PrometheusObserver::new().render_instances(&set).unwrap();
        assert_eq!(
            output.matches("# TYPE MMSPERF_SE_RETRYS_PROCESSED counter").count(),
            1
        );
        assert!(output.contains(r#"MMSPERF_SE_RETRYS_PROCESSED{instance="ADMA"} 4"#));
        assert!(output.contains(r#"MMSPERF_SE_RETRYS_PROCESSED{instance="AADMA"} 0"#));
    }

    #[test]
    fn test_register_and_gather() {
        let counter = Monotone::new().with_name("registered");
        counter.add(7);
        let counters: Vec<&dyn Observable> = vec![&counter];
        let observer = PrometheusObserver::new();
        observer.register(counters.iter().copied()).unwrap();
        assert!(observer.gather().unwrap().contains("registered 7"));
        assert!(observer.register(counters.into_iter()).is_err());
    }

    #[test]
    fn test_render_bytes() {
        let counter = Monotone::new().with_name("bytes");
        let counters: Vec<&dyn Observable> = vec![&counter];
        let bytes = PrometheusObserver::new()
            .render_bytes(counters.into_iter())
            .unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("bytes 0"));
    }
}
