//! Unified error type for all observers.
//!
//! Every observer returns [`Result`], so callers can switch output formats
//! without touching their error handling.

use thiserror::Error;

/// Unified error type for all observer operations.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "prometheus")]
    #[error("prometheus error: {0}")]
    Prometheus(#[from] PrometheusError),

    #[error("utf8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic metric error.
    #[error("metric error: {0}")]
    Metric(String),
}

/// Result type for observer operations.
pub type Result<T> = std::result::Result<T, ObserverError>;

/// Failures specific to the Prometheus observer.
#[cfg(feature = "prometheus")]
#[derive(Debug, Error)]
pub enum PrometheusError {
    /// Creating or registering a metric failed.
    #[error("metric error: {0}")]
    MetricError(String),

    #[error("encode error: {0}")]
    EncodeError(String),

    #[error(transparent)]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

#[cfg(feature = "prometheus")]
impl From<prometheus::Error> for PrometheusError {
    fn from(err: prometheus::Error) -> Self {
        PrometheusError::MetricError(err.to_string())
    }
}

#[cfg(feature = "prometheus")]
impl From<prometheus::Error> for ObserverError {
    fn from(err: prometheus::Error) -> Self {
        ObserverError::Prometheus(PrometheusError::from(err))
    }
}
