use thiserror::Error as ThisError;

use crate::metric::MetricKind;

/// Errors that could occur while building or installing a StatsD reporter.
#[derive(Debug, ThisError)]
pub enum BuildError {
    /// There was an issue when creating the necessary Tokio runtime to launch the exporter.
    #[error("failed to create Tokio runtime for exporter: {0}")]
    FailedToCreateRuntime(String),

    /// There was an issue when creating the global recorder.
    #[error("failed to install exporter as global recorder: a recorder is already installed")]
    FailedToSetGlobalRecorder,

    /// The given push gateway endpoint is not a valid `host:port` address.
    #[error("push gateway endpoint is not valid: {0}")]
    InvalidPushGatewayEndpoint(String),

    /// No push gateway was configured before building the reporter.
    #[error("no push gateway was configured")]
    MissingExporterConfiguration,

    /// The flush interval must be greater than zero.
    #[error("flush interval must be greater than zero")]
    ZeroFlushInterval,

    /// The duration unit used to scale timer values must be greater than zero.
    #[error("duration unit must be greater than zero")]
    ZeroDurationUnit,

    /// Percentiles must not be empty.
    #[error("percentiles cannot be empty")]
    EmptyPercentiles,

    /// A percentile was outside of the open interval `(0, 1)`.
    #[error("percentile {0} must be strictly between 0 and 1")]
    InvalidPercentile(f64),
}

/// Errors returned by [`Registry`](crate::Registry) lookups.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum RegistryError {
    /// A metric with this name already exists with a different kind.
    #[error("metric `{name}` is already registered as a {existing}, not a {requested}")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },
}
