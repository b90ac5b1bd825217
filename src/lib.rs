//! A periodic reporter that flushes an in-process metrics registry to StatsD over UDP.
//!
//! ## Basics
//!
//! `metrics-reporter-statsd` keeps counters, gauges, meters, histograms and timers in a
//! [`Registry`] and, on a fixed interval, renders every one of them as StatsD lines and
//! pushes them to an agent. Metric updates never wait on the network and a failed send
//! never reaches the application.
//!
//! ## Behavior
//!
//! - Counters report the change since the previous flush as `<name>.count:<delta>|c`, and
//!   are reset by the flush
//! - Gauges report their current value as `<name>:<value>|g`
//! - Meters report their cumulative count plus 1, 5 and 15 minute moving rates and the mean
//!   rate, in events per second
//! - Histograms and timers report their cumulative count, min, max, mean, standard deviation
//!   and the configured percentiles as `<name>.99-percentile`; timers are scaled to the
//!   configured duration unit and also report their rates
//! - Rates and statistics are written without a type unless configured otherwise, see
//!   [`StatType`]
//! - A flush is split into datagrams on line boundaries, never mid-line
//!
//! ## Usage
//!
//! ```ignore
//! let handle = StatsdBuilder::new()
//!     .with_push_gateway("localhost:8125", Duration::from_secs(10))?
//!     .set_global_prefix("my_app")
//!     .set_percentiles(&[0.5, 0.99])?
//!     .install()?;
//!
//! // Metrics recorded through the `metrics` facade land in the same registry ...
//! metrics::counter!("requests").increment(1);
//!
//! // ... as do metrics registered directly.
//! handle.registry().timer("db.query")?.update(Duration::from_millis(12));
//!
//! // Stops after the flush in progress, if any.
//! handle.shutdown();
//! ```
//!
//! Callers that schedule the loop themselves can use [`StatsdBuilder::build`] and drive
//! [`Reporter::run`] with their own [`CancellationToken`](tokio_util::sync::CancellationToken).
mod common;
pub use self::common::{BuildError, RegistryError};

mod builder;
pub use self::builder::{ReporterHandle, StatsdBuilder};

mod ewma;
pub use self::ewma::MeterSnapshot;

pub mod formatting;

mod metric;
pub use self::metric::{Counter, Gauge, Histogram, Meter, Metric, MetricKind, Timer};

mod recorder;
pub use self::recorder::StatsdRecorder;

mod registry;
pub use self::registry::Registry;

mod reporter;
pub use self::reporter::{Reporter, StatType};

mod sample;

mod snapshot;
pub use self::snapshot::{DistributionSnapshot, Snapshot};

mod transport;
pub use self::transport::UdpTransport;
