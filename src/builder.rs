use std::future::Future;
use std::io;
use std::pin::Pin;
use std::thread;
use std::time::Duration;

use metrics_util::{parse_quantiles, Quantile};
use quanta::Clock;
use tokio::runtime;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::common::BuildError;
use crate::recorder::StatsdRecorder;
use crate::registry::Registry;
use crate::reporter::{Inner, Reporter, StatType};
use crate::transport::DEFAULT_MAX_PACKET_SIZE;

type ExporterFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'static>>;

const DEFAULT_PERCENTILES: [f64; 5] = [0.5, 0.75, 0.95, 0.99, 0.999];

#[derive(Clone)]
enum ExporterConfig {
    PushGateway { endpoint: String, interval: Duration },
    Unconfigured,
}

/// Builder for creating and installing a StatsD reporter.
pub struct StatsdBuilder {
    exporter_config: ExporterConfig,
    percentiles: Vec<Quantile>,
    duration_unit: Duration,
    prefix: Option<String>,
    max_packet_size: usize,
    stat_type: StatType,
    registry: Option<Registry>,
    clock: Option<Clock>,
}

impl StatsdBuilder {
    /// Creates a new [`StatsdBuilder`].
    pub fn new() -> Self {
        Self {
            exporter_config: ExporterConfig::Unconfigured,
            percentiles: parse_quantiles(&DEFAULT_PERCENTILES),
            duration_unit: Duration::from_millis(1),
            prefix: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            stat_type: StatType::default(),
            registry: None,
            clock: None,
        }
    }

    /// Configures the reporter to push the registry to a StatsD agent every `interval`.
    ///
    /// The endpoint is a `host:port` pair. It is resolved again on every flush, so the host
    /// does not need to be resolvable yet.
    ///
    /// ## Errors
    ///
    /// If the endpoint has no port or the interval is zero, an error variant will be returned
    /// describing the error.
    pub fn with_push_gateway<T>(
        mut self,
        endpoint: T,
        interval: Duration,
    ) -> Result<Self, BuildError>
    where
        T: Into<String>,
    {
        let endpoint = endpoint.into();
        match endpoint.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => (),
            _ => return Err(BuildError::InvalidPushGatewayEndpoint(endpoint)),
        }
        if interval.is_zero() {
            return Err(BuildError::ZeroFlushInterval);
        }

        self.exporter_config = ExporterConfig::PushGateway { endpoint, interval };
        Ok(self)
    }

    /// Sets the percentiles reported for histograms and timers, in the given order.
    ///
    /// Each percentile is a quantile strictly between 0 and 1, so 0.99 is the 99th
    /// percentile and is reported as `<name>.99-percentile`.
    ///
    /// Defaults to 0.5, 0.75, 0.95, 0.99 and 0.999.
    ///
    /// ## Errors
    ///
    /// If `percentiles` is empty or holds a value outside `(0, 1)`, an error variant will be
    /// thrown.
    pub fn set_percentiles(mut self, percentiles: &[f64]) -> Result<Self, BuildError> {
        if percentiles.is_empty() {
            return Err(BuildError::EmptyPercentiles);
        }
        if let Some(&p) = percentiles.iter().find(|&&p| !(p > 0.0 && p < 1.0)) {
            return Err(BuildError::InvalidPercentile(p));
        }

        self.percentiles = parse_quantiles(percentiles);
        Ok(self)
    }

    /// Sets the unit timer values are reported in.
    ///
    /// Defaults to milliseconds, so a 5 second timing is reported as `5000`.
    ///
    /// ## Errors
    ///
    /// If `unit` is zero, an error variant will be thrown.
    pub fn set_duration_unit(mut self, unit: Duration) -> Result<Self, BuildError> {
        if unit.is_zero() {
            return Err(BuildError::ZeroDurationUnit);
        }
        self.duration_unit = unit;
        Ok(self)
    }

    /// Sets the maximum size of packets going out to the agent.
    ///
    /// Defaults to 1432 bytes
    pub fn set_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Sets how rate and statistic lines are typed. Defaults to [`StatType::Untyped`].
    pub fn set_stat_type(mut self, stat_type: StatType) -> Self {
        self.stat_type = stat_type;
        self
    }

    /// Adds a global prefix for every metric name.
    ///
    /// Its intended use is to introduce a configurable namespace for every metric generated
    /// by the application such that different deployments can operate on their own family of
    /// metrics without overlap. An empty prefix is the same as no prefix.
    #[must_use]
    pub fn set_global_prefix<P>(mut self, prefix: P) -> Self
    where
        P: Into<String>,
    {
        let prefix = crate::formatting::sanitize_metric_name(&prefix.into());
        self.prefix = Some(prefix).filter(|p| !p.is_empty());
        self
    }

    /// Reports an existing registry instead of a new, empty one.
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the reporter, spawns its flush loop and installs a [`StatsdRecorder`] over the
    /// same registry as the global [`metrics`] recorder.
    ///
    /// When called from within a Tokio runtime, the flush loop is spawned directly into the
    /// runtime. Otherwise, a new single-threaded Tokio runtime is created on a background
    /// thread, and the loop is spawned there.
    ///
    /// ## Errors
    ///
    /// If there is an error while either building the reporter, or installing the recorder,
    /// an error variant will be returned describing the error.
    pub fn install(self) -> Result<ReporterHandle, BuildError> {
        let reporter = self.build()?;
        let registry = reporter.registry().clone();
        let token = CancellationToken::new();
        let exporter = exporter_future(reporter, token.clone());

        let current = runtime::Handle::try_current().ok();
        let runtime = match current {
            Some(_) => None,
            None => Some(
                runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?,
            ),
        };

        // nothing is spawned until the recorder is in place
        metrics::set_global_recorder(StatsdRecorder::new(registry.clone()))
            .map_err(|_| BuildError::FailedToSetGlobalRecorder)?;

        if let Some(handle) = current {
            handle.spawn(exporter);
        } else if let Some(runtime) = runtime {
            thread::Builder::new()
                .name("metrics-reporter-statsd".to_owned())
                .spawn(move || runtime.block_on(exporter))
                .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;
        }

        Ok(ReporterHandle { registry, token })
    }

    /// Builds the reporter and returns it without starting it.
    ///
    /// In most cases, users should prefer [`install`][StatsdBuilder::install]. If a caller needs
    /// to schedule the flush loop in a particular way, [`Reporter::run`] gives the flexibility
    /// to do so.
    ///
    /// ## Errors
    ///
    /// If no push gateway was configured, an error variant will be returned.
    pub fn build(self) -> Result<Reporter, BuildError> {
        let ExporterConfig::PushGateway { endpoint, interval } = self.exporter_config.clone()
        else {
            return Err(BuildError::MissingExporterConfiguration);
        };
        let max_packet_size = self.max_packet_size;

        Ok(Reporter::new(
            self.build_inner(),
            endpoint,
            interval,
            max_packet_size,
        ))
    }

    /// Builds a [`metrics`] recorder over the configured registry, without any reporter.
    pub fn build_recorder(self) -> StatsdRecorder {
        StatsdRecorder::new(self.build_inner().registry)
    }

    #[cfg(test)]
    pub(crate) fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    fn build_inner(self) -> Inner {
        let registry = match (self.registry, self.clock) {
            (Some(registry), _) => registry,
            (None, Some(clock)) => Registry::with_clock(clock),
            (None, None) => Registry::new(),
        };

        Inner {
            prefix: self.prefix,
            registry,
            percentiles: self.percentiles,
            duration_unit: self.duration_unit,
            stat_type: self.stat_type,
        }
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder::new()
    }
}

fn exporter_future(reporter: Reporter, token: CancellationToken) -> ExporterFuture {
    Box::pin(async move {
        let result = reporter.run(token).await;
        if let Err(e) = &result {
            error!("statsd reporter stopped: {:?}", e);
        }
        result
    })
}

/// Handle to an installed reporter.
///
/// Dropping the handle leaves the reporter running for the life of the process.
#[derive(Debug, Clone)]
pub struct ReporterHandle {
    registry: Registry,
    token: CancellationToken,
}

impl ReporterHandle {
    /// The registry flushed by the reporter, also fed by the global [`metrics`] recorder.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Stops the flush loop once the flush in progress, if any, has completed.
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}
