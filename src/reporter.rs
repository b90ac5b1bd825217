use std::io;
use std::time::Duration;

use metrics_util::Quantile;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::ewma::MeterSnapshot;
use crate::formatting::{percentile_suffix, sanitize_metric_name, write_metric_line};
use crate::registry::Registry;
use crate::snapshot::{DistributionSnapshot, Snapshot};
use crate::transport::UdpTransport;

/// How rate and statistic lines are typed on the wire.
///
/// `count` lines always carry `|c` and gauges always carry `|g`; this only affects the
/// derived lines of meters, histograms and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatType {
    /// `name.mean:12.5`
    #[default]
    Untyped,
    /// `name.mean:12.5|g`, for aggregators that reject untyped lines.
    Gauge,
}

impl StatType {
    fn as_type_str(&self) -> Option<&'static str> {
        match self {
            Self::Untyped => None,
            Self::Gauge => Some("g"),
        }
    }
}

pub(crate) struct Inner {
    pub prefix: Option<String>,
    pub registry: Registry,
    pub percentiles: Vec<Quantile>,
    pub duration_unit: Duration,
    pub stat_type: StatType,
}

impl Inner {
    fn render(&self) -> String {
        let mut output = String::new();

        for (name, metric) in self.registry.entries() {
            let snapshot = metric.snapshot(self.duration_unit);
            trace!(metric = name.as_str(), kind = %metric.kind(), "rendering metric");
            self.render_snapshot(&mut output, &sanitize_metric_name(&name), &snapshot);
        }

        output
    }

    fn render_snapshot(&self, output: &mut String, name: &str, snapshot: &Snapshot) {
        match snapshot {
            Snapshot::Counter { delta } => {
                if *delta != 0 {
                    self.write_count(output, name, *delta);
                }
            }
            Snapshot::Gauge { value } => {
                self.write_value(output, name, None, *value, Some("g"));
            }
            Snapshot::Meter(rates) => {
                self.write_count(output, name, rates.count);
                self.write_rates(output, name, rates);
            }
            Snapshot::Histogram(distribution) => {
                self.write_count(output, name, distribution.count());
                self.write_distribution(output, name, distribution);
            }
            Snapshot::Timer {
                distribution,
                rates,
            } => {
                self.write_count(output, name, distribution.count());
                self.write_distribution(output, name, distribution);
                self.write_rates(output, name, rates);
            }
        }
    }

    fn write_count<T: std::fmt::Display>(&self, output: &mut String, name: &str, count: T) {
        write_metric_line(
            output,
            self.prefix.as_deref(),
            name,
            Some("count"),
            count,
            Some("c"),
        );
    }

    fn write_rates(&self, output: &mut String, name: &str, rates: &MeterSnapshot) {
        let stat = self.stat_type.as_type_str();
        self.write_value(output, name, Some("one-minute"), rates.rate1, stat);
        self.write_value(output, name, Some("five-minute"), rates.rate5, stat);
        self.write_value(output, name, Some("fifteen-minute"), rates.rate15, stat);
        self.write_value(output, name, Some("mean-rate"), rates.rate_mean, stat);
    }

    // Nothing but the count is written for an empty distribution.
    fn write_distribution(&self, output: &mut String, name: &str, dist: &DistributionSnapshot) {
        let stat = self.stat_type.as_type_str();
        let stats = [
            ("min", dist.min()),
            ("max", dist.max()),
            ("mean", dist.mean()),
            ("std-dev", dist.stddev()),
        ];
        for (suffix, value) in stats {
            if let Some(value) = value {
                self.write_value(output, name, Some(suffix), value, stat);
            }
        }

        for percentile in &self.percentiles {
            if let Some(value) = dist.quantile(percentile.value()) {
                let suffix = percentile_suffix(percentile.value());
                self.write_value(output, name, Some(&suffix), value, stat);
            }
        }
    }

    fn write_value(
        &self,
        output: &mut String,
        name: &str,
        suffix: Option<&str>,
        value: f64,
        mtype: Option<&str>,
    ) {
        if !value.is_finite() {
            warn!(
                metric = name,
                suffix = suffix.unwrap_or_default(),
                "skipping non-finite value {}",
                value
            );
            return;
        }
        write_metric_line(output, self.prefix.as_deref(), name, suffix, value, mtype);
    }
}

/// Periodically flushes a [`Registry`] to a StatsD endpoint.
///
/// Built by [`StatsdBuilder::build`](crate::StatsdBuilder::build). Use [`run`](Reporter::run)
/// to drive the flush loop on a runtime of your choosing, or [`flush`](Reporter::flush) to
/// push a single batch.
pub struct Reporter {
    inner: Inner,
    endpoint: String,
    interval: Duration,
    max_packet_size: usize,
}

impl Reporter {
    pub(crate) fn new(
        inner: Inner,
        endpoint: String,
        interval: Duration,
        max_packet_size: usize,
    ) -> Self {
        Self {
            inner,
            endpoint,
            interval,
            max_packet_size,
        }
    }

    /// The registry this reporter reads from.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Takes a snapshot of every registered metric and renders it as a StatsD payload.
    ///
    /// Counters are reset by this call, exactly as during a regular flush.
    pub fn render(&self) -> String {
        self.inner.render()
    }

    /// Renders the registry once and sends it through `transport`.
    ///
    /// Transport failures are logged and swallowed, since the next flush is expected to
    /// make up for a lost batch.
    pub async fn flush(&self, transport: &UdpTransport) {
        let output = self.render();
        if output.is_empty() {
            debug!("nothing to flush");
            return;
        }

        if let Err(e) = transport.send(&output).await {
            error!("error sending metrics to statsd at {}: {:?}", self.endpoint, e);
        }
    }

    /// Runs the flush loop until `token` is cancelled.
    ///
    /// The first flush happens one interval after the start. A flush that outlasts the
    /// interval delays the next tick instead of overlapping it, and cancellation is only
    /// observed between flushes.
    ///
    /// ## Errors
    ///
    /// Only fails if the local UDP socket cannot be bound.
    pub async fn run(self, token: CancellationToken) -> io::Result<()> {
        let transport = UdpTransport::bind(self.endpoint.clone(), self.max_packet_size).await?;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!("statsd reporter shutting down");
                    break;
                }
                _ = ticker.tick() => self.flush(&transport).await,
            }
        }

        Ok(())
    }
}
