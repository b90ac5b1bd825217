use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};
use tracing::warn;

use crate::formatting::key_to_name;
use crate::metric;
use crate::registry::Registry;

impl CounterFn for metric::Counter {
    fn increment(&self, value: u64) {
        self.inc(value as i64);
    }

    fn absolute(&self, value: u64) {
        metric::Counter::absolute(self, value);
    }
}

impl GaugeFn for metric::Gauge {
    fn increment(&self, value: f64) {
        metric::Gauge::increment(self, value);
    }

    fn decrement(&self, value: f64) {
        metric::Gauge::decrement(self, value);
    }

    fn set(&self, value: f64) {
        metric::Gauge::set(self, value);
    }
}

impl HistogramFn for metric::Histogram {
    fn record(&self, value: f64) {
        self.update(value);
    }
}

/// A [`metrics`] recorder that registers facade metrics into a [`Registry`].
///
/// Facade counters, gauges and histograms become registry counters, gauges and histograms
/// named after the key, with labels folded into the name. A key whose name is already
/// taken by a metric of another kind is logged and recorded nowhere.
#[derive(Debug, Clone)]
pub struct StatsdRecorder {
    registry: Registry,
}

impl StatsdRecorder {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl From<Registry> for StatsdRecorder {
    fn from(registry: Registry) -> Self {
        StatsdRecorder::new(registry)
    }
}

impl Recorder for StatsdRecorder {
    fn describe_counter(&self, _k: KeyName, _u: Option<Unit>, _d: SharedString) {}
    fn describe_gauge(&self, _k: KeyName, _u: Option<Unit>, _d: SharedString) {}
    fn describe_histogram(&self, _k: KeyName, _u: Option<Unit>, _d: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        match self.registry.counter(&key_to_name(key)) {
            Ok(counter) => Counter::from_arc(counter),
            Err(e) => {
                warn!("cannot record counter: {}", e);
                Counter::noop()
            }
        }
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        match self.registry.gauge(&key_to_name(key)) {
            Ok(gauge) => Gauge::from_arc(gauge),
            Err(e) => {
                warn!("cannot record gauge: {}", e);
                Gauge::noop()
            }
        }
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        match self.registry.histogram(&key_to_name(key)) {
            Ok(histogram) => Histogram::from_arc(histogram),
            Err(e) => {
                warn!("cannot record histogram: {}", e);
                Histogram::noop()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StatsdRecorder;
    use crate::metric::Metric;
    use crate::registry::Registry;

    #[test]
    fn test_facade_metrics_land_in_registry() {
        let registry = Registry::new();
        let recorder = StatsdRecorder::new(registry.clone());

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("requests", "status" => "ok").increment(2);
            metrics::gauge!("queue.depth").set(7.0);
            metrics::histogram!("latency").record(12.0);
        });

        assert_eq!(registry.counter("requests.status_ok").unwrap().count(), 2);
        assert_eq!(registry.gauge("queue.depth").unwrap().value(), 7.0);
        assert_eq!(registry.histogram("latency").unwrap().count(), 1);
    }

    #[test]
    fn test_kind_conflict_is_a_noop() {
        let registry = Registry::new();
        registry.timer("conflict").unwrap();
        let recorder = StatsdRecorder::from(registry.clone());

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("conflict").increment(1);
        });

        assert!(matches!(registry.get("conflict"), Some(Metric::Timer(_))));
    }

    #[test]
    fn test_absolute_counter_reports_growth() {
        let registry = Registry::new();
        let recorder = StatsdRecorder::new(registry.clone());
        let counter = registry.counter("total").unwrap();

        metrics::with_local_recorder(&recorder, || metrics::counter!("total").absolute(10));
        assert_eq!(counter.take(), 10);

        metrics::with_local_recorder(&recorder, || metrics::counter!("total").absolute(15));
        assert_eq!(counter.take(), 5);

        // a lower total, e.g. after the source restarted, adds nothing
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("total").absolute(4);
            metrics::counter!("total").increment(2);
        });
        assert_eq!(counter.take(), 2);
    }
}
