use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use quanta::Clock;

use crate::common::RegistryError;
use crate::metric::{Counter, Gauge, Histogram, Meter, Metric, MetricKind, Timer};

struct Inner {
    metrics: RwLock<IndexMap<String, Metric>>,
    clock: Clock,
}

/// A thread-safe map from metric name to metric.
///
/// Cloning a registry is cheap and yields a handle to the same metrics. Accessors such as
/// [`counter`](Registry::counter) follow get-or-register semantics: the first access of a
/// name creates the metric and every later access returns the same instance.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Creates a registry whose meters and timers read time from `clock`.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::new(Inner {
                metrics: RwLock::new(IndexMap::new()),
                clock,
            }),
        }
    }

    pub fn counter(&self, name: &str) -> Result<Arc<Counter>, RegistryError> {
        match self.get_or_register(name, MetricKind::Counter, |_| {
            Metric::Counter(Arc::new(Counter::new()))
        })? {
            Metric::Counter(counter) => Ok(counter),
            other => Err(mismatch(name, other.kind(), MetricKind::Counter)),
        }
    }

    pub fn gauge(&self, name: &str) -> Result<Arc<Gauge>, RegistryError> {
        match self.get_or_register(name, MetricKind::Gauge, |_| {
            Metric::Gauge(Arc::new(Gauge::new()))
        })? {
            Metric::Gauge(gauge) => Ok(gauge),
            other => Err(mismatch(name, other.kind(), MetricKind::Gauge)),
        }
    }

    pub fn meter(&self, name: &str) -> Result<Arc<Meter>, RegistryError> {
        match self.get_or_register(name, MetricKind::Meter, |clock| {
            Metric::Meter(Arc::new(Meter::with_clock(clock.clone())))
        })? {
            Metric::Meter(meter) => Ok(meter),
            other => Err(mismatch(name, other.kind(), MetricKind::Meter)),
        }
    }

    pub fn histogram(&self, name: &str) -> Result<Arc<Histogram>, RegistryError> {
        match self.get_or_register(name, MetricKind::Histogram, |_| {
            Metric::Histogram(Arc::new(Histogram::new()))
        })? {
            Metric::Histogram(histogram) => Ok(histogram),
            other => Err(mismatch(name, other.kind(), MetricKind::Histogram)),
        }
    }

    pub fn timer(&self, name: &str) -> Result<Arc<Timer>, RegistryError> {
        match self.get_or_register(name, MetricKind::Timer, |clock| {
            Metric::Timer(Arc::new(Timer::with_clock(clock.clone())))
        })? {
            Metric::Timer(timer) => Ok(timer),
            other => Err(mismatch(name, other.kind(), MetricKind::Timer)),
        }
    }

    /// Registers an already constructed metric under `name`.
    ///
    /// If the name is taken, the existing metric is kept and returned when it has the same
    /// kind.
    pub fn register(&self, name: &str, metric: Metric) -> Result<Metric, RegistryError> {
        let kind = metric.kind();
        self.get_or_register(name, kind, move |_| metric)
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        self.inner.metrics.read().get(name).cloned()
    }

    /// Removes a metric, returning it if it was registered.
    pub fn unregister(&self, name: &str) -> Option<Metric> {
        self.inner.metrics.write().shift_remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.metrics.read().keys().cloned().collect()
    }

    /// A copy of every registered metric, taken under a single read lock.
    ///
    /// Metrics registered or removed afterwards do not affect the returned list.
    pub fn entries(&self) -> Vec<(String, Metric)> {
        self.inner
            .metrics
            .read()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.metrics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.metrics.read().is_empty()
    }

    fn get_or_register<F>(
        &self,
        name: &str,
        kind: MetricKind,
        create: F,
    ) -> Result<Metric, RegistryError>
    where
        F: FnOnce(&Clock) -> Metric,
    {
        let existing = self.inner.metrics.read().get(name).cloned();
        let metric = match existing {
            Some(metric) => metric,
            None => self
                .inner
                .metrics
                .write()
                .entry(name.to_owned())
                .or_insert_with(|| create(&self.inner.clock))
                .clone(),
        };

        if metric.kind() == kind {
            Ok(metric)
        } else {
            Err(mismatch(name, metric.kind(), kind))
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}

fn mismatch(name: &str, existing: MetricKind, requested: MetricKind) -> RegistryError {
    RegistryError::KindMismatch {
        name: name.to_owned(),
        existing,
        requested,
    }
}

#[cfg(test)]
mod tests {
    use super::Registry;
    use crate::common::RegistryError;
    use crate::metric::{Counter, Metric, MetricKind};
    use std::sync::Arc;

    #[test]
    fn test_get_or_register_returns_same_instance() {
        let registry = Registry::new();
        let first = registry.counter("foo").unwrap();
        first.inc(2);
        let second = registry.counter("foo").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.count(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_kind_mismatch() {
        let registry = Registry::new();
        registry.timer("baz").unwrap();
        let err = registry.counter("baz").unwrap_err();
        assert_eq!(
            err,
            RegistryError::KindMismatch {
                name: "baz".to_owned(),
                existing: MetricKind::Timer,
                requested: MetricKind::Counter,
            }
        );
        assert_eq!(
            err.to_string(),
            "metric `baz` is already registered as a timer, not a counter"
        );
    }

    #[test]
    fn test_entries_are_a_stable_copy() {
        let registry = Registry::new();
        registry.counter("a").unwrap();
        registry.gauge("b").unwrap();
        let entries = registry.entries();

        registry.meter("c").unwrap();
        registry.unregister("a");

        let names: Vec<_> = entries.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(registry.names(), ["b", "c"]);
    }

    #[test]
    fn test_register_existing() {
        let registry = Registry::new();
        let counter = Arc::new(Counter::new());
        registry
            .register("hits", Metric::Counter(counter.clone()))
            .unwrap();
        registry.counter("hits").unwrap().inc(1);
        assert_eq!(counter.count(), 1);
        assert!(registry.get("hits").is_some());
        assert!(registry.get("misses").is_none());
    }
}
