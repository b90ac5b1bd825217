//! Metric primitives held by a [`Registry`](crate::Registry).
//!
//! Every primitive is safe to update from any thread. Reads used by the reporter go through
//! a single atomic or a single lock per metric, so a snapshot never mixes fields from two
//! different moments.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portable_atomic::{AtomicF64, AtomicI64, AtomicU64, Ordering};
use quanta::Clock;

use crate::ewma::{MeterCore, MeterSnapshot};
use crate::sample::{Reservoir, DEFAULT_RESERVOIR_SIZE};
use crate::snapshot::DistributionSnapshot;

/// The kind of a registered metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Meter,
    Histogram,
    Timer,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Meter => "meter",
            Self::Histogram => "histogram",
            Self::Timer => "timer",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered metric of any kind.
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Meter(Arc<Meter>),
    Histogram(Arc<Histogram>),
    Timer(Arc<Timer>),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Meter(_) => MetricKind::Meter,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Timer(_) => MetricKind::Timer,
        }
    }
}

/// A signed count of events.
///
/// The reporter transmits the change since the previous flush and resets the counter to
/// zero in the same atomic operation.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
    // highest total seen through `absolute`
    last_absolute: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dec(&self, n: i64) {
        self.count.fetch_sub(n, Ordering::Relaxed);
    }

    /// Count accumulated since the last flush.
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    /// Accounts for a monotonic running total kept by the caller.
    ///
    /// Only the growth over the highest total seen so far is added to the pending count, so
    /// a total is never reported twice across flushes. A total lower than a previous one is
    /// ignored.
    pub(crate) fn absolute(&self, total: u64) {
        let previous = self.last_absolute.fetch_max(total, Ordering::AcqRel);
        if total > previous {
            self.inc((total - previous) as i64);
        }
    }

    /// Returns the pending count and resets it to zero.
    pub(crate) fn take(&self) -> i64 {
        self.count.swap(0, Ordering::AcqRel)
    }
}

/// The last value set.
#[derive(Debug)]
pub struct Gauge {
    value: AtomicF64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicF64::new(0.0),
        }
    }

    pub fn set(&self, value: f64) {
        self.value.store(value, Ordering::Release);
    }

    pub fn increment(&self, value: f64) {
        self.value.fetch_add(value, Ordering::AcqRel);
    }

    pub fn decrement(&self, value: f64) {
        self.value.fetch_sub(value, Ordering::AcqRel);
    }

    pub fn value(&self) -> f64 {
        self.value.load(Ordering::Acquire)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts events and tracks their rate over 1, 5 and 15 minute windows.
#[derive(Debug)]
pub struct Meter {
    clock: Clock,
    core: Mutex<MeterCore>,
}

impl Meter {
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    pub(crate) fn with_clock(clock: Clock) -> Self {
        let core = MeterCore::new(clock.now());
        Self {
            clock,
            core: Mutex::new(core),
        }
    }

    pub fn mark(&self, n: u64) {
        let now = self.clock.now();
        self.core.lock().mark(n, now);
    }

    pub fn count(&self) -> u64 {
        self.snapshot().count
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        let now = self.clock.now();
        self.core.lock().snapshot(now)
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

/// The distribution of a stream of values.
#[derive(Debug)]
pub struct Histogram {
    reservoir: Mutex<Reservoir>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_reservoir_size(DEFAULT_RESERVOIR_SIZE)
    }

    /// Creates a histogram whose sample keeps at most `size` values.
    pub fn with_reservoir_size(size: usize) -> Self {
        Self {
            reservoir: Mutex::new(Reservoir::new(size)),
        }
    }

    pub fn update(&self, value: f64) {
        self.reservoir.lock().update(value);
    }

    pub fn count(&self) -> u64 {
        self.reservoir.lock().count()
    }

    pub fn clear(&self) {
        self.reservoir.lock().clear();
    }

    pub fn snapshot(&self) -> DistributionSnapshot {
        let reservoir = self.reservoir.lock();
        DistributionSnapshot::new(reservoir.count(), reservoir.values().to_vec())
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct TimerCore {
    /// Durations in nanoseconds.
    durations: Reservoir,
    rates: MeterCore,
}

/// The distribution of durations plus the rate at which they are recorded.
#[derive(Debug)]
pub struct Timer {
    clock: Clock,
    core: Mutex<TimerCore>,
}

impl Timer {
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    pub(crate) fn with_clock(clock: Clock) -> Self {
        let core = TimerCore {
            durations: Reservoir::new(DEFAULT_RESERVOIR_SIZE),
            rates: MeterCore::new(clock.now()),
        };
        Self {
            clock,
            core: Mutex::new(core),
        }
    }

    pub fn update(&self, duration: Duration) {
        let now = self.clock.now();
        let mut core = self.core.lock();
        core.durations.update(duration.as_nanos() as f64);
        core.rates.mark(1, now);
    }

    /// Runs `f` and records how long it took.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = self.clock.now();
        let result = f();
        self.update(self.clock.now().duration_since(start));
        result
    }

    pub fn count(&self) -> u64 {
        self.core.lock().durations.count()
    }

    /// Returns the recorded durations expressed in multiples of `unit`, together with the
    /// update rates, read under one lock.
    pub fn snapshot(&self, unit: Duration) -> (DistributionSnapshot, MeterSnapshot) {
        let now = self.clock.now();
        let scale = unit.as_nanos().max(1) as f64;
        let mut core = self.core.lock();
        let values = core.durations.values().iter().map(|v| v / scale).collect();
        let distribution = DistributionSnapshot::new(core.durations.count(), values);
        (distribution, core.rates.snapshot(now))
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Counter, Gauge, Histogram, Meter, Metric, MetricKind, Timer};
    use quanta::Clock;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_counter_take_resets() {
        let counter = Counter::new();
        counter.inc(5);
        counter.dec(2);
        assert_eq!(counter.count(), 3);
        assert_eq!(counter.take(), 3);
        assert_eq!(counter.count(), 0);
        counter.inc(1);
        assert_eq!(counter.take(), 1);
    }

    #[test]
    fn test_clear() {
        let counter = Counter::new();
        counter.inc(9);
        counter.clear();
        assert_eq!(counter.count(), 0);

        let histogram = Histogram::with_reservoir_size(4);
        histogram.update(1.0);
        histogram.clear();
        assert_eq!(histogram.count(), 0);
        assert!(histogram.snapshot().is_empty());
    }

    #[test]
    fn test_gauge_arithmetic() {
        let gauge = Gauge::new();
        gauge.set(1.5);
        gauge.increment(2.0);
        gauge.decrement(0.5);
        assert_eq!(gauge.value(), 3.0);
    }

    #[test]
    fn test_meter_count() {
        let meter = Meter::new();
        for _ in 0..40 {
            meter.mark(1);
        }
        assert_eq!(meter.count(), 40);
    }

    #[test]
    fn test_timer_scales_to_unit() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::with_clock(clock);
        timer.update(Duration::from_secs(2));
        let elapsed = timer.time(|| {
            mock.increment(Duration::from_millis(500));
            7
        });
        assert_eq!(elapsed, 7);

        let (distribution, rates) = timer.snapshot(Duration::from_millis(1));
        assert_eq!(distribution.count(), 2);
        assert_eq!(distribution.min(), Some(500.0));
        assert_eq!(distribution.max(), Some(2000.0));
        assert_eq!(rates.count, 2);
    }

    #[test]
    fn test_metric_kind() {
        let metric = Metric::Counter(Arc::new(Counter::new()));
        assert_eq!(metric.kind(), MetricKind::Counter);
        assert_eq!(metric.kind().to_string(), "counter");
    }
}
