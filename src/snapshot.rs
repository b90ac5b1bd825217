use std::time::Duration;

use crate::ewma::MeterSnapshot;
use crate::metric::Metric;

// Absorbs binary floating point error in `q * n`, e.g. 0.7 * 10 = 7.000000000000001.
const RANK_TOLERANCE: f64 = 1e-9;

/// A point-in-time view of a single metric.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Events counted since the previous snapshot.
    Counter { delta: i64 },
    Gauge { value: f64 },
    Meter(MeterSnapshot),
    Histogram(DistributionSnapshot),
    /// Durations are expressed in multiples of the requested unit.
    Timer {
        distribution: DistributionSnapshot,
        rates: MeterSnapshot,
    },
}

impl Metric {
    /// Captures the current state of the metric.
    ///
    /// Taking a snapshot of a counter resets it, so its next snapshot only holds what was
    /// counted in between. Timer values are scaled into multiples of `duration_unit`.
    pub fn snapshot(&self, duration_unit: Duration) -> Snapshot {
        match self {
            Metric::Counter(counter) => Snapshot::Counter {
                delta: counter.take(),
            },
            Metric::Gauge(gauge) => Snapshot::Gauge {
                value: gauge.value(),
            },
            Metric::Meter(meter) => Snapshot::Meter(meter.snapshot()),
            Metric::Histogram(histogram) => Snapshot::Histogram(histogram.snapshot()),
            Metric::Timer(timer) => {
                let (distribution, rates) = timer.snapshot(duration_unit);
                Snapshot::Timer {
                    distribution,
                    rates,
                }
            }
        }
    }
}

/// Summary statistics over a sorted sample of a distribution.
///
/// Every statistic is `None` when nothing has been sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSnapshot {
    count: u64,
    sorted: Vec<f64>,
    stats: Option<Stats>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Stats {
    min: f64,
    max: f64,
    mean: f64,
    stddev: f64,
}

impl DistributionSnapshot {
    /// Builds a snapshot from the total number of recorded values and a sample of them.
    pub fn new(count: u64, mut sample: Vec<f64>) -> Self {
        sample.sort_by(f64::total_cmp);

        let stats = match (sample.first(), sample.last()) {
            (Some(&min), Some(&max)) => {
                let n = sample.len() as f64;
                let mean = sample.iter().sum::<f64>() / n;
                let variance = sample.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                Some(Stats {
                    min,
                    max,
                    mean,
                    stddev: variance.sqrt(),
                })
            }
            _ => None,
        };

        Self {
            count,
            sorted: sample,
            stats,
        }
    }

    /// Number of values ever recorded, which may exceed the sample size.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn min(&self) -> Option<f64> {
        self.stats.map(|s| s.min)
    }

    pub fn max(&self) -> Option<f64> {
        self.stats.map(|s| s.max)
    }

    pub fn mean(&self) -> Option<f64> {
        self.stats.map(|s| s.mean)
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> Option<f64> {
        self.stats.map(|s| s.stddev)
    }

    /// The sample in ascending order.
    pub fn values(&self) -> &[f64] {
        &self.sorted
    }

    /// Nearest-rank estimate of quantile `q`: the smallest sampled value such that at
    /// least `q * n` samples are less than or equal to it.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.sorted.is_empty() || !(q > 0.0 && q <= 1.0) {
            return None;
        }

        let n = self.sorted.len();
        let rank = (q * n as f64 - RANK_TOLERANCE).ceil().max(1.0) as usize;
        self.sorted.get(rank.min(n) - 1).copied()
    }
}
