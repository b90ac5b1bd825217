//! Exponentially-weighted moving average rates, as used by meters and timers.
use std::time::Duration;

use quanta::Instant;

/// Interval at which the moving averages are decayed.
pub(crate) const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// A single moving average over a fixed window, updated every [`TICK_INTERVAL`].
#[derive(Debug, Clone)]
pub(crate) struct Ewma {
    alpha: f64,
    /// Events per second.
    rate: f64,
    uncounted: u64,
    initialized: bool,
}

impl Ewma {
    /// Creates an average that decays over `window`.
    pub fn new(window: Duration) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / window.as_secs_f64()).exp();
        Self {
            alpha,
            rate: 0.0,
            uncounted: 0,
            initialized: false,
        }
    }

    pub fn one_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    pub fn five_minutes() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }

    pub fn fifteen_minutes() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }

    pub fn update(&mut self, n: u64) {
        self.uncounted = self.uncounted.saturating_add(n);
    }

    /// Folds the events seen since the last tick into the average.
    pub fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    /// Events per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// Point-in-time rates of a meter. All rates are events per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSnapshot {
    pub count: u64,
    pub rate1: f64,
    pub rate5: f64,
    pub rate15: f64,
    pub rate_mean: f64,
}

/// Unsynchronized meter state; callers wrap it in a lock.
#[derive(Debug, Clone)]
pub(crate) struct MeterCore {
    count: u64,
    start: Instant,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterCore {
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            start: now,
            last_tick: now,
            m1: Ewma::one_minute(),
            m5: Ewma::five_minutes(),
            m15: Ewma::fifteen_minutes(),
        }
    }

    pub fn mark(&mut self, n: u64, now: Instant) {
        self.tick_if_necessary(now);
        self.count = self.count.saturating_add(n);
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    pub fn snapshot(&mut self, now: Instant) -> MeterSnapshot {
        self.tick_if_necessary(now);
        let elapsed = now.duration_since(self.start).as_secs_f64();
        let rate_mean = if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            0.0
        };

        MeterSnapshot {
            count: self.count,
            rate1: self.m1.rate(),
            rate5: self.m5.rate(),
            rate15: self.m15.rate(),
            rate_mean,
        }
    }

    // Ticks are applied lazily: every full interval elapsed since the last tick is replayed.
    fn tick_if_necessary(&mut self, now: Instant) {
        let age = now.duration_since(self.last_tick);
        if age < TICK_INTERVAL {
            return;
        }

        let ticks = age.as_nanos() / TICK_INTERVAL.as_nanos();
        self.last_tick = self.last_tick + TICK_INTERVAL * ticks as u32;
        for _ in 0..ticks {
            self.m1.tick();
            self.m5.tick();
            self.m15.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Ewma, MeterCore, TICK_INTERVAL};
    use quanta::Clock;
    use std::time::Duration;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_one_minute_decay() {
        let mut ewma = Ewma::one_minute();
        ewma.update(3);
        ewma.tick();
        assert!(close(ewma.rate(), 0.6));

        // twelve ticks is one full window, which decays by a factor of e
        for _ in 0..12 {
            ewma.tick();
        }
        assert!(close(ewma.rate(), 0.6 * (-1.0f64).exp()));
    }

    #[test]
    fn test_meter_ticks_lazily() {
        let (clock, mock) = Clock::mock();
        let mut meter = MeterCore::new(clock.now());

        meter.mark(10, clock.now());
        let snapshot = meter.snapshot(clock.now());
        assert_eq!(snapshot.count, 10);
        assert_eq!(snapshot.rate1, 0.0);
        assert_eq!(snapshot.rate_mean, 0.0);

        mock.increment(TICK_INTERVAL);
        let snapshot = meter.snapshot(clock.now());
        assert!(close(snapshot.rate1, 2.0));
        assert!(close(snapshot.rate5, 2.0));
        assert!(close(snapshot.rate15, 2.0));
        assert!(close(snapshot.rate_mean, 2.0));

        mock.increment(Duration::from_secs(60));
        let snapshot = meter.snapshot(clock.now());
        assert_eq!(snapshot.count, 10);
        assert!(close(snapshot.rate1, 2.0 * (-1.0f64).exp()));
        assert!(snapshot.rate5 > snapshot.rate1);
        assert!(snapshot.rate15 > snapshot.rate5);
    }
}
