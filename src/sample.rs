use rand::Rng;

/// Default number of values kept by a [`Reservoir`].
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// A uniform random sample of a stream of values (Vitter's algorithm R).
///
/// Every value ever recorded has the same probability of being in the sample, so
/// quantiles computed over it estimate the quantiles of the whole stream.
#[derive(Debug, Clone)]
pub(crate) struct Reservoir {
    count: u64,
    size: usize,
    values: Vec<f64>,
}

impl Reservoir {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            count: 0,
            size,
            values: Vec::with_capacity(size.min(DEFAULT_RESERVOIR_SIZE)),
        }
    }

    pub fn update(&mut self, value: f64) {
        self.count = self.count.saturating_add(1);
        if self.values.len() < self.size {
            self.values.push(value);
        } else {
            let slot = rand::thread_rng().gen_range(0..self.count);
            if let Some(v) = self.values.get_mut(slot as usize) {
                *v = value;
            }
        }
    }

    /// Number of values recorded, including the ones evicted from the sample.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn clear(&mut self) {
        self.count = 0;
        self.values.clear();
    }
}
