//! Online statistics for summarizing captures
//!
//! [SummaryStatistics] keeps constant state per sample. [OrderStatistics] keeps
//! every sample and sorts lazily, only when a query follows new samples.
use std::cmp::Ordering;

/// Count, sum, mean and variance using Welford's single pass update
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SummaryStatistics {
    n: u64,
    sum: f64,
    average: f64,
    m2: f64,
}
impl SummaryStatistics {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn reset(&mut self) {
        *self = Self::default();
    }
    /// Adds a sample. NaN is ignored
    pub fn sample(&mut self, x: f64) {
        if x.is_nan() {
            return;
        }
        self.n += 1;
        self.sum += x;
        let delta = x - self.average;
        self.average += delta / self.n as f64;
        self.m2 += delta * (x - self.average);
    }
    pub fn n(&self) -> u64 {
        self.n
    }
    pub fn sum(&self) -> f64 {
        self.sum
    }
    /// 0 when there are no samples
    pub fn average(&self) -> f64 {
        self.average
    }
    pub fn population_variance(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        self.m2 / self.n as f64
    }
    pub fn population_stddev(&self) -> f64 {
        self.population_variance().sqrt()
    }
    pub fn sample_variance(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        self.m2 / (self.n - 1) as f64
    }
    pub fn sample_stddev(&self) -> f64 {
        self.sample_variance().sqrt()
    }
}
impl Extend<f64> for SummaryStatistics {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for x in iter {
            self.sample(x);
        }
    }
}

/// Rank based statistics over every sample seen
///
/// Fractiles use the nearest rank below `n * f`, without interpolation. All
/// queries return `None` until a sample has been added.
#[derive(Debug, Clone)]
pub struct OrderStatistics<T = f64> {
    samples: Vec<T>,
    dirty: bool,
}
impl<T> Default for OrderStatistics<T> {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            dirty: false,
        }
    }
}
impl<T: Copy + PartialOrd> OrderStatistics<T> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn reset(&mut self) {
        self.samples.clear();
        self.dirty = false;
    }
    /// Adds a sample. Values that do not compare with themselves (NaN) are ignored
    pub fn sample(&mut self, x: T) {
        if x.partial_cmp(&x).is_none() {
            return;
        }
        self.samples.push(x);
        self.dirty = true;
    }
    pub fn n(&self) -> usize {
        self.samples.len()
    }
    fn sorted(&mut self) -> &[T] {
        if self.dirty {
            self.samples
                .sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            self.dirty = false;
        }
        &self.samples
    }
    /// The sample at index `floor(n * f)` in sorted order, `f` in `[0, 1]`
    pub fn fractile(&mut self, f: f64) -> Option<T> {
        let sorted = self.sorted();
        let last = sorted.len().checked_sub(1)?;
        let index = (sorted.len() as f64 * f) as usize;
        Some(sorted[index.min(last)])
    }
    pub fn median(&mut self) -> Option<T> {
        self.fractile(0.5)
    }
    pub fn q1(&mut self) -> Option<T> {
        self.fractile(0.25)
    }
    pub fn q3(&mut self) -> Option<T> {
        self.fractile(0.75)
    }
    pub fn min(&mut self) -> Option<T> {
        self.sorted().first().copied()
    }
    pub fn max(&mut self) -> Option<T> {
        self.sorted().last().copied()
    }
}
impl<T: Copy + PartialOrd> Extend<T> for OrderStatistics<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for x in iter {
            self.sample(x);
        }
    }
}
