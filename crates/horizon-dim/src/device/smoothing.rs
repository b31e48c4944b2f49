//! Exponential smoothing of noisy position samples.

use std::collections::VecDeque;

use horizon_dim_core::{DeviceConfig, Point};

/// Weighted moving average over the most recent samples.
///
/// The newest sample has weight 1, the one before it `factor`, then
/// `factor^2`, and so on. Each smoothed value replaces the raw sample it was
/// computed from, so the filter feeds back on itself the way a physical
/// damper would.
#[derive(Debug, Clone)]
pub struct Smoother {
    history: VecDeque<(f64, f64)>,
    depth: usize,
    factor: f64,
}

impl Smoother {
    pub fn new(depth: usize, factor: f64) -> Self {
        let depth = depth.max(1);
        Self {
            history: VecDeque::with_capacity(depth),
            depth,
            factor,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.smoothing_depth, config.smoothing_factor)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Add a sample and return the smoothed value.
    pub fn push_f64(&mut self, x: f64, y: f64) -> (f64, f64) {
        self.history.push_front((x, y));
        self.history.truncate(self.depth);

        let mut total = (0.0, 0.0);
        let mut weights = 0.0;
        let mut weight = 1.0;
        for &(hx, hy) in &self.history {
            total.0 += hx * weight;
            total.1 += hy * weight;
            weights += weight;
            weight *= self.factor;
        }
        let smoothed = (total.0 / weights, total.1 / weights);
        self.history[0] = smoothed;
        smoothed
    }

    /// Add an integer sample; the result is rounded to the nearest pixel.
    pub fn push(&mut self, p: Point) -> Point {
        let (x, y) = self.push_f64(f64::from(p.x), f64::from(p.y));
        Point::new(x.round() as i32, y.round() as i32)
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::from_config(&DeviceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_passes_through() {
        let mut s = Smoother::default();
        assert_eq!(s.push(Point::new(40, -7)), Point::new(40, -7));
    }

    #[test]
    fn test_weights_decay_geometrically() {
        let mut s = Smoother::new(3, 0.5);
        s.push_f64(0.0, 0.0);
        let (x, _) = s.push_f64(30.0, 0.0);
        // (30 * 1 + 0 * 0.5) / 1.5
        assert!((x - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut s = Smoother::new(4, 0.2);
        for i in 0..20 {
            s.push_f64(f64::from(i), 0.0);
        }
        assert_eq!(s.len(), 4);
        s.reset();
        assert!(s.is_empty());
    }
}
