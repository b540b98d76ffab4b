use crate::{baseline::BaselineStats, numeric::EPS};
use nanoseg_common::Real;

/// Exponentially weighted mean and variance of the resting signal.
///
/// Seeded from a histogram estimate, then nudged by every sample the
/// scanner classifies as baseline so slow drift is followed.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct LocalBaseline {
    mean: Real,
    variance: Real,
    smoothing_factor: Real,
}

impl LocalBaseline {
    pub fn new(seed: &BaselineStats, smoothing_factor: Real) -> Self {
        LocalBaseline {
            mean: seed.mean,
            variance: seed.stdev * seed.stdev,
            smoothing_factor,
        }
    }

    pub fn push(&mut self, value: Real) {
        let diff = value - self.mean;
        let increment = self.smoothing_factor * diff;
        self.mean += increment;
        self.variance = (1. - self.smoothing_factor) * (self.variance + diff * increment);
    }

    pub fn mean(&self) -> Real {
        self.mean
    }

    pub fn stdev(&self) -> Real {
        self.variance.sqrt().max(EPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn seed(mean: Real, stdev: Real) -> BaselineStats {
        BaselineStats {
            mean,
            stdev,
            amplitude: mean,
        }
    }

    #[test]
    fn zero_smoothing_holds_seed() {
        let mut baseline = LocalBaseline::new(&seed(5.0, 2.0), 0.0);
        for x in [1.0, 100.0, -40.0] {
            baseline.push(x);
        }
        assert_eq!(baseline.mean(), 5.0);
        assert_eq!(baseline.stdev(), 2.0);
    }

    #[test]
    fn constant_data() {
        let mut baseline = LocalBaseline::new(&seed(1.0, 0.0), 0.1);
        for _ in 0..10 {
            baseline.push(1.0);
        }
        assert_eq!(baseline.mean(), 1.0);
        assert_eq!(baseline.stdev(), EPS);
    }

    #[test]
    fn follows_a_step() {
        let mut baseline = LocalBaseline::new(&seed(0.0, 1.0), 0.1);
        baseline.push(1.0);
        assert_approx_eq!(baseline.mean(), 0.1, 1e-12);
        assert_approx_eq!(baseline.stdev(), (0.9f64 * 1.1).sqrt(), 1e-12);
        for _ in 0..200 {
            baseline.push(1.0);
        }
        assert_approx_eq!(baseline.mean(), 1.0, 1e-8);
    }
}
