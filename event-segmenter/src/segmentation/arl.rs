//! Average run length of a CUSUM detector, for calibrating its threshold.
use crate::error::{SegmentError, SegmentResult};
use nanoseg_common::Real;

/// Siegmund's approximation of the average run length of a CUSUM with
/// threshold `h` and normalised shift `mu`, minus the target `length`.
///
/// The root in `h` is the threshold whose expected run length before a
/// false alarm equals `length`.
pub fn average_run_length(length: Real, sigma: Real, mu: Real, h: Real) -> Real {
    let k = 2.0 * mu * (h / sigma + 1.166);
    ((-k).exp() - 1.0 + k) / (2.0 * mu * mu) - length
}

pub trait RootFinder {
    /// Finds `x` in `[lower, upper]` with `f(x) = 0`.
    fn find_root<F: Fn(Real) -> Real>(&self, f: F, lower: Real, upper: Real) -> SegmentResult<Real>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bisection {
    pub tolerance: Real,
    pub max_iterations: usize,
}

impl Default for Bisection {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 200,
        }
    }
}

impl RootFinder for Bisection {
    fn find_root<F: Fn(Real) -> Real>(&self, f: F, lower: Real, upper: Real) -> SegmentResult<Real> {
        let (mut lo, mut hi) = (lower.min(upper), lower.max(upper));
        let (mut f_lo, f_hi) = (f(lo), f(hi));
        if f_lo == 0.0 {
            return Ok(lo);
        }
        if f_hi == 0.0 {
            return Ok(hi);
        }
        if f_lo.is_nan() || f_hi.is_nan() || f_lo.signum() == f_hi.signum() {
            return Err(SegmentError::NotBracketed { lower, upper });
        }
        for _ in 0..self.max_iterations {
            let mid = lo + (hi - lo) / 2.0;
            let f_mid = f(mid);
            if f_mid == 0.0 || hi - lo < self.tolerance {
                return Ok(mid);
            }
            if f_mid.signum() == f_lo.signum() {
                lo = mid;
                f_lo = f_mid;
            } else {
                hi = mid;
            }
        }
        Err(SegmentError::MaxIterations {
            iterations: self.max_iterations,
        })
    }
}

/// A desired run length for a detector with the given noise and step size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArlTarget {
    pub length: Real,
    pub sigma: Real,
    pub mu: Real,
}

impl ArlTarget {
    pub fn residual(&self, h: Real) -> Real {
        average_run_length(self.length, self.sigma, self.mu, h)
    }

    /// Threshold within `[lower, upper]` meeting the target.
    pub fn calibrate<R: RootFinder>(&self, finder: &R, lower: Real, upper: Real) -> SegmentResult<Real> {
        finder.find_root(|h| self.residual(h), lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn arl_is_monotone_in_threshold() {
        let a = average_run_length(0.0, 1.0, 0.5, 1.0);
        let b = average_run_length(0.0, 1.0, 0.5, 2.0);
        assert!(b > a);
        assert_approx_eq!(a, 2.0 * ((-2.166f64).exp() - 1.0 + 2.166), 1e-12);
    }

    #[test]
    fn calibrated_threshold_meets_target() {
        let target = ArlTarget {
            length: 1000.0,
            sigma: 1.0,
            mu: 0.5,
        };
        let h = target.calibrate(&Bisection::default(), 0.0, 1000.0).unwrap();
        assert_approx_eq!(h, 499.834, 1e-6);
        assert!(average_run_length(1000.0, 1.0, 0.5, h).abs() < 1e-6);
    }

    #[test]
    fn unbracketed_root() {
        let target = ArlTarget {
            length: 1000.0,
            sigma: 1.0,
            mu: 0.5,
        };
        let err = target.calibrate(&Bisection::default(), 0.0, 10.0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FitStep);
    }

    #[test]
    fn iteration_limit() {
        let finder = Bisection {
            tolerance: 0.0,
            max_iterations: 5,
        };
        let err = finder.find_root(|x| x - 0.3, 0.0, 1.0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MaxIterations);
    }
}
