use crate::{
    error::{SegmentError, SegmentResult},
    memory::{BufferAllocator, SystemAllocator},
    numeric::{locate_max, signal_max, signal_min},
};
use nanoseg_common::Real;
use std::ops::RangeInclusive;
use tracing::debug;

/// Resting level of the signal.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct BaselineStats {
    pub mean: Real,
    pub stdev: Real,
    /// Value of the modal histogram bin.
    pub amplitude: Real,
}

/// Histogram of a sampling window over a fixed current range.
#[derive(Debug, Clone)]
pub struct BaselineModel {
    min: Real,
    max: Real,
    delta: Real,
    current: Vec<Real>,
    counts: Vec<u64>,
    sums: Vec<Real>,
    sums_of_squares: Vec<Real>,
}

impl BaselineModel {
    /// `floor(2 * window^(1/3))`.
    pub fn bin_count(window: usize) -> usize {
        // The offset keeps exact cubes from rounding down.
        (2.0 * (window as Real).cbrt() + 1e-9).floor() as usize
    }

    pub fn new(min: Real, max: Real, window: usize) -> SegmentResult<Self> {
        if !(min.is_finite() && max.is_finite() && max > min) {
            return Err(SegmentError::BadBaseline(format!(
                "empty current range [{min}, {max}]"
            )));
        }
        let bins = Self::bin_count(window);
        if bins == 0 {
            return Err(SegmentError::BadBaseline(format!(
                "a window of {window} samples is too short to histogram"
            )));
        }
        let delta = (max - min) / bins as Real;
        let mut current = SystemAllocator.allocate(bins, 0.0)?;
        for (i, value) in current.iter_mut().enumerate() {
            *value = min + i as Real * delta;
        }
        Ok(Self {
            min,
            max,
            delta,
            current,
            counts: SystemAllocator.allocate(bins, 0)?,
            sums: SystemAllocator.allocate(bins, 0.0)?,
            sums_of_squares: SystemAllocator.allocate(bins, 0.0)?,
        })
    }

    pub fn bins(&self) -> usize {
        self.current.len()
    }

    pub fn delta(&self) -> Real {
        self.delta
    }

    /// Lower edge of each bin.
    pub fn bin_values(&self) -> &[Real] {
        &self.current
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    fn bin_of(&self, value: Real) -> Option<usize> {
        if !(self.min..=self.max).contains(&value) {
            return None;
        }
        let bin = ((value - self.min) / self.delta) as usize;
        Some(bin.min(self.bins() - 1))
    }

    fn centre(&self, bin: usize) -> Real {
        self.min + (bin as Real + 0.5) * self.delta
    }

    /// Samples outside `[min, max]` are ignored.
    pub fn accumulate(&mut self, samples: &[Real]) {
        for &x in samples {
            if let Some(bin) = self.bin_of(x) {
                let shifted = x - self.min;
                self.counts[bin] += 1;
                self.sums[bin] += shifted;
                self.sums_of_squares[bin] += shifted * shifted;
            }
        }
    }

    fn modal_bin(&self) -> SegmentResult<usize> {
        locate_max(&self.counts.iter().map(|&c| c as Real).collect::<Vec<_>>())
            .filter(|&m| self.counts[m] > 0)
            .ok_or_else(|| {
                SegmentError::BadBaseline(format!(
                    "no samples fell within [{}, {}]",
                    self.min, self.max
                ))
            })
    }

    /// The run of bins around `modal` whose counts exceed `fraction` of
    /// the modal count.
    fn peak_region(&self, modal: usize, fraction: Real) -> RangeInclusive<usize> {
        let floor = self.counts[modal] as Real * fraction;
        let in_peak = |bin: usize| self.counts[bin] as Real > floor;
        let lo = (0..modal).rev().take_while(|&b| in_peak(b)).last().unwrap_or(modal);
        let hi = (modal + 1..self.bins())
            .take_while(|&b| in_peak(b))
            .last()
            .unwrap_or(modal);
        lo..=hi
    }

    /// Current range spanned by the peak region, which excludes the
    /// samples of any events in the window.
    pub fn peak_bounds(&self) -> SegmentResult<(Real, Real)> {
        let region = self.peak_region(self.modal_bin()?, PEAK_FLOOR);
        Ok((
            self.current[*region.start()],
            self.current[*region.end()] + self.delta,
        ))
    }

    /// Fits a Gaussian to the peak region of the histogram.
    ///
    /// With fewer than three populated bins the fit is underdetermined and
    /// the moments of the samples in the region are used instead, down to
    /// the quantisation noise of a single bin.
    pub fn estimate(&self) -> SegmentResult<BaselineStats> {
        let modal = self.modal_bin()?;
        let region = self.peak_region(modal, PEAK_FLOOR);
        debug!("Baseline peak spans bins {region:?} of {}", self.bins());
        let amplitude = self.current[modal];

        let populated = region.clone().filter(|&b| self.counts[b] > 0).count();
        let (mean, stdev) = if populated < 3 {
            self.moments(region)
        } else {
            let shoulder = self.peak_region(modal, SHOULDER_FLOOR);
            let half_width = (modal - shoulder.start() + 1).min(shoulder.end() + 1 - modal);
            self.gaussian_fit(region, modal, half_width as Real * self.delta)?
        };
        if !(mean.is_finite() && stdev.is_finite() && (self.min..=self.max).contains(&mean)) {
            return Err(SegmentError::BadBaseline(format!(
                "fit gave {mean} ± {stdev} outside [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(BaselineStats {
            mean,
            stdev,
            amplitude,
        })
    }

    fn moments(&self, region: RangeInclusive<usize>) -> (Real, Real) {
        let n: u64 = self.counts[region.clone()].iter().sum();
        let sum: Real = self.sums[region.clone()].iter().sum();
        let sum_of_squares: Real = self.sums_of_squares[region].iter().sum();
        let n = n as Real;
        let variance = if n > 1.0 {
            ((sum_of_squares - sum * sum / n) / (n - 1.0)).max(0.0)
        } else {
            0.0
        };
        let stdev = if variance > 0.0 {
            variance.sqrt()
        } else {
            self.delta / Real::sqrt(12.0)
        };
        (self.min + sum / n, stdev)
    }

    /// Weighted least squares fit of `ln(count)` to a parabola in the bin
    /// centres, scaled about the modal bin and `stdev_guess`.
    fn gaussian_fit(
        &self,
        region: RangeInclusive<usize>,
        modal: usize,
        stdev_guess: Real,
    ) -> SegmentResult<(Real, Real)> {
        let peak = self.counts[modal] as Real;
        let mean_guess = self.centre(modal);
        let mut moments = [0.0; 5];
        let mut rhs = [0.0; 3];
        for bin in region {
            let y = self.counts[bin] as Real / peak;
            if y <= 0.0 {
                continue;
            }
            let x = (self.centre(bin) - mean_guess) / stdev_guess;
            let weighted_log = y * y.ln();
            let mut power = y;
            for moment in moments.iter_mut() {
                *moment += power;
                power *= x;
            }
            rhs[0] += x * x * weighted_log;
            rhs[1] += x * weighted_log;
            rhs[2] += weighted_log;
        }
        let [x0, x1, x2, x3, x4] = moments;
        let normal = [[x4, x3, x2], [x3, x2, x1], [x2, x1, x0]];
        let [a, b, _] = solve3(&normal, &rhs)
            .ok_or_else(|| SegmentError::BadBaseline("baseline histogram fit is singular".into()))?;
        if a.is_nan() || a >= 0.0 {
            return Err(SegmentError::BadBaseline(
                "baseline histogram is not peaked".into(),
            ));
        }
        let variance = -1.0 / (2.0 * a);
        Ok((
            mean_guess + variance * b * stdev_guess,
            variance.sqrt() * stdev_guess,
        ))
    }
}

/// Bins below this fraction of the peak are outside the baseline.
const PEAK_FLOOR: Real = 0.2;
/// Level used to guess the width of the peak.
const SHOULDER_FLOOR: Real = 0.6;

fn determinant(m: &[[Real; 3]; 3]) -> Real {
    m[0][0] * (m[1][1] * m[2][2] - m[2][1] * m[1][2])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Cramer's rule; `None` when `m` is singular.
fn solve3(m: &[[Real; 3]; 3], rhs: &[Real; 3]) -> Option<[Real; 3]> {
    let det = determinant(m);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let mut solution = [0.0; 3];
    for (column, value) in solution.iter_mut().enumerate() {
        let mut replaced = *m;
        for (row, &r) in replaced.iter_mut().zip(rhs) {
            row[column] = r;
        }
        *value = determinant(&replaced) / det;
    }
    Some(solution)
}

/// Relative half width given to the range of a window with a single value.
const FLAT_WIDTH: Real = 1e-6;

/// Where the resting level comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaselineSource {
    /// Histogram over `[min, max]`; an unset bound is taken from the window.
    Histogram {
        min: Option<Real>,
        max: Option<Real>,
    },
    Manual { mean: Real, stdev: Real },
}

impl Default for BaselineSource {
    fn default() -> Self {
        BaselineSource::Histogram {
            min: None,
            max: None,
        }
    }
}

impl BaselineSource {
    pub fn estimate(&self, window: &[Real]) -> SegmentResult<BaselineStats> {
        match *self {
            BaselineSource::Manual { mean, stdev } => {
                if !(mean.is_finite() && stdev.is_finite() && stdev > 0.0) {
                    return Err(SegmentError::BadBaseline(format!(
                        "manual baseline {mean} ± {stdev} is unusable"
                    )));
                }
                Ok(BaselineStats {
                    mean,
                    stdev,
                    amplitude: mean,
                })
            }
            BaselineSource::Histogram { min, max } => {
                let mut min = min.or_else(|| signal_min(window)).unwrap_or_default();
                let mut max = max.or_else(|| signal_max(window)).unwrap_or_default();
                if min == max {
                    // Flat window.
                    let quantum = (min.abs() * FLAT_WIDTH).max(FLAT_WIDTH);
                    min -= quantum;
                    max += quantum;
                }
                let mut coarse = BaselineModel::new(min, max, window.len())?;
                coarse.accumulate(window);

                // Rebin the peak alone so the fit sees it at full resolution.
                let (lo, hi) = coarse.peak_bounds()?;
                let inside = window.iter().filter(|x| (lo..=hi).contains(*x)).count();
                match BaselineModel::new(lo, hi, inside) {
                    Ok(mut fine) => {
                        fine.accumulate(window);
                        fine.estimate()
                    }
                    Err(_) => coarse.estimate(),
                }
            }
        }
    }
}
