use crate::{
    chain::{Chain, NodeHandle},
    error::{RunState, SegmentError, SegmentResult},
    numeric::{signal_average, signal_variance},
};
use nanoseg_common::{Real, SampleIndex};

/// A piecewise constant segment within an event.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct CusumLevel {
    pub current: Real,
    pub stdev: Real,
    pub max_deviation: Real,
    /// Sample of the largest deviation from `current`.
    pub max_deviation_at: SampleIndex,
    pub raw_level_ecd: Real,
    pub fitted_level_ecd: Real,
    pub length: usize,
}

impl CusumLevel {
    /// Summarises `samples`, the first of which is sample `start` of the channel.
    pub fn from_samples(samples: &[Real], start: SampleIndex) -> Self {
        let current = signal_average(samples);
        let (at, max_deviation) = samples
            .iter()
            .map(|x| (x - current).abs())
            .enumerate()
            .fold((0, 0.0), |best, (i, d)| if d > best.1 { (i, d) } else { best });
        Self {
            current,
            stdev: signal_variance(samples).sqrt(),
            max_deviation,
            max_deviation_at: start + at,
            length: samples.len(),
            ..Default::default()
        }
    }
}

/// Limits applied when levels are added to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLimits {
    pub subevent_minpoints: usize,
    pub max_sublevels: usize,
}

pub type LevelList = Chain<CusumLevel>;

impl LevelList {
    pub fn add_level(
        &mut self,
        run: &RunState,
        limits: &LevelLimits,
        level: CusumLevel,
    ) -> SegmentResult<NodeHandle> {
        run.checkpoint()?;
        if level.length < limits.subevent_minpoints {
            return Err(SegmentError::LevelTooShort {
                length: level.length,
                minimum: limits.subevent_minpoints,
            });
        }
        if self.len() >= limits.max_sublevels {
            return Err(SegmentError::TooManyLevels {
                maximum: limits.max_sublevels,
            });
        }
        self.append(level)
    }

    /// Builds the levels delimited by `boundaries`, indices into `trace`
    /// which must be strictly increasing and end inside it. `offset` is the
    /// channel index of `trace[0]`.
    pub fn from_boundaries(
        run: &RunState,
        limits: &LevelLimits,
        trace: &[Real],
        offset: SampleIndex,
        boundaries: &[usize],
    ) -> SegmentResult<Self> {
        let mut levels = LevelList::default();
        for pair in boundaries.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if end <= start || end > trace.len() {
                return Err(SegmentError::LevelTooShort {
                    length: end.saturating_sub(start),
                    minimum: limits.subevent_minpoints.max(1),
                });
            }
            let level = CusumLevel::from_samples(&trace[start..end], offset + start);
            levels.add_level(run, limits, level)?;
        }
        Ok(levels)
    }
}
