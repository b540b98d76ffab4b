use crate::{
    chain::{Chain, NodeHandle},
    error::{RunState, SegmentResult},
};
use nanoseg_common::{Real, SampleIndex, SampleRate, samples_to_seconds};

/// Timings in seconds, in the order they were observed.
pub type DurationList = Chain<Real>;

impl DurationList {
    pub fn add_duration(&mut self, run: &RunState, seconds: Real) -> SegmentResult<NodeHandle> {
        run.checkpoint()?;
        self.append(seconds)
    }

    pub fn add_samples(
        &mut self,
        run: &RunState,
        samples: SampleIndex,
        sample_rate: SampleRate,
    ) -> SegmentResult<NodeHandle> {
        self.add_duration(run, samples_to_seconds(samples, sample_rate))
    }

    pub fn total(&self) -> Real {
        self.iter().sum()
    }

    pub fn mean(&self) -> Option<Real> {
        (!self.is_empty()).then(|| self.total() / self.len() as Real)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_seconds() {
        let run = RunState::default();
        let mut durations = DurationList::default();
        assert_eq!(durations.mean(), None);
        durations.add_samples(&run, 250, 1000.0).unwrap();
        durations.add_duration(&run, 0.75).unwrap();
        assert_eq!(durations.len(), 2);
        assert_eq!(durations.total(), 1.0);
        assert_eq!(durations.mean(), Some(0.5));
    }
}
