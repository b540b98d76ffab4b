use crate::{
    error::{SegmentError, SegmentResult},
    memory::try_copy,
};
use anyhow::{Error, anyhow};
use nanoseg_common::Real;
use std::{collections::VecDeque, str::FromStr};

/// An in-place, length preserving filter.
///
/// `order` is the number of samples on each side that the filter's output
/// at one sample depends on; buffers are padded by at least this much so
/// the usable region is free of edge transients.
pub trait SignalFilter: Send + Sync {
    fn name(&self) -> &str;

    fn order(&self) -> usize;

    fn apply(&self, signal: &mut [Real]) -> SegmentResult<()>;
}

#[derive(Default, Debug, Clone, Copy)]
pub struct Passthrough;

impl SignalFilter for Passthrough {
    fn name(&self) -> &str {
        "none"
    }

    fn order(&self) -> usize {
        0
    }

    fn apply(&self, _signal: &mut [Real]) -> SegmentResult<()> {
        Ok(())
    }
}

/// Centred boxcar of `2 * half_width + 1` samples. The window is truncated
/// at the ends of the buffer.
#[derive(Debug, Clone, Copy)]
pub struct MovingAverage {
    half_width: usize,
}

impl MovingAverage {
    pub fn new(half_width: usize) -> Self {
        Self { half_width }
    }
}

impl SignalFilter for MovingAverage {
    fn name(&self) -> &str {
        "moving-average"
    }

    fn order(&self) -> usize {
        self.half_width
    }

    fn apply(&self, signal: &mut [Real]) -> SegmentResult<()> {
        if self.half_width == 0 || signal.is_empty() {
            return Ok(());
        }
        let source = try_copy(signal)?;
        let mut window = VecDeque::<Real>::new();
        window
            .try_reserve(2 * self.half_width + 1)
            .map_err(SegmentError::from)?;
        let mut sum = 0.0;
        let mut ahead = source.iter();
        for &x in ahead.by_ref().take(self.half_width) {
            window.push_back(x);
            sum += x;
        }
        for out in signal.iter_mut() {
            if let Some(&x) = ahead.next() {
                window.push_back(x);
                sum += x;
            }
            if window.len() > 2 * self.half_width + 1 {
                sum -= window.pop_front().unwrap_or_default();
            }
            *out = sum / window.len() as Real;
        }
        Ok(())
    }
}

/// Filter selection as given on the command line: `none` or `moving-average,<half width>`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSpec {
    #[default]
    None,
    MovingAverage(usize),
}

impl FilterSpec {
    pub fn build(self) -> Box<dyn SignalFilter> {
        match self {
            FilterSpec::None => Box::new(Passthrough),
            FilterSpec::MovingAverage(half_width) => Box::new(MovingAverage::new(half_width)),
        }
    }
}

impl FromStr for FilterSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vals: Vec<_> = s.split(',').map(str::trim).collect();
        match vals.as_slice() {
            ["none"] => Ok(FilterSpec::None),
            ["moving-average", half_width] => {
                Ok(FilterSpec::MovingAverage(usize::from_str(half_width)?))
            }
            _ => Err(anyhow!(
                "Unrecognised filter, expected 'none' or 'moving-average,*', got '{s}'"
            )),
        }
    }
}
