use super::Detector;
use crate::{
    error::{SegmentError, SegmentResult},
    segmentation::EdgeKind,
};
use nanoseg_common::{Real, SampleIndex};

/// Entry and exit levels, in units of the local standard deviation.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct HysteresisBand {
    pub threshold: Real,
    pub hysteresis: Real,
}

impl HysteresisBand {
    pub fn new(threshold: Real, hysteresis: Real) -> SegmentResult<Self> {
        if !(threshold.is_finite() && hysteresis.is_finite()) || hysteresis >= threshold {
            return Err(SegmentError::Config(format!(
                "hysteresis ({hysteresis}) must lie below the threshold ({threshold})"
            )));
        }
        Ok(Self {
            threshold,
            hysteresis,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub index: SampleIndex,
    pub kind: EdgeKind,
}

/// Reports where a deviation series leaves and re-enters the band.
///
/// Values are deviations from a baseline, positive in the direction of an
/// event. A `Falling` crossing is reported at the first sample above the
/// threshold, a `Rising` crossing at the first sample back below the
/// hysteresis level.
#[derive(Default, Debug, Clone)]
pub struct CrossingDetector {
    band: HysteresisBand,
    inside: bool,
    last: Option<SampleIndex>,
}

impl CrossingDetector {
    pub fn new(band: HysteresisBand) -> Self {
        Self {
            band,
            ..Default::default()
        }
    }

    pub fn band(&self) -> HysteresisBand {
        self.band
    }

    pub fn is_inside(&self) -> bool {
        self.inside
    }

    pub fn reset(&mut self) {
        self.inside = false;
        self.last = None;
    }
}

impl Detector for CrossingDetector {
    type EventPointType = Crossing;

    fn signal(&mut self, index: SampleIndex, value: Real) -> Option<Crossing> {
        self.last = Some(index);
        if !self.inside && value > self.band.threshold {
            self.inside = true;
            Some(Crossing {
                index,
                kind: EdgeKind::Falling,
            })
        } else if self.inside && value < self.band.hysteresis {
            self.inside = false;
            Some(Crossing {
                index,
                kind: EdgeKind::Rising,
            })
        } else {
            None
        }
    }

    /// Closes an excursion still open when the series ends.
    fn finish(&mut self) -> Option<Crossing> {
        let index = self.last?;
        if self.inside {
            self.inside = false;
            Some(Crossing {
                index: index + 1,
                kind: EdgeKind::Rising,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::EventFilter;

    fn detector(threshold: Real, hysteresis: Real) -> CrossingDetector {
        CrossingDetector::new(HysteresisBand::new(threshold, hysteresis).unwrap())
    }

    #[test]
    fn zero_data() {
        let data: [Real; 0] = [];
        let mut iter = data.into_iter().enumerate().events(detector(2.0, 1.0));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn hysteresis_suppresses_chatter() {
        // Dips to 1.5 stay above the exit level, so only one excursion is seen.
        let data = [0.0, 3.0, 1.5, 3.0, 1.5, 0.5, 0.0, 4.0, 0.0];
        let mut iter = data.into_iter().enumerate().events(detector(2.0, 1.0));
        let falling = |index| Some(Crossing { index, kind: EdgeKind::Falling });
        let rising = |index| Some(Crossing { index, kind: EdgeKind::Rising });
        assert_eq!(iter.next(), falling(1));
        assert_eq!(iter.next(), rising(5));
        assert_eq!(iter.next(), falling(7));
        assert_eq!(iter.next(), rising(8));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn open_excursion_is_closed_at_finish() {
        let data = [0.0, 5.0, 5.0];
        let mut iter = data.into_iter().enumerate().events(detector(2.0, 1.0));
        assert_eq!(iter.next().map(|c| c.index), Some(1));
        assert_eq!(
            iter.next(),
            Some(Crossing {
                index: 3,
                kind: EdgeKind::Rising
            })
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn band_must_be_ordered() {
        assert!(HysteresisBand::new(1.0, 1.0).is_err());
        assert!(HysteresisBand::new(1.0, 2.0).is_err());
        assert!(HysteresisBand::new(Real::NAN, 0.0).is_err());
    }
}
