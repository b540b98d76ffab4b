pub mod crossing_detector;

pub use crossing_detector::{Crossing, CrossingDetector, HysteresisBand};

use nanoseg_common::{Real, SampleIndex};

pub trait Detector: Clone {
    type EventPointType;

    fn signal(&mut self, index: SampleIndex, value: Real) -> Option<Self::EventPointType>;

    fn finish(&mut self) -> Option<Self::EventPointType>;
}
