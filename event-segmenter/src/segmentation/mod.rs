//! Event detection and the lists it builds.
pub mod arl;
pub mod detectors;
pub mod duration;
pub mod edge;
pub mod event;
pub mod iterators;
pub mod level;
pub mod local_baseline;
pub mod scanner;

pub use arl::{ArlTarget, Bisection, RootFinder, average_run_length};
pub use detectors::{Crossing, CrossingDetector, Detector, HysteresisBand};
pub use duration::DurationList;
pub use edge::{Edge, EdgeKind, EdgeList};
pub use event::{Event, EventList};
pub use iterators::{EventFilter, EventIter, SavablePoint, SaveToFileFilter};
pub use level::{CusumLevel, LevelLimits, LevelList};
pub use local_baseline::LocalBaseline;
pub use scanner::{EventScanner, ScanOutcome, ScanSettings, Segmentation};
