use metrics::counter;
use nanoseg_common::metrics::{failures, names::FAILURES};
use std::{
    collections::TryReserveError,
    io,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI32, Ordering},
    },
};
use thiserror::Error;
use tracing::error;

pub type SegmentResult<T> = Result<T, SegmentError>;

/// The closed set of classification and failure codes.
///
/// `Cusum` through `StepNan` double as event classifications: an accepted
/// event carries `Cusum`, a rejected one carries the reason it was rejected.
/// The numeric values are stable and are what callers inspect after a run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumCount,
    strum::EnumIter,
    strum::FromRepr,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[repr(i32)]
pub enum ErrorCode {
    Cusum = 0,
    StepResponse = 1,
    BadBaseline = 2,
    TooLong = 3,
    TooShort = 4,
    BadLevels = 5,
    BadTrace = 6,
    BadPadding = 7,
    FitStep = 8,
    Overfitted = 9,
    StepZero = 10,
    StepDegenerate = 11,
    MaxIterations = 12,
    FileFailed = 13,
    OutputFailed = 14,
    ParseFailed = 15,
    Memory = 16,
    Invalid = 17,
    Interrupt = 18,
    StepNan = 19,
}

impl ErrorCode {
    pub fn value(self) -> i32 {
        self as i32
    }

    /// True for the codes an event can be finalized with.
    pub fn is_accepted(self) -> bool {
        self == ErrorCode::Cusum
    }
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Memory allocation failed: {0}")]
    Memory(#[from] TryReserveError),
    #[error("Cannot open {path}: {source}")]
    FileOpen { path: PathBuf, source: io::Error },
    #[error("Cannot read {path}: {source}")]
    FileRead { path: PathBuf, source: io::Error },
    #[error("Cannot write {path}: {source}")]
    Output { path: PathBuf, source: io::Error },
    #[error("Unsupported data format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid binary layout: {0}")]
    InvalidDecoder(String),
    #[error("Cannot parse value '{value}' for {key} on line {line} of {path}")]
    SettingsValue {
        path: PathBuf,
        line: usize,
        key: String,
        value: String,
    },
    #[error("Invalid layout description: {0}")]
    Layout(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Bad baseline: {0}")]
    BadBaseline(String),
    #[error("Read of {requested} samples from {start} exceeds channel length {available}")]
    BadPadding {
        start: usize,
        requested: usize,
        available: usize,
    },
    #[error("Level of {length} samples is shorter than the minimum of {minimum}")]
    LevelTooShort { length: usize, minimum: usize },
    #[error("More than {maximum} levels requested")]
    TooManyLevels { maximum: usize },
    #[error("NaN encountered at sample {index}")]
    NotANumber { index: usize },
    #[error("Filter {name} failed: {reason}")]
    Filter { name: String, reason: String },
    #[error("Root finder did not converge within {iterations} iterations")]
    MaxIterations { iterations: usize },
    #[error("Root is not bracketed by [{lower}, {upper}]")]
    NotBracketed { lower: f64, upper: f64 },
    #[error("Channel contains no samples")]
    EmptyChannel,
    #[error("Interrupted")]
    Interrupted,
}

impl SegmentError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SegmentError::Memory(_) => ErrorCode::Memory,
            SegmentError::FileOpen { .. } | SegmentError::FileRead { .. } => {
                ErrorCode::FileFailed
            }
            SegmentError::Output { .. } => ErrorCode::OutputFailed,
            SegmentError::SettingsValue { .. } | SegmentError::Layout(_) => {
                ErrorCode::ParseFailed
            }
            SegmentError::UnsupportedFormat(_)
            | SegmentError::InvalidDecoder(_)
            | SegmentError::Config(_) => ErrorCode::Invalid,
            SegmentError::BadBaseline(_) => ErrorCode::BadBaseline,
            SegmentError::BadPadding { .. } => ErrorCode::BadPadding,
            SegmentError::LevelTooShort { .. } => ErrorCode::BadLevels,
            SegmentError::TooManyLevels { .. } => ErrorCode::Overfitted,
            SegmentError::NotANumber { .. } => ErrorCode::StepNan,
            SegmentError::Filter { .. } | SegmentError::EmptyChannel => ErrorCode::BadTrace,
            SegmentError::MaxIterations { .. } => ErrorCode::MaxIterations,
            SegmentError::NotBracketed { .. } => ErrorCode::FitStep,
            SegmentError::Interrupted => ErrorCode::Interrupt,
        }
    }
}

const NO_ERROR: i32 = -1;

#[derive(Debug)]
struct RunStateInner {
    last_error: AtomicI32,
    interrupted: AtomicBool,
}

/// Shared failure record and cancellation flag for one logical run.
///
/// Clones refer to the same run, so a handle can be given to another
/// thread (or a signal handler) to interrupt a pass in progress.
/// A fresh run starts from `RunState::default()`.
#[derive(Debug, Clone)]
pub struct RunState {
    inner: Arc<RunStateInner>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            inner: Arc::new(RunStateInner {
                last_error: AtomicI32::new(NO_ERROR),
                interrupted: AtomicBool::new(false),
            }),
        }
    }
}

impl RunState {
    /// Emits the message and records the code of `err`, overwriting any previous code.
    pub fn fail(&self, err: &SegmentError) {
        let code = err.code();
        error!(code = code.value(), "{err}");
        let label: &'static str = code.into();
        counter!(FAILURES, &[failures::get_label(label)]).increment(1);
        self.inner.last_error.store(code.value(), Ordering::SeqCst);
    }

    /// Records the failure carried by `result`, if any, and passes it on unchanged.
    pub fn check<T>(&self, result: SegmentResult<T>) -> SegmentResult<T> {
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner
            .last_error
            .store(ErrorCode::Interrupt.value(), Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Called by every builder before it appends.
    pub fn checkpoint(&self) -> SegmentResult<()> {
        if self.is_interrupted() {
            Err(SegmentError::Interrupted)
        } else {
            Ok(())
        }
    }

    pub fn last_error(&self) -> Option<ErrorCode> {
        ErrorCode::from_repr(self.inner.last_error.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::{EnumCount, IntoEnumIterator};

    #[test]
    fn codes_are_contiguous() {
        assert_eq!(ErrorCode::COUNT, 20);
        for (i, code) in ErrorCode::iter().enumerate() {
            assert_eq!(code.value(), i as i32);
            assert_eq!(ErrorCode::from_repr(i as i32), Some(code));
        }
        assert_eq!(ErrorCode::StepNan.value(), 19);
        assert_eq!(ErrorCode::Memory.to_string(), "memory");
    }

    #[test]
    fn fail_records_latest_code() {
        let run = RunState::default();
        assert_eq!(run.last_error(), None);

        run.fail(&SegmentError::BadBaseline("empty".into()));
        assert_eq!(run.last_error(), Some(ErrorCode::BadBaseline));

        let result: SegmentResult<()> = run.check(Err(SegmentError::EmptyChannel));
        assert!(result.is_err());
        assert_eq!(run.last_error(), Some(ErrorCode::BadTrace));

        assert_eq!(run.check(Ok(3)).ok(), Some(3));
        assert_eq!(run.last_error(), Some(ErrorCode::BadTrace));
    }

    #[test]
    fn interrupt_is_shared_between_clones() {
        let run = RunState::default();
        let handle = run.clone();
        assert!(run.checkpoint().is_ok());

        handle.interrupt();
        assert!(matches!(run.checkpoint(), Err(SegmentError::Interrupted)));
        assert_eq!(run.last_error(), Some(ErrorCode::Interrupt));
    }

    #[test]
    fn allocation_failure_maps_to_memory() {
        let mut v = Vec::<u8>::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        assert_eq!(SegmentError::from(err).code(), ErrorCode::Memory);
    }
}
