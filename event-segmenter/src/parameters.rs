use crate::{
    baseline::BaselineSource,
    error::{SegmentError, SegmentResult},
    filter::FilterSpec,
    segmentation::{HysteresisBand, LevelLimits, ScanSettings},
    signal::Padding,
};
use anyhow::{Error, anyhow};
use clap::{Args, Subcommand, ValueEnum};
use nanoseg_common::{Real, SampleRate};
use std::{path::PathBuf, str::FromStr};

/// Direction of an event relative to the baseline.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, ValueEnum, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Polarity {
    /// Events reduce the current.
    #[default]
    Negative,
    /// Events increase the current.
    Positive,
}

impl Polarity {
    /// Distance of `value` from `baseline`, positive in the direction of an event.
    pub fn deviation(self, value: Real, baseline: Real) -> Real {
        match self {
            Polarity::Negative => baseline - value,
            Polarity::Positive => value - baseline,
        }
    }
}

/// Comma separated list of array indices, e.g. `0,2,3`.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ArrayList(pub Vec<usize>);

impl FromStr for ArrayList {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arrays = s
            .split(',')
            .map(|val| usize::from_str(val.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if arrays.is_empty() {
            Err(anyhow!("Expected at least one array index, got '{s}'"))
        } else {
            Ok(ArrayList(arrays))
        }
    }
}

#[derive(Default, Debug, Clone, Args)]
pub struct SegmenterSettings {
    /// Deviation from the local baseline, in standard deviations, which opens an event
    #[clap(long, env, default_value = "5.0")]
    pub threshold: Real,

    /// Deviation, in standard deviations, below which an open event closes
    #[clap(long, env, default_value = "1.0")]
    pub hysteresis: Real,

    #[clap(long, env, value_enum, default_value_t)]
    pub polarity: Polarity,

    /// Events shorter than this are kept but classified as too short
    #[clap(long, env, default_value = "10")]
    pub event_minpoints: usize,

    /// Events longer than this are classified as too long and not captured
    #[clap(long, env, default_value = "100000")]
    pub event_maxpoints: usize,

    /// Samples of baseline captured on each side of an event
    #[clap(long, env, default_value = "50")]
    pub event_padding: usize,

    /// Samples decoded per chunk
    #[clap(long, env, default_value = "1000000")]
    pub read_length: usize,

    /// Smoothing factor of the local baseline tracker
    #[clap(long, env, default_value = "0.0001")]
    pub baseline_smoothing: Real,

    /// Lower bound of the baseline histogram; taken from the chunk if not set
    #[clap(long)]
    pub baseline_min: Option<Real>,

    /// Upper bound of the baseline histogram; taken from the chunk if not set
    #[clap(long)]
    pub baseline_max: Option<Real>,

    /// Fixed baseline level; requires `--baseline-stdev`
    #[clap(long, requires = "baseline_stdev")]
    pub baseline_mean: Option<Real>,

    #[clap(long, requires = "baseline_mean")]
    pub baseline_stdev: Option<Real>,

    /// Filter applied to each chunk before detection
    #[clap(long, default_value = "none")]
    pub data_filter: FilterSpec,

    /// Filter applied to each captured event
    #[clap(long, default_value = "none")]
    pub event_filter: FilterSpec,

    /// Deviation from an event's mean blockage, in standard deviations,
    /// which marks an intra-event crossing. Disabled if not set
    #[clap(long)]
    pub intra_threshold: Option<Real>,

    #[clap(long, default_value = "0.5")]
    pub intra_hysteresis: Real,

    #[clap(long, default_value = "5")]
    pub subevent_minpoints: usize,

    #[clap(long, default_value = "20")]
    pub max_sublevels: usize,

    /// Keep the captured signal of rejected events
    #[clap(long)]
    pub keep_rejected: bool,
}

impl SegmenterSettings {
    pub fn band(&self) -> SegmentResult<HysteresisBand> {
        HysteresisBand::new(self.threshold, self.hysteresis)
    }

    pub fn intra_band(&self) -> SegmentResult<Option<HysteresisBand>> {
        self.intra_threshold
            .map(|threshold| HysteresisBand::new(threshold, self.intra_hysteresis))
            .transpose()
    }

    pub fn baseline_source(&self) -> BaselineSource {
        match (self.baseline_mean, self.baseline_stdev) {
            (Some(mean), Some(stdev)) => BaselineSource::Manual { mean, stdev },
            _ => BaselineSource::Histogram {
                min: self.baseline_min,
                max: self.baseline_max,
            },
        }
    }

    pub fn level_limits(&self) -> LevelLimits {
        LevelLimits {
            subevent_minpoints: self.subevent_minpoints,
            max_sublevels: self.max_sublevels,
        }
    }

    pub fn padding(&self) -> Padding {
        Padding {
            data_order: self.data_filter.build().order(),
            event_order: self.event_filter.build().order(),
            extra: self.event_padding,
        }
    }

    /// Checks every setting and derives the scanner's view of them.
    pub fn validate(&self, sample_rate: SampleRate) -> SegmentResult<ScanSettings> {
        let band = self.band()?;
        if band.hysteresis < 0.0 {
            return Err(SegmentError::Config(format!(
                "hysteresis ({}) must not be negative",
                band.hysteresis
            )));
        }
        let intra_band = self.intra_band()?;
        if self.event_minpoints > self.event_maxpoints {
            return Err(SegmentError::Config(format!(
                "event_minpoints ({}) exceeds event_maxpoints ({})",
                self.event_minpoints, self.event_maxpoints
            )));
        }
        if self.subevent_minpoints == 0 || self.max_sublevels == 0 {
            return Err(SegmentError::Config(format!(
                "subevent_minpoints ({}) and max_sublevels ({}) must be positive",
                self.subevent_minpoints, self.max_sublevels
            )));
        }
        if !(self.baseline_smoothing.is_finite() && (0.0..=1.0).contains(&self.baseline_smoothing)) {
            return Err(SegmentError::Config(format!(
                "baseline_smoothing ({}) must lie in [0, 1]",
                self.baseline_smoothing
            )));
        }
        if let (Some(min), Some(max)) = (self.baseline_min, self.baseline_max) {
            if min >= max {
                return Err(SegmentError::BadBaseline(format!(
                    "histogram range [{min}, {max}] is empty"
                )));
            }
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(SegmentError::Config(format!(
                "sample rate ({sample_rate}) must be positive"
            )));
        }
        let settings = ScanSettings {
            band,
            polarity: self.polarity,
            event_minpoints: self.event_minpoints,
            event_maxpoints: self.event_maxpoints,
            event_padding: self.event_padding,
            event_extra: self.event_filter.build().order(),
            baseline_smoothing: self.baseline_smoothing,
            intra_band,
            levels: self.level_limits(),
            keep_rejected: self.keep_rejected,
            sample_rate,
        };
        let required = settings
            .margin()
            .checked_mul(2)
            .and_then(|margin| margin.checked_add(self.event_maxpoints))
            .ok_or_else(|| SegmentError::Config("event window overflows".into()))?;
        if self.read_length <= required {
            return Err(SegmentError::Config(format!(
                "read_length ({}) must exceed event_maxpoints plus both margins ({required})",
                self.read_length
            )));
        }
        Ok(settings)
    }
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    #[clap(about = "Segments Chimera acquisition files, one channel per file set.")]
    Chimera {
        /// Acquisition settings; defaults to each data file with a `.settings` extension
        #[clap(long)]
        settings: Option<PathBuf>,

        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
    #[clap(about = "Segments interleaved binary files described by a JSON layout.")]
    Binary {
        /// JSON file describing the record layout
        #[clap(long)]
        layout: PathBuf,

        /// Arrays to segment, e.g. `0,2`; defaults to the layout's array index
        #[clap(long)]
        arrays: Option<ArrayList>,

        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        settings: SegmenterSettings,
    }

    fn parse(args: &[&str]) -> SegmenterSettings {
        Harness::parse_from(std::iter::once("harness").chain(args.iter().copied())).settings
    }

    #[test]
    fn defaults_validate() {
        let settings = parse(&[]);
        assert_eq!(settings.polarity, Polarity::Negative);
        assert_eq!(settings.data_filter, FilterSpec::None);
        let scan = settings.validate(10_000.0).unwrap();
        assert_eq!(scan.margin(), 50);
        assert_eq!(scan.band.threshold, 5.0);
    }

    #[test]
    fn polarity_deviation() {
        assert_eq!(Polarity::Negative.deviation(80.0, 100.0), 20.0);
        assert_eq!(Polarity::Positive.deviation(80.0, 100.0), -20.0);
    }

    #[test]
    fn parse_array_list() {
        assert_eq!(ArrayList::from_str("0, 2,3").unwrap(), ArrayList(vec![0, 2, 3]));
        assert!(ArrayList::from_str("0,x").is_err());
    }

    #[test]
    fn hysteresis_above_threshold() {
        let settings = parse(&["--threshold", "2", "--hysteresis", "3"]);
        assert_eq!(settings.validate(1.0).unwrap_err().code(), ErrorCode::Invalid);
    }

    #[test]
    fn read_length_too_short() {
        let settings = parse(&["--read-length", "200", "--event-maxpoints", "100"]);
        assert_eq!(settings.validate(1.0).unwrap_err().code(), ErrorCode::Invalid);
        let settings = parse(&["--read-length", "201", "--event-maxpoints", "100"]);
        assert!(settings.validate(1.0).is_ok());
    }

    #[test]
    fn level_limits_reach_the_scanner() {
        let settings = parse(&["--subevent-minpoints", "7", "--max-sublevels", "3"]);
        let scan = settings.validate(1.0).unwrap();
        assert_eq!(scan.levels.subevent_minpoints, 7);
        assert_eq!(scan.levels.max_sublevels, 3);

        let settings = parse(&["--max-sublevels", "0"]);
        assert_eq!(settings.validate(1.0).unwrap_err().code(), ErrorCode::Invalid);
    }

    #[test]
    fn manual_baseline_takes_precedence() {
        let settings = parse(&["--baseline-mean", "100", "--baseline-stdev", "2", "--baseline-min", "0"]);
        assert_eq!(
            settings.baseline_source(),
            BaselineSource::Manual {
                mean: 100.0,
                stdev: 2.0
            }
        );
    }

    #[test]
    fn empty_histogram_range() {
        let settings = parse(&["--baseline-min", "5", "--baseline-max", "5"]);
        assert_eq!(
            settings.validate(1.0).unwrap_err().code(),
            ErrorCode::BadBaseline
        );
    }

    #[test]
    fn filter_orders_set_padding() {
        let settings = parse(&["--data-filter", "moving-average,3", "--event-filter", "moving-average,6"]);
        let padding = settings.padding();
        assert_eq!(padding.pad(), 59);
        assert_eq!(padding.usable_offset(), 53);
        assert_eq!(settings.validate(1.0).unwrap().margin(), 56);
    }
}
