use crate::{
    baseline::BaselineSource,
    decoder::DataFormat,
    error::{ErrorCode, RunState, SegmentError, SegmentResult},
    filter::SignalFilter,
    input::{InputChain, SampleSource},
    memory::SystemAllocator,
    parameters::SegmenterSettings,
    progress::{ProgressSink, Timer},
    segmentation::{EventScanner, ScanOutcome, ScanSettings, Segmentation},
    signal::{Padding, SignalBuffer},
};
use metrics::counter;
use nanoseg_common::{
    Real, SampleRate,
    metrics::names::{CHUNKS_PROCESSED, SAMPLES_PROCESSED},
    samples_to_seconds,
};
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

/// Settings resolved against one sample rate, with the filters built.
pub struct Segmenter {
    read_length: usize,
    scan: ScanSettings,
    padding: Padding,
    baseline: BaselineSource,
    data_filter: Box<dyn SignalFilter>,
    event_filter: Box<dyn SignalFilter>,
}

impl Segmenter {
    pub fn new(settings: &SegmenterSettings, sample_rate: SampleRate) -> SegmentResult<Self> {
        Ok(Self {
            read_length: settings.read_length,
            scan: settings.validate(sample_rate)?,
            padding: settings.padding(),
            baseline: settings.baseline_source(),
            data_filter: settings.data_filter.build(),
            event_filter: settings.event_filter.build(),
        })
    }

    pub fn scan_settings(&self) -> &ScanSettings {
        &self.scan
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }
}

/// Result of segmenting one channel.
#[derive(Debug)]
pub struct ChannelReport {
    pub label: String,
    pub segmentation: Segmentation,
    pub samples: usize,
    pub chunks: usize,
    pub sample_rate: SampleRate,
    pub elapsed: Duration,
    /// Time spent in the scanner, summed over chunks.
    pub scan_time: Duration,
}

impl ChannelReport {
    /// Length of the channel in seconds.
    pub fn duration(&self) -> Real {
        samples_to_seconds(self.samples, self.sample_rate)
    }

    pub fn accepted(&self) -> usize {
        self.segmentation.events.accepted().count()
    }

    /// Number of events of each class, omitting classes with none.
    pub fn class_counts(&self) -> Vec<(ErrorCode, usize)> {
        ErrorCode::iter()
            .map(|code| (code, self.segmentation.events.count_class(code)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// Accepted events per second.
    pub fn capture_rate(&self) -> Real {
        let duration = self.duration();
        if duration > 0.0 {
            self.accepted() as Real / duration
        } else {
            0.0
        }
    }
}

fn filter_error(filter: &dyn SignalFilter, err: SegmentError) -> SegmentError {
    match err {
        SegmentError::Memory(_) | SegmentError::Interrupted => err,
        other => SegmentError::Filter {
            name: filter.name().to_owned(),
            reason: other.to_string(),
        },
    }
}

/// Segments a whole channel, chunk by chunk.
///
/// Any failure is recorded on `run` and returned; nothing built for the
/// channel survives it.
#[tracing::instrument(skip_all, fields(channel = label, samples = source.len()))]
pub fn segment_channel<S: SampleSource + ?Sized>(
    source: &S,
    format: &DataFormat,
    segmenter: &Segmenter,
    run: &RunState,
    progress: &dyn ProgressSink,
    label: &str,
) -> SegmentResult<ChannelReport> {
    run.check(scan_channel(source, format, segmenter, run, progress, label))
}

fn scan_channel<S: SampleSource + ?Sized>(
    source: &S,
    format: &DataFormat,
    segmenter: &Segmenter,
    run: &RunState,
    progress: &dyn ProgressSink,
    label: &str,
) -> SegmentResult<ChannelReport> {
    let total = source.len();
    if total == 0 {
        return Err(SegmentError::EmptyChannel);
    }
    run.checkpoint()?;

    let mut timer = Timer::default();
    timer.record();
    let mut scan_timer = Timer::default();

    let mut buffer = SignalBuffer::new(segmenter.read_length, segmenter.padding, format, &SystemAllocator)?;
    let mut scanner = EventScanner::new(segmenter.scan);
    let mut out = Segmentation::default();
    let margin = segmenter.scan.margin();

    let mut scan_from = 0;
    let mut chunks = 0;
    let mut resumed = false;
    while scan_from < total {
        run.checkpoint()?;
        buffer.fill(source, scan_from.saturating_sub(margin))?;
        segmenter
            .data_filter
            .apply(buffer.padded_mut())
            .map_err(|e| filter_error(segmenter.data_filter.as_ref(), e))?;

        if !scanner.is_seeded() || (!resumed && scanner.is_idle()) {
            match segmenter.baseline.estimate(buffer.usable()) {
                Ok(stats) => {
                    debug!(mean = stats.mean, stdev = stats.stdev, "Baseline estimated");
                    scanner.seed(&stats);
                }
                Err(e) if scanner.is_seeded() => {
                    warn!(start = buffer.start(), "Keeping previous baseline: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        scan_timer.record();
        let outcome = scanner.scan(
            &buffer,
            total,
            scan_from,
            segmenter.event_filter.as_ref(),
            run,
            &mut out,
        )?;
        scan_timer.end();
        scan_timer.accumulate();
        chunks += 1;
        counter!(CHUNKS_PROCESSED).increment(1);

        let next = match outcome {
            ScanOutcome::Complete => buffer.start() + buffer.usable().len(),
            ScanOutcome::Resume(start) => start,
        };
        if next <= scan_from {
            return Err(SegmentError::BadPadding {
                start: scan_from,
                requested: segmenter.read_length,
                available: total - scan_from,
            });
        }
        counter!(SAMPLES_PROCESSED).increment((next - scan_from) as u64);
        resumed = matches!(outcome, ScanOutcome::Resume(_));
        scan_from = next;
        progress.report(scan_from, total, label, timer.elapsed());
    }
    scanner.finish(total, run, &mut out)?;
    timer.end();

    let report = ChannelReport {
        label: label.to_owned(),
        segmentation: out,
        samples: total,
        chunks,
        sample_rate: segmenter.scan.sample_rate,
        elapsed: timer.elapsed(),
        scan_time: scan_timer.cumulative(),
    };
    info!(
        events = report.segmentation.events.len(),
        accepted = report.accepted(),
        chunks,
        "Channel segmented in {:?}, {:?} of it scanning",
        report.elapsed,
        report.scan_time
    );
    Ok(report)
}

/// Segments every sample of `chain` using its own format and sample rate.
pub fn segment_chain(
    chain: &InputChain,
    settings: &SegmenterSettings,
    run: &RunState,
    progress: &dyn ProgressSink,
    label: &str,
) -> SegmentResult<ChannelReport> {
    let segmenter = run.check(
        chain
            .sample_rate()
            .and_then(|rate| Segmenter::new(settings, rate)),
    )?;
    segment_channel(chain, chain.format(), &segmenter, run, progress, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decoder::{BinaryDecoderConfig, BinaryLayout, ByteOrder, SampleType},
        filter::FilterSpec,
        input::{MemorySource, tests::write_file},
        progress::NoProgress,
        segmentation::EdgeKind,
    };
    use assert_approx_eq::assert_approx_eq;
    use rand::{SeedableRng, rngs::StdRng};
    use rand_distr::{Distribution, Normal};

    fn settings(read_length: usize) -> SegmenterSettings {
        SegmenterSettings {
            threshold: 5.0,
            hysteresis: 1.0,
            event_minpoints: 10,
            event_maxpoints: 200,
            event_padding: 10,
            read_length,
            baseline_mean: Some(100.0),
            baseline_stdev: Some(1.0),
            intra_hysteresis: 0.5,
            subevent_minpoints: 5,
            max_sublevels: 20,
            ..Default::default()
        }
    }

    fn signal(length: usize, dips: &[(usize, usize)]) -> Vec<Real> {
        let mut data = vec![100.0; length];
        for &(from, to) in dips {
            data[from..to].fill(80.0);
        }
        data
    }

    fn run_memory(data: &[Real], settings: &SegmenterSettings) -> SegmentResult<ChannelReport> {
        let segmenter = Segmenter::new(settings, 1000.0)?;
        segment_channel(
            &MemorySource(data),
            &DataFormat::Chimera,
            &segmenter,
            &RunState::default(),
            &NoProgress,
            "test",
        )
    }

    fn spans(report: &ChannelReport) -> Vec<(usize, usize, Option<ErrorCode>)> {
        report
            .segmentation
            .events
            .iter()
            .map(|e| (e.start, e.finish, e.class))
            .collect()
    }

    #[test]
    fn events_across_chunk_boundaries() {
        let dips = [(100, 160), (980, 1040), (1965, 1975), (2990, 3050), (4600, 4603)];
        let data = signal(5000, &dips);

        let single = run_memory(&data, &settings(10_000)).unwrap();
        let chunked = run_memory(&data, &settings(1000)).unwrap();
        assert_eq!(single.chunks, 1);
        assert!(chunked.chunks > 5);
        assert_eq!(spans(&single), spans(&chunked));

        let expected: Vec<_> = dips.iter().map(|&(s, f)| (s, f)).collect();
        let found: Vec<_> = spans(&chunked).iter().map(|&(s, f, _)| (s, f)).collect();
        assert_eq!(found, expected);
        assert_eq!(chunked.accepted(), 4);
        assert_eq!(
            chunked.class_counts(),
            vec![(ErrorCode::Cusum, 4), (ErrorCode::TooShort, 1)]
        );
        for (a, b) in single.segmentation.events.iter().zip(chunked.segmentation.events.iter()) {
            assert_eq!(a.trace, b.trace);
        }
    }

    #[test]
    fn edges_alternate_in_order() {
        let data = signal(3000, &[(100, 160), (980, 1040), (2000, 2100)]);
        let report = run_memory(&data, &settings(700)).unwrap();
        let edges = report.segmentation.edges.as_slice();
        assert_eq!(edges.len(), 6);
        for (i, pair) in edges.windows(2).enumerate() {
            assert!(pair[0].location < pair[1].location);
            let expected = if i % 2 == 0 { EdgeKind::Falling } else { EdgeKind::Rising };
            assert_eq!(pair[0].kind, expected);
        }
        for event in report.segmentation.events.iter() {
            assert!(event.finish > event.start);
            assert_eq!(event.length, event.finish - event.start);
        }
    }

    #[test]
    fn data_filter_is_independent_of_chunking() {
        let data = signal(5000, &[(100, 160), (995, 1060), (3000, 3100)]);
        let mut single = settings(10_000);
        single.data_filter = FilterSpec::MovingAverage(2);
        single.event_filter = FilterSpec::MovingAverage(3);
        let mut chunked = single.clone();
        chunked.read_length = 900;

        let single = run_memory(&data, &single).unwrap();
        let chunked = run_memory(&data, &chunked).unwrap();
        assert_eq!(single.segmentation.events.len(), 3);
        assert_eq!(spans(&single), spans(&chunked));
        for (a, b) in single.segmentation.events.iter().zip(chunked.segmentation.events.iter()) {
            assert_eq!(a.filtered, b.filtered);
        }
    }

    #[test]
    fn capture_clears_data_filter_edge() {
        // The event closes just before the end of the first chunk, and the
        // bump lies within reach of its capture once smoothed.
        let mut data = signal(3000, &[(900, 994)]);
        data[1013..1016].fill(110.0);
        let mut single = settings(10_000);
        single.data_filter = FilterSpec::MovingAverage(5);
        single.event_filter = FilterSpec::MovingAverage(2);
        let mut chunked = single.clone();
        chunked.read_length = 1000;

        let single = run_memory(&data, &single).unwrap();
        let chunked = run_memory(&data, &chunked).unwrap();
        assert_eq!(single.segmentation.events.len(), 1);
        assert_eq!(spans(&single), spans(&chunked));
        let (a, b) = (
            &single.segmentation.events.as_slice()[0],
            &chunked.segmentation.events.as_slice()[0],
        );
        assert!(a.finish < 1000);
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.filtered, b.filtered);
    }

    #[test]
    fn scan_time_is_part_of_elapsed() {
        let data = signal(3000, &[(100, 160), (980, 1040)]);
        let report = run_memory(&data, &settings(1000)).unwrap();
        assert!(report.scan_time <= report.elapsed);
    }

    #[test]
    fn histogram_baseline_on_noisy_signal() {
        let mut rng = StdRng::seed_from_u64(11);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let dips = [(1500, 1550), (4200, 4250), (7700, 7750)];
        let mut data: Vec<Real> = (0..10_000).map(|_| 100.0 + noise.sample(&mut rng)).collect();
        for &(from, to) in &dips {
            for x in &mut data[from..to] {
                *x -= 20.0;
            }
        }
        let mut settings = settings(2000);
        settings.baseline_mean = None;
        settings.baseline_stdev = None;
        settings.baseline_smoothing = 1e-3;

        let report = run_memory(&data, &settings).unwrap();
        let accepted: Vec<_> = report.segmentation.events.accepted().collect();
        assert_eq!(accepted.len(), dips.len());
        for (event, &(from, to)) in accepted.iter().zip(&dips) {
            assert!(event.start.abs_diff(from) <= 5);
            assert!(event.finish.abs_diff(to) <= 5);
            assert_approx_eq!(event.local_baseline, 100.0, 0.5);
        }
        assert_eq!(report.segmentation.dwell.len(), 3);
        assert_eq!(report.segmentation.inter_event.len(), 2);
        assert_approx_eq!(report.capture_rate(), 0.3, 1e-12);
    }

    #[test]
    fn empty_channel() {
        let run = RunState::default();
        let segmenter = Segmenter::new(&settings(1000), 1000.0).unwrap();
        let err = segment_channel(
            &MemorySource(&[]),
            &DataFormat::Chimera,
            &segmenter,
            &run,
            &NoProgress,
            "empty",
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadTrace);
        assert_eq!(run.last_error(), Some(ErrorCode::BadTrace));
    }

    #[test]
    fn interrupted_before_start() {
        let data = signal(2000, &[(100, 160)]);
        let run = RunState::default();
        run.interrupt();
        let segmenter = Segmenter::new(&settings(1000), 1000.0).unwrap();
        let err = segment_channel(
            &MemorySource(&data),
            &DataFormat::Chimera,
            &segmenter,
            &run,
            &NoProgress,
            "interrupted",
        )
        .unwrap_err();
        assert!(matches!(err, SegmentError::Interrupted));
        assert_eq!(run.last_error(), Some(ErrorCode::Interrupt));
    }

    #[test]
    fn nan_stops_the_pass() {
        let mut data = signal(3000, &[(100, 160)]);
        data[2500] = Real::NAN;
        let run = RunState::default();
        let segmenter = Segmenter::new(&settings(1000), 1000.0).unwrap();
        let result = segment_channel(
            &MemorySource(&data),
            &DataFormat::Chimera,
            &segmenter,
            &run,
            &NoProgress,
            "nan",
        );
        assert!(result.is_err());
        assert_eq!(run.last_error(), Some(ErrorCode::StepNan));
    }

    #[test]
    fn binary_files_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<i16> = signal(2400, &[(500, 560), (1300, 1390)])
            .into_iter()
            .map(|x| x as i16)
            .collect();
        let mut paths = Vec::new();
        for (i, part) in samples.chunks(800).enumerate() {
            let bytes: Vec<u8> = part.iter().flat_map(|x| x.to_le_bytes()).collect();
            paths.push(write_file(&dir, &format!("part{i}.bin"), &bytes));
        }
        let config = BinaryDecoderConfig::new(BinaryLayout {
            header_bytes: 0,
            sample_rate: 1000.0,
            n_arrays: 1,
            array_index: 0,
            sample_type: SampleType::I16 { mask: None },
            byte_order: ByteOrder::Little,
            scale: 1.0,
            offset: 0.0,
        })
        .unwrap();
        let mut chain = InputChain::new(DataFormat::Binary(config)).unwrap();
        for path in &paths {
            chain.append(path, None).unwrap();
        }

        let run = RunState::default();
        let report = segment_chain(&chain, &settings(600), &run, &NoProgress, "binary").unwrap();
        let found: Vec<_> = spans(&report).iter().map(|&(s, f, _)| (s, f)).collect();
        assert_eq!(found, vec![(500, 560), (1300, 1390)]);
        assert_eq!(report.samples, 2400);
        assert_approx_eq!(report.duration(), 2.4, 1e-12);
        assert_eq!(run.last_error(), None);
    }

    #[test]
    fn invalid_settings_are_recorded() {
        let data = signal(100, &[]);
        let mut bad = settings(100);
        bad.hysteresis = 10.0;
        assert_eq!(run_memory(&data, &bad).unwrap_err().code(), ErrorCode::Invalid);
    }
}
