use super::{
    Crossing, CrossingDetector, Detector, DurationList, EdgeKind, EdgeList, Event, EventFilter,
    EventList, HysteresisBand, LevelLimits, LevelList, LocalBaseline,
};
use crate::{
    baseline::BaselineStats,
    error::{ErrorCode, RunState, SegmentError, SegmentResult},
    filter::SignalFilter,
    memory::{try_copy, try_push},
    numeric::{locate_max, locate_min, signal_average},
    parameters::Polarity,
    signal::SignalBuffer,
};
use metrics::counter;
use nanoseg_common::{
    Real, SampleIndex, SampleRate,
    metrics::{events_found, names::EVENTS_FOUND},
};
use tracing::{debug, trace};

/// Validated settings the scanner works from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSettings {
    pub band: HysteresisBand,
    pub polarity: Polarity,
    pub event_minpoints: usize,
    pub event_maxpoints: usize,
    pub event_padding: usize,
    /// Order of the event filter.
    pub event_extra: usize,
    pub baseline_smoothing: Real,
    pub intra_band: Option<HysteresisBand>,
    pub levels: LevelLimits,
    pub keep_rejected: bool,
    pub sample_rate: SampleRate,
}

impl ScanSettings {
    /// Samples captured on each side of an event.
    pub fn margin(&self) -> usize {
        self.event_padding + self.event_extra
    }
}

/// Everything found in one channel.
#[derive(Default, Debug)]
pub struct Segmentation {
    pub edges: EdgeList,
    pub events: EventList,
    /// Gaps between consecutive accepted events.
    pub inter_event: DurationList,
    /// Lengths of accepted events.
    pub dwell: DurationList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every usable sample was consumed.
    Complete,
    /// An event runs past the end of the chunk; the next chunk must be
    /// scanned from its start.
    Resume(SampleIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Baseline,
    Inside { start: SampleIndex },
    TooLong { start: SampleIndex },
}

/// Threshold scanner which carries its state from one chunk to the next.
///
/// Deviations are measured against an exponentially tracked local baseline
/// in units of its standard deviation. An event opens when the deviation
/// exceeds the threshold, its start is walked back to the last sample
/// within the hysteresis level, and it closes at the first sample back
/// below the hysteresis level.
#[derive(Debug, Clone)]
pub struct EventScanner {
    settings: ScanSettings,
    detector: CrossingDetector,
    tracker: Option<LocalBaseline>,
    state: ScanState,
    last_finish: Option<SampleIndex>,
    last_accepted_finish: Option<SampleIndex>,
}

impl EventScanner {
    pub fn new(settings: ScanSettings) -> Self {
        Self {
            settings,
            detector: CrossingDetector::new(settings.band),
            tracker: None,
            state: ScanState::Baseline,
            last_finish: None,
            last_accepted_finish: None,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Restarts the local baseline from `stats`.
    pub fn seed(&mut self, stats: &BaselineStats) {
        self.tracker = Some(LocalBaseline::new(stats, self.settings.baseline_smoothing));
    }

    pub fn is_seeded(&self) -> bool {
        self.tracker.is_some()
    }

    /// True when no event is open.
    pub fn is_idle(&self) -> bool {
        self.state == ScanState::Baseline
    }

    pub fn tracker(&self) -> Option<&LocalBaseline> {
        self.tracker.as_ref()
    }

    fn normalised(&self, tracker: &LocalBaseline, value: Real) -> Real {
        self.settings.polarity.deviation(value, tracker.mean()) / tracker.stdev()
    }

    /// Scans the usable window of `buffer` from channel index `scan_from`.
    ///
    /// Samples of the window before `scan_from` are context for event
    /// capture only.
    pub fn scan(
        &mut self,
        buffer: &SignalBuffer,
        total: usize,
        scan_from: SampleIndex,
        event_filter: &dyn SignalFilter,
        run: &RunState,
        out: &mut Segmentation,
    ) -> SegmentResult<ScanOutcome> {
        let mut tracker = self.tracker.ok_or_else(|| {
            SegmentError::BadBaseline("local baseline has not been seeded".into())
        })?;
        let base = buffer.start();
        let usable = buffer.usable();
        let end = base + usable.len();

        for (index, &value) in (base..end).zip(usable).skip(scan_from.saturating_sub(base)) {
            if value.is_nan() {
                return Err(SegmentError::NotANumber { index });
            }
            let deviation = self.normalised(&tracker, value);
            let crossing = self.detector.signal(index, deviation);
            match self.state {
                ScanState::Baseline => match crossing {
                    Some(Crossing {
                        kind: EdgeKind::Falling,
                        ..
                    }) => {
                        let floor = scan_from.max(self.last_finish.unwrap_or_default());
                        let start = self.backtrack(&tracker, usable, base, index, floor);
                        trace!(start, crossing = index, "Event opened");
                        self.state = ScanState::Inside { start };
                    }
                    _ => tracker.push(value),
                },
                ScanState::Inside { start } => {
                    if let Some(Crossing {
                        kind: EdgeKind::Rising,
                        ..
                    }) = crossing
                    {
                        self.finalize(buffer, &tracker, start, index, total, event_filter, run, out)?;
                        self.state = ScanState::Baseline;
                    } else if index - start >= self.settings.event_maxpoints {
                        debug!(start, "Event longer than {} samples", self.settings.event_maxpoints);
                        self.state = ScanState::TooLong { start };
                    }
                }
                ScanState::TooLong { start } => {
                    if let Some(Crossing {
                        kind: EdgeKind::Rising,
                        ..
                    }) = crossing
                    {
                        self.record_too_long(&tracker, start, index, run, out)?;
                        self.state = ScanState::Baseline;
                    }
                }
            }
        }
        self.tracker = Some(tracker);

        match self.state {
            ScanState::Inside { start } if end < total => {
                trace!(start, "Event continues past chunk end");
                self.detector.reset();
                self.state = ScanState::Baseline;
                Ok(ScanOutcome::Resume(start))
            }
            _ => Ok(ScanOutcome::Complete),
        }
    }

    /// Settles whatever is open when the channel ends.
    ///
    /// A too long event is recorded as finishing at `total`; an ordinary
    /// event cannot be captured and is dropped.
    pub fn finish(&mut self, total: usize, run: &RunState, out: &mut Segmentation) -> SegmentResult<()> {
        let state = std::mem::replace(&mut self.state, ScanState::Baseline);
        self.detector.reset();
        match state {
            ScanState::Baseline => Ok(()),
            ScanState::Inside { start } => {
                debug!(start, "Discarding event open at end of channel");
                Ok(())
            }
            ScanState::TooLong { start } => {
                let tracker = self.tracker.unwrap_or_default();
                self.record_too_long(&tracker, start, total, run, out)
            }
        }
    }

    fn backtrack(
        &self,
        tracker: &LocalBaseline,
        usable: &[Real],
        base: SampleIndex,
        crossing: SampleIndex,
        floor: SampleIndex,
    ) -> SampleIndex {
        let mut start = crossing;
        while start > floor.max(base) {
            match usable.get(start - 1 - base) {
                Some(&value) if self.normalised(tracker, value) > self.settings.band.hysteresis => {
                    start -= 1
                }
                _ => break,
            }
        }
        start
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &mut self,
        buffer: &SignalBuffer,
        tracker: &LocalBaseline,
        start: SampleIndex,
        finish: SampleIndex,
        total: usize,
        event_filter: &dyn SignalFilter,
        run: &RunState,
        out: &mut Segmentation,
    ) -> SegmentResult<()> {
        let settings = self.settings;
        let (baseline, stdev) = (tracker.mean(), tracker.stdev());
        let length = finish - start;

        let mut event = Event::default();
        event.populate(start, finish, out.events.len(), stdev, baseline);
        event.threshold = settings.band.threshold * stdev;
        event.padding_before = settings.event_padding.min(start);
        event.extra_before = settings.event_extra.min(start - event.padding_before);
        let tail = total - finish;
        event.padding_after = settings.event_padding.min(tail);
        event.extra_after = settings.event_extra.min(tail - event.padding_after);

        let from = start - event.padding_before - event.extra_before;
        let to = finish + event.padding_after + event.extra_after;
        event.trace = try_copy(window(buffer, from, to)?)?;
        event.filtered = try_copy(&event.trace)?;
        event_filter
            .apply(&mut event.filtered)
            .map_err(|e| match e {
                SegmentError::Memory(_) => e,
                other => SegmentError::Filter {
                    name: event_filter.name().to_owned(),
                    reason: other.to_string(),
                },
            })?;

        let mut blockage = try_copy(event.body())?;
        for x in blockage.iter_mut() {
            *x = settings.polarity.deviation(*x, baseline);
        }
        event.area = blockage.iter().sum::<Real>() / settings.sample_rate;
        event.average_blockage = signal_average(&blockage);
        if let Some((at, &max)) = locate_max(&blockage).and_then(|i| Some((i, blockage.get(i)?))) {
            event.max_blockage = max;
            event.max_blockage_at = start + at;
        }
        if let Some((at, &min)) = locate_min(&blockage).and_then(|i| Some((i, blockage.get(i)?))) {
            event.min_blockage = min;
            event.min_blockage_at = start + at;
        }
        let after = window(buffer, finish, finish + event.padding_after.max(1))?;
        event.baseline_after = signal_average(after);

        let mut class = if length < settings.event_minpoints {
            ErrorCode::TooShort
        } else if (event.baseline_after - baseline).abs() > event.threshold {
            ErrorCode::BadBaseline
        } else {
            ErrorCode::Cusum
        };
        if class.is_accepted() {
            let body_from = event.trace_offset();
            let body = event
                .filtered
                .get(body_from..body_from + length)
                .unwrap_or_default();
            let mut boundaries = Vec::new();
            try_push(&mut boundaries, 0)?;
            if let Some(band) = settings.intra_band {
                let mean = event.average_blockage;
                let crossings = body
                    .iter()
                    .map(|&x| (settings.polarity.deviation(x, baseline) - mean).abs() / stdev)
                    .enumerate()
                    .map(|(i, deviation)| (start + i, deviation))
                    .events(CrossingDetector::new(band));
                for crossing in crossings {
                    event
                        .intra_edges
                        .add_edge(run, crossing.index, crossing.kind, stdev, baseline)?;
                    let at = crossing.index - start;
                    if at > 0 && at < length {
                        try_push(&mut boundaries, at)?;
                    }
                }
            }
            try_push(&mut boundaries, length)?;
            match LevelList::from_boundaries(run, &settings.levels, body, start, &boundaries) {
                Ok(levels) => event.levels = levels,
                Err(e @ (SegmentError::LevelTooShort { .. } | SegmentError::TooManyLevels { .. })) => {
                    debug!(start, "Event levels rejected: {e}");
                    class = e.code();
                }
                Err(e) => return Err(e),
            }
        }
        event.class = Some(class);

        for (location, kind) in [(start, EdgeKind::Falling), (finish, EdgeKind::Rising)] {
            event.edges.add_edge(run, location, kind, stdev, baseline)?;
            out.edges.add_edge(run, location, kind, stdev, baseline)?;
        }

        if class.is_accepted() {
            if let Some(previous) = self.last_accepted_finish {
                out.inter_event
                    .add_samples(run, start - previous, settings.sample_rate)?;
            }
            out.dwell.add_samples(run, length, settings.sample_rate)?;
            self.last_accepted_finish = Some(finish);
        } else if !settings.keep_rejected {
            event.release();
        }
        self.last_finish = Some(finish);

        trace!(start, finish, %class, "Event finalized");
        let label: &'static str = class.into();
        counter!(EVENTS_FOUND, &[events_found::get_label(label)]).increment(1);
        out.events.add_event(run, event)?;
        Ok(())
    }

    fn record_too_long(
        &mut self,
        tracker: &LocalBaseline,
        start: SampleIndex,
        finish: SampleIndex,
        run: &RunState,
        out: &mut Segmentation,
    ) -> SegmentResult<()> {
        let (baseline, stdev) = (tracker.mean(), tracker.stdev());
        let mut event = Event::default();
        event.populate(start, finish, out.events.len(), stdev, baseline);
        event.threshold = self.settings.band.threshold * stdev;
        event.class = Some(ErrorCode::TooLong);
        for (location, kind) in [(start, EdgeKind::Falling), (finish, EdgeKind::Rising)] {
            out.edges.add_edge(run, location, kind, stdev, baseline)?;
        }
        self.last_finish = Some(finish);

        debug!(start, finish, "Too long event recorded");
        let label: &'static str = ErrorCode::TooLong.into();
        counter!(EVENTS_FOUND, &[events_found::get_label(label)]).increment(1);
        out.events.add_event(run, event)?;
        Ok(())
    }
}

/// Samples `[from, to)` of the channel, which must lie within the buffer.
fn window(buffer: &SignalBuffer, from: SampleIndex, to: SampleIndex) -> SegmentResult<&[Real]> {
    let offset = buffer.usable_offset();
    let lo = (from + offset).checked_sub(buffer.start());
    let hi = (to + offset).checked_sub(buffer.start());
    lo.zip(hi)
        .and_then(|(lo, hi)| buffer.padded().get(lo..hi))
        .ok_or(SegmentError::BadPadding {
            start: from,
            requested: to.saturating_sub(from),
            available: buffer.padded().len(),
        })
}
