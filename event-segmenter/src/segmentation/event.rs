use super::{EdgeList, LevelList};
use crate::{
    chain::Chain,
    error::{ErrorCode, RunState, SegmentResult},
};
use nanoseg_common::{Real, SampleIndex};
use std::fmt::{Display, Formatter};

/// One excursion from the baseline.
///
/// `trace` holds the raw samples from `start - padding_before - extra_before`
/// to `finish + padding_after + extra_after`; `filtered` is the same span
/// after the event filter.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Event {
    pub index: usize,
    pub start: SampleIndex,
    pub finish: SampleIndex,
    pub length: usize,
    pub class: Option<ErrorCode>,
    /// Integrated deviation from the baseline, in current × seconds.
    pub area: Real,
    pub baseline_before: Real,
    pub baseline_after: Real,
    pub average_blockage: Real,
    pub max_blockage: Real,
    pub max_blockage_at: SampleIndex,
    pub min_blockage: Real,
    pub min_blockage_at: SampleIndex,
    pub padding_before: usize,
    pub padding_after: usize,
    pub extra_before: usize,
    pub extra_after: usize,
    pub threshold: Real,
    pub local_baseline: Real,
    pub local_stdev: Real,
    pub trace: Vec<Real>,
    pub filtered: Vec<Real>,
    pub edges: EdgeList,
    pub intra_edges: EdgeList,
    pub levels: LevelList,
}

impl Event {
    /// Resets the event to describe `[start, finish)`, keeping buffer capacity.
    pub fn populate(
        &mut self,
        start: SampleIndex,
        finish: SampleIndex,
        index: usize,
        local_stdev: Real,
        local_baseline: Real,
    ) {
        let mut trace = std::mem::take(&mut self.trace);
        let mut filtered = std::mem::take(&mut self.filtered);
        trace.clear();
        filtered.clear();
        *self = Event {
            index,
            start,
            finish,
            length: finish.saturating_sub(start),
            local_stdev,
            local_baseline,
            baseline_before: local_baseline,
            trace,
            filtered,
            ..Default::default()
        };
    }

    /// Frees the captured signal and every owned list.
    pub fn release(&mut self) {
        self.trace = Vec::new();
        self.filtered = Vec::new();
        self.edges.clear();
        self.intra_edges.clear();
        self.levels.clear();
    }

    pub fn is_accepted(&self) -> bool {
        self.class.is_some_and(ErrorCode::is_accepted)
    }

    /// Index of `start` within `trace`.
    pub fn trace_offset(&self) -> usize {
        self.padding_before + self.extra_before
    }

    /// The part of `trace` between `start` and `finish`.
    pub fn body(&self) -> &[Real] {
        let from = self.trace_offset().min(self.trace.len());
        let to = (from + self.length).min(self.trace.len());
        &self.trace[from..to]
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let class: &'static str = self.class.map(Into::into).unwrap_or("unclassified");
        write!(
            f,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            self.index,
            self.start,
            self.finish,
            self.length,
            class,
            self.area,
            self.baseline_before,
            self.baseline_after,
            self.average_blockage,
            self.max_blockage,
            self.local_stdev,
            self.intra_edges.len(),
        )
    }
}

pub type EventList = Chain<Event>;

impl EventList {
    pub fn add_event(&mut self, run: &RunState, event: Event) -> SegmentResult<usize> {
        run.checkpoint()?;
        self.append(event).map(|handle| handle.index())
    }

    pub fn accepted(&self) -> impl Iterator<Item = &Event> {
        self.iter().filter(|event| event.is_accepted())
    }

    pub fn count_class(&self, class: ErrorCode) -> usize {
        self.iter().filter(|event| event.class == Some(class)).count()
    }
}
