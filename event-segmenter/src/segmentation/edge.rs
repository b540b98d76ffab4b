use crate::{
    chain::{Chain, NodeHandle},
    error::{RunState, SegmentResult},
};
use nanoseg_common::{Real, SampleIndex};
use std::fmt::{Display, Formatter};

/// Direction of a crossing relative to the event it bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EdgeKind {
    /// Leaving the baseline.
    Falling,
    /// Returning to the baseline.
    Rising,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub location: SampleIndex,
    pub kind: EdgeKind,
    pub local_stdev: Real,
    pub local_baseline: Real,
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.location, self.kind, self.local_baseline, self.local_stdev
        )
    }
}

pub type EdgeList = Chain<Edge>;

impl EdgeList {
    /// Appends a crossing unless the run has been interrupted.
    pub fn add_edge(
        &mut self,
        run: &RunState,
        location: SampleIndex,
        kind: EdgeKind,
        local_stdev: Real,
        local_baseline: Real,
    ) -> SegmentResult<NodeHandle> {
        run.checkpoint()?;
        self.append(Edge {
            location,
            kind,
            local_stdev,
            local_baseline,
        })
    }
}
