/// Stepping policy
///
/// A step request picks a dimension of progress and the session keeps
/// issuing `next` until that dimension differs from where it started.
/// The comparison baseline is the status left behind by the previous
/// run, captured when the step begins.
use serde::{Deserialize, Serialize};

use crate::types::StepStatus;

/// Dimension of progress a step run waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    /// Any movement at all; a single `next` always suffices
    Object,
    Rank,
    Pass,
    Iteration,
    Clock,
}

/// Tracks one run of `next` commands until the chosen dimension changes
#[derive(Debug, Default)]
pub struct StepTracker {
    step_type: Option<StepType>,
    starting: Option<StepStatus>,
    last: Option<StepStatus>,
}

impl StepTracker {
    /// Begin a run, using the previous run's end point as the baseline.
    pub fn begin(&mut self, step_type: StepType) {
        self.starting = self.last.clone();
        self.step_type = Some(step_type);
    }

    /// Whether the given status completes the run.
    ///
    /// With no baseline recorded, any status completes it.
    pub fn evaluate(&self, status: &StepStatus) -> bool {
        match (self.step_type, &self.starting) {
            (Some(step_type), Some(start)) => match step_type {
                StepType::Object => true,
                StepType::Rank => start.rank != status.rank,
                StepType::Pass => start.pass != status.pass,
                StepType::Iteration => start.iteration != status.iteration,
                StepType::Clock => start.global_clock != status.global_clock,
            },
            _ => true,
        }
    }

    /// Record where this `next` ended; a finished run resets the baseline.
    pub fn record(&mut self, status: StepStatus, finished: bool) {
        self.last = Some(status);
        if finished {
            self.step_type = None;
            self.starting = None;
        }
    }
}
