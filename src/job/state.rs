//! Lifecycle of one extraction job.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

/// ```text
/// Initializing → MetadataLoaded → GridPlanned → Running → Draining → Finalized
///       └──────────────┴───────────────┴────────────┴──→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Initializing,
    MetadataLoaded,
    GridPlanned,
    Running,
    Draining,
    Finalized,
    Failed,
}

impl JobState {
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Initializing, MetadataLoaded)
                | (MetadataLoaded, GridPlanned)
                | (GridPlanned, Running)
                | (Running, Draining)
                | (Draining, Finalized)
                | (Initializing | MetadataLoaded | GridPlanned | Running | Draining, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finalized | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Initializing => "initializing",
            JobState::MetadataLoaded => "metadata-loaded",
            JobState::GridPlanned => "grid-planned",
            JobState::Running => "running",
            JobState::Draining => "draining",
            JobState::Finalized => "finalized",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current state of a named job; transitions are logged.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    slide: String,
    state: JobState,
}

impl Lifecycle {
    pub fn new(slide: impl Into<String>) -> Self {
        Self {
            slide: slide.into(),
            state: JobState::Initializing,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn advance(&mut self, next: JobState) {
        if !self.state.can_advance_to(next) {
            warn!(
                slide = %self.slide,
                from = %self.state,
                to = %next,
                "Unexpected job state transition"
            );
        }
        debug!(slide = %self.slide, from = %self.state, to = %next, "Job state");
        self.state = next;
    }

    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.advance(JobState::Failed);
        }
    }
}
