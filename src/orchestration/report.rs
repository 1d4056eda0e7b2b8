//! Save-and-apply result types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::loader::BackupRecord;
use crate::workers::{WorkerError, WorkerId};

/// Controller state. `Idle` between operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum OrchestrationState {
    Idle = 0,
    Pausing = 1,
    Paused = 2,
    Persisting = 3,
    Recovering = 4,
    Unpausing = 5,
    Signaling = 6,
}

impl OrchestrationState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => OrchestrationState::Pausing,
            2 => OrchestrationState::Paused,
            3 => OrchestrationState::Persisting,
            4 => OrchestrationState::Recovering,
            5 => OrchestrationState::Unpausing,
            6 => OrchestrationState::Signaling,
            _ => OrchestrationState::Idle,
        }
    }
}

/// Step of a save-and-apply an error was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Discover,
    Pause,
    Persist,
    Recover,
    Unpause,
    Signal,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Discover => "discover",
            Step::Pause => "pause",
            Step::Persist => "persist",
            Step::Recover => "recover",
            Step::Unpause => "unpause",
            Step::Signal => "signal",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded failure, with enough structure to render an actionable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepError {
    pub step: Step,
    pub worker: Option<WorkerId>,
    pub message: String,
}

impl StepError {
    pub fn new(step: Step, worker: Option<WorkerId>, message: impl Into<String>) -> Self {
        Self {
            step,
            worker,
            message: message.into(),
        }
    }

    pub(crate) fn from_worker(step: Step, error: &WorkerError) -> Self {
        Self::new(step, error.worker().cloned(), error.to_string())
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.worker {
            Some(worker) => write!(f, "{} {}: {}", self.step, worker, self.message),
            None => write!(f, "{}: {}", self.step, self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Persisted and every worker step succeeded.
    Applied,
    /// Persisted, but at least one worker step failed.
    AppliedWithErrors,
    /// Nothing persisted; the previous configuration remains current.
    Failed,
}

impl ApplyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyOutcome::Applied => "applied",
            ApplyOutcome::AppliedWithErrors => "applied_with_errors",
            ApplyOutcome::Failed => "failed",
        }
    }
}

/// Aggregated result of one save-and-apply.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: ApplyOutcome,
    /// Snapshot version made current, when persisted.
    pub version: Option<u64>,
    pub backup: Option<BackupRecord>,
    pub backup_warning: Option<String>,
    pub paused: Vec<WorkerId>,
    pub unpaused: Vec<WorkerId>,
    pub signaled: Vec<WorkerId>,
    pub errors: Vec<StepError>,
}

impl ApplyReport {
    pub(crate) fn begin(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            started_at: now,
            finished_at: now,
            outcome: ApplyOutcome::Failed,
            version: None,
            backup: None,
            backup_warning: None,
            paused: Vec::new(),
            unpaused: Vec::new(),
            signaled: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn finish(&mut self, persisted: bool) {
        self.finished_at = Utc::now();
        self.outcome = match (persisted, self.errors.is_empty()) {
            (false, _) => ApplyOutcome::Failed,
            (true, true) => ApplyOutcome::Applied,
            (true, false) => ApplyOutcome::AppliedWithErrors,
        };
    }

    pub fn is_success(&self) -> bool {
        self.outcome != ApplyOutcome::Failed
    }

    /// Errors recorded during one step.
    pub fn errors_in(&self, step: Step) -> impl Iterator<Item = &StepError> {
        self.errors.iter().filter(move |e| e.step == step)
    }
}
