use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::JobStatus;

/// Exit code a worker uses to reject a message outright (deleted, never retried).
pub const EXIT_REJECT: i32 = 3;
/// Exit code a worker uses to hand a message back untouched (returned without backoff).
pub const EXIT_NOOP: i32 = 4;

/// Classified result of one worker run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum WorkerOutcome {
    /// Exit code 0.
    Succeeded,
    /// Non-zero exit, or terminated by a signal (`code == None`).
    Failed { code: Option<i32> },
    /// Killed after exceeding the job deadline.
    TimedOut,
    /// The process could not be started.
    SpawnError { reason: String },
    /// Worker exited with [`EXIT_REJECT`].
    Rejected,
    /// Worker exited with [`EXIT_NOOP`].
    Noop,
}

impl WorkerOutcome {
    /// Classifies a process exit code; `None` means the process died from a signal.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => WorkerOutcome::Succeeded,
            Some(EXIT_REJECT) => WorkerOutcome::Rejected,
            Some(EXIT_NOOP) => WorkerOutcome::Noop,
            other => WorkerOutcome::Failed { code: other },
        }
    }

    /// Returns `true` for outcomes handled by the failure path of acknowledgment.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            WorkerOutcome::Failed { .. } | WorkerOutcome::TimedOut | WorkerOutcome::SpawnError { .. }
        )
    }

    pub fn status(&self) -> JobStatus {
        match self {
            WorkerOutcome::Succeeded => JobStatus::Succeeded,
            WorkerOutcome::TimedOut => JobStatus::TimedOut,
            WorkerOutcome::Noop => JobStatus::Returned,
            WorkerOutcome::Failed { .. }
            | WorkerOutcome::SpawnError { .. }
            | WorkerOutcome::Rejected => JobStatus::Failed,
        }
    }

    /// Short identifier for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerOutcome::Succeeded => "succeeded",
            WorkerOutcome::Failed { .. } => "failed",
            WorkerOutcome::TimedOut => "timed-out",
            WorkerOutcome::SpawnError { .. } => "spawn-error",
            WorkerOutcome::Rejected => "rejected",
            WorkerOutcome::Noop => "noop",
        }
    }
}

/// Outcome of a job plus how long the worker ran.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerResult {
    pub outcome: WorkerOutcome,
    pub elapsed: Duration,
}

impl WorkerResult {
    pub fn new(outcome: WorkerOutcome, elapsed: Duration) -> Self {
        Self { outcome, elapsed }
    }
}
