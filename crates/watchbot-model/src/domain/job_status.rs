use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    /// Dispatched, worker not yet started.
    Pending,
    /// Worker process is running.
    Running,
    /// Worker exited with code 0.
    Succeeded,
    /// Worker failed, was rejected, or could not be spawned.
    Failed,
    /// Worker was killed at its deadline.
    TimedOut,
    /// Worker handed the message back without processing it.
    Returned,
}

impl JobStatus {
    /// Returns `true` if the job will not transition further.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns `true` if the job is pending or running.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::TimedOut.is_terminal());
        assert!(JobStatus::Returned.is_terminal());

        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&JobStatus::TimedOut).unwrap();
        assert_eq!(json, r#""timedOut""#);
        let back: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobStatus::TimedOut);
    }
}
