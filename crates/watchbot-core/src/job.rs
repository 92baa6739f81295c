use std::{fmt, time::Duration};

use tokio::time::Instant;
use watchbot_model::Message;

/// Unique id of one job (one delivery being processed).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message paired with the time window its worker may use.
///
/// The deadline is computed once in [`Job::start`] and never moves.
#[derive(Clone, Debug)]
pub struct Job {
    id: JobId,
    message: Message,
    started_at: Instant,
    deadline: Instant,
}

impl Job {
    pub fn start(message: Message, max_duration: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            id: JobId::new(),
            message,
            started_at,
            deadline: started_at + max_duration,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
