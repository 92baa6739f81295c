use serde::Serialize;

use crate::BackoffStrategy;

/// Upper bound for a single long-poll wait (SQS limit).
pub const MAX_WAIT_TIME_SECS: u32 = 20;

/// Queue intake tuning.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOptions {
    /// Delay growth between failed receives.
    pub backoff: BackoffStrategy,
    /// Consecutive receive failures tolerated before giving up.
    pub max_retries: u32,
    /// Long-poll wait per receive call.
    pub wait_time_seconds: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffStrategy::default(),
            max_retries: 10,
            wait_time_seconds: MAX_WAIT_TIME_SECS,
        }
    }
}
