//! Adapter between `watchbot-model` retry settings and taskvisor policies.

use std::time::Duration;

use taskvisor::{BackoffPolicy, JitterPolicy};
use watchbot_model::{BackoffStrategy, JitterStrategy};

pub(crate) fn to_jitter_policy(jitter: JitterStrategy) -> JitterPolicy {
    match jitter {
        JitterStrategy::None => JitterPolicy::None,
        JitterStrategy::Full => JitterPolicy::Full,
        JitterStrategy::Equal => JitterPolicy::Equal,
    }
}

pub(crate) fn to_backoff_policy(s: &BackoffStrategy) -> BackoffPolicy {
    BackoffPolicy {
        first: Duration::from_millis(s.first_ms),
        max: Duration::from_millis(s.max_ms),
        factor: s.factor,
        jitter: to_jitter_policy(s.jitter),
    }
}
