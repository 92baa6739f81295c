use serde::{Deserialize, Serialize};

/// Jitter applied on top of a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JitterStrategy {
    /// Use the computed delay as-is.
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// Half the delay plus a random share of the other half.
    #[default]
    Equal,
}

/// Retry delay growth between failed queue receives.
///
/// The delay for attempt `n` is `first_ms × factor^n`, capped at `max_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffStrategy {
    pub first_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
    #[serde(default)]
    pub jitter: JitterStrategy,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self {
            first_ms: 500,
            max_ms: 30_000,
            factor: 2.0,
            jitter: JitterStrategy::Equal,
        }
    }
}

impl BackoffStrategy {
    /// Constant delay without jitter.
    pub fn constant(delay_ms: u64) -> Self {
        Self {
            first_ms: delay_ms,
            max_ms: delay_ms,
            factor: 1.0,
            jitter: JitterStrategy::None,
        }
    }

    /// Returns `true` if the parameters produce a usable delay sequence.
    pub fn is_valid(&self) -> bool {
        self.factor.is_finite() && self.factor >= 1.0 && self.first_ms <= self.max_ms
    }
}
