use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Largest visibility timeout the queue accepts (12 hours).
pub const MAX_VISIBILITY_SECS: u32 = 43_200;

/// What happens to a message whose job did not succeed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RedeliveryPolicy {
    /// Leave the message alone; it reappears when its visibility timeout expires.
    Natural,
    /// Make the message visible again immediately.
    Release,
    /// Hide the message for `2^receive_count` seconds, capped at [`MAX_VISIBILITY_SECS`].
    #[default]
    Backoff,
}

impl RedeliveryPolicy {
    /// Visibility timeout to apply for a failed delivery, or `None` to take no action.
    pub fn visibility_for(&self, receive_count: u32) -> Option<u32> {
        match self {
            RedeliveryPolicy::Natural => None,
            RedeliveryPolicy::Release => Some(0),
            RedeliveryPolicy::Backoff => {
                let secs = 2u64
                    .checked_pow(receive_count)
                    .unwrap_or(u64::MAX)
                    .min(MAX_VISIBILITY_SECS as u64);
                Some(secs as u32)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RedeliveryPolicy::Natural => "natural",
            RedeliveryPolicy::Release => "release",
            RedeliveryPolicy::Backoff => "backoff",
        }
    }
}

impl FromStr for RedeliveryPolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "natural" => Ok(RedeliveryPolicy::Natural),
            "release" => Ok(RedeliveryPolicy::Release),
            "backoff" => Ok(RedeliveryPolicy::Backoff),
            _ => Err(ModelError::Invalid {
                field: "RedeliveryPolicy",
                reason: format!("unknown policy {s:?} (expected: natural|release|backoff)"),
            }),
        }
    }
}
