use serde::{Deserialize, Serialize};

use crate::Receipt;

/// One delivery of a queue message.
///
/// The queue owns the message; a watcher only holds this value while the job for it is in flight.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Queue-assigned identifier.
    pub id: String,
    /// Opaque body as delivered.
    pub body: String,
    /// Token for this delivery; required to delete or hide the message.
    pub receipt: Receipt,
    /// Approximate number of times the queue has delivered this message.
    pub receive_count: u32,
    /// Epoch milliseconds when the message was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_ms: Option<u64>,
    /// Epoch milliseconds of the first delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_receive_ms: Option<u64>,
}

/// Body content as seen by the worker.
///
/// Messages published through SNS arrive wrapped in a notification envelope;
/// the worker receives the inner `Message` and `Subject` instead of the raw JSON.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub subject: Option<String>,
    pub payload: String,
}

#[derive(Deserialize)]
struct SnsNotification {
    #[serde(rename = "Type")]
    kind: Option<String>,
    #[serde(rename = "Subject")]
    subject: Option<String>,
    #[serde(rename = "Message")]
    message: String,
}

impl Message {
    pub fn new(id: impl Into<String>, body: impl Into<String>, receipt: impl Into<Receipt>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            receipt: receipt.into(),
            receive_count: 1,
            sent_ms: None,
            first_receive_ms: None,
        }
    }

    pub fn with_receive_count(mut self, count: u32) -> Self {
        self.receive_count = count;
        self
    }

    pub fn with_timestamps(mut self, sent_ms: Option<u64>, first_receive_ms: Option<u64>) -> Self {
        self.sent_ms = sent_ms;
        self.first_receive_ms = first_receive_ms;
        self
    }

    /// Unwraps an SNS notification body, falling back to the raw body.
    pub fn envelope(&self) -> Envelope {
        match serde_json::from_str::<SnsNotification>(&self.body) {
            Ok(n) if n.kind.as_deref().is_none_or(|k| k == "Notification") => Envelope {
                subject: n.subject.filter(|s| !s.is_empty()),
                payload: n.message,
            },
            _ => Envelope {
                subject: None,
                payload: self.body.clone(),
            },
        }
    }

    /// Environment handed to the worker process for this delivery.
    pub fn worker_env(&self) -> Vec<(String, String)> {
        let envelope = self.envelope();
        let mut env = vec![
            ("Message".to_string(), envelope.payload),
            ("MessageId".to_string(), self.id.clone()),
            (
                "ApproximateReceiveCount".to_string(),
                self.receive_count.to_string(),
            ),
        ];
        if let Some(subject) = envelope.subject {
            env.push(("Subject".to_string(), subject));
        }
        if let Some(ts) = self.sent_ms {
            env.push(("SentTimestamp".to_string(), ts.to_string()));
        }
        if let Some(ts) = self.first_receive_ms {
            env.push(("ApproximateFirstReceiveTimestamp".to_string(), ts.to_string()));
        }
        env
    }
}
