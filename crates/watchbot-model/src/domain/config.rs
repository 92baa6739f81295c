use serde::Serialize;

use crate::{MAX_WAIT_TIME_SECS, ModelError, PollOptions, RedeliveryPolicy, WorkerOptions};

/// Validated, immutable configuration for one watcher.
///
/// Construct it with [`WatcherConfig::builder`]; every field is checked in
/// [`WatcherConfigBuilder::build`] so that an instance always holds usable values.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    queue_url: String,
    writable_filesystem: bool,
    worker_options: WorkerOptions,
    concurrency: usize,
    redelivery: RedeliveryPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_receive_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dead_letter_url: Option<String>,
    poll: PollOptions,
}

impl WatcherConfig {
    pub fn builder(queue_url: impl Into<String>, worker_options: WorkerOptions) -> WatcherConfigBuilder {
        WatcherConfigBuilder {
            queue_url: queue_url.into(),
            writable_filesystem: false,
            worker_options,
            concurrency: 1,
            redelivery: RedeliveryPolicy::default(),
            max_receive_count: None,
            dead_letter_url: None,
            poll: PollOptions::default(),
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    pub fn writable_filesystem(&self) -> bool {
        self.writable_filesystem
    }

    pub fn worker_options(&self) -> &WorkerOptions {
        &self.worker_options
    }

    /// Maximum number of jobs in flight at once.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn redelivery(&self) -> RedeliveryPolicy {
        self.redelivery
    }

    /// Receive count above which a failed message is dead-lettered.
    pub fn max_receive_count(&self) -> Option<u32> {
        self.max_receive_count
    }

    pub fn dead_letter_url(&self) -> Option<&str> {
        self.dead_letter_url.as_deref()
    }

    pub fn poll(&self) -> &PollOptions {
        &self.poll
    }
}

#[derive(Clone, Debug)]
pub struct WatcherConfigBuilder {
    queue_url: String,
    writable_filesystem: bool,
    worker_options: WorkerOptions,
    concurrency: usize,
    redelivery: RedeliveryPolicy,
    max_receive_count: Option<u32>,
    dead_letter_url: Option<String>,
    poll: PollOptions,
}

impl WatcherConfigBuilder {
    pub fn with_writable_filesystem(mut self, writable: bool) -> Self {
        self.writable_filesystem = writable;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_redelivery(mut self, policy: RedeliveryPolicy) -> Self {
        self.redelivery = policy;
        self
    }

    pub fn with_max_receive_count(mut self, count: u32) -> Self {
        self.max_receive_count = Some(count);
        self
    }

    pub fn with_dead_letter_url(mut self, url: impl Into<String>) -> Self {
        self.dead_letter_url = Some(url.into());
        self
    }

    pub fn with_poll(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn build(self) -> Result<WatcherConfig, ModelError> {
        if self.queue_url.trim().is_empty() {
            return Err(ModelError::Required { field: "QueueUrl" });
        }
        if self.concurrency == 0 {
            return Err(ModelError::NotPositive {
                field: "Concurrency",
            });
        }
        if self.max_receive_count == Some(0) {
            return Err(ModelError::NotPositive {
                field: "maxReceiveCount",
            });
        }
        if let Some(url) = &self.dead_letter_url
            && url.trim().is_empty()
        {
            return Err(ModelError::Required {
                field: "DeadLetterQueueUrl",
            });
        }
        if !self.poll.backoff.is_valid() {
            return Err(ModelError::Invalid {
                field: "poll.backoff",
                reason: "factor must be >= 1 and first_ms <= max_ms".into(),
            });
        }
        // Zero would turn the intake loop into a busy poll on an empty queue.
        if self.poll.wait_time_seconds == 0 || self.poll.wait_time_seconds > MAX_WAIT_TIME_SECS {
            return Err(ModelError::Invalid {
                field: "poll.waitTimeSeconds",
                reason: format!("must be between 1 and {MAX_WAIT_TIME_SECS}"),
            });
        }

        Ok(WatcherConfig {
            queue_url: self.queue_url,
            writable_filesystem: self.writable_filesystem,
            worker_options: self.worker_options,
            concurrency: self.concurrency,
            redelivery: self.redelivery,
            max_receive_count: self.max_receive_count,
            dead_letter_url: self.dead_letter_url,
            poll: self.poll,
        })
    }
}
