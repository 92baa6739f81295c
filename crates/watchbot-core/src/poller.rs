use std::{sync::Arc, time::Duration};

use taskvisor::BackoffPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use watchbot_model::{Message, PollOptions};

use crate::{
    error::WatcherError,
    map::to_backoff_policy,
    queue::QueueTransport,
};

/// Largest batch a single receive may request (SQS limit).
pub const MAX_BATCH: usize = 10;

/// Pulls message batches sized to the free job capacity.
///
/// Transient receive failures are retried with backoff; the poller gives up
/// only after `max_retries` consecutive failures.
pub struct QueuePoller {
    queue: Arc<dyn QueueTransport>,
    backoff: BackoffPolicy,
    max_retries: u32,
    wait: Duration,
}

impl QueuePoller {
    pub fn new(queue: Arc<dyn QueueTransport>, opts: &PollOptions) -> Self {
        Self {
            queue,
            backoff: to_backoff_policy(&opts.backoff),
            max_retries: opts.max_retries,
            wait: Duration::from_secs(opts.wait_time_seconds as u64),
        }
    }

    /// Returns at most `capacity` messages.
    ///
    /// An empty batch means the long-poll elapsed, there was no capacity, or
    /// `stop` fired while waiting to retry. The receive itself is never
    /// interrupted, so no delivered message is dropped on the floor.
    pub async fn poll(
        &self,
        capacity: usize,
        stop: &CancellationToken,
    ) -> Result<Vec<Message>, WatcherError> {
        let max = capacity.min(MAX_BATCH);
        if max == 0 {
            return Ok(Vec::new());
        }

        let mut failures: u32 = 0;
        let mut prev: Option<Duration> = None;
        loop {
            trace!(target: "watchbot.core.poller", queue = self.queue.name(), max, "receive");
            match self.queue.receive(max, self.wait).await {
                Ok(batch) => {
                    if batch.len() > max {
                        warn!(
                            target: "watchbot.core.poller",
                            got = batch.len(),
                            max,
                            "transport returned more messages than requested"
                        );
                    }
                    debug!(target: "watchbot.core.poller", count = batch.len(), "batch received");
                    return Ok(batch);
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.max_retries {
                        return Err(WatcherError::QueueUnavailable {
                            attempts: failures,
                            source: e,
                        });
                    }
                    let delay = self.backoff.next(prev);
                    prev = Some(delay);
                    warn!(
                        target: "watchbot.core.poller",
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "receive failed; retrying"
                    );
                    if self.sleep_or_stop(delay, stop).await {
                        return Ok(Vec::new());
                    }
                }
            }
        }
    }

    /// Returns `true` if `stop` fired first.
    async fn sleep_or_stop(&self, delay: Duration, stop: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = stop.cancelled() => true,
        }
    }
}
