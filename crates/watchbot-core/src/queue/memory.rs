use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::trace;
use watchbot_model::{Message, Receipt};

use super::QueueTransport;
use crate::error::QueueError;

/// In-process queue with SQS-like delivery semantics.
///
/// Received messages stay in flight until deleted, released with a zero
/// visibility timeout, or dead-lettered. Visibility timers are recorded but
/// never expire on their own.
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

#[derive(Default)]
struct Inner {
    seq: u64,
    ready: VecDeque<Stored>,
    in_flight: HashMap<Receipt, Stored>,
    deleted: Vec<String>,
    visibility: Vec<(String, u32)>,
    dead: Vec<Message>,
    dead_letter_enabled: bool,
    receive_calls: usize,
    failures: u32,
}

#[derive(Clone)]
struct Stored {
    id: String,
    body: String,
    receive_count: u32,
    sent_ms: u64,
    first_receive_ms: Option<u64>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Enables [`QueueTransport::dead_letter`] on this queue.
    pub fn with_dead_letter(self) -> Self {
        self.lock().dead_letter_enabled = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a body and returns the assigned message id.
    pub fn push(&self, body: impl Into<String>) -> String {
        let id = {
            let mut inner = self.lock();
            inner.seq += 1;
            let id = format!("msg-{}", inner.seq);
            inner.ready.push_back(Stored {
                id: id.clone(),
                body: body.into(),
                receive_count: 0,
                sent_ms: now_ms(),
                first_receive_ms: None,
            });
            id
        };
        self.notify.notify_waiters();
        id
    }

    /// Makes the next `n` receive calls fail.
    pub fn fail_next_receives(&self, n: u32) {
        self.lock().failures = n;
    }

    /// Ids of deleted messages, in deletion order.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// `(message id, seconds)` for every visibility change, in order.
    pub fn visibility_changes(&self) -> Vec<(String, u32)> {
        self.lock().visibility.clone()
    }

    pub fn dead_lettered(&self) -> Vec<Message> {
        self.lock().dead.clone()
    }

    pub fn receive_calls(&self) -> usize {
        self.lock().receive_calls
    }

    pub fn ready_len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// `fresh` marks the start of a receive call, as opposed to a long-poll wakeup.
    fn take(&self, max: usize, fresh: bool) -> Result<Vec<Message>, QueueError> {
        let mut inner = self.lock();
        if fresh {
            inner.receive_calls += 1;
            if inner.failures > 0 {
                inner.failures -= 1;
                return Err(QueueError::Receive("injected failure".into()));
            }
        }

        let now = now_ms();
        let mut out = Vec::new();
        while out.len() < max {
            let Some(mut stored) = inner.ready.pop_front() else {
                break;
            };
            stored.receive_count += 1;
            let first = *stored.first_receive_ms.get_or_insert(now);
            inner.seq += 1;
            let receipt = format!("{}-r{}", stored.id, inner.seq);

            out.push(
                Message::new(stored.id.clone(), stored.body.clone(), receipt.clone())
                    .with_receive_count(stored.receive_count)
                    .with_timestamps(Some(stored.sent_ms), Some(first)),
            );
            inner.in_flight.insert(receipt, stored);
        }
        Ok(out)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Message>, QueueError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let notified = self.notify.notified();
        let batch = self.take(max, true)?;
        if !batch.is_empty() || wait.is_zero() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(wait, notified).await;
        self.take(max, false)
    }

    async fn delete(&self, message: &Message) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if let Some(stored) = inner.in_flight.remove(&message.receipt) {
            trace!(target: "watchbot.core.memory", id = %stored.id, "deleted");
            inner.deleted.push(stored.id);
        }
        Ok(())
    }

    async fn change_visibility(&self, message: &Message, seconds: u32) -> Result<(), QueueError> {
        let released = {
            let mut inner = self.lock();
            if !inner.in_flight.contains_key(&message.receipt) {
                return Err(QueueError::Visibility(format!(
                    "receipt {} is not in flight",
                    message.receipt
                )));
            }
            inner.visibility.push((message.id.clone(), seconds));
            if seconds == 0 {
                if let Some(stored) = inner.in_flight.remove(&message.receipt) {
                    inner.ready.push_back(stored);
                }
                true
            } else {
                false
            }
        };
        if released {
            self.notify.notify_waiters();
            // Waiting receivers get to run before the caller continues, as with a remote queue.
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn dead_letter(&self, message: &Message) -> Result<bool, QueueError> {
        let mut inner = self.lock();
        if !inner.dead_letter_enabled {
            return Ok(false);
        }
        if inner.in_flight.remove(&message.receipt).is_some() {
            inner.dead.push(message.clone());
        }
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_respects_max_and_counts_deliveries() {
        let q = MemoryQueue::new();
        q.push("a");
        q.push("b");
        q.push("c");

        let batch = q.receive(2, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].body, "a");
        assert_eq!(batch[0].receive_count, 1);
        assert_eq!(q.ready_len(), 1);
        assert_eq!(q.in_flight_len(), 2);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let q = MemoryQueue::new();
        q.push("a");
        let msg = q.receive(1, Duration::ZERO).await.unwrap().remove(0);

        q.delete(&msg).await.unwrap();
        q.delete(&msg).await.unwrap();
        assert_eq!(q.deleted(), vec![msg.id.clone()]);
        assert_eq!(q.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn release_redelivers_with_higher_count() {
        let q = MemoryQueue::new();
        q.push("a");
        let first = q.receive(1, Duration::ZERO).await.unwrap().remove(0);
        q.change_visibility(&first, 0).await.unwrap();

        let second = q.receive(1, Duration::ZERO).await.unwrap().remove(0);
        assert_eq!(second.id, first.id);
        assert_ne!(second.receipt, first.receipt);
        assert_eq!(second.receive_count, 2);
        assert_eq!(second.first_receive_ms, first.first_receive_ms);
    }

    #[tokio::test]
    async fn dead_letter_requires_opt_in() {
        let q = MemoryQueue::new();
        q.push("a");
        let msg = q.receive(1, Duration::ZERO).await.unwrap().remove(0);
        assert!(!q.dead_letter(&msg).await.unwrap());

        let q = MemoryQueue::new().with_dead_letter();
        q.push("a");
        let msg = q.receive(1, Duration::ZERO).await.unwrap().remove(0);
        assert!(q.dead_letter(&msg).await.unwrap());
        assert_eq!(q.dead_lettered().len(), 1);
        assert_eq!(q.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let q = MemoryQueue::new();
        q.fail_next_receives(1);
        assert!(q.receive(1, Duration::ZERO).await.is_err());
        assert!(q.receive(1, Duration::ZERO).await.unwrap().is_empty());
        assert_eq!(q.receive_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn long_poll_wakes_on_push() {
        let q = std::sync::Arc::new(MemoryQueue::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.receive(1, Duration::from_secs(20)).await });

        tokio::task::yield_now().await;
        q.push("late");

        let batch = handle.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(q.receive_calls(), 1);
    }
}
