//! Queue transport capability.
//!
//! The watcher only needs four primitives from a queue. Transports are
//! expected to provide at-least-once delivery; the watcher never assumes
//! a message is seen exactly once.

use std::time::Duration;

use async_trait::async_trait;
use watchbot_model::Message;

use crate::error::QueueError;

mod memory;
pub use memory::MemoryQueue;

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Receives up to `max` messages, long-polling for at most `wait` when the queue is empty.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Message>, QueueError>;

    /// Permanently acknowledges a delivery. Deleting an already deleted receipt is not an error.
    async fn delete(&self, message: &Message) -> Result<(), QueueError>;

    /// Hides a delivery for `seconds` from now; `0` makes it visible immediately.
    async fn change_visibility(&self, message: &Message, seconds: u32) -> Result<(), QueueError>;

    /// Moves a delivery to a dead-letter destination.
    ///
    /// Returns `Ok(false)` when the transport has no such destination, leaving
    /// the message to the queue's own redrive configuration.
    async fn dead_letter(&self, _message: &Message) -> Result<bool, QueueError> {
        Ok(false)
    }

    fn name(&self) -> &'static str;
}
