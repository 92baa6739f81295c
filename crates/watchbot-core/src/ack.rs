use std::sync::Arc;

use tracing::{debug, info, warn};
use watchbot_model::{Message, RedeliveryPolicy, WorkerOutcome, WorkerResult};

use crate::{error::QueueError, queue::QueueTransport};

/// Queue action chosen for a finished job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckAction {
    /// Acknowledge permanently.
    Delete,
    /// Hide for the given number of seconds (`0` releases immediately).
    ChangeVisibility(u32),
    /// Route to the dead-letter destination.
    DeadLetter,
    /// Do nothing; the visibility timeout brings the message back.
    Leave,
}

/// Maps worker outcomes onto queue state.
///
/// Holds no process state; [`AckController::decide`] is a pure function of
/// the message and result, and [`AckController::resolve`] applies it.
pub struct AckController {
    queue: Arc<dyn QueueTransport>,
    redelivery: RedeliveryPolicy,
    max_receive_count: Option<u32>,
}

impl AckController {
    pub fn new(
        queue: Arc<dyn QueueTransport>,
        redelivery: RedeliveryPolicy,
        max_receive_count: Option<u32>,
    ) -> Self {
        Self {
            queue,
            redelivery,
            max_receive_count,
        }
    }

    pub fn decide(&self, message: &Message, result: &WorkerResult) -> AckAction {
        match &result.outcome {
            WorkerOutcome::Succeeded | WorkerOutcome::Rejected => AckAction::Delete,
            WorkerOutcome::Noop => AckAction::ChangeVisibility(0),
            WorkerOutcome::Failed { .. }
            | WorkerOutcome::TimedOut
            | WorkerOutcome::SpawnError { .. } => {
                if self
                    .max_receive_count
                    .is_some_and(|max| message.receive_count > max)
                {
                    return AckAction::DeadLetter;
                }
                match self.redelivery.visibility_for(message.receive_count) {
                    Some(secs) => AckAction::ChangeVisibility(secs),
                    None => AckAction::Leave,
                }
            }
        }
    }

    /// Applies the decision for `result` and returns the action actually taken.
    pub async fn resolve(
        &self,
        message: &Message,
        result: &WorkerResult,
    ) -> Result<AckAction, QueueError> {
        self.report(message, result);

        let action = self.decide(message, result);
        match action {
            AckAction::Delete => self.queue.delete(message).await?,
            AckAction::ChangeVisibility(secs) => {
                self.queue.change_visibility(message, secs).await?
            }
            AckAction::Leave => {}
            AckAction::DeadLetter => {
                if !self.queue.dead_letter(message).await? {
                    debug!(
                        target: "watchbot.core.ack",
                        message = %message.id,
                        "no dead-letter destination; leaving to queue redrive"
                    );
                    return Ok(AckAction::Leave);
                }
                warn!(
                    target: "watchbot.core.ack",
                    message = %message.id,
                    receives = message.receive_count,
                    "message dead-lettered"
                );
            }
        }
        debug!(target: "watchbot.core.ack", message = %message.id, ?action, "resolved");
        Ok(action)
    }

    fn report(&self, message: &Message, result: &WorkerResult) {
        let elapsed_ms = result.elapsed.as_millis() as u64;
        match &result.outcome {
            WorkerOutcome::Succeeded => {
                info!(target: "watchbot.core.ack", message = %message.id, elapsed_ms, "job succeeded")
            }
            WorkerOutcome::Failed { code } => warn!(
                target: "watchbot.core.ack",
                message = %message.id,
                code = ?code,
                receives = message.receive_count,
                "job failed"
            ),
            WorkerOutcome::TimedOut => warn!(
                target: "watchbot.core.ack",
                message = %message.id,
                elapsed_ms,
                receives = message.receive_count,
                "job timed out"
            ),
            WorkerOutcome::SpawnError { reason } => warn!(
                target: "watchbot.core.ack",
                message = %message.id,
                reason = %reason,
                "job could not start"
            ),
            WorkerOutcome::Rejected => {
                warn!(target: "watchbot.core.ack", message = %message.id, "job rejected by worker")
            }
            WorkerOutcome::Noop => {
                info!(target: "watchbot.core.ack", message = %message.id, "job returned without processing")
            }
        }
    }
}
