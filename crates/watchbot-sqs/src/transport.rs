use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::{Client, error::DisplayErrorContext, types::MessageSystemAttributeName};
use tracing::{debug, trace, warn};
use watchbot_core::{QueueError, QueueTransport};
use watchbot_model::{MAX_WAIT_TIME_SECS, Message};

use crate::convert::{from_sqs, region_from_url};

/// [`QueueTransport`] backed by Amazon SQS.
#[derive(Clone, Debug)]
pub struct SqsTransport {
    client: Client,
    queue_url: String,
    dead_letter_url: Option<String>,
}

impl SqsTransport {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            dead_letter_url: None,
        }
    }

    /// Enables dead-lettering by re-sending bodies to `url`.
    pub fn with_dead_letter(mut self, url: impl Into<String>) -> Self {
        self.dead_letter_url = Some(url.into());
        self
    }

    /// Client from the default AWS credential and region chain.
    ///
    /// When no region is configured, it is taken from the queue URL.
    pub async fn from_env(queue_url: impl Into<String>) -> Self {
        let queue_url = queue_url.into();
        let mut config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        if config.region().is_none()
            && let Some(region) = region_from_url(&queue_url)
        {
            debug!(target: "watchbot.sqs", %region, "region taken from queue url");
            config = config.to_builder().region(Region::new(region)).build();
        }
        Self::new(Client::new(&config), queue_url)
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Message>, QueueError> {
        let max = max.clamp(1, 10) as i32;
        let wait = wait.as_secs().min(MAX_WAIT_TIME_SECS as u64) as i32;

        let out = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max)
            .wait_time_seconds(wait)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(&e).to_string()))?;

        let mut batch = Vec::new();
        for raw in out.messages() {
            match from_sqs(raw) {
                Some(msg) => batch.push(msg),
                None => warn!(target: "watchbot.sqs", id = ?raw.message_id(), "message without receipt handle ignored"),
            }
        }
        trace!(target: "watchbot.sqs", count = batch.len(), "received");
        Ok(batch)
    }

    async fn delete(&self, message: &Message) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn change_visibility(&self, message: &Message, seconds: u32) -> Result<(), QueueError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt)
            .visibility_timeout(seconds as i32)
            .send()
            .await
            .map_err(|e| QueueError::Visibility(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn dead_letter(&self, message: &Message) -> Result<bool, QueueError> {
        let Some(url) = &self.dead_letter_url else {
            return Ok(false);
        };
        self.client
            .send_message()
            .queue_url(url)
            .message_body(&message.body)
            .send()
            .await
            .map_err(|e| QueueError::DeadLetter(DisplayErrorContext(&e).to_string()))?;
        self.delete(message).await?;
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "sqs"
    }
}
