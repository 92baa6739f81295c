use aws_sdk_sqs::types::{Message as SqsMessage, MessageSystemAttributeName as Attr};
use watchbot_model::Message;

/// Converts an SQS message; `None` if it lacks an id or receipt handle.
pub fn from_sqs(msg: &SqsMessage) -> Option<Message> {
    let id = msg.message_id()?;
    let receipt = msg.receipt_handle()?;
    let attr = |name: Attr| -> Option<u64> {
        msg.attributes()
            .and_then(|a| a.get(&name))
            .and_then(|v| v.parse().ok())
    };

    let receive_count = attr(Attr::ApproximateReceiveCount)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(1);

    Some(
        Message::new(id, msg.body().unwrap_or_default(), receipt)
            .with_receive_count(receive_count)
            .with_timestamps(attr(Attr::SentTimestamp), attr(Attr::ApproximateFirstReceiveTimestamp)),
    )
}

/// Region embedded in a queue URL such as `https://sqs.us-east-1.amazonaws.com/123/q`.
pub fn region_from_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let host = rest.split('/').next()?;
    let mut parts = host.split('.');
    if parts.next()? != "sqs" {
        return None;
    }
    let region = parts.next()?;
    (parts.next()? == "amazonaws").then(|| region.to_string())
}
