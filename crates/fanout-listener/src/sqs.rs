//! Amazon SQS backend.
//!
//! Handles GetQueueUrl, ReceiveMessage, DeleteMessage and SendMessage against
//! a standard queue, translating SDK types to the listener's message model.

use crate::error::{ListenerError, ListenerResult};
use crate::message::{
    body_digest, Message, MessageAttribute, OutgoingMessage, QueueEndpoint, ReceiptHandle,
};
use crate::queue::{QueueService, MAX_WAIT_SECONDS};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::primitives::Blob;
use aws_sdk_sqs::types::{MessageAttributeValue, MessageSystemAttributeName};
use aws_sdk_sqs::Client;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Message attribute name that asks SQS for every custom attribute.
const ALL_ATTRIBUTES: &str = "All";

/// Connection settings for [`SqsQueue`].
#[derive(Debug, Clone, Default)]
pub struct SqsSettings {
    /// Region override; falls back to the shared AWS config chain.
    pub region: Option<String>,
    /// Endpoint override, e.g. a LocalStack URL.
    pub endpoint_url: Option<String>,
}

/// SQS-backed [`QueueService`].
#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
}

impl SqsQueue {
    /// Build a client from the shared AWS configuration (`~/.aws/config`,
    /// environment, instance metadata), applying any overrides.
    pub async fn connect(settings: &SqsSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let config = loader.load().await;

        debug!(
            region = config.region().map(|r| r.as_ref()).unwrap_or("unset"),
            endpoint_url = settings.endpoint_url.as_deref().unwrap_or("default"),
            "SQS client configured"
        );

        Self::from_client(Client::new(&config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueueService for SqsQueue {
    async fn resolve(&self, name: &str) -> ListenerResult<QueueEndpoint> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_queue_does_not_exist() {
                    ListenerError::QueueNotFound(name.to_string())
                } else {
                    ListenerError::Resolve {
                        queue: name.to_string(),
                        reason: service_error.to_string(),
                    }
                }
            })?;

        let url = output.queue_url().ok_or_else(|| ListenerError::Resolve {
            queue: name.to_string(),
            reason: "GetQueueUrl returned no URL".to_string(),
        })?;

        Ok(QueueEndpoint::new(url))
    }

    async fn receive(
        &self,
        endpoint: &QueueEndpoint,
        wait_seconds: u32,
    ) -> ListenerResult<Option<Message>> {
        let wait_seconds = wait_seconds.min(MAX_WAIT_SECONDS) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(endpoint.as_str())
            .max_number_of_messages(1)
            .wait_time_seconds(wait_seconds)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp)
            .message_attribute_names(ALL_ATTRIBUTES)
            .send()
            .await
            .map_err(|e| ListenerError::Receive(e.into_service_error().to_string()))?;

        let messages = output.messages.unwrap_or_default();
        debug!(count = messages.len(), "Received messages");

        match messages.into_iter().next() {
            Some(message) => from_sqs_message(message).map(Some),
            None => Ok(None),
        }
    }

    async fn delete(
        &self,
        endpoint: &QueueEndpoint,
        receipt: &ReceiptHandle,
    ) -> ListenerResult<()> {
        self.client
            .delete_message()
            .queue_url(endpoint.as_str())
            .receipt_handle(receipt.as_str())
            .send()
            .await
            .map_err(|e| ListenerError::Delete(e.into_service_error().to_string()))?;
        Ok(())
    }

    async fn send(
        &self,
        endpoint: &QueueEndpoint,
        message: &OutgoingMessage,
    ) -> ListenerResult<()> {
        let attributes = to_sqs_attributes(&message.attributes)?;

        let output = self
            .client
            .send_message()
            .queue_url(endpoint.as_str())
            .message_body(&message.body)
            .set_message_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| ListenerError::Send(e.into_service_error().to_string()))?;

        debug!(
            message_id = output.message_id().unwrap_or("unknown"),
            "Message sent"
        );
        Ok(())
    }
}

/// Convert an SDK message into the listener's model.
pub(crate) fn from_sqs_message(message: aws_sdk_sqs::types::Message) -> ListenerResult<Message> {
    let receipt_handle = message
        .receipt_handle()
        .map(ReceiptHandle::new)
        .ok_or_else(|| ListenerError::Receive("message has no receipt handle".to_string()))?;

    let body = message.body().unwrap_or_default().to_string();
    let body_digest = match message.md5_of_body() {
        Some(digest) => digest.to_string(),
        None => {
            warn!("Message has no MD5OfBody, computing digest locally");
            body_digest(&body)
        }
    };

    let sent_timestamp = message
        .attributes()
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::SentTimestamp))
        .and_then(|raw| parse_sent_timestamp(raw.as_str()));

    let attributes: HashMap<String, MessageAttribute> = message
        .message_attributes()
        .map(|attrs| {
            attrs
                .iter()
                .map(|(name, value)| (name.clone(), from_sqs_attribute(value)))
                .collect()
        })
        .unwrap_or_default();

    Ok(Message {
        message_id: message.message_id().map(str::to_string),
        body,
        attributes,
        body_digest,
        receipt_handle,
        sent_timestamp,
    })
}

fn from_sqs_attribute(value: &MessageAttributeValue) -> MessageAttribute {
    MessageAttribute {
        data_type: value.data_type().to_string(),
        string_value: value.string_value().map(str::to_string),
        binary_value: value.binary_value().map(|blob| blob.as_ref().to_vec()),
    }
}

pub(crate) fn to_sqs_attributes(
    attributes: &HashMap<String, MessageAttribute>,
) -> ListenerResult<HashMap<String, MessageAttributeValue>> {
    attributes
        .iter()
        .map(|(name, attribute)| {
            let value = MessageAttributeValue::builder()
                .data_type(&attribute.data_type)
                .set_string_value(attribute.string_value.clone())
                .set_binary_value(attribute.binary_value.clone().map(Blob::new))
                .build()
                .map_err(|e| {
                    ListenerError::Send(format!("Failed to build {name} attribute: {e}"))
                })?;
            Ok((name.clone(), value))
        })
        .collect()
}

/// `SentTimestamp` is epoch milliseconds.
fn parse_sent_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::NODES_ATTRIBUTE;

    fn sqs_attribute(data_type: &str, value: &str) -> MessageAttributeValue {
        MessageAttributeValue::builder()
            .data_type(data_type)
            .string_value(value)
            .build()
            .unwrap()
    }

    #[test]
    fn converts_received_message() {
        let sdk_message = aws_sdk_sqs::types::Message::builder()
            .message_id("id-1")
            .receipt_handle("receipt-1")
            .body(r#"{"Command":"pause"}"#)
            .md5_of_body("0123456789abcdef0123456789abcdef")
            .attributes(MessageSystemAttributeName::SentTimestamp, "1700000000123")
            .message_attributes(NODES_ATTRIBUTE, sqs_attribute("Number", "3"))
            .message_attributes("Interval", sqs_attribute("String", "1m"))
            .build();

        let message = from_sqs_message(sdk_message).unwrap();

        assert_eq!(message.message_id.as_deref(), Some("id-1"));
        assert_eq!(message.receipt_handle.as_str(), "receipt-1");
        assert_eq!(message.body, r#"{"Command":"pause"}"#);
        assert_eq!(message.body_digest, "0123456789abcdef0123456789abcdef");
        assert_eq!(
            message.sent_timestamp.unwrap().timestamp_millis(),
            1_700_000_000_123
        );
        assert_eq!(message.attributes[NODES_ATTRIBUTE].value(), Some("3"));
        assert_eq!(message.attributes[NODES_ATTRIBUTE].data_type, "Number");
        assert_eq!(message.attributes["Interval"].value(), Some("1m"));
    }

    #[test]
    fn missing_digest_is_computed_from_body() {
        let sdk_message = aws_sdk_sqs::types::Message::builder()
            .receipt_handle("receipt-1")
            .body("hello")
            .build();

        let message = from_sqs_message(sdk_message).unwrap();
        assert_eq!(message.body_digest, body_digest("hello"));
        assert!(message.sent_timestamp.is_none());
        assert!(message.attributes.is_empty());
    }

    #[test]
    fn missing_receipt_handle_is_a_receive_error() {
        let sdk_message = aws_sdk_sqs::types::Message::builder().body("hello").build();
        assert!(matches!(
            from_sqs_message(sdk_message),
            Err(ListenerError::Receive(_))
        ));
    }

    #[test]
    fn outgoing_attributes_keep_data_type_labels() {
        let mut attributes = HashMap::new();
        attributes.insert(
            NODES_ATTRIBUTE.to_string(),
            MessageAttribute {
                data_type: "Number.int".to_string(),
                string_value: Some("2".to_string()),
                binary_value: None,
            },
        );
        attributes.insert("Blob".to_string(), MessageAttribute::binary(vec![1, 2, 3]));

        let converted = to_sqs_attributes(&attributes).unwrap();

        let nodes = &converted[NODES_ATTRIBUTE];
        assert_eq!(nodes.data_type(), "Number.int");
        assert_eq!(nodes.string_value(), Some("2"));
        let blob = &converted["Blob"];
        assert_eq!(blob.data_type(), "Binary");
        assert_eq!(blob.binary_value().cloned().map(Blob::into_inner), Some(vec![1u8, 2, 3]));
    }

    #[test]
    fn sent_timestamp_rejects_garbage() {
        assert!(parse_sent_timestamp("yesterday").is_none());
        assert_eq!(
            parse_sent_timestamp("0").unwrap(),
            Utc.timestamp_millis_opt(0).unwrap()
        );
    }

    // Client-level tests run the real SDK request path against canned
    // responses.

    use aws_sdk_sqs::operation::get_queue_url::{GetQueueUrlError, GetQueueUrlOutput};
    use aws_sdk_sqs::operation::receive_message::{ReceiveMessageInput, ReceiveMessageOutput};
    use aws_sdk_sqs::types::error::{InvalidAddress, QueueDoesNotExist};
    use aws_smithy_mocks::{mock, mock_client};
    use std::sync::{Arc, Mutex};

    const QUEUE_URL: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/chaos-commands";

    #[tokio::test]
    async fn receive_asks_for_one_message_with_its_attributes() {
        let seen: Arc<Mutex<Option<ReceiveMessageInput>>> = Arc::default();
        let rule = {
            let seen = seen.clone();
            mock!(Client::receive_message)
                .match_requests(move |request| {
                    *seen.lock().unwrap() = Some(request.clone());
                    true
                })
                .then_output(|| {
                    ReceiveMessageOutput::builder()
                        .messages(
                            aws_sdk_sqs::types::Message::builder()
                                .receipt_handle("receipt-1")
                                .body("reboot")
                                .md5_of_body(body_digest("reboot"))
                                .build(),
                        )
                        .build()
                })
        };
        let queue = SqsQueue::from_client(mock_client!(aws_sdk_sqs, [&rule]));

        let message = queue
            .receive(&QueueEndpoint::new(QUEUE_URL), 45)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(message.body, "reboot");
        assert_eq!(message.receipt_handle.as_str(), "receipt-1");

        let request = seen.lock().unwrap().take().unwrap();
        assert_eq!(request.queue_url(), Some(QUEUE_URL));
        assert_eq!(request.max_number_of_messages(), Some(1));
        assert_eq!(request.wait_time_seconds(), Some(20), "Wait is capped at 20 s");
        assert_eq!(
            request.message_system_attribute_names(),
            &[MessageSystemAttributeName::SentTimestamp]
        );
        assert_eq!(request.message_attribute_names(), &[ALL_ATTRIBUTES.to_string()]);
        assert_eq!(rule.num_calls(), 1);
    }

    #[tokio::test]
    async fn empty_receive_is_none() {
        let rule = mock!(Client::receive_message)
            .then_output(|| ReceiveMessageOutput::builder().build());
        let queue = SqsQueue::from_client(mock_client!(aws_sdk_sqs, [&rule]));

        let message = queue.receive(&QueueEndpoint::new(QUEUE_URL), 5).await.unwrap();

        assert!(message.is_none());
    }

    #[tokio::test]
    async fn resolve_returns_the_queue_url() {
        let rule = mock!(Client::get_queue_url)
            .match_requests(|request| request.queue_name() == Some("chaos-commands"))
            .then_output(|| GetQueueUrlOutput::builder().queue_url(QUEUE_URL).build());
        let queue = SqsQueue::from_client(mock_client!(aws_sdk_sqs, [&rule]));

        let endpoint = queue.resolve("chaos-commands").await.unwrap();

        assert_eq!(endpoint.as_str(), QUEUE_URL);
    }

    #[tokio::test]
    async fn missing_queue_maps_to_queue_not_found() {
        let rule = mock!(Client::get_queue_url).then_error(|| {
            GetQueueUrlError::QueueDoesNotExist(
                QueueDoesNotExist::builder()
                    .message("The specified queue does not exist.")
                    .build(),
            )
        });
        let queue = SqsQueue::from_client(mock_client!(aws_sdk_sqs, [&rule]));

        let err = queue.resolve("no-such-queue").await.unwrap_err();

        assert!(matches!(err, ListenerError::QueueNotFound(ref name) if name == "no-such-queue"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn other_resolve_failures_keep_the_reason() {
        let rule = mock!(Client::get_queue_url).then_error(|| {
            GetQueueUrlError::InvalidAddress(
                InvalidAddress::builder().message("bad address").build(),
            )
        });
        let queue = SqsQueue::from_client(mock_client!(aws_sdk_sqs, [&rule]));

        let err = queue.resolve("chaos-commands").await.unwrap_err();

        match err {
            ListenerError::Resolve { queue, reason } => {
                assert_eq!(queue, "chaos-commands");
                assert!(reason.contains("bad address"), "reason was {reason:?}");
            }
            other => panic!("expected a resolve error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolve_without_a_url_is_an_error() {
        let rule =
            mock!(Client::get_queue_url).then_output(|| GetQueueUrlOutput::builder().build());
        let queue = SqsQueue::from_client(mock_client!(aws_sdk_sqs, [&rule]));

        let err = queue.resolve("chaos-commands").await.unwrap_err();

        assert!(matches!(err, ListenerError::Resolve { .. }));
    }
}
