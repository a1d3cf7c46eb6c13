//! Process-local queue with SQS-like delivery semantics.
//!
//! Receives long-poll until a message is visible or the wait expires. A
//! received message stays in the queue, hidden for the visibility timeout,
//! until it is deleted with the receipt handle of its latest delivery.

use crate::error::{ListenerError, ListenerResult};
use crate::message::{body_digest, Message, MessageAttribute, OutgoingMessage, QueueEndpoint, ReceiptHandle};
use crate::queue::{QueueService, MAX_WAIT_SECONDS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

const ENDPOINT_SCHEME: &str = "memory://";

/// Visibility timeout SQS applies when a queue doesn't set one.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

struct StoredMessage {
    message_id: String,
    body: String,
    digest: String,
    attributes: HashMap<String, MessageAttribute>,
    sent_at: DateTime<Utc>,
    receipt: Option<String>,
    invisible_until: Option<Instant>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.invisible_until.map_or(true, |until| until <= now)
    }
}

#[derive(Default)]
struct NamedQueue {
    messages: VecDeque<StoredMessage>,
    arrivals: Arc<Notify>,
}

/// In-memory [`QueueService`].
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, NamedQueue>>,
    visibility_timeout: Duration,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// A zero timeout leaves received messages visible to the next receive.
    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            visibility_timeout,
        }
    }

    /// Create a queue (no-op if it exists) and return its endpoint.
    pub async fn create_queue(&self, name: &str) -> QueueEndpoint {
        self.queues.lock().await.entry(name.to_string()).or_default();
        QueueEndpoint::new(format!("{ENDPOINT_SCHEME}{name}"))
    }

    /// Number of messages in the queue, visible or not.
    pub async fn len(&self, endpoint: &QueueEndpoint) -> usize {
        let queues = self.queues.lock().await;
        queue_name(endpoint)
            .and_then(|name| queues.get(name))
            .map_or(0, |queue| queue.messages.len())
    }

    pub async fn is_empty(&self, endpoint: &QueueEndpoint) -> bool {
        self.len(endpoint).await == 0
    }

    /// Bodies and attributes currently queued, oldest first.
    pub async fn snapshot(&self, endpoint: &QueueEndpoint) -> Vec<OutgoingMessage> {
        let queues = self.queues.lock().await;
        queue_name(endpoint)
            .and_then(|name| queues.get(name))
            .map(|queue| {
                queue
                    .messages
                    .iter()
                    .map(|stored| OutgoingMessage {
                        body: stored.body.clone(),
                        attributes: stored.attributes.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn queue_name(endpoint: &QueueEndpoint) -> Option<&str> {
    endpoint.as_str().strip_prefix(ENDPOINT_SCHEME)
}

#[async_trait]
impl QueueService for InMemoryQueue {
    async fn resolve(&self, name: &str) -> ListenerResult<QueueEndpoint> {
        if self.queues.lock().await.contains_key(name) {
            Ok(QueueEndpoint::new(format!("{ENDPOINT_SCHEME}{name}")))
        } else {
            Err(ListenerError::QueueNotFound(name.to_string()))
        }
    }

    async fn receive(
        &self,
        endpoint: &QueueEndpoint,
        wait_seconds: u32,
    ) -> ListenerResult<Option<Message>> {
        let name = queue_name(endpoint)
            .ok_or_else(|| ListenerError::Receive(format!("not an in-memory queue: {endpoint}")))?;
        let deadline =
            Instant::now() + Duration::from_secs(u64::from(wait_seconds.min(MAX_WAIT_SECONDS)));

        loop {
            let mut queues = self.queues.lock().await;
            let queue = queues
                .get_mut(name)
                .ok_or_else(|| ListenerError::Receive(format!("queue {name:?} does not exist")))?;

            let now = Instant::now();
            if let Some(stored) = queue.messages.iter_mut().find(|m| m.is_visible(now)) {
                let receipt = Uuid::new_v4().to_string();
                stored.receipt = Some(receipt.clone());
                if !self.visibility_timeout.is_zero() {
                    stored.invisible_until = Some(now + self.visibility_timeout);
                }

                debug!(queue = name, message_id = %stored.message_id, "Delivering message");
                return Ok(Some(Message {
                    message_id: Some(stored.message_id.clone()),
                    body: stored.body.clone(),
                    attributes: stored.attributes.clone(),
                    body_digest: stored.digest.clone(),
                    receipt_handle: ReceiptHandle::new(receipt),
                    sent_timestamp: Some(stored.sent_at),
                }));
            }

            if now >= deadline {
                return Ok(None);
            }

            // Wake on a new message, on the wait deadline, or when a hidden
            // message becomes visible again, whichever comes first.
            let wake_at = queue
                .messages
                .iter()
                .filter_map(|m| m.invisible_until)
                .min()
                .map_or(deadline, |until| until.min(deadline));

            let arrivals = queue.arrivals.clone();
            let notified = arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(queues);

            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn delete(
        &self,
        endpoint: &QueueEndpoint,
        receipt: &ReceiptHandle,
    ) -> ListenerResult<()> {
        let name = queue_name(endpoint)
            .ok_or_else(|| ListenerError::Delete(format!("not an in-memory queue: {endpoint}")))?;
        let mut queues = self.queues.lock().await;
        let queue = queues
            .get_mut(name)
            .ok_or_else(|| ListenerError::Delete(format!("queue {name:?} does not exist")))?;

        let position = queue
            .messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt.as_str()))
            .ok_or_else(|| {
                ListenerError::Delete(format!("receipt handle {} is not valid", receipt.as_str()))
            })?;

        queue.messages.remove(position);
        Ok(())
    }

    async fn send(
        &self,
        endpoint: &QueueEndpoint,
        message: &OutgoingMessage,
    ) -> ListenerResult<()> {
        let name = queue_name(endpoint)
            .ok_or_else(|| ListenerError::Send(format!("not an in-memory queue: {endpoint}")))?;
        let mut queues = self.queues.lock().await;
        let queue = queues
            .get_mut(name)
            .ok_or_else(|| ListenerError::Send(format!("queue {name:?} does not exist")))?;

        queue.messages.push_back(StoredMessage {
            message_id: Uuid::new_v4().to_string(),
            digest: body_digest(&message.body),
            body: message.body.clone(),
            attributes: message.attributes.clone(),
            sent_at: Utc::now(),
            receipt: None,
            invisible_until: None,
        });
        queue.arrivals.notify_waiters();
        Ok(())
    }
}
