//! The queueing service seen by the listener.

use crate::error::ListenerResult;
use crate::message::{Message, OutgoingMessage, QueueEndpoint, ReceiptHandle};
use async_trait::async_trait;
use std::sync::Arc;

/// Longest long-poll wait a single receive may ask for, in seconds.
pub const MAX_WAIT_SECONDS: u32 = 20;

/// Remote queue operations the fan-out protocol is built on.
///
/// Implementations request at most one message per receive, along with the
/// `SentTimestamp` system attribute and every custom attribute.
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Turn a queue name into an endpoint.
    ///
    /// Fails with `QueueNotFound` when no queue has that name.
    async fn resolve(&self, name: &str) -> ListenerResult<QueueEndpoint>;

    /// Long-poll for up to `wait_seconds` and return at most one message.
    ///
    /// `Ok(None)` is the normal timeout path.
    async fn receive(
        &self,
        endpoint: &QueueEndpoint,
        wait_seconds: u32,
    ) -> ListenerResult<Option<Message>>;

    /// Delete one delivery of a message.
    async fn delete(&self, endpoint: &QueueEndpoint, receipt: &ReceiptHandle)
        -> ListenerResult<()>;

    /// Publish a new message.
    async fn send(&self, endpoint: &QueueEndpoint, message: &OutgoingMessage)
        -> ListenerResult<()>;
}

#[async_trait]
impl<Q: QueueService + ?Sized> QueueService for Arc<Q> {
    async fn resolve(&self, name: &str) -> ListenerResult<QueueEndpoint> {
        (**self).resolve(name).await
    }

    async fn receive(
        &self,
        endpoint: &QueueEndpoint,
        wait_seconds: u32,
    ) -> ListenerResult<Option<Message>> {
        (**self).receive(endpoint, wait_seconds).await
    }

    async fn delete(
        &self,
        endpoint: &QueueEndpoint,
        receipt: &ReceiptHandle,
    ) -> ListenerResult<()> {
        (**self).delete(endpoint, receipt).await
    }

    async fn send(
        &self,
        endpoint: &QueueEndpoint,
        message: &OutgoingMessage,
    ) -> ListenerResult<()> {
        (**self).send(endpoint, message).await
    }
}
