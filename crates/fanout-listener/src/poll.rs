//! Idempotent long-poll receive.

use crate::error::ListenerResult;
use crate::fanout::fanout;
use crate::message::QueueEndpoint;
use crate::queue::{QueueService, MAX_WAIT_SECONDS};
use std::time::Duration;
use tracing::{debug, info};

/// Default pause after re-reading a message this node already handled.
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_secs(60);

/// Digest of the last message this node claimed.
///
/// Owned by the caller's poll loop and lent to each [`poll_once`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupState {
    last_seen_digest: String,
}

impl DedupState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a digest seen before, e.g. one persisted across restarts.
    pub fn with_digest(digest: impl Into<String>) -> Self {
        Self {
            last_seen_digest: digest.into(),
        }
    }

    pub fn last_seen_digest(&self) -> &str {
        &self.last_seen_digest
    }

    fn is_duplicate(&self, digest: &str) -> bool {
        self.last_seen_digest == digest
    }

    fn record(&mut self, digest: &str) {
        self.last_seen_digest = digest.to_string();
    }
}

/// Per-call polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Long-poll wait per receive, capped at [`MAX_WAIT_SECONDS`].
    pub wait_seconds: u32,
    /// Pause after seeing a message this node already claimed.
    pub quiescence: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            wait_seconds: MAX_WAIT_SECONDS,
            quiescence: DEFAULT_QUIESCENCE,
        }
    }
}

/// Receive, claim and fan out at most one message.
///
/// 1. Long-polls for one message.
/// 2. Returns `None` if nothing arrived.
/// 3. If the body digest equals `dedup`'s last seen digest, leaves the
///    message in the queue, sleeps `settings.quiescence` and returns `None`.
/// 4. Otherwise deletes it, records its digest, runs [`fanout`] and returns
///    the body.
///
/// Receive and delete failures are returned as errors; `dedup` is only
/// updated once the message has been deleted.
pub async fn poll_once<Q>(
    queue: &Q,
    endpoint: &QueueEndpoint,
    settings: PollSettings,
    dedup: &mut DedupState,
) -> ListenerResult<Option<String>>
where
    Q: QueueService + ?Sized,
{
    let wait_seconds = settings.wait_seconds.min(MAX_WAIT_SECONDS);

    let message = match queue.receive(endpoint, wait_seconds).await? {
        Some(message) => message,
        None => {
            debug!(wait_seconds, "Received 0 messages");
            return Ok(None);
        }
    };

    debug!(
        message_id = message.message_id.as_deref().unwrap_or("unknown"),
        digest = %message.body_digest,
        sent_at = ?message.sent_timestamp,
        attributes = message.attributes.len(),
        "Received 1 message"
    );

    if dedup.is_duplicate(&message.body_digest) {
        info!(
            body = %message.body,
            quiescence_secs = settings.quiescence.as_secs_f64(),
            "Message contains current command, not deleting"
        );
        tokio::time::sleep(settings.quiescence).await;
        return Ok(None);
    }

    queue.delete(endpoint, &message.receipt_handle).await?;
    debug!(digest = %message.body_digest, "Message deleted");

    dedup.record(&message.body_digest);

    let outcome = fanout(queue, endpoint, &message).await;
    debug!(outcome = ?outcome, "Fan-out finished");

    Ok(Some(message.body))
}
