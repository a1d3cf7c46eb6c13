//! Decrement-and-requeue fan-out.
//!
//! A message published with `Nodes = N` is claimed by one node, which puts a
//! copy back with `Nodes = N - 1` for the next node. The copy with `Nodes = 1`
//! is the last one; whoever claims it publishes nothing. No node needs to know
//! the cluster size, only the counter travelling with the message.

use crate::error::{ListenerError, ListenerResult};
use crate::message::{Message, NodeCount, OutgoingMessage, QueueEndpoint};
use crate::queue::QueueService;
use tracing::{debug, error, info, warn};

/// What to do with a claimed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutPlan {
    /// No `Nodes` attribute: a single-node command.
    Untracked,
    /// `Nodes` could not be parsed; propagation stops.
    Malformed { value: String, reason: String },
    /// This node took the last copy.
    ChainComplete,
    /// Re-publish for `remaining` more nodes.
    Forward {
        remaining: NodeCount,
        message: OutgoingMessage,
    },
}

/// Result of running fan-out for one claimed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    Untracked,
    Malformed,
    ChainComplete,
    Forwarded { remaining: NodeCount },
    SendFailed { remaining: NodeCount },
}

/// Decide the fan-out step for a claimed message without touching the queue.
pub fn plan_fanout(message: &Message) -> FanoutPlan {
    let count = match message.node_count() {
        None => return FanoutPlan::Untracked,
        Some(Ok(count)) => count,
        Some(Err(ListenerError::MalformedCounter { value, reason })) => {
            return FanoutPlan::Malformed { value, reason }
        }
        Some(Err(other)) => {
            return FanoutPlan::Malformed {
                value: String::new(),
                reason: other.to_string(),
            }
        }
    };

    match count.decrement() {
        None => FanoutPlan::ChainComplete,
        Some(remaining) => FanoutPlan::Forward {
            remaining,
            message: message.forward(remaining),
        },
    }
}

/// Re-publish a claimed message for the next node, if its counter says so.
///
/// Never fails: a send error only means fewer nodes see the command, and the
/// node that already claimed it must keep its copy.
pub async fn fanout<Q>(queue: &Q, endpoint: &QueueEndpoint, message: &Message) -> FanoutOutcome
where
    Q: QueueService + ?Sized,
{
    match plan_fanout(message) {
        FanoutPlan::Untracked => {
            debug!("Nodes attribute not found, not resending message for other nodes");
            FanoutOutcome::Untracked
        }
        FanoutPlan::Malformed { value, reason } => {
            error!(
                nodes = %value,
                reason = %reason,
                message_id = message.message_id.as_deref().unwrap_or("unknown"),
                "Nodes value is not a positive integer, not resending message"
            );
            FanoutOutcome::Malformed
        }
        FanoutPlan::ChainComplete => {
            debug!("Node counter is now zero, not resending message");
            FanoutOutcome::ChainComplete
        }
        FanoutPlan::Forward {
            remaining,
            message: outgoing,
        } => match queue.send(endpoint, &outgoing).await {
            Ok(()) => {
                debug!(remaining = remaining.get(), "Resent message with decremented node counter");
                FanoutOutcome::Forwarded { remaining }
            }
            Err(e) => {
                warn!(
                    remaining = remaining.get(),
                    error = %e,
                    "Failed to resend message with decremented counter"
                );
                FanoutOutcome::SendFailed { remaining }
            }
        },
    }
}

/// Send `body` as the first copy of a round reaching `nodes` nodes.
///
/// Unlike [`fanout`], a send failure is returned: nothing has been claimed
/// yet, so the caller can simply retry.
pub async fn start_round<Q>(
    queue: &Q,
    endpoint: &QueueEndpoint,
    body: &str,
    nodes: NodeCount,
) -> ListenerResult<()>
where
    Q: QueueService + ?Sized,
{
    let message = OutgoingMessage::new(body).with_nodes(nodes);
    queue.send(endpoint, &message).await?;
    info!(endpoint = %endpoint, nodes = nodes.get(), "Started fan-out round");
    Ok(())
}
