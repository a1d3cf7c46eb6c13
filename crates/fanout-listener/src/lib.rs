//! Fan-out listener: delivers each command from a shared queue to every node
//! of a cluster.
//!
//! Nodes long-poll one standard queue. The node that claims a message
//! (deletes it by receipt handle) re-publishes a copy with its `Nodes`
//! counter decremented, so the next node can claim it in turn.
//!
//! # Core Invariants
//!
//! 1. **Claim by delete**: a body is returned only after its delete succeeded
//! 2. **Idempotent per node**: a node never returns the same body digest twice
//!    in a row; it leaves the message for others and backs off instead
//! 3. **Counter-bounded**: the copy carrying `Nodes = 1` is never re-published
//! 4. **Best-effort propagation**: a failed re-publish never undoes a claim
//!
//! # Architecture
//!
//! ```text
//! publish (Nodes=N) -> Queue -> node A -> delete, send (Nodes=N-1)
//!                        ^                              |
//!                        |______________________________|
//! ```

pub mod config;
pub mod error;
pub mod fanout;
pub mod listener;
pub mod memory;
pub mod message;
pub mod paths;
pub mod poll;
pub mod queue;
pub mod sqs;

#[cfg(test)]
mod tests;

pub use config::ListenerConfig;
pub use error::{ListenerError, ListenerResult};
pub use fanout::{fanout, plan_fanout, start_round, FanoutOutcome, FanoutPlan};
pub use listener::{CollectingSink, CommandSink, Listener, StdoutSink};
pub use memory::InMemoryQueue;
pub use message::{
    body_digest, AttributeKind, Message, MessageAttribute, NodeCount, OutgoingMessage,
    QueueEndpoint, ReceiptHandle, NODES_ATTRIBUTE,
};
pub use paths::Paths;
pub use poll::{poll_once, DedupState, PollSettings};
pub use queue::{QueueService, MAX_WAIT_SECONDS};
pub use sqs::{SqsQueue, SqsSettings};
