//! Poll loop that drives [`poll_once`] for one node.

use crate::error::ListenerResult;
use crate::message::QueueEndpoint;
use crate::poll::{poll_once, DedupState, PollSettings};
use crate::queue::QueueService;
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Receives every command body this node claims.
pub trait CommandSink: Send {
    fn deliver(&mut self, body: &str) -> ListenerResult<()>;
}

/// Writes each command body to stdout on its own line.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl CommandSink for StdoutSink {
    fn deliver(&mut self, body: &str) -> ListenerResult<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{body}")?;
        stdout.flush()?;
        Ok(())
    }
}

/// Collects command bodies in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub bodies: Vec<String>,
}

impl CommandSink for CollectingSink {
    fn deliver(&mut self, body: &str) -> ListenerResult<()> {
        self.bodies.push(body.to_string());
        Ok(())
    }
}

/// One node's listener.
///
/// Resolves the queue once, then keeps the node's dedup state across polls.
pub struct Listener<Q> {
    queue: Q,
    queue_name: String,
    endpoint: QueueEndpoint,
    settings: PollSettings,
    dedup: DedupState,
}

impl<Q: QueueService> Listener<Q> {
    /// Resolve `queue_name` and build a listener for it.
    ///
    /// Resolution failures are returned as-is; without an endpoint there is
    /// nothing to listen on.
    pub async fn connect(queue: Q, queue_name: &str, settings: PollSettings) -> ListenerResult<Self> {
        let endpoint = queue.resolve(queue_name).await?;
        info!(queue = %queue_name, endpoint = %endpoint, "Resolved queue");

        Ok(Self {
            queue,
            queue_name: queue_name.to_string(),
            endpoint,
            settings,
            dedup: DedupState::new(),
        })
    }

    /// Replace the dedup state, e.g. with a digest persisted by a previous run.
    pub fn with_dedup_state(mut self, dedup: DedupState) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn endpoint(&self) -> &QueueEndpoint {
        &self.endpoint
    }

    pub fn dedup_state(&self) -> &DedupState {
        &self.dedup
    }

    /// A single long-poll receive.
    pub async fn poll_once(&mut self) -> ListenerResult<Option<String>> {
        poll_once(&self.queue, &self.endpoint, self.settings, &mut self.dedup).await
    }

    /// Poll until a command arrives or `total` elapses (`None` waits forever).
    ///
    /// Each receive waits at most the configured per-call wait, so long
    /// totals are covered by several receives.
    pub async fn wait_for_command(
        &mut self,
        total: Option<Duration>,
    ) -> ListenerResult<Option<String>> {
        let deadline = total.map(|total| Instant::now() + total);

        loop {
            let settings = match deadline {
                None => self.settings,
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        debug!(queue = %self.queue_name, "Gave up waiting for a command");
                        return Ok(None);
                    }
                    // Neither the receive nor a duplicate's pause may outlast the deadline.
                    let left_secs = u32::try_from(left.as_secs()).unwrap_or(u32::MAX).max(1);
                    PollSettings {
                        wait_seconds: self.settings.wait_seconds.min(left_secs),
                        quiescence: self.settings.quiescence.min(left),
                    }
                }
            };

            if let Some(body) =
                poll_once(&self.queue, &self.endpoint, settings, &mut self.dedup).await?
            {
                return Ok(Some(body));
            }
        }
    }

    /// Poll forever, handing each claimed command to `sink`.
    ///
    /// Returns only on a fatal error (receive, delete, or the sink itself).
    pub async fn run<S: CommandSink>(&mut self, sink: &mut S) -> ListenerResult<()> {
        info!(
            queue = %self.queue_name,
            wait_secs = self.settings.wait_seconds,
            quiescence_secs = self.settings.quiescence.as_secs(),
            "Starting listener loop"
        );

        loop {
            if let Some(body) = self.poll_once().await? {
                info!(queue = %self.queue_name, digest = %self.dedup.last_seen_digest(), "Claimed command");
                sink.deliver(&body)?;
            }
        }
    }
}
