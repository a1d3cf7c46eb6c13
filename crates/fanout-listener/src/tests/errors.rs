//! Transport failures and what they leave behind.

use super::harness::{fast_settings, Call, RecordingQueue, QUEUE_NAME};
use crate::error::{ListenerError, ListenerResult};
use crate::listener::{CommandSink, Listener};
use crate::poll::{poll_once, DedupState};
use std::time::Duration;

const DRAIN: &str = r#"{"Command":"drain"}"#;

#[tokio::test]
async fn delete_failure_is_fatal_and_claims_nothing() {
    let (queue, endpoint) = RecordingQueue::with_queue().await;
    queue.publish(&endpoint, DRAIN, Some(3)).await;
    queue.fail_next_delete();
    let mut dedup = DedupState::new();

    let err = poll_once(queue.as_ref(), &endpoint, fast_settings(), &mut dedup)
        .await
        .unwrap_err();

    assert!(matches!(err, ListenerError::Delete(_)));
    assert!(err.is_fatal());
    assert_eq!(dedup, DedupState::new(), "Digest is recorded only after a delete");
    assert!(queue.sends().is_empty(), "Nothing is resent for an unclaimed message");
    assert_eq!(queue.queued_nodes(&endpoint).await, vec![Some("3".to_string())]);

    // The message is still there for the next attempt.
    let retry = poll_once(queue.as_ref(), &endpoint, fast_settings(), &mut dedup)
        .await
        .unwrap();
    assert_eq!(retry.as_deref(), Some(DRAIN));
}

#[tokio::test]
async fn receive_failure_is_fatal() {
    let (queue, endpoint) = RecordingQueue::with_queue().await;
    queue.publish(&endpoint, DRAIN, None).await;
    queue.fail_receive(true);
    let mut dedup = DedupState::new();

    let err = poll_once(queue.as_ref(), &endpoint, fast_settings(), &mut dedup)
        .await
        .unwrap_err();

    assert!(matches!(err, ListenerError::Receive(_)));
    assert!(err.is_fatal());
    assert_eq!(queue.calls(), vec![Call::Receive { wait_seconds: 0 }]);
    assert!(!queue.inner().is_empty(&endpoint).await);
}

#[tokio::test]
async fn missing_queue_fails_to_connect() {
    let queue = RecordingQueue::new();

    let err = Listener::connect(queue, "no-such-queue", fast_settings())
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ListenerError::QueueNotFound(ref name) if name == "no-such-queue"));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn run_stops_on_fatal_error() {
    let (queue, endpoint) = RecordingQueue::with_queue().await;
    queue.publish(&endpoint, DRAIN, None).await;
    queue.fail_next_delete();

    let mut listener = Listener::connect(queue.clone(), QUEUE_NAME, fast_settings())
        .await
        .unwrap();
    let mut sink = crate::listener::CollectingSink::default();

    let result = tokio::time::timeout(Duration::from_secs(5), listener.run(&mut sink))
        .await
        .expect("run() should return on a fatal error");

    assert!(matches!(result, Err(ListenerError::Delete(_))));
    assert!(sink.bodies.is_empty());
}

struct FailingSink;

impl CommandSink for FailingSink {
    fn deliver(&mut self, _body: &str) -> ListenerResult<()> {
        Err(ListenerError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stdout closed",
        )))
    }
}

#[tokio::test]
async fn run_stops_when_the_sink_fails() {
    let (queue, endpoint) = RecordingQueue::with_queue().await;
    queue.publish(&endpoint, DRAIN, None).await;

    let mut listener = Listener::connect(queue.clone(), QUEUE_NAME, fast_settings())
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), listener.run(&mut FailingSink))
        .await
        .expect("run() should return when the sink fails");

    assert!(matches!(result, Err(ListenerError::Io(_))));
    // The command was claimed before the sink saw it.
    assert!(queue.inner().is_empty(&endpoint).await);
}
