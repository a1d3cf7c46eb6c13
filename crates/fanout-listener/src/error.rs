//! Error types for the fan-out listener.

use thiserror::Error;

/// Listener error type.
#[derive(Error, Debug)]
pub enum ListenerError {
    /// No queue matches the configured name
    #[error("Unable to find queue {0:?}")]
    QueueNotFound(String),

    /// Queue name resolution failed for another reason
    #[error("Unable to resolve queue {queue:?}: {reason}")]
    Resolve { queue: String, reason: String },

    /// Long-poll receive failed
    #[error("Unable to receive message: {0}")]
    Receive(String),

    /// Claiming (deleting) a received message failed
    #[error("Unable to delete message: {0}")]
    Delete(String),

    /// Re-publishing a message for the next node failed
    #[error("Unable to send message: {0}")]
    Send(String),

    /// The `Nodes` attribute is not a positive integer
    #[error("Nodes value {value:?} is not a positive integer: {reason}")]
    MalformedCounter { value: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (config file, paths)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (config file)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ListenerError {
    /// Whether this error should terminate the listener.
    ///
    /// Send failures and malformed counters only cost a fan-out hop; the node
    /// that claimed the message still gets its command.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ListenerError::Send(_) | ListenerError::MalformedCounter { .. }
        )
    }
}

/// Result type for listener operations.
pub type ListenerResult<T> = Result<T, ListenerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_not_found_display() {
        let err = ListenerError::QueueNotFound("chaos".to_string());
        assert_eq!(err.to_string(), "Unable to find queue \"chaos\"");
    }

    #[test]
    fn malformed_counter_display() {
        let err = ListenerError::MalformedCounter {
            value: "three".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Nodes value \"three\" is not a positive integer: invalid digit found in string"
        );
    }

    #[test]
    fn fatality_follows_error_taxonomy() {
        assert!(ListenerError::QueueNotFound("q".into()).is_fatal());
        assert!(ListenerError::Resolve {
            queue: "q".into(),
            reason: "timeout".into()
        }
        .is_fatal());
        assert!(ListenerError::Receive("boom".into()).is_fatal());
        assert!(ListenerError::Delete("boom".into()).is_fatal());
        assert!(ListenerError::Config("bad".into()).is_fatal());

        assert!(!ListenerError::Send("boom".into()).is_fatal());
        assert!(!ListenerError::MalformedCounter {
            value: "x".into(),
            reason: "nope".into()
        }
        .is_fatal());
    }

    #[test]
    fn json_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{{{").unwrap_err();
        let err: ListenerError = serde_err.into();
        assert!(err.to_string().starts_with("JSON error:"));
        assert!(err.is_fatal());
    }
}
