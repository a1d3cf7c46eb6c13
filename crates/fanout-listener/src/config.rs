//! Configuration for the fan-out listener.
//!
//! Values are layered: built-in defaults, then the JSON config file, then
//! `FANOUT_*` environment variables, then command-line flags.

use crate::error::{ListenerError, ListenerResult};
use crate::poll::PollSettings;
use crate::queue::MAX_WAIT_SECONDS;
use crate::sqs::SqsSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default pause after re-reading an already claimed message, in seconds.
pub const DEFAULT_QUIESCENCE_SECS: u64 = 60;

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Name of the queue to listen on.
    pub queue_name: Option<String>,
    /// Long-poll wait per receive (at most 20).
    pub wait_secs: u32,
    /// Pause after seeing a message this node already claimed.
    pub quiescence_secs: u64,
    /// AWS region override.
    pub region: Option<String>,
    /// SQS endpoint override.
    pub endpoint_url: Option<String>,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            queue_name: None,
            wait_secs: MAX_WAIT_SECONDS,
            quiescence_secs: DEFAULT_QUIESCENCE_SECS,
            region: None,
            endpoint_url: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ListenerConfig {
    /// Load from `path` if it exists (defaults otherwise), then apply the
    /// environment.
    pub fn load(path: &Path) -> ListenerResult<Self> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// [`ListenerConfig::load`] with an explicit environment lookup.
    pub fn load_with_env<F>(path: &Path, lookup: F) -> ListenerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };

        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ListenerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ListenerConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override values from `FANOUT_*` variables found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> ListenerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(queue_name) = get("FANOUT_QUEUE_NAME") {
            self.queue_name = Some(queue_name);
        }
        if let Some(raw) = get("FANOUT_WAIT_SECS") {
            self.wait_secs = parse_env("FANOUT_WAIT_SECS", &raw)?;
        }
        if let Some(raw) = get("FANOUT_QUIESCENCE_SECS") {
            self.quiescence_secs = parse_env("FANOUT_QUIESCENCE_SECS", &raw)?;
        }
        if let Some(region) = get("FANOUT_AWS_REGION") {
            self.region = Some(region);
        }
        if let Some(endpoint_url) = get("FANOUT_ENDPOINT_URL") {
            self.endpoint_url = Some(endpoint_url);
        }
        if let Some(log_level) = get("FANOUT_LOG_LEVEL") {
            self.log_level = log_level;
        }
        Ok(())
    }

    /// Check that the configuration can drive a listener.
    pub fn validate(&self) -> ListenerResult<()> {
        self.queue_name()?;
        if self.wait_secs > MAX_WAIT_SECONDS {
            return Err(ListenerError::Config(format!(
                "wait_secs must be at most {MAX_WAIT_SECONDS}, got {}",
                self.wait_secs
            )));
        }
        Ok(())
    }

    /// The configured queue name.
    pub fn queue_name(&self) -> ListenerResult<&str> {
        self.queue_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ListenerError::Config("a queue name is required".to_string()))
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            wait_seconds: self.wait_secs,
            quiescence: Duration::from_secs(self.quiescence_secs),
        }
    }

    pub fn sqs_settings(&self) -> SqsSettings {
        SqsSettings {
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> ListenerResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ListenerError::Config(format!("{name} must be a non-negative integer, got {raw:?}")))
}
