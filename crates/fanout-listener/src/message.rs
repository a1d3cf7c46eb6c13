//! Queue message model and the `Nodes` fan-out counter.

use crate::error::{ListenerError, ListenerResult};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;

/// Attribute carrying the number of nodes that still need a copy.
pub const NODES_ATTRIBUTE: &str = "Nodes";

/// Resolved queue handle (the queue URL for SQS).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueEndpoint(String);

impl QueueEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token identifying one delivery of a message; required to delete it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Coarse classification of an attribute's data type label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Number,
    Binary,
}

/// A custom message attribute.
///
/// The data type label is kept verbatim (including custom suffixes such as
/// `Number.int`) so attributes re-sent during fan-out are identical to the
/// ones received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttribute {
    pub data_type: String,
    pub string_value: Option<String>,
    pub binary_value: Option<Vec<u8>>,
}

impl MessageAttribute {
    /// A `String` typed attribute.
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    /// A `Number` typed attribute.
    pub fn number(value: impl ToString) -> Self {
        Self {
            data_type: "Number".to_string(),
            string_value: Some(value.to_string()),
            binary_value: None,
        }
    }

    /// A `Binary` typed attribute.
    pub fn binary(value: Vec<u8>) -> Self {
        Self {
            data_type: "Binary".to_string(),
            string_value: None,
            binary_value: Some(value),
        }
    }

    pub fn kind(&self) -> AttributeKind {
        if self.data_type.starts_with("Number") {
            AttributeKind::Number
        } else if self.data_type.starts_with("Binary") {
            AttributeKind::Binary
        } else {
            AttributeKind::String
        }
    }

    /// The string value, if this is not a binary attribute.
    pub fn value(&self) -> Option<&str> {
        self.string_value.as_deref()
    }
}

/// Remaining number of nodes that should receive a message, including the
/// node currently holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeCount(NonZeroU32);

impl NodeCount {
    pub fn new(count: u32) -> Option<Self> {
        NonZeroU32::new(count).map(Self)
    }

    /// Parse the wire representation of the `Nodes` attribute.
    ///
    /// Zero, negative and out-of-range values are malformed: a counter that
    /// has already reached zero must never be re-derived into a live one.
    pub fn parse(raw: &str) -> ListenerResult<Self> {
        let value: i64 = raw
            .parse()
            .map_err(|e: std::num::ParseIntError| ListenerError::MalformedCounter {
                value: raw.to_string(),
                reason: e.to_string(),
            })?;

        let value = u32::try_from(value).map_err(|_| ListenerError::MalformedCounter {
            value: raw.to_string(),
            reason: "out of range".to_string(),
        })?;

        Self::new(value).ok_or_else(|| ListenerError::MalformedCounter {
            value: raw.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Count left after this node takes its copy. `None` ends the chain.
    pub fn decrement(self) -> Option<Self> {
        Self::new(self.get() - 1)
    }
}

impl fmt::Display for NodeCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hex MD5 of a message body, the digest SQS reports as `MD5OfBody`.
pub fn body_digest(body: &str) -> String {
    format!("{:x}", Md5::digest(body.as_bytes()))
}

/// A message received from the queue.
#[derive(Debug, Clone)]
pub struct Message {
    pub message_id: Option<String>,
    pub body: String,
    pub attributes: HashMap<String, MessageAttribute>,
    pub body_digest: String,
    pub receipt_handle: ReceiptHandle,
    pub sent_timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// The fan-out counter, if this message is part of a fan-out round.
    pub fn node_count(&self) -> Option<ListenerResult<NodeCount>> {
        let attribute = self.attributes.get(NODES_ATTRIBUTE)?;
        Some(match attribute.value() {
            Some(raw) => NodeCount::parse(raw),
            None => Err(ListenerError::MalformedCounter {
                value: String::new(),
                reason: format!("{} attribute has no string value", attribute.data_type),
            }),
        })
    }

    /// A copy of this message for the next node, with `Nodes` rewritten.
    ///
    /// The body and every other attribute are carried over untouched, as is
    /// the data type label of `Nodes` itself.
    pub fn forward(&self, remaining: NodeCount) -> OutgoingMessage {
        let mut attributes = self.attributes.clone();
        if let Some(attribute) = attributes.get_mut(NODES_ATTRIBUTE) {
            attribute.string_value = Some(remaining.to_string());
        }

        OutgoingMessage {
            body: self.body.clone(),
            attributes,
        }
    }
}

/// A message to publish onto the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub body: String,
    pub attributes: HashMap<String, MessageAttribute>,
}

impl OutgoingMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    /// Start a fan-out round that reaches `nodes` nodes.
    pub fn with_nodes(mut self, nodes: NodeCount) -> Self {
        self.attributes
            .insert(NODES_ATTRIBUTE.to_string(), MessageAttribute::number(nodes));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: MessageAttribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }
}
