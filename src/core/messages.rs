//! Control messages sent from a page to the worker.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{OffcacheError, Result};

/// A control message, tagged by its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate an installed version now instead of waiting for pages to close.
    SkipWaiting,
    /// Delete every cache generation, then reply.
    CacheClear,
    /// Any other type; ignored.
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Decode a message from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`OffcacheError::MalformedPayload`] if the body is not a JSON
    /// object with a string `type`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| OffcacheError::MalformedPayload(e.to_string()))
    }
}

/// Reply sent on a message's reply channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReply {
    pub success: bool,
}

/// A control message plus the channel its reply goes to, if the sender
/// is listening.
#[derive(Debug)]
pub struct MessageEvent {
    pub message: ControlMessage,
    pub reply: Option<oneshot::Sender<MessageReply>>,
}

impl MessageEvent {
    /// A message with no reply channel.
    #[must_use]
    pub const fn new(message: ControlMessage) -> Self {
        Self {
            message,
            reply: None,
        }
    }

    /// A message plus the receiving end of its reply channel.
    #[must_use]
    pub fn with_reply(message: ControlMessage) -> (Self, oneshot::Receiver<MessageReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                message,
                reply: Some(tx),
            },
            rx,
        )
    }
}
