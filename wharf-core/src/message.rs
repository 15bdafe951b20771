//! Message types for Wharf
//!
//! This module provides the message values exchanged between the engine and
//! the application: the text/binary kind discriminator and the complete
//! received-message value handed to subscribers. Frame-level concerns
//! (fragmentation, masking, control frames) live in the channel collaborator
//! and never surface here.

use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// Identity of a connected client
///
/// Generated by the server at accept time and unique for the lifetime of the
/// server, never derived from the peer's address and port.
pub type ClientId = Uuid;

/// Kind of a data message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageKind {
    /// UTF-8 text payload
    Text,
    /// Opaque binary payload
    Binary,
}

impl MessageKind {
    /// Check if this is a text message
    pub fn is_text(&self) -> bool {
        matches!(self, MessageKind::Text)
    }

    /// Check if this is a binary message
    pub fn is_binary(&self) -> bool {
        matches!(self, MessageKind::Binary)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Binary => write!(f, "binary"),
        }
    }
}

/// A complete data message received from a connected client
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Identity of the sending client
    pub client_id: ClientId,
    /// Text or binary
    pub kind: MessageKind,
    /// Complete, reassembled message payload
    pub payload: Bytes,
}

impl IncomingMessage {
    /// Create a new received message
    pub fn new(client_id: ClientId, kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            client_id,
            kind,
            payload: payload.into(),
        }
    }

    /// Get the payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Get the payload as text, replacing invalid UTF-8 sequences
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl fmt::Display for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} message ({} bytes) from {}", self.kind, self.len(), self.client_id)
    }
}
