//! Error types shared across the workspace.
//!
//! Each failure mode is a typed variant; sources are attached with
//! `#[source]`/`#[from]` rather than formatted into the message.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::EventKind;
use crate::session::InvalidTransition;

/// An `error` field carried by a platform event payload.
///
/// The text is whatever the platform reported (hardware rejection, GATT
/// status, adapter missing, …). It is never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(transparent)]
#[error("{message}")]
pub struct PlatformError {
    message: String,
}

impl PlatformError {
    /// Wrap a platform-reported failure message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The reported failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for PlatformError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for PlatformError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Outcome of a failed bridge operation.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The terminal event carried an `error` field.
    #[error("platform rejected the operation")]
    Platform(#[from] PlatformError),

    /// No terminal event arrived before the deadline.
    #[error("timed out after {after:?} waiting for {event}")]
    Timeout {
        /// Event the operation was waiting for.
        event: EventKind,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The operation's subscription was torn down before a terminal event.
    #[error("operation cancelled before a terminal event arrived")]
    Cancelled,

    /// A session operation was attempted from a state that forbids it.
    #[error("invalid session transition")]
    InvalidTransition(#[from] InvalidTransition),

    /// A session operation needs a live link and there is none.
    #[error("device is not connected")]
    NotConnected,

    /// A characteristic value was not valid base64.
    #[error("failed to decode characteristic value")]
    Decode(#[source] base64::DecodeError),
}

impl BridgeError {
    /// Whether this error came from a deadline rather than the platform.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
