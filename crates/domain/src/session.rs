//! Per-device session lifecycle.
//!
//! A session walks through a small state machine. Every transition is
//! validated against the current state so that, e.g., a service discovery
//! requested while disconnected is rejected instead of silently waiting on
//! an event that can never arrive.
//!
//! ```text
//! Disconnected ──ConnectRequested──▶ Connecting ──Connected──▶ Connected
//!      ▲                                 │                        │
//!      └────────────ConnectFailed────────┘              DiscoveryRequested
//!                                                                  ▼
//!      Ready ◀──────────────DiscoveryStarted──────────────── Discovering
//! ```
//!
//! `DisconnectRequested` moves any linked state to `Disconnecting`, and
//! `LinkLost` drops any linked or connecting state straight to
//! `Disconnected`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a device session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Discovering,
    Ready,
    Disconnecting,
}

/// Something that happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    ConnectRequested,
    Connected,
    ConnectFailed,
    DiscoveryRequested,
    DiscoveryStarted,
    DiscoveryFailed,
    DisconnectRequested,
    Disconnected,
    DisconnectFailed,
    /// The link dropped without a disconnect having been requested.
    LinkLost,
}

/// A rejected session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event:?} while {from}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub event: SessionEvent,
}

impl SessionState {
    /// Compute the state reached by applying `event`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when `event` is not allowed from `self`.
    pub fn apply(self, event: SessionEvent) -> Result<Self, InvalidTransition> {
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self, event) {
            (S::Disconnected, E::ConnectRequested) => S::Connecting,
            (S::Connecting, E::Connected) => S::Connected,
            (S::Connecting, E::ConnectFailed) => S::Disconnected,
            (S::Connected | S::Ready, E::DiscoveryRequested) => S::Discovering,
            (S::Discovering, E::DiscoveryStarted) => S::Ready,
            (S::Discovering, E::DiscoveryFailed) => S::Connected,
            (S::Connected | S::Discovering | S::Ready, E::DisconnectRequested) => S::Disconnecting,
            (S::Disconnecting, E::Disconnected) => S::Disconnected,
            (S::Disconnecting, E::DisconnectFailed) => S::Connected,
            (
                S::Connecting | S::Connected | S::Discovering | S::Ready | S::Disconnecting,
                E::LinkLost,
            ) => S::Disconnected,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// Whether the link to the device is up.
    #[must_use]
    pub fn is_linked(self) -> bool {
        matches!(self, Self::Connected | Self::Discovering | Self::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Discovering => "discovering",
            Self::Ready => "ready",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_walk_happy_path() {
        let state = SessionState::default()
            .apply(SessionEvent::ConnectRequested)
            .and_then(|s| s.apply(SessionEvent::Connected))
            .and_then(|s| s.apply(SessionEvent::DiscoveryRequested))
            .and_then(|s| s.apply(SessionEvent::DiscoveryStarted))
            .and_then(|s| s.apply(SessionEvent::DisconnectRequested))
            .and_then(|s| s.apply(SessionEvent::Disconnected))
            .unwrap();
        assert_eq!(state, SessionState::Disconnected);
    }

    #[test]
    fn should_reject_discovery_while_disconnected() {
        let err = SessionState::Disconnected
            .apply(SessionEvent::DiscoveryRequested)
            .unwrap_err();
        assert_eq!(err.from, SessionState::Disconnected);
        assert_eq!(err.event, SessionEvent::DiscoveryRequested);
        assert_eq!(
            err.to_string(),
            "cannot apply DiscoveryRequested while disconnected"
        );
    }

    #[test]
    fn should_reject_second_connect_while_connecting() {
        assert!(
            SessionState::Connecting
                .apply(SessionEvent::ConnectRequested)
                .is_err()
        );
    }

    #[test]
    fn should_return_to_disconnected_on_failed_connect() {
        let state = SessionState::Connecting
            .apply(SessionEvent::ConnectFailed)
            .unwrap();
        assert_eq!(state, SessionState::Disconnected);
    }

    #[test]
    fn should_fall_back_to_connected_on_failed_discovery() {
        let state = SessionState::Discovering
            .apply(SessionEvent::DiscoveryFailed)
            .unwrap();
        assert_eq!(state, SessionState::Connected);
    }

    #[test]
    fn should_drop_to_disconnected_on_link_loss_from_any_linked_state() {
        for from in [
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Discovering,
            SessionState::Ready,
            SessionState::Disconnecting,
        ] {
            assert_eq!(
                from.apply(SessionEvent::LinkLost).unwrap(),
                SessionState::Disconnected
            );
        }
        assert!(
            SessionState::Disconnected
                .apply(SessionEvent::LinkLost)
                .is_err()
        );
    }

    #[test]
    fn should_report_linked_states() {
        assert!(SessionState::Ready.is_linked());
        assert!(SessionState::Connected.is_linked());
        assert!(!SessionState::Connecting.is_linked());
        assert!(!SessionState::Disconnecting.is_linked());
    }
}
