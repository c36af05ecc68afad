//! Event: one-way notifications emitted by the platform collaborator.
//!
//! Every hardware callback becomes exactly one [`PlatformEvent`]. Events are
//! not correlated with the commands that caused them; the application layer
//! matches them back to pending operations by identifier.
//!
//! On the wire an event is `{"name": <kind>, "payload": {...}}`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::characteristic::{Characteristic, CharacteristicValue};
use crate::device::DeviceAdvertisement;
use crate::error::PlatformError;
use crate::id::{Identified, Identifier};
use crate::service::Service;
use crate::state::BluetoothState;

/// Name of a platform event, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    StateChanged,
    ScanStarted,
    ScanStopped,
    DeviceDiscovered,
    DeviceConnected,
    DeviceDisconnected,
    ServiceDiscoveryStarted,
    ServiceDiscovered,
    CharacteristicDiscoveryStarted,
    CharacteristicDiscovered,
    CharacteristicRead,
    CharacteristicWritten,
    CharacteristicNotified,
    NotifyStateChanged,
}

impl EventKind {
    /// The event name as emitted by the platform.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateChanged => "StateChanged",
            Self::ScanStarted => "ScanStarted",
            Self::ScanStopped => "ScanStopped",
            Self::DeviceDiscovered => "DeviceDiscovered",
            Self::DeviceConnected => "DeviceConnected",
            Self::DeviceDisconnected => "DeviceDisconnected",
            Self::ServiceDiscoveryStarted => "ServiceDiscoveryStarted",
            Self::ServiceDiscovered => "ServiceDiscovered",
            Self::CharacteristicDiscoveryStarted => "CharacteristicDiscoveryStarted",
            Self::CharacteristicDiscovered => "CharacteristicDiscovered",
            Self::CharacteristicRead => "CharacteristicRead",
            Self::CharacteristicWritten => "CharacteristicWritten",
            Self::CharacteristicNotified => "CharacteristicNotified",
            Self::NotifyStateChanged => "NotifyStateChanged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload that may carry an `error` field.
///
/// When `error` is present it takes precedence over any success field of
/// the same payload.
pub trait Fallible {
    /// The platform-reported failure, if any.
    fn error(&self) -> Option<&PlatformError>;
}

/// Payload of acknowledgement-style events: scan start/stop, connection
/// changes, discovery start, write completion and notify-state changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Acknowledgement {
    pub identifier: Option<Identifier>,
    pub error: Option<PlatformError>,
}

impl Acknowledgement {
    /// A successful acknowledgement without identity (scan start/stop).
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// A successful acknowledgement for the given target.
    #[must_use]
    pub fn for_target(identifier: impl Into<Identifier>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            error: None,
        }
    }

    /// Attach a failure to this acknowledgement.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<PlatformError>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Identified for Acknowledgement {
    fn identifier(&self) -> Option<&str> {
        self.identifier.identifier()
    }
}

impl Fallible for Acknowledgement {
    fn error(&self) -> Option<&PlatformError> {
        self.error.as_ref()
    }
}

impl Fallible for CharacteristicValue {
    fn error(&self) -> Option<&PlatformError> {
        self.error.as_ref()
    }
}

/// A typed inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload")]
pub enum PlatformEvent {
    StateChanged { state: BluetoothState },
    ScanStarted(Acknowledgement),
    ScanStopped(Acknowledgement),
    DeviceDiscovered(DeviceAdvertisement),
    DeviceConnected(Acknowledgement),
    DeviceDisconnected(Acknowledgement),
    ServiceDiscoveryStarted(Acknowledgement),
    ServiceDiscovered(Service),
    CharacteristicDiscoveryStarted(Acknowledgement),
    CharacteristicDiscovered(Characteristic),
    CharacteristicRead(CharacteristicValue),
    CharacteristicWritten(Acknowledgement),
    CharacteristicNotified(CharacteristicValue),
    NotifyStateChanged(Acknowledgement),
}

impl PlatformEvent {
    /// The name of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::ScanStarted(_) => EventKind::ScanStarted,
            Self::ScanStopped(_) => EventKind::ScanStopped,
            Self::DeviceDiscovered(_) => EventKind::DeviceDiscovered,
            Self::DeviceConnected(_) => EventKind::DeviceConnected,
            Self::DeviceDisconnected(_) => EventKind::DeviceDisconnected,
            Self::ServiceDiscoveryStarted(_) => EventKind::ServiceDiscoveryStarted,
            Self::ServiceDiscovered(_) => EventKind::ServiceDiscovered,
            Self::CharacteristicDiscoveryStarted(_) => EventKind::CharacteristicDiscoveryStarted,
            Self::CharacteristicDiscovered(_) => EventKind::CharacteristicDiscovered,
            Self::CharacteristicRead(_) => EventKind::CharacteristicRead,
            Self::CharacteristicWritten(_) => EventKind::CharacteristicWritten,
            Self::CharacteristicNotified(_) => EventKind::CharacteristicNotified,
            Self::NotifyStateChanged(_) => EventKind::NotifyStateChanged,
        }
    }

    /// The acknowledgement payload, for acknowledgement-style events.
    #[must_use]
    pub fn acknowledgement(&self) -> Option<&Acknowledgement> {
        match self {
            Self::ScanStarted(ack)
            | Self::ScanStopped(ack)
            | Self::DeviceConnected(ack)
            | Self::DeviceDisconnected(ack)
            | Self::ServiceDiscoveryStarted(ack)
            | Self::CharacteristicDiscoveryStarted(ack)
            | Self::CharacteristicWritten(ack)
            | Self::NotifyStateChanged(ack) => Some(ack),
            _ => None,
        }
    }

    /// The value payload of `CharacteristicRead` / `CharacteristicNotified`.
    #[must_use]
    pub fn characteristic_value(&self) -> Option<&CharacteristicValue> {
        match self {
            Self::CharacteristicRead(value) | Self::CharacteristicNotified(value) => Some(value),
            _ => None,
        }
    }

    /// The advertisement payload of `DeviceDiscovered`.
    #[must_use]
    pub fn advertisement(&self) -> Option<&DeviceAdvertisement> {
        match self {
            Self::DeviceDiscovered(adv) => Some(adv),
            _ => None,
        }
    }

    /// The service payload of `ServiceDiscovered`.
    #[must_use]
    pub fn service(&self) -> Option<&Service> {
        match self {
            Self::ServiceDiscovered(service) => Some(service),
            _ => None,
        }
    }

    /// The characteristic payload of `CharacteristicDiscovered`.
    #[must_use]
    pub fn characteristic(&self) -> Option<&Characteristic> {
        match self {
            Self::CharacteristicDiscovered(characteristic) => Some(characteristic),
            _ => None,
        }
    }

    /// The state payload of `StateChanged`.
    #[must_use]
    pub fn state(&self) -> Option<&BluetoothState> {
        match self {
            Self::StateChanged { state } => Some(state),
            _ => None,
        }
    }
}

impl Identified for PlatformEvent {
    fn identifier(&self) -> Option<&str> {
        match self {
            Self::StateChanged { .. } => None,
            Self::DeviceDiscovered(adv) => adv.identifier(),
            Self::ServiceDiscovered(service) => service.identifier(),
            Self::CharacteristicDiscovered(characteristic) => characteristic.identifier(),
            Self::CharacteristicRead(value) | Self::CharacteristicNotified(value) => {
                value.identifier()
            }
            Self::ScanStarted(ack)
            | Self::ScanStopped(ack)
            | Self::DeviceConnected(ack)
            | Self::DeviceDisconnected(ack)
            | Self::ServiceDiscoveryStarted(ack)
            | Self::CharacteristicDiscoveryStarted(ack)
            | Self::CharacteristicWritten(ack)
            | Self::NotifyStateChanged(ack) => ack.identifier(),
        }
    }
}
