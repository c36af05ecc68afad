//! Command: imperative requests issued to the platform collaborator.
//!
//! Commands are fire-and-forget: their outcome arrives later as one or more
//! [`PlatformEvent`](crate::event::PlatformEvent)s.

use serde::{Deserialize, Serialize};

use crate::characteristic::Characteristic;
use crate::device::Device;
use crate::service::Service;

/// A typed outbound command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "camelCase")]
pub enum PlatformCommand {
    /// Start scanning, optionally restricted to advertised service UUIDs.
    StartScan { service_uuids: Vec<uuid::Uuid> },
    StopScan,
    Connect { device: Device },
    Disconnect { device: Device },
    /// Discover services, restricted to `service_uuids` unless empty.
    DiscoverServices {
        device: Device,
        service_uuids: Vec<uuid::Uuid>,
    },
    /// Discover characteristics, restricted to `characteristic_uuids` unless empty.
    DiscoverCharacteristics {
        service: Service,
        characteristic_uuids: Vec<uuid::Uuid>,
    },
    ReadCharacteristicValue { characteristic: Characteristic },
    /// Write a base64-encoded value.
    WriteCharacteristicValue {
        characteristic: Characteristic,
        value: String,
        with_response: bool,
    },
    /// Enable or disable value notifications on the device side.
    SetNotifyValue {
        characteristic: Characteristic,
        enabled: bool,
    },
    /// Ask the platform to emit a `StateChanged` with the current state.
    NotifyCurrentState,
}

impl PlatformCommand {
    /// The command name, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartScan { .. } => "startScan",
            Self::StopScan => "stopScan",
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::DiscoverServices { .. } => "discoverServices",
            Self::DiscoverCharacteristics { .. } => "discoverCharacteristics",
            Self::ReadCharacteristicValue { .. } => "readCharacteristicValue",
            Self::WriteCharacteristicValue { .. } => "writeCharacteristicValue",
            Self::SetNotifyValue { .. } => "setNotifyValue",
            Self::NotifyCurrentState => "notifyCurrentState",
        }
    }
}
