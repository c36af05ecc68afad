//! Device: a remote peripheral seen by the platform collaborator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::{Identified, Identifier};

/// A peripheral the application can connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub identifier: Identifier,
    #[serde(default)]
    pub name: Option<String>,
}

impl Device {
    /// Create a device handle from its platform identifier.
    #[must_use]
    pub fn new(identifier: impl Into<Identifier>) -> Self {
        Self {
            identifier: identifier.into(),
            name: None,
        }
    }

    /// Attach the advertised local name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Identified for Device {
    fn identifier(&self) -> Option<&str> {
        Some(self.identifier.as_str())
    }
}

/// Advertisement data received alongside a discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Advertisement {
    /// Advertised service UUIDs.
    pub service_uuids: Vec<uuid::Uuid>,
    /// Manufacturer-specific data keyed by company identifier.
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    /// Service data keyed by service UUID.
    pub service_data: HashMap<uuid::Uuid, Vec<u8>>,
    /// Advertised transmission power, in dBm.
    pub tx_power_level: Option<i16>,
}

/// Payload of a `DeviceDiscovered` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAdvertisement {
    pub identifier: Identifier,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rssi: Option<i16>,
    #[serde(default)]
    pub advertisement: Advertisement,
}

impl DeviceAdvertisement {
    /// The connectable [`Device`] described by this advertisement.
    #[must_use]
    pub fn device(&self) -> Device {
        Device {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
        }
    }
}

impl Identified for DeviceAdvertisement {
    fn identifier(&self) -> Option<&str> {
        Some(self.identifier.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_device_with_name() {
        let device = Device::new("D1").with_name("Foo");
        assert_eq!(device.identifier.as_str(), "D1");
        assert_eq!(device.name.as_deref(), Some("Foo"));
    }

    #[test]
    fn should_derive_device_from_advertisement() {
        let adv = DeviceAdvertisement {
            identifier: Identifier::new("D1"),
            name: Some("Foo".to_owned()),
            rssi: Some(-60),
            advertisement: Advertisement::default(),
        };
        assert_eq!(adv.device(), Device::new("D1").with_name("Foo"));
    }

    #[test]
    fn should_parse_sparse_advertisement_payload() {
        let adv: DeviceAdvertisement =
            serde_json::from_str(r#"{"identifier":"D1","name":"Foo"}"#).unwrap();
        assert_eq!(adv.rssi, None);
        assert!(adv.advertisement.service_uuids.is_empty());
    }
}
