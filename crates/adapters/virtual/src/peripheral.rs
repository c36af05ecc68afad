//! Simulated peripherals: a device, its advertisement and its GATT table.

use std::collections::HashMap;

use uuid::Uuid;

use blebridge_domain::characteristic::{Characteristic, CharacteristicProperties};
use blebridge_domain::device::{Advertisement, Device, DeviceAdvertisement};
use blebridge_domain::id::Identifier;
use blebridge_domain::service::Service;

/// Identifier of service `uuid` on `device`.
#[must_use]
pub fn service_identifier(device: &Identifier, uuid: Uuid) -> Identifier {
    Identifier::new(format!("{device}/{uuid}"))
}

/// Identifier of characteristic `uuid` in service `service` on `device`.
#[must_use]
pub fn characteristic_identifier(device: &Identifier, service: Uuid, uuid: Uuid) -> Identifier {
    Identifier::new(format!("{device}/{service}/{uuid}"))
}

/// A simulated characteristic with a stored value.
#[derive(Debug, Clone)]
pub struct VirtualCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub value: Vec<u8>,
    pub(crate) notifying: bool,
}

impl VirtualCharacteristic {
    #[must_use]
    pub fn new(uuid: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            properties,
            value: Vec::new(),
            notifying: false,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }
}

/// A simulated primary service.
#[derive(Debug, Clone)]
pub struct VirtualService {
    pub uuid: Uuid,
    pub characteristics: Vec<VirtualCharacteristic>,
}

impl VirtualService {
    #[must_use]
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_characteristic(mut self, characteristic: VirtualCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}

/// A simulated peripheral.
#[derive(Debug, Clone)]
pub struct VirtualPeripheral {
    pub device: Device,
    pub rssi: i16,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub services: Vec<VirtualService>,
    pub(crate) connected: bool,
}

impl VirtualPeripheral {
    #[must_use]
    pub fn new(identifier: &str, name: &str) -> Self {
        Self {
            device: Device::new(identifier).with_name(name),
            rssi: -60,
            manufacturer_data: HashMap::new(),
            services: Vec::new(),
            connected: false,
        }
    }

    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    #[must_use]
    pub fn with_manufacturer_data(mut self, company: u16, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data.insert(company, data.into());
        self
    }

    #[must_use]
    pub fn with_service(mut self, service: VirtualService) -> Self {
        self.services.push(service);
        self
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether a scan restricted to `filter` reports this peripheral.
    pub(crate) fn advertises_any(&self, filter: &[Uuid]) -> bool {
        filter.is_empty() || self.services.iter().any(|s| filter.contains(&s.uuid))
    }

    pub(crate) fn advertisement(&self) -> DeviceAdvertisement {
        DeviceAdvertisement {
            identifier: self.device.identifier.clone(),
            name: self.device.name.clone(),
            rssi: Some(self.rssi),
            advertisement: Advertisement {
                service_uuids: self.services.iter().map(|s| s.uuid).collect(),
                manufacturer_data: self.manufacturer_data.clone(),
                ..Advertisement::default()
            },
        }
    }

    pub(crate) fn service(&self, service: &VirtualService) -> Service {
        Service {
            identifier: service_identifier(&self.device.identifier, service.uuid),
            device: self.device.identifier.clone(),
            uuid: service.uuid,
        }
    }

    pub(crate) fn characteristic(
        &self,
        service: &VirtualService,
        characteristic: &VirtualCharacteristic,
    ) -> Characteristic {
        Characteristic {
            identifier: characteristic_identifier(
                &self.device.identifier,
                service.uuid,
                characteristic.uuid,
            ),
            device: self.device.identifier.clone(),
            service: service_identifier(&self.device.identifier, service.uuid),
            uuid: characteristic.uuid,
            properties: characteristic.properties,
        }
    }

    pub(crate) fn find_service(&self, identifier: &Identifier) -> Option<&VirtualService> {
        self.services
            .iter()
            .find(|s| service_identifier(&self.device.identifier, s.uuid) == *identifier)
    }

    pub(crate) fn find_characteristic_mut(
        &mut self,
        identifier: &Identifier,
    ) -> Option<&mut VirtualCharacteristic> {
        let device = self.device.identifier.clone();
        self.services.iter_mut().find_map(|service| {
            let service_uuid = service.uuid;
            service
                .characteristics
                .iter_mut()
                .find(|c| characteristic_identifier(&device, service_uuid, c.uuid) == *identifier)
        })
    }

    pub(crate) fn link_down(&mut self) {
        self.connected = false;
        for characteristic in self.services.iter_mut().flat_map(|s| s.characteristics.iter_mut()) {
            characteristic.notifying = false;
        }
    }
}
