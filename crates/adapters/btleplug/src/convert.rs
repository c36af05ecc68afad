//! Conversions from btleplug types to bridge payloads.

use btleplug::api::{CharPropFlags, PeripheralProperties};
use uuid::Uuid;

use blebridge_domain::characteristic::{Characteristic, CharacteristicProperties};
use blebridge_domain::device::{Advertisement, DeviceAdvertisement};
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

pub(crate) fn advertisement(props: &PeripheralProperties) -> DeviceAdvertisement {
    DeviceAdvertisement {
        identifier: Identifier::new(props.address.to_string()),
        name: props.local_name.clone(),
        rssi: props.rssi,
        advertisement: Advertisement {
            service_uuids: props.services.clone(),
            manufacturer_data: props.manufacturer_data.clone(),
            service_data: props.service_data.clone(),
            tx_power_level: props.tx_power_level,
        },
    }
}

pub(crate) fn properties(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

pub(crate) fn service(device: &Identifier, service: &btleplug::api::Service) -> Service {
    Service {
        identifier: service_identifier(device, service.uuid),
        device: device.clone(),
        uuid: service.uuid,
    }
}

pub(crate) fn characteristic(
    device: &Identifier,
    characteristic: &btleplug::api::Characteristic,
) -> Characteristic {
    Characteristic {
        identifier: characteristic_identifier(
            device,
            characteristic.service_uuid,
            characteristic.uuid,
        ),
        device: device.clone(),
        service: service_identifier(device, characteristic.service_uuid),
        uuid: characteristic.uuid,
        properties: properties(characteristic.properties),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};

    use btleplug::api::BDAddr;

    #[test]
    fn should_map_characteristic_flags() {
        let props = properties(CharPropFlags::READ | CharPropFlags::NOTIFY);
        assert!(props.read);
        assert!(props.notify);
        assert!(!props.write);
        assert!(!props.indicate);
    }

    #[test]
    fn should_identify_peripheral_by_address() {
        let props = PeripheralProperties {
            address: BDAddr::from([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]),
            local_name: Some("Foo".to_string()),
            rssi: Some(-55),
            manufacturer_data: HashMap::from([(0x004c, vec![1, 2])]),
            ..PeripheralProperties::default()
        };

        let ad = advertisement(&props);

        assert_eq!(ad.identifier.as_str(), "A4:C1:38:5B:0E:DF");
        assert_eq!(ad.name.as_deref(), Some("Foo"));
        assert_eq!(ad.rssi, Some(-55));
        assert_eq!(ad.advertisement.manufacturer_data[&0x004c], [1, 2]);
    }

    #[test]
    fn should_scope_characteristic_to_its_service() {
        let device = Identifier::new("A4:C1:38:5B:0E:DF");
        let raw = btleplug::api::Characteristic {
            uuid: Uuid::from_u128(2),
            service_uuid: Uuid::from_u128(1),
            properties: CharPropFlags::WRITE,
            descriptors: BTreeSet::new(),
        };

        let characteristic = characteristic(&device, &raw);

        assert_eq!(
            characteristic.service,
            service_identifier(&device, Uuid::from_u128(1))
        );
        assert!(characteristic.properties.write);
        assert!(characteristic.identifier.as_str().starts_with("A4:C1:38:5B:0E:DF/"));
    }
}
