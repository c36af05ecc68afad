//! Demo peripherals built from standard Bluetooth SIG assigned numbers.

use uuid::Uuid;

use blebridge_domain::characteristic::CharacteristicProperties;

use crate::peripheral::{VirtualCharacteristic, VirtualPeripheral, VirtualService};

/// Expand a 16-bit assigned number onto the Bluetooth base UUID.
#[must_use]
pub const fn assigned(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5f9b_34fb | ((short as u128) << 96))
}

pub const HEART_RATE_SERVICE: Uuid = assigned(0x180d);
pub const HEART_RATE_MEASUREMENT: Uuid = assigned(0x2a37);
pub const BODY_SENSOR_LOCATION: Uuid = assigned(0x2a38);
pub const HEART_RATE_CONTROL_POINT: Uuid = assigned(0x2a39);
pub const BATTERY_SERVICE: Uuid = assigned(0x180f);
pub const BATTERY_LEVEL: Uuid = assigned(0x2a19);
pub const ENVIRONMENTAL_SENSING_SERVICE: Uuid = assigned(0x181a);
pub const TEMPERATURE: Uuid = assigned(0x2a6e);

fn props(read: bool, write: bool, notify: bool) -> CharacteristicProperties {
    CharacteristicProperties {
        read,
        write,
        write_without_response: false,
        notify,
        indicate: false,
    }
}

fn battery(level: u8) -> VirtualService {
    VirtualService::new(BATTERY_SERVICE).with_characteristic(
        VirtualCharacteristic::new(BATTERY_LEVEL, props(true, false, true)).with_value([level]),
    )
}

/// A chest-strap heart-rate monitor.
#[must_use]
pub fn heart_rate_monitor() -> VirtualPeripheral {
    VirtualPeripheral::new("AA:BB:CC:00:00:01", "Virtual HRM")
        .with_rssi(-48)
        .with_manufacturer_data(0xffff, [0x01, 0x02])
        .with_service(
            VirtualService::new(HEART_RATE_SERVICE)
                .with_characteristic(
                    VirtualCharacteristic::new(HEART_RATE_MEASUREMENT, props(false, false, true))
                        .with_value([0x00, 72]),
                )
                // 0x01: chest
                .with_characteristic(
                    VirtualCharacteristic::new(BODY_SENSOR_LOCATION, props(true, false, false))
                        .with_value([0x01]),
                )
                .with_characteristic(VirtualCharacteristic::new(
                    HEART_RATE_CONTROL_POINT,
                    props(false, true, false),
                )),
        )
        .with_service(battery(87))
}

/// An environmental sensor reporting temperature in 0.01 °C.
#[must_use]
pub fn thermometer() -> VirtualPeripheral {
    VirtualPeripheral::new("AA:BB:CC:00:00:02", "Virtual Thermometer")
        .with_rssi(-71)
        .with_service(
            VirtualService::new(ENVIRONMENTAL_SENSING_SERVICE).with_characteristic(
                VirtualCharacteristic::new(TEMPERATURE, props(true, false, true))
                    .with_value(2150_i16.to_le_bytes()),
            ),
        )
        .with_service(battery(54))
}
