//! # blebridge-adapter-virtual
//!
//! Virtual platform collaborator that simulates peripherals for testing and
//! demonstration purposes.
//!
//! Every command is answered with the events a real radio would produce,
//! pushed onto the platform event queue. Simulated failures (unknown
//! device, no link, missing property, radio off) come back as `error`
//! fields on those events, never as Rust errors.
//!
//! ## Dependency rule
//!
//! Depends on `blebridge-app` (port trait) and `blebridge-domain` only.

pub mod demo;
mod peripheral;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use uuid::Uuid;

use blebridge_app::ports::{EventSender, Platform};
use blebridge_domain::characteristic::{Characteristic, CharacteristicValue};
use blebridge_domain::command::PlatformCommand;
use blebridge_domain::device::Device;
use blebridge_domain::event::{Acknowledgement, PlatformEvent};
use blebridge_domain::id::Identifier;
use blebridge_domain::service::Service;
use blebridge_domain::state::BluetoothState;

pub use peripheral::{
    VirtualCharacteristic, VirtualPeripheral, VirtualService, characteristic_identifier,
    service_identifier,
};

const UNKNOWN_DEVICE: &str = "Unknown device";
const NOT_CONNECTED: &str = "Device not connected";
const POWERED_OFF: &str = "Bluetooth is powered off";

#[derive(Debug)]
struct World {
    state: BluetoothState,
    scanning: bool,
    peripherals: BTreeMap<Identifier, VirtualPeripheral>,
}

/// Simulated Bluetooth central.
pub struct VirtualPlatform {
    events: EventSender,
    world: Mutex<World>,
}

impl VirtualPlatform {
    /// A powered-on radio with no peripherals in range.
    #[must_use]
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            world: Mutex::new(World {
                state: BluetoothState::PoweredOn,
                scanning: false,
                peripherals: BTreeMap::new(),
            }),
        }
    }

    /// A radio with the [`demo`] peripherals in range.
    #[must_use]
    pub fn demo(events: EventSender) -> Self {
        Self::new(events)
            .with_peripheral(demo::heart_rate_monitor())
            .with_peripheral(demo::thermometer())
    }

    #[must_use]
    pub fn with_peripheral(self, peripheral: VirtualPeripheral) -> Self {
        self.add_peripheral(peripheral);
        self
    }

    /// Bring `peripheral` in range. Reported immediately if a scan is running.
    pub fn add_peripheral(&self, peripheral: VirtualPeripheral) {
        let mut world = self.world();
        if world.scanning {
            self.emit(PlatformEvent::DeviceDiscovered(peripheral.advertisement()));
        }
        world
            .peripherals
            .insert(peripheral.device.identifier.clone(), peripheral);
    }

    /// Whether `device` currently has a link.
    #[must_use]
    pub fn is_connected(&self, device: &str) -> bool {
        self.world()
            .peripherals
            .get(&Identifier::new(device))
            .is_some_and(VirtualPeripheral::is_connected)
    }

    /// Whether a scan is running.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.world().scanning
    }

    /// The stored value of a characteristic.
    #[must_use]
    pub fn value_of(&self, characteristic: &Identifier) -> Option<Vec<u8>> {
        self.world()
            .peripherals
            .values_mut()
            .find_map(|p| p.find_characteristic_mut(characteristic).map(|c| c.value.clone()))
    }

    /// Update a characteristic's value, notifying if notifications are on.
    ///
    /// Returns whether a notification was emitted.
    pub fn notify(&self, characteristic: &Identifier, value: &[u8]) -> bool {
        let mut world = self.world();
        for peripheral in world.peripherals.values_mut() {
            let connected = peripheral.connected;
            if let Some(target) = peripheral.find_characteristic_mut(characteristic) {
                target.value = value.to_vec();
                if connected && target.notifying {
                    self.emit(PlatformEvent::CharacteristicNotified(
                        CharacteristicValue::from_bytes(characteristic.clone(), value),
                    ));
                    return true;
                }
                return false;
            }
        }
        false
    }

    /// Simulate an unsolicited link loss.
    pub fn drop_link(&self, device: &str) -> bool {
        let mut world = self.world();
        let Some(peripheral) = world.peripherals.get_mut(&Identifier::new(device)) else {
            return false;
        };
        if !peripheral.connected {
            return false;
        }
        peripheral.link_down();
        tracing::info!(device, "virtual link dropped");
        self.emit(PlatformEvent::DeviceDisconnected(Acknowledgement::for_target(device)));
        true
    }

    /// Power the radio on or off. Powering off drops every link and the scan.
    pub fn set_powered(&self, powered: bool) {
        let mut world = self.world();
        let state = if powered {
            BluetoothState::PoweredOn
        } else {
            BluetoothState::PoweredOff
        };
        if world.state == state {
            return;
        }
        world.state = state;
        self.emit(PlatformEvent::StateChanged { state });

        if !powered {
            world.scanning = false;
            for peripheral in world.peripherals.values_mut().filter(|p| p.connected) {
                peripheral.link_down();
                self.emit(PlatformEvent::DeviceDisconnected(Acknowledgement::for_target(
                    peripheral.device.identifier.clone(),
                )));
            }
        }
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlatformEvent) {
        tracing::trace!(kind = %event.kind(), "virtual event");
        if self.events.send(event).is_err() {
            tracing::debug!("platform event queue closed, event dropped");
        }
    }

    fn start_scan(&self, world: &mut World, filter: &[Uuid]) {
        if !world.state.is_usable() {
            self.emit(PlatformEvent::ScanStarted(Acknowledgement::ok().with_error(POWERED_OFF)));
            return;
        }
        world.scanning = true;
        self.emit(PlatformEvent::ScanStarted(Acknowledgement::ok()));
        for peripheral in world.peripherals.values().filter(|p| p.advertises_any(filter)) {
            self.emit(PlatformEvent::DeviceDiscovered(peripheral.advertisement()));
        }
    }

    fn connect(world: &mut World, device: &Device) -> Acknowledgement {
        let ack = Acknowledgement::for_target(device.identifier.clone());
        if !world.state.is_usable() {
            return ack.with_error(POWERED_OFF);
        }
        match world.peripherals.get_mut(&device.identifier) {
            Some(peripheral) => {
                peripheral.connected = true;
                ack
            }
            None => ack.with_error(UNKNOWN_DEVICE),
        }
    }

    fn disconnect(world: &mut World, device: &Device) -> Acknowledgement {
        let ack = Acknowledgement::for_target(device.identifier.clone());
        match world.peripherals.get_mut(&device.identifier) {
            Some(peripheral) if peripheral.connected => {
                peripheral.link_down();
                ack
            }
            Some(_) => ack.with_error(NOT_CONNECTED),
            None => ack.with_error(UNKNOWN_DEVICE),
        }
    }

    fn discover_services(&self, world: &World, device: &Device, filter: &[Uuid]) {
        let ack = Acknowledgement::for_target(device.identifier.clone());
        let peripheral = match world.peripherals.get(&device.identifier) {
            Some(peripheral) if peripheral.connected => peripheral,
            Some(_) => {
                self.emit(PlatformEvent::ServiceDiscoveryStarted(ack.with_error(NOT_CONNECTED)));
                return;
            }
            None => {
                self.emit(PlatformEvent::ServiceDiscoveryStarted(ack.with_error(UNKNOWN_DEVICE)));
                return;
            }
        };
        self.emit(PlatformEvent::ServiceDiscoveryStarted(ack));
        for service in peripheral
            .services
            .iter()
            .filter(|s| filter.is_empty() || filter.contains(&s.uuid))
        {
            self.emit(PlatformEvent::ServiceDiscovered(peripheral.service(service)));
        }
    }

    fn discover_characteristics(&self, world: &World, service: &Service, filter: &[Uuid]) {
        let ack = Acknowledgement::for_target(service.identifier.clone());
        let found = world
            .peripherals
            .get(&service.device)
            .ok_or(UNKNOWN_DEVICE)
            .and_then(|p| if p.connected { Ok(p) } else { Err(NOT_CONNECTED) })
            .and_then(|p| {
                p.find_service(&service.identifier)
                    .map(|s| (p, s))
                    .ok_or("Unknown service")
            });
        let (peripheral, virtual_service) = match found {
            Ok(found) => found,
            Err(error) => {
                self.emit(PlatformEvent::CharacteristicDiscoveryStarted(ack.with_error(error)));
                return;
            }
        };
        self.emit(PlatformEvent::CharacteristicDiscoveryStarted(ack));
        for characteristic in virtual_service
            .characteristics
            .iter()
            .filter(|c| filter.is_empty() || filter.contains(&c.uuid))
        {
            self.emit(PlatformEvent::CharacteristicDiscovered(
                peripheral.characteristic(virtual_service, characteristic),
            ));
        }
    }

    fn with_linked_characteristic<T>(
        world: &mut World,
        characteristic: &Characteristic,
        action: impl FnOnce(&mut VirtualCharacteristic) -> Result<T, &'static str>,
    ) -> Result<T, &'static str> {
        let peripheral = world
            .peripherals
            .get_mut(&characteristic.device)
            .ok_or(UNKNOWN_DEVICE)?;
        if !peripheral.connected {
            return Err(NOT_CONNECTED);
        }
        let target = peripheral
            .find_characteristic_mut(&characteristic.identifier)
            .ok_or("Unknown characteristic")?;
        action(target)
    }

    fn read(world: &mut World, characteristic: &Characteristic) -> CharacteristicValue {
        let id = characteristic.identifier.clone();
        let read = Self::with_linked_characteristic(world, characteristic, |target| {
            if target.properties.read {
                Ok(target.value.clone())
            } else {
                Err("Read not permitted")
            }
        });
        match read {
            Ok(value) => CharacteristicValue::from_bytes(id, &value),
            Err(error) => CharacteristicValue::failed(id, error),
        }
    }

    fn write(
        world: &mut World,
        characteristic: &Characteristic,
        value: &str,
        with_response: bool,
    ) -> Acknowledgement {
        let ack = Acknowledgement::for_target(characteristic.identifier.clone());
        let written = Self::with_linked_characteristic(world, characteristic, |target| {
            let permitted = if with_response {
                target.properties.write
            } else {
                target.properties.write_without_response || target.properties.write
            };
            if !permitted {
                return Err("Write not permitted");
            }
            target.value = STANDARD.decode(value).map_err(|_| "Invalid value")?;
            Ok(())
        });
        match written {
            Ok(()) => ack,
            Err(error) => ack.with_error(error),
        }
    }

    fn set_notify(world: &mut World, characteristic: &Characteristic, enabled: bool) -> Acknowledgement {
        let ack = Acknowledgement::for_target(characteristic.identifier.clone());
        let changed = Self::with_linked_characteristic(world, characteristic, |target| {
            if !(target.properties.notify || target.properties.indicate) {
                return Err("Notifications not supported");
            }
            target.notifying = enabled;
            Ok(())
        });
        match changed {
            Ok(()) => ack,
            Err(error) => ack.with_error(error),
        }
    }
}

impl Platform for VirtualPlatform {
    fn issue(&self, command: PlatformCommand) {
        tracing::debug!(command = command.name(), "virtual platform command");
        let mut world = self.world();
        match command {
            PlatformCommand::StartScan { service_uuids } => self.start_scan(&mut world, &service_uuids),
            PlatformCommand::StopScan => {
                world.scanning = false;
                self.emit(PlatformEvent::ScanStopped(Acknowledgement::ok()));
            }
            PlatformCommand::Connect { device } => {
                let ack = Self::connect(&mut world, &device);
                self.emit(PlatformEvent::DeviceConnected(ack));
            }
            PlatformCommand::Disconnect { device } => {
                let ack = Self::disconnect(&mut world, &device);
                self.emit(PlatformEvent::DeviceDisconnected(ack));
            }
            PlatformCommand::DiscoverServices {
                device,
                service_uuids,
            } => self.discover_services(&world, &device, &service_uuids),
            PlatformCommand::DiscoverCharacteristics {
                service,
                characteristic_uuids,
            } => self.discover_characteristics(&world, &service, &characteristic_uuids),
            PlatformCommand::ReadCharacteristicValue { characteristic } => {
                let value = Self::read(&mut world, &characteristic);
                self.emit(PlatformEvent::CharacteristicRead(value));
            }
            PlatformCommand::WriteCharacteristicValue {
                characteristic,
                value,
                with_response,
            } => {
                let ack = Self::write(&mut world, &characteristic, &value, with_response);
                if with_response {
                    self.emit(PlatformEvent::CharacteristicWritten(ack));
                } else if let Some(error) = ack.error {
                    tracing::debug!(%error, "write without response failed silently");
                }
            }
            PlatformCommand::SetNotifyValue {
                characteristic,
                enabled,
            } => {
                let ack = Self::set_notify(&mut world, &characteristic, enabled);
                self.emit(PlatformEvent::NotifyStateChanged(ack));
            }
            PlatformCommand::NotifyCurrentState => {
                self.emit(PlatformEvent::StateChanged { state: world.state });
            }
        }
    }
}
