//! # blebridge-adapter-btleplug
//!
//! Platform collaborator over the host Bluetooth stack, via `btleplug`.
//!
//! ## How it works
//!
//! - A pump task turns the adapter's central events into `DeviceDiscovered`
//!   and unsolicited `DeviceDisconnected` platform events.
//! - Every command runs on its own task and completes with exactly the
//!   event(s) the bridge correlates it with; failures travel as `error`
//!   fields, never as Rust errors across the queue.
//! - Each connected peripheral gets a notification task forwarding
//!   `CharacteristicNotified` events.
//!
//! Devices are identified by their Bluetooth address; services and
//! characteristics by address and UUID path.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `blebridge-app` and `blebridge-domain`.

mod convert;
mod error;

pub use convert::{characteristic_identifier, service_identifier};
pub use error::BtleplugError;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use btleplug::api::{Central as _, CentralEvent, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use blebridge_app::ports::{EventSender, Platform};
use blebridge_domain::characteristic::{Characteristic, CharacteristicValue};
use blebridge_domain::command::PlatformCommand;
use blebridge_domain::device::Device;
use blebridge_domain::error::PlatformError;
use blebridge_domain::event::{Acknowledgement, PlatformEvent};
use blebridge_domain::id::Identifier;
use blebridge_domain::service::Service;
use blebridge_domain::state::BluetoothState;

/// Platform backed by the first Bluetooth adapter of the host.
pub struct BtleplugPlatform {
    inner: Arc<Inner>,
    runtime: Handle,
    pump: JoinHandle<()>,
}

struct Inner {
    adapter: Adapter,
    events: EventSender,
    disconnecting: RequestedDisconnects,
    notification_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Devices whose next central disconnection answers a disconnect request
/// instead of reporting link loss.
#[derive(Debug, Default)]
struct RequestedDisconnects(Mutex<HashSet<String>>);

impl RequestedDisconnects {
    fn request(&self, device: &str) {
        lock(&self.0).insert(device.to_owned());
    }

    /// No central event will follow: the request failed, or a new link starts.
    fn abandon(&self, device: &str) {
        lock(&self.0).remove(device);
    }

    /// Consume the pending request for `device`. Returns whether there was one.
    fn settle(&self, device: &str) -> bool {
        lock(&self.0).remove(device)
    }
}

impl BtleplugPlatform {
    /// Open the first adapter and start forwarding its events.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BtleplugError::NotAvailable`] without an adapter, or
    /// [`BtleplugError::Bluetooth`] if the host stack cannot be opened.
    pub async fn open(events: EventSender) -> Result<Self, BtleplugError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters.into_iter().next().ok_or(BtleplugError::NotAvailable)?;
        match adapter.adapter_info().await {
            Ok(info) => tracing::info!(%info, "Bluetooth adapter opened"),
            Err(err) => tracing::debug!(%err, "adapter info unavailable"),
        }

        let central_events = adapter.events().await?;
        let inner = Arc::new(Inner {
            adapter,
            events,
            disconnecting: RequestedDisconnects::default(),
            notification_tasks: Mutex::new(HashMap::new()),
        });
        let pump = tokio::spawn(Arc::clone(&inner).pump_central_events(central_events));

        Ok(Self {
            inner,
            runtime: Handle::current(),
            pump,
        })
    }
}

impl Drop for BtleplugPlatform {
    fn drop(&mut self) {
        self.pump.abort();
        for (_, task) in lock(&self.inner.notification_tasks).drain() {
            task.abort();
        }
    }
}

impl Platform for BtleplugPlatform {
    fn issue(&self, command: PlatformCommand) {
        tracing::debug!(command = command.name(), "btleplug command");
        let inner = Arc::clone(&self.inner);
        self.runtime.spawn(async move { inner.execute(command).await });
    }
}

impl Inner {
    fn emit(&self, event: PlatformEvent) {
        tracing::trace!(kind = %event.kind(), "btleplug event");
        if self.events.send(event).is_err() {
            tracing::debug!("platform event queue closed, event dropped");
        }
    }

    async fn pump_central_events(
        self: Arc<Self>,
        mut events: std::pin::Pin<Box<dyn tokio_stream::Stream<Item = CentralEvent> + Send>>,
    ) {
        while let Some(event) = events.next().await {
            match event {
                CentralEvent::DeviceDiscovered(id) => {
                    let Ok(peripheral) = self.adapter.peripheral(&id).await else {
                        continue;
                    };
                    match peripheral.properties().await {
                        Ok(Some(props)) => {
                            tracing::trace!(address = %props.address, name = ?props.local_name, "device detected");
                            self.emit(PlatformEvent::DeviceDiscovered(convert::advertisement(&props)));
                        }
                        Ok(None) => {}
                        Err(err) => tracing::warn!(%err, "failed to read peripheral properties"),
                    }
                }
                CentralEvent::DeviceDisconnected(id) => {
                    let Ok(peripheral) = self.adapter.peripheral(&id).await else {
                        continue;
                    };
                    let device = peripheral.address().to_string();
                    self.stop_notifications(&device);
                    if self.disconnecting.settle(&device) {
                        tracing::debug!(%device, "requested disconnection confirmed");
                        continue;
                    }
                    tracing::warn!(%device, "link lost");
                    self.emit(PlatformEvent::DeviceDisconnected(Acknowledgement::for_target(device)));
                }
                _ => {}
            }
        }
        tracing::debug!("central event stream ended");
    }

    async fn execute(self: Arc<Self>, command: PlatformCommand) {
        match command {
            PlatformCommand::StartScan { service_uuids } => {
                let filter = ScanFilter {
                    services: service_uuids,
                };
                let ack = acknowledge(Acknowledgement::ok(), self.adapter.start_scan(filter).await);
                self.emit(PlatformEvent::ScanStarted(ack));
            }
            PlatformCommand::StopScan => {
                let ack = acknowledge(Acknowledgement::ok(), self.adapter.stop_scan().await);
                self.emit(PlatformEvent::ScanStopped(ack));
            }
            PlatformCommand::Connect { device } => {
                let result = self.connect(&device).await;
                let ack = acknowledge(Acknowledgement::for_target(device.identifier), result);
                self.emit(PlatformEvent::DeviceConnected(ack));
            }
            PlatformCommand::Disconnect { device } => {
                self.disconnecting.request(device.identifier.as_str());
                let result = self.disconnect(&device).await;
                if result.is_err() {
                    self.disconnecting.abandon(device.identifier.as_str());
                }
                let ack = acknowledge(Acknowledgement::for_target(device.identifier), result);
                self.emit(PlatformEvent::DeviceDisconnected(ack));
            }
            PlatformCommand::DiscoverServices {
                device,
                service_uuids,
            } => match self.discover_services(&device, &service_uuids).await {
                Ok(services) => {
                    self.emit(PlatformEvent::ServiceDiscoveryStarted(Acknowledgement::for_target(
                        device.identifier,
                    )));
                    for service in services {
                        self.emit(PlatformEvent::ServiceDiscovered(service));
                    }
                }
                Err(err) => self.emit(PlatformEvent::ServiceDiscoveryStarted(
                    Acknowledgement::for_target(device.identifier).with_error(&err),
                )),
            },
            PlatformCommand::DiscoverCharacteristics {
                service,
                characteristic_uuids,
            } => match self.discover_characteristics(&service, &characteristic_uuids).await {
                Ok(characteristics) => {
                    self.emit(PlatformEvent::CharacteristicDiscoveryStarted(
                        Acknowledgement::for_target(service.identifier),
                    ));
                    for characteristic in characteristics {
                        self.emit(PlatformEvent::CharacteristicDiscovered(characteristic));
                    }
                }
                Err(err) => self.emit(PlatformEvent::CharacteristicDiscoveryStarted(
                    Acknowledgement::for_target(service.identifier).with_error(&err),
                )),
            },
            PlatformCommand::ReadCharacteristicValue { characteristic } => {
                let value = match self.read(&characteristic).await {
                    Ok(bytes) => CharacteristicValue::from_bytes(characteristic.identifier, &bytes),
                    Err(err) => CharacteristicValue::failed(characteristic.identifier, &err),
                };
                self.emit(PlatformEvent::CharacteristicRead(value));
            }
            PlatformCommand::WriteCharacteristicValue {
                characteristic,
                value,
                with_response,
            } => {
                let result = self.write(&characteristic, &value, with_response).await;
                if with_response {
                    let ack = acknowledge(Acknowledgement::for_target(characteristic.identifier), result);
                    self.emit(PlatformEvent::CharacteristicWritten(ack));
                } else if let Err(err) = result {
                    tracing::warn!(%err, characteristic = %characteristic.identifier, "write without response failed");
                }
            }
            PlatformCommand::SetNotifyValue {
                characteristic,
                enabled,
            } => {
                let result = self.set_notify(&characteristic, enabled).await;
                let ack = acknowledge(Acknowledgement::for_target(characteristic.identifier), result);
                self.emit(PlatformEvent::NotifyStateChanged(ack));
            }
            PlatformCommand::NotifyCurrentState => {
                // An opened adapter is the only state this backend can observe.
                self.emit(PlatformEvent::StateChanged {
                    state: BluetoothState::PoweredOn,
                });
            }
        }
    }

    async fn peripheral(&self, device: &Identifier) -> Result<Peripheral, BtleplugError> {
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.address().to_string() == device.as_str())
            .ok_or_else(|| BtleplugError::UnknownDevice(device.to_string()))
    }

    async fn linked_peripheral(&self, device: &Identifier) -> Result<Peripheral, BtleplugError> {
        let peripheral = self.peripheral(device).await?;
        if peripheral.is_connected().await? {
            Ok(peripheral)
        } else {
            Err(BtleplugError::NotConnected)
        }
    }

    async fn connect(self: &Arc<Self>, device: &Device) -> Result<(), BtleplugError> {
        self.disconnecting.abandon(device.identifier.as_str());
        let peripheral = self.peripheral(&device.identifier).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        let notifications = peripheral.notifications().await?;
        let task = tokio::spawn(Arc::clone(self).forward_notifications(peripheral, notifications));
        if let Some(previous) = lock(&self.notification_tasks).insert(device.identifier.to_string(), task) {
            previous.abort();
        }
        Ok(())
    }

    async fn disconnect(&self, device: &Device) -> Result<(), BtleplugError> {
        let peripheral = self.linked_peripheral(&device.identifier).await?;
        peripheral.disconnect().await?;
        self.stop_notifications(device.identifier.as_str());
        Ok(())
    }

    fn stop_notifications(&self, device: &str) {
        if let Some(task) = lock(&self.notification_tasks).remove(device) {
            task.abort();
        }
    }

    async fn forward_notifications(
        self: Arc<Self>,
        peripheral: Peripheral,
        mut notifications: std::pin::Pin<Box<dyn tokio_stream::Stream<Item = btleplug::api::ValueNotification> + Send>>,
    ) {
        let device = Identifier::new(peripheral.address().to_string());
        while let Some(notification) = notifications.next().await {
            let Some(characteristic) = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == notification.uuid)
            else {
                tracing::debug!(uuid = %notification.uuid, "notification for undiscovered characteristic");
                continue;
            };
            let identifier = characteristic_identifier(&device, characteristic.service_uuid, characteristic.uuid);
            self.emit(PlatformEvent::CharacteristicNotified(CharacteristicValue::from_bytes(
                identifier,
                &notification.value,
            )));
        }
    }

    async fn discover_services(
        &self,
        device: &Device,
        filter: &[Uuid],
    ) -> Result<Vec<Service>, BtleplugError> {
        let peripheral = self.linked_peripheral(&device.identifier).await?;
        peripheral.discover_services().await?;
        Ok(peripheral
            .services()
            .iter()
            .filter(|s| filter.is_empty() || filter.contains(&s.uuid))
            .map(|s| convert::service(&device.identifier, s))
            .collect())
    }

    async fn discover_characteristics(
        &self,
        service: &Service,
        filter: &[Uuid],
    ) -> Result<Vec<Characteristic>, BtleplugError> {
        let peripheral = self.linked_peripheral(&service.device).await?;
        let raw = peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service.uuid)
            .ok_or_else(|| BtleplugError::UnknownService(service.identifier.to_string()))?;
        Ok(raw
            .characteristics
            .iter()
            .filter(|c| filter.is_empty() || filter.contains(&c.uuid))
            .map(|c| convert::characteristic(&service.device, c))
            .collect())
    }

    async fn resolve(
        &self,
        characteristic: &Characteristic,
    ) -> Result<(Peripheral, btleplug::api::Characteristic), BtleplugError> {
        let peripheral = self.linked_peripheral(&characteristic.device).await?;
        let raw = peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                characteristic_identifier(&characteristic.device, c.service_uuid, c.uuid)
                    == characteristic.identifier
            })
            .ok_or_else(|| BtleplugError::UnknownCharacteristic(characteristic.identifier.to_string()))?;
        Ok((peripheral, raw))
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, BtleplugError> {
        let (peripheral, raw) = self.resolve(characteristic).await?;
        Ok(peripheral.read(&raw).await?)
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        value: &str,
        with_response: bool,
    ) -> Result<(), BtleplugError> {
        let payload = STANDARD.decode(value)?;
        let (peripheral, raw) = self.resolve(characteristic).await?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        peripheral.write(&raw, &payload, write_type).await?;
        Ok(())
    }

    async fn set_notify(&self, characteristic: &Characteristic, enabled: bool) -> Result<(), BtleplugError> {
        let (peripheral, raw) = self.resolve(characteristic).await?;
        if enabled {
            peripheral.subscribe(&raw).await?;
        } else {
            peripheral.unsubscribe(&raw).await?;
        }
        Ok(())
    }
}

/// Attach `result`'s failure, if any, to `ack`.
fn acknowledge<E>(ack: Acknowledgement, result: Result<(), E>) -> Acknowledgement
where
    E: Into<BtleplugError>,
{
    match result {
        Ok(()) => ack,
        Err(err) => {
            let err = err.into();
            tracing::warn!(%err, "platform command failed");
            ack.with_error(PlatformError::from(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_swallow_only_one_disconnection_per_request() {
        let requests = RequestedDisconnects::default();
        requests.request("AA:BB");

        assert!(requests.settle("AA:BB"));
        assert!(!requests.settle("AA:BB"));
        assert!(!requests.settle("CC:DD"));
    }

    #[test]
    fn should_forget_abandoned_request() {
        let requests = RequestedDisconnects::default();
        requests.request("AA:BB");
        requests.abandon("AA:BB");

        assert!(!requests.settle("AA:BB"));
    }

    #[test]
    fn should_leave_successful_acknowledgement_untouched() {
        let ack = acknowledge::<BtleplugError>(Acknowledgement::for_target("D1"), Ok(()));
        assert_eq!(ack, Acknowledgement::for_target("D1"));
    }

    #[test]
    fn should_attach_flattened_error_to_acknowledgement() {
        let ack = acknowledge(
            Acknowledgement::for_target("D1"),
            Err(BtleplugError::NotConnected),
        );
        assert_eq!(ack.error.unwrap().message(), "Device not connected");
    }

    #[test]
    fn should_convert_btleplug_errors_when_acknowledging() {
        let ack = acknowledge(Acknowledgement::ok(), Err(btleplug::Error::DeviceNotFound));
        assert!(ack.error.unwrap().message().starts_with("Bluetooth operation failed"));
    }
}
