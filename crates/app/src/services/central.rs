//! Central: the operation catalog.
//!
//! Every request-style operation is framed here on top of the
//! [`Correlation`] and [`stream`] primitives:
//!
//! | Operation | Shape | Identity | Deadline |
//! |---|---|---|---|
//! | `start_scan` / `stop_scan` | ack | none | none |
//! | `connect` / `disconnect` | one-shot | device | none |
//! | `discover_services` | ack, then stream | device | none |
//! | `discover_characteristics` | ack, then stream | service | none |
//! | `read_characteristic_value` | one-shot | characteristic | read |
//! | `write_characteristic_value` | one-shot, or none without response | characteristic | write |
//! | `set_notify_value` | one-shot | characteristic | notify |
//! | `characteristic_did_notify` | stream | characteristic | none |
//! | `did_discover_device` / `device_did_disconnect` / `did_change_state` | stream | optional | none |

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use blebridge_domain::characteristic::{self, Characteristic, CharacteristicValue};
use blebridge_domain::command::PlatformCommand;
use blebridge_domain::device::{Device, DeviceAdvertisement};
use blebridge_domain::error::{BridgeError, PlatformError};
use blebridge_domain::event::{Acknowledgement, EventKind, PlatformEvent};
use blebridge_domain::id::Identifier;
use blebridge_domain::service::Service;
use blebridge_domain::state::BluetoothState;

use crate::config::CentralConfig;
use crate::correlation::Correlation;
use crate::event_channel::{EventChannel, Subscription, lock};
use crate::identity;
use crate::ports::Platform;
use crate::services::scan::{Scan, ScanOptions};
use crate::stream;

/// Request-style facade over an event-only platform.
///
/// Carries the shared [`EventChannel`] and the platform explicitly; every
/// clone talks to the same channel and platform.
pub struct Central<P> {
    channel: EventChannel,
    platform: Arc<P>,
    config: CentralConfig,
}

impl<P> Clone for Central<P> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            platform: Arc::clone(&self.platform),
            config: self.config.clone(),
        }
    }
}

impl<P> std::fmt::Debug for Central<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Central")
            .field("listeners", &self.channel.listener_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: Platform> Central<P> {
    /// Create a catalog issuing commands to `platform` and listening on `channel`.
    pub fn new(channel: EventChannel, platform: Arc<P>, config: CentralConfig) -> Self {
        Self {
            channel,
            platform,
            config,
        }
    }

    #[must_use]
    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    #[must_use]
    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    #[must_use]
    pub fn config(&self) -> &CentralConfig {
        &self.config
    }

    /// Start scanning and return a handle that can stop it.
    ///
    /// Discovered devices are delivered to [`did_discover_device`](Self::did_discover_device) sinks.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Platform`] if the platform refuses to scan.
    #[tracing::instrument(skip(self, options), fields(filters = options.service_uuids.len()))]
    pub async fn start_scan(&self, options: ScanOptions) -> Result<Scan<P>, BridgeError> {
        self.acknowledged(
            EventKind::ScanStarted,
            None,
            PlatformCommand::StartScan {
                service_uuids: options.service_uuids,
            },
        )
        .await?;
        tracing::info!("scan started");
        Ok(Scan::new(self.clone()))
    }

    /// Stop scanning.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Platform`] if the platform reports a failure.
    #[tracing::instrument(skip(self))]
    pub async fn stop_scan(&self) -> Result<(), BridgeError> {
        self.acknowledged(EventKind::ScanStopped, None, PlatformCommand::StopScan)
            .await?;
        tracing::info!("scan stopped");
        Ok(())
    }

    /// Connect to `device`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Platform`] if the connection is refused.
    #[tracing::instrument(skip(self, device), fields(device = %device.identifier))]
    pub async fn connect(&self, device: &Device) -> Result<Acknowledgement, BridgeError> {
        self.acknowledged(
            EventKind::DeviceConnected,
            Some(&device.identifier),
            PlatformCommand::Connect {
                device: device.clone(),
            },
        )
        .await
    }

    /// Disconnect from `device`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Platform`] if the platform reports a failure.
    #[tracing::instrument(skip(self, device), fields(device = %device.identifier))]
    pub async fn disconnect(&self, device: &Device) -> Result<Acknowledgement, BridgeError> {
        self.acknowledged(
            EventKind::DeviceDisconnected,
            Some(&device.identifier),
            PlatformCommand::Disconnect {
                device: device.clone(),
            },
        )
        .await
    }

    /// Discover the services of `device`, restricted to `service_uuids` unless empty.
    ///
    /// Each service discovered on `device` is forwarded to `sink` until the
    /// returned subscription is disposed.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Platform`] when discovery fails to start (for
    /// example, the device is not connected). The sink is not called then.
    #[tracing::instrument(skip(self, device, service_uuids, sink), fields(device = %device.identifier))]
    pub async fn discover_services<S>(
        &self,
        device: &Device,
        service_uuids: &[Uuid],
        sink: S,
    ) -> Result<Subscription, BridgeError>
    where
        S: FnMut(Service) + Send + 'static,
    {
        let owner = device.identifier.clone();
        let services = stream::forward(
            &self.channel,
            EventKind::ServiceDiscovered,
            PlatformEvent::service,
            move |service: &Service| identity::matches(&owner, &service.device),
            sink,
        );
        self.acknowledged(
            EventKind::ServiceDiscoveryStarted,
            Some(&device.identifier),
            PlatformCommand::DiscoverServices {
                device: device.clone(),
                service_uuids: service_uuids.to_vec(),
            },
        )
        .await?;
        Ok(services)
    }

    /// Discover the characteristics of `service`, restricted to
    /// `characteristic_uuids` unless empty.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Platform`] when discovery fails to start.
    #[tracing::instrument(skip(self, service, characteristic_uuids, sink), fields(service = %service.identifier))]
    pub async fn discover_characteristics<S>(
        &self,
        service: &Service,
        characteristic_uuids: &[Uuid],
        sink: S,
    ) -> Result<Subscription, BridgeError>
    where
        S: FnMut(Characteristic) + Send + 'static,
    {
        let owner = service.identifier.clone();
        let characteristics = stream::forward(
            &self.channel,
            EventKind::CharacteristicDiscovered,
            PlatformEvent::characteristic,
            move |characteristic: &Characteristic| identity::matches(&owner, &characteristic.service),
            sink,
        );
        self.acknowledged(
            EventKind::CharacteristicDiscoveryStarted,
            Some(&service.identifier),
            PlatformCommand::DiscoverCharacteristics {
                service: service.clone(),
                characteristic_uuids: characteristic_uuids.to_vec(),
            },
        )
        .await?;
        Ok(characteristics)
    }

    /// Read the current value of `characteristic`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Platform`] on a GATT error, or
    /// [`BridgeError::Timeout`] after the configured read deadline.
    #[tracing::instrument(skip(self, characteristic), fields(characteristic = %characteristic.identifier))]
    pub async fn read_characteristic_value(
        &self,
        characteristic: &Characteristic,
    ) -> Result<CharacteristicValue, BridgeError> {
        Correlation::new(
            &self.channel,
            EventKind::CharacteristicRead,
            PlatformEvent::characteristic_value,
        )
        .for_target(&characteristic.identifier)
        .with_timeout(self.config.read_timeout())
        .run(
            &*self.platform,
            PlatformCommand::ReadCharacteristicValue {
                characteristic: characteristic.clone(),
            },
        )
        .await
    }

    /// Write `value` to `characteristic`.
    ///
    /// Without response the command is issued and `Ok(None)` returned at once;
    /// no `CharacteristicWritten` event is awaited.
    ///
    /// # Errors
    ///
    /// With response: [`BridgeError::Platform`] on a GATT error, or
    /// [`BridgeError::Timeout`] after the configured write deadline.
    #[tracing::instrument(skip(self, characteristic, value), fields(characteristic = %characteristic.identifier, len = value.len()))]
    pub async fn write_characteristic_value(
        &self,
        characteristic: &Characteristic,
        value: &[u8],
        with_response: bool,
    ) -> Result<Option<Acknowledgement>, BridgeError> {
        let command = PlatformCommand::WriteCharacteristicValue {
            characteristic: characteristic.clone(),
            value: characteristic::encode(value),
            with_response,
        };
        if !with_response {
            self.platform.issue(command);
            return Ok(None);
        }
        Correlation::new(
            &self.channel,
            EventKind::CharacteristicWritten,
            PlatformEvent::acknowledgement,
        )
        .for_target(&characteristic.identifier)
        .with_timeout(self.config.write_timeout())
        .run(&*self.platform, command)
        .await
        .map(Some)
    }

    /// Enable or disable notifications for `characteristic` on the device.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Platform`] if refused, or
    /// [`BridgeError::Timeout`] after the configured notify deadline.
    #[tracing::instrument(skip(self, characteristic), fields(characteristic = %characteristic.identifier))]
    pub async fn set_notify_value(
        &self,
        characteristic: &Characteristic,
        enabled: bool,
    ) -> Result<Acknowledgement, BridgeError> {
        Correlation::new(
            &self.channel,
            EventKind::NotifyStateChanged,
            PlatformEvent::acknowledgement,
        )
        .for_target(&characteristic.identifier)
        .with_timeout(self.config.notify_timeout())
        .run(
            &*self.platform,
            PlatformCommand::SetNotifyValue {
                characteristic: characteristic.clone(),
                enabled,
            },
        )
        .await
    }

    /// Forward value notifications of `characteristic` to `sink`.
    ///
    /// A notification carrying an error is delivered as `Err` and ends the
    /// stream; nothing reaches the sink after it.
    pub fn characteristic_did_notify<S>(&self, characteristic: &Characteristic, sink: S) -> Subscription
    where
        S: FnMut(Result<CharacteristicValue, PlatformError>) + Send + 'static,
    {
        let target = characteristic.identifier.clone();
        let sink = Mutex::new(sink);
        self.channel
            .subscribe(EventKind::CharacteristicNotified, move |event| {
                let Some(value) = event.characteristic_value() else {
                    return ControlFlow::Continue(());
                };
                if !identity::matches(&target, value) {
                    return ControlFlow::Continue(());
                }
                let mut sink = lock(&sink);
                if let Some(error) = &value.error {
                    tracing::warn!(characteristic = %target, %error, "notification stream failed");
                    (*sink)(Err(error.clone()));
                    return ControlFlow::Break(());
                }
                (*sink)(Ok(value.clone()));
                ControlFlow::Continue(())
            })
    }

    /// Forward every discovered device to `sink`.
    pub fn did_discover_device<S>(&self, sink: S) -> Subscription
    where
        S: FnMut(DeviceAdvertisement) + Send + 'static,
    {
        stream::forward_all(
            &self.channel,
            EventKind::DeviceDiscovered,
            PlatformEvent::advertisement,
            sink,
        )
    }

    /// Forward disconnections of `device`, or of every device when `None`.
    ///
    /// This catches link loss as well as requested disconnections.
    pub fn device_did_disconnect<S>(&self, device: Option<&Device>, sink: S) -> Subscription
    where
        S: FnMut(Acknowledgement) + Send + 'static,
    {
        let target = device.map(|device| device.identifier.clone());
        stream::forward(
            &self.channel,
            EventKind::DeviceDisconnected,
            PlatformEvent::acknowledgement,
            move |ack: &Acknowledgement| {
                target
                    .as_ref()
                    .is_none_or(|target| identity::matches(target, ack))
            },
            sink,
        )
    }

    /// Forward adapter power-state changes to `sink`, starting with the
    /// current state.
    pub fn did_change_state<S>(&self, sink: S) -> Subscription
    where
        S: FnMut(BluetoothState) + Send + 'static,
    {
        let subscription = stream::forward_all(
            &self.channel,
            EventKind::StateChanged,
            PlatformEvent::state,
            sink,
        );
        self.platform.issue(PlatformCommand::NotifyCurrentState);
        subscription
    }

    async fn acknowledged(
        &self,
        kind: EventKind,
        target: Option<&Identifier>,
        command: PlatformCommand,
    ) -> Result<Acknowledgement, BridgeError> {
        let correlation = Correlation::new(&self.channel, kind, PlatformEvent::acknowledgement);
        let correlation = match target {
            Some(target) => correlation.for_target(target),
            None => correlation,
        };
        correlation.run(&*self.platform, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use blebridge_domain::characteristic::CharacteristicProperties;
    use blebridge_domain::id::Identified;

    use crate::testing::{RecordingPlatform, wait_for_listeners};

    fn characteristic(id: &str) -> Characteristic {
        Characteristic {
            identifier: Identifier::new(id),
            device: Identifier::new("D1"),
            service: Identifier::new("S1"),
            uuid: Uuid::nil(),
            properties: CharacteristicProperties::default(),
        }
    }

    fn service(id: &str, device: &str) -> Service {
        Service {
            identifier: Identifier::new(id),
            device: Identifier::new(device),
            uuid: Uuid::nil(),
        }
    }

    fn central(platform: RecordingPlatform, channel: &EventChannel) -> Central<RecordingPlatform> {
        Central::new(channel.clone(), Arc::new(platform), CentralConfig::default())
    }

    fn answering(channel: &EventChannel) -> Central<RecordingPlatform> {
        let platform = RecordingPlatform::replying(channel, |command| match command {
            PlatformCommand::StartScan { .. } => vec![PlatformEvent::ScanStarted(Acknowledgement::ok())],
            PlatformCommand::StopScan => vec![PlatformEvent::ScanStopped(Acknowledgement::ok())],
            PlatformCommand::Connect { device } => vec![PlatformEvent::DeviceConnected(
                Acknowledgement::for_target(device.identifier.clone()),
            )],
            PlatformCommand::Disconnect { device } => vec![PlatformEvent::DeviceDisconnected(
                Acknowledgement::for_target(device.identifier.clone()),
            )],
            PlatformCommand::DiscoverServices { device, .. } if device.identifier.as_str() == "OFF" => {
                vec![PlatformEvent::ServiceDiscoveryStarted(
                    Acknowledgement::for_target("OFF").with_error("Device not connected"),
                )]
            }
            PlatformCommand::DiscoverServices { device, .. } => vec![
                PlatformEvent::ServiceDiscoveryStarted(Acknowledgement::for_target(
                    device.identifier.clone(),
                )),
                PlatformEvent::ServiceDiscovered(service("S1", device.identifier.as_str())),
                PlatformEvent::ServiceDiscovered(service("X1", "OTHER")),
                PlatformEvent::ServiceDiscovered(service("S2", device.identifier.as_str())),
            ],
            PlatformCommand::ReadCharacteristicValue { characteristic } => vec![
                PlatformEvent::CharacteristicRead(CharacteristicValue::from_bytes(
                    characteristic.identifier.clone(),
                    &[0x2a],
                )),
            ],
            PlatformCommand::SetNotifyValue { characteristic, .. } => vec![
                PlatformEvent::NotifyStateChanged(Acknowledgement::for_target(
                    characteristic.identifier.clone(),
                )),
            ],
            _ => Vec::new(),
        });
        central(platform, channel)
    }

    #[tokio::test]
    async fn should_start_scan_and_forward_discovered_devices() {
        let channel = EventChannel::new();
        let central = answering(&channel);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _discovery = central.did_discover_device(move |ad| lock(&sink).push(ad));

        let _scan = central.start_scan(ScanOptions::default()).await.unwrap();
        channel.publish(PlatformEvent::DeviceDiscovered(DeviceAdvertisement {
            identifier: Identifier::new("D1"),
            name: Some("Foo".to_string()),
            rssi: Some(-60),
            advertisement: Default::default(),
        }));

        let seen = lock(&seen);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].identifier.as_str(), "D1");
        assert_eq!(seen[0].name.as_deref(), Some("Foo"));
        assert_eq!(channel.listener_count(), 1);
    }

    #[tokio::test]
    async fn should_reject_scan_when_platform_reports_error() {
        let channel = EventChannel::new();
        let platform = RecordingPlatform::replying(&channel, |_| {
            vec![PlatformEvent::ScanStarted(Acknowledgement::ok().with_error("powered off"))]
        });
        let central = central(platform, &channel);

        let err = central.start_scan(ScanOptions::default()).await.unwrap_err();

        assert!(matches!(err, BridgeError::Platform(_)));
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_issue_stop_scan_command() {
        let channel = EventChannel::new();
        let central = answering(&channel);

        central.stop_scan().await.unwrap();

        assert_eq!(central.platform().commands(), [PlatformCommand::StopScan]);
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_connect_and_disconnect_without_leaking_listeners() {
        let channel = EventChannel::new();
        let central = answering(&channel);
        let device = Device::new("D1");

        let ack = central.connect(&device).await.unwrap();
        assert_eq!(ack.identifier(), Some("D1"));
        central.disconnect(&device).await.unwrap();

        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_fail_connect_with_platform_error() {
        let channel = EventChannel::new();
        let platform = RecordingPlatform::replying(&channel, |_| {
            vec![PlatformEvent::DeviceConnected(
                Acknowledgement::for_target("D1").with_error("Peer removed pairing"),
            )]
        });
        let central = central(platform, &channel);

        let err = central.connect(&Device::new("D1")).await.unwrap_err();

        assert!(matches!(&err, BridgeError::Platform(e) if e.message() == "Peer removed pairing"));
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_stream_services_of_the_requested_device_only() {
        let channel = EventChannel::new();
        let central = answering(&channel);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let subscription = central
            .discover_services(&Device::new("D1"), &[], move |s| {
                lock(&sink).push(s.identifier.to_string());
            })
            .await
            .unwrap();

        assert_eq!(*lock(&seen), ["S1", "S2"]);
        assert!(subscription.is_active());
        assert_eq!(channel.listener_count(), 1);
        drop(subscription);
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_reject_service_discovery_and_never_call_sink() {
        let channel = EventChannel::new();
        let central = answering(&channel);
        let calls = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&calls);

        let err = central
            .discover_services(&Device::new("OFF"), &[], move |_| *lock(&sink) += 1)
            .await
            .unwrap_err();

        assert!(matches!(&err, BridgeError::Platform(e) if e.message() == "Device not connected"));
        assert_eq!(*lock(&calls), 0);
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_stream_characteristics_of_the_requested_service_only() {
        let channel = EventChannel::new();
        let central = central(RecordingPlatform::default(), &channel);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let started = {
            let central = central.clone();
            tokio::spawn(async move {
                central
                    .discover_characteristics(&service("S1", "D1"), &[], move |c| {
                        lock(&sink).push(c.identifier.to_string());
                    })
                    .await
            })
        };
        wait_for_listeners(&channel, 2).await;

        channel.publish(PlatformEvent::CharacteristicDiscoveryStarted(
            Acknowledgement::for_target("S1"),
        ));
        let subscription = started.await.unwrap().unwrap();
        let mut other = characteristic("C9");
        other.service = Identifier::new("S2");
        channel.publish(PlatformEvent::CharacteristicDiscovered(characteristic("C1")));
        channel.publish(PlatformEvent::CharacteristicDiscovered(other));

        assert_eq!(*lock(&seen), ["C1"]);
        assert_eq!(subscription.kind(), EventKind::CharacteristicDiscovered);
    }

    #[tokio::test]
    async fn should_read_and_decode_characteristic_value() {
        let channel = EventChannel::new();
        let central = answering(&channel);

        let value = central
            .read_characteristic_value(&characteristic("C1"))
            .await
            .unwrap();

        assert_eq!(value.bytes().unwrap(), [0x2a]);
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_resolve_concurrent_reads_by_identity_not_order() {
        let channel = EventChannel::new();
        let central = central(RecordingPlatform::default(), &channel);
        let read = |id: &'static str| {
            let central = central.clone();
            tokio::spawn(async move { central.read_characteristic_value(&characteristic(id)).await })
        };
        let a = read("A");
        let b = read("B");
        wait_for_listeners(&channel, 2).await;

        channel.publish(PlatformEvent::CharacteristicRead(CharacteristicValue::from_bytes("B", b"bee")));
        let b = b.await.unwrap().unwrap();
        assert_eq!(b.bytes().unwrap(), b"bee");
        assert!(!a.is_finished());
        assert_eq!(channel.listener_count(), 1);

        channel.publish(PlatformEvent::CharacteristicRead(CharacteristicValue::from_bytes("A", b"ay")));
        let a = a.await.unwrap().unwrap();
        assert_eq!(a.bytes().unwrap(), b"ay");
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_read_after_five_seconds() {
        let channel = EventChannel::new();
        let central = central(RecordingPlatform::default(), &channel);
        let started = tokio::time::Instant::now();

        let err = central
            .read_characteristic_value(&characteristic("C1"))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert_eq!(channel.listener_count(), 0);
        assert_eq!(
            channel.publish(PlatformEvent::CharacteristicRead(CharacteristicValue::from_bytes("C1", b"late"))),
            0
        );
    }

    #[tokio::test]
    async fn should_write_without_response_immediately() {
        let channel = EventChannel::new();
        let central = central(RecordingPlatform::default(), &channel);

        let ack = central
            .write_characteristic_value(&characteristic("C1"), b"hi", false)
            .await
            .unwrap();

        assert!(ack.is_none());
        assert_eq!(channel.listener_count(), 0);
        let commands = central.platform().commands();
        assert!(matches!(
            &commands[..],
            [PlatformCommand::WriteCharacteristicValue { value, with_response: false, .. }] if value == "aGk="
        ));
    }

    #[tokio::test]
    async fn should_wait_for_written_event_with_response() {
        let channel = EventChannel::new();
        let platform = RecordingPlatform::replying(&channel, |command| match command {
            PlatformCommand::WriteCharacteristicValue { characteristic, .. } => vec![
                PlatformEvent::CharacteristicWritten(
                    Acknowledgement::for_target(characteristic.identifier.clone())
                        .with_error("Write not permitted"),
                ),
            ],
            _ => Vec::new(),
        });
        let central = central(platform, &channel);

        let err = central
            .write_characteristic_value(&characteristic("C1"), b"hi", true)
            .await
            .unwrap_err();

        assert!(matches!(&err, BridgeError::Platform(e) if e.message() == "Write not permitted"));
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_enable_notifications_and_forward_values() {
        let channel = EventChannel::new();
        let central = answering(&channel);
        let c1 = characteristic("C1");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifications = central.characteristic_did_notify(&c1, move |item| lock(&sink).push(item));

        central.set_notify_value(&c1, true).await.unwrap();
        channel.publish(PlatformEvent::CharacteristicNotified(CharacteristicValue::from_bytes("C1", &[1])));
        channel.publish(PlatformEvent::CharacteristicNotified(CharacteristicValue::from_bytes("C2", &[9])));
        channel.publish(PlatformEvent::CharacteristicNotified(CharacteristicValue::from_bytes("C1", &[2])));

        let seen = lock(&seen);
        let values: Vec<Vec<u8>> = seen
            .iter()
            .map(|item| item.as_ref().unwrap().bytes().unwrap())
            .collect();
        assert_eq!(values, [vec![1], vec![2]]);
        assert!(notifications.is_active());
    }

    #[tokio::test]
    async fn should_end_notification_stream_on_error() {
        let channel = EventChannel::new();
        let central = central(RecordingPlatform::default(), &channel);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifications = central.characteristic_did_notify(&characteristic("C1"), move |item| lock(&sink).push(item));

        channel.publish(PlatformEvent::CharacteristicNotified(CharacteristicValue::failed("C1", "link lost")));
        channel.publish(PlatformEvent::CharacteristicNotified(CharacteristicValue::from_bytes("C1", &[1])));

        let seen = lock(&seen);
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], Err(e) if e.message() == "link lost"));
        assert!(!notifications.is_active());
    }

    #[tokio::test]
    async fn should_forward_disconnections_per_device_or_globally() {
        let channel = EventChannel::new();
        let central = central(RecordingPlatform::default(), &channel);
        let device = Device::new("D1");
        let mine = Arc::new(Mutex::new(0));
        let all = Arc::new(Mutex::new(0));
        let (m, a) = (Arc::clone(&mine), Arc::clone(&all));
        let _mine = central.device_did_disconnect(Some(&device), move |_| *lock(&m) += 1);
        let _all = central.device_did_disconnect(None, move |_| *lock(&a) += 1);

        channel.publish(PlatformEvent::DeviceDisconnected(Acknowledgement::for_target("D1")));
        channel.publish(PlatformEvent::DeviceDisconnected(Acknowledgement::for_target("D2")));

        assert_eq!(*lock(&mine), 1);
        assert_eq!(*lock(&all), 2);
    }

    #[tokio::test]
    async fn should_report_current_state_on_subscribe() {
        let channel = EventChannel::new();
        let platform = RecordingPlatform::replying(&channel, |command| match command {
            PlatformCommand::NotifyCurrentState => vec![PlatformEvent::StateChanged {
                state: BluetoothState::PoweredOn,
            }],
            _ => Vec::new(),
        });
        let central = central(platform, &channel);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let _state = central.did_change_state(move |state| lock(&sink).push(state));
        channel.publish(PlatformEvent::StateChanged {
            state: BluetoothState::PoweredOff,
        });

        assert_eq!(*lock(&seen), [BluetoothState::PoweredOn, BluetoothState::PoweredOff]);
    }
}
