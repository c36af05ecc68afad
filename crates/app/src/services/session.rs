//! Per-device session: connection lifecycle as an explicit state machine.
//!
//! A [`DeviceSession`] composes [`Central`] operations into validated stages
//! (see [`SessionState`]). Link loss is surfaced through the sink given to
//! [`connect`](DeviceSession::connect), independent of any pending operation.
//! GATT operations on one session are serialised, so two of them never race
//! for the same terminal event.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use blebridge_domain::characteristic::{Characteristic, CharacteristicValue};
use blebridge_domain::device::Device;
use blebridge_domain::error::{BridgeError, PlatformError};
use blebridge_domain::event::Acknowledgement;
use blebridge_domain::service::Service;
use blebridge_domain::session::{SessionEvent, SessionState};

use crate::event_channel::{Subscription, lock};
use crate::ports::Platform;
use crate::services::central::Central;

pub struct DeviceSession<P> {
    central: Central<P>,
    device: Device,
    state: Arc<Mutex<SessionState>>,
    services: Arc<Mutex<Vec<Service>>>,
    discovery: Arc<Mutex<Option<Subscription>>>,
    link_watch: Mutex<Option<Subscription>>,
    gatt: tokio::sync::Mutex<()>,
}

impl<P: Platform> DeviceSession<P> {
    /// A disconnected session for `device`.
    pub fn new(central: Central<P>, device: Device) -> Self {
        Self {
            central,
            device,
            state: Arc::default(),
            services: Arc::default(),
            discovery: Arc::default(),
            link_watch: Mutex::new(None),
            gatt: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Services discovered so far on the current link.
    #[must_use]
    pub fn services(&self) -> Vec<Service> {
        lock(&self.services).clone()
    }

    /// Connect, watching for link loss from the moment the command is issued.
    ///
    /// `on_link_lost` is called when the device disconnects without a
    /// [`disconnect`](Self::disconnect) request, including a disconnection
    /// reported right behind the connect acknowledgement. In that case this
    /// still returns `Ok` and the session is left disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidTransition`] unless disconnected, or the
    /// connect failure (the session is then disconnected again).
    pub async fn connect<F>(&self, on_link_lost: F) -> Result<(), BridgeError>
    where
        F: FnMut(Acknowledgement) + Send + 'static,
    {
        self.transition(SessionEvent::ConnectRequested)?;
        let watch = self.watch_link(on_link_lost);
        *lock(&self.link_watch) = Some(watch);

        if let Err(err) = self.central.connect(&self.device).await {
            lock(&self.link_watch).take();
            self.settle(SessionState::Connecting, SessionEvent::ConnectFailed);
            return Err(err);
        }
        if !self.settle(SessionState::Connecting, SessionEvent::Connected) {
            tracing::debug!(device = %self.device.identifier, "link lost while connecting");
        }
        Ok(())
    }

    /// Discover services, restricted to `service_uuids` unless empty.
    ///
    /// Services keep accumulating in [`services`](Self::services) for the
    /// lifetime of the link.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidTransition`] without a link, or the
    /// discovery-start failure (the session is then back to connected).
    /// Returns [`BridgeError::NotConnected`] if the link drops before
    /// discovery is acknowledged.
    pub async fn discover_services(&self, service_uuids: &[Uuid]) -> Result<(), BridgeError> {
        self.transition(SessionEvent::DiscoveryRequested)?;
        let services = Arc::clone(&self.services);
        let started = self
            .central
            .discover_services(&self.device, service_uuids, move |service| {
                let mut known = lock(&services);
                if !known.iter().any(|s| s.identifier == service.identifier) {
                    known.push(service);
                }
            })
            .await;

        let mut state = lock(&self.state);
        if *state != SessionState::Discovering {
            drop(state);
            lock(&self.services).clear();
            return Err(started.err().unwrap_or(BridgeError::NotConnected));
        }
        match started {
            Ok(subscription) => {
                *state = state.apply(SessionEvent::DiscoveryStarted)?;
                *lock(&self.discovery) = Some(subscription);
                tracing::debug!(device = %self.device.identifier, "service discovery started");
                Ok(())
            }
            Err(err) => {
                *state = state.apply(SessionEvent::DiscoveryFailed)?;
                tracing::debug!(device = %self.device.identifier, %err, "service discovery rejected");
                Err(err)
            }
        }
    }

    /// Connect, then discover services. Discovery is only attempted once
    /// the connection is up.
    ///
    /// # Errors
    ///
    /// The first failing step's error.
    pub async fn connect_and_discover<F>(
        &self,
        service_uuids: &[Uuid],
        on_link_lost: F,
    ) -> Result<(), BridgeError>
    where
        F: FnMut(Acknowledgement) + Send + 'static,
    {
        self.connect(on_link_lost).await?;
        self.discover_services(service_uuids).await
    }

    /// Disconnect. The link-loss sink is not called for this disconnection.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidTransition`] without a link, or the
    /// platform failure. The session is then connected again with no
    /// discovered services.
    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        self.transition(SessionEvent::DisconnectRequested)?;
        let result = self.central.disconnect(&self.device).await;
        lock(&self.discovery).take();
        lock(&self.services).clear();
        if let Err(err) = result {
            self.transition(SessionEvent::DisconnectFailed)?;
            return Err(err);
        }
        self.transition(SessionEvent::Disconnected)?;
        lock(&self.link_watch).take();
        Ok(())
    }

    /// Discover the characteristics of `service`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotConnected`] without a link, or the
    /// discovery-start failure.
    pub async fn discover_characteristics<S>(
        &self,
        service: &Service,
        characteristic_uuids: &[Uuid],
        sink: S,
    ) -> Result<Subscription, BridgeError>
    where
        S: FnMut(Characteristic) + Send + 'static,
    {
        let _gatt = self.gatt.lock().await;
        self.ensure_linked()?;
        self.central
            .discover_characteristics(service, characteristic_uuids, sink)
            .await
    }

    /// Read and decode the value of `characteristic`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotConnected`] without a link, or the read failure.
    pub async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, BridgeError> {
        let _gatt = self.gatt.lock().await;
        self.ensure_linked()?;
        self.central
            .read_characteristic_value(characteristic)
            .await?
            .bytes()
    }

    /// Write `value` to `characteristic`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotConnected`] without a link, or the write failure.
    pub async fn write(
        &self,
        characteristic: &Characteristic,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), BridgeError> {
        let _gatt = self.gatt.lock().await;
        self.ensure_linked()?;
        self.central
            .write_characteristic_value(characteristic, value, with_response)
            .await?;
        Ok(())
    }

    /// Enable or disable notifications for `characteristic`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotConnected`] without a link, or the platform failure.
    pub async fn set_notify(&self, characteristic: &Characteristic, enabled: bool) -> Result<(), BridgeError> {
        let _gatt = self.gatt.lock().await;
        self.ensure_linked()?;
        self.central.set_notify_value(characteristic, enabled).await?;
        Ok(())
    }

    /// Forward notifications of `characteristic` to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotConnected`] without a link.
    pub fn notifications<S>(&self, characteristic: &Characteristic, sink: S) -> Result<Subscription, BridgeError>
    where
        S: FnMut(Result<CharacteristicValue, PlatformError>) + Send + 'static,
    {
        self.ensure_linked()?;
        Ok(self.central.characteristic_did_notify(characteristic, sink))
    }

    fn ensure_linked(&self) -> Result<(), BridgeError> {
        if self.state().is_linked() {
            Ok(())
        } else {
            Err(BridgeError::NotConnected)
        }
    }

    fn transition(&self, event: SessionEvent) -> Result<SessionState, BridgeError> {
        let mut state = lock(&self.state);
        let from = *state;
        let next = from.apply(event)?;
        tracing::debug!(device = %self.device.identifier, %from, to = %next, ?event, "session transition");
        *state = next;
        Ok(next)
    }

    /// Apply `event` only if the session is still `expected`. Returns
    /// whether it was applied.
    fn settle(&self, expected: SessionState, event: SessionEvent) -> bool {
        let mut state = lock(&self.state);
        if *state != expected {
            return false;
        }
        match state.apply(event) {
            Ok(next) => {
                tracing::debug!(device = %self.device.identifier, from = %expected, to = %next, ?event, "session transition");
                *state = next;
                true
            }
            Err(_) => false,
        }
    }

    fn watch_link<F>(&self, mut on_link_lost: F) -> Subscription
    where
        F: FnMut(Acknowledgement) + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let services = Arc::clone(&self.services);
        let discovery = Arc::clone(&self.discovery);
        let device = self.device.identifier.clone();

        self.central
            .device_did_disconnect(Some(&self.device), move |ack| {
                {
                    let mut state = lock(&state);
                    if *state == SessionState::Disconnecting {
                        return;
                    }
                    match state.apply(SessionEvent::LinkLost) {
                        Ok(next) => *state = next,
                        Err(_) => return,
                    }
                }
                lock(&discovery).take();
                lock(&services).clear();
                tracing::warn!(%device, "link lost");
                on_link_lost(ack);
            })
    }
}
