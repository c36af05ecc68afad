//! Correlated operations: "issue a command, await the matching event".
//!
//! A [`Correlation`] arms a listener on the [`EventChannel`] *before* its
//! command is issued, so an event fired synchronously by the platform is
//! never missed. The first event of the watched kind that passes the
//! identity filter is terminal: the listener is disposed and the operation
//! fulfils with the payload, or fails with the payload's `error` field.
//!
//! With a deadline, silence becomes [`BridgeError::Timeout`]. A terminal
//! event arriving after the deadline finds no listener and is dropped.

use std::ops::ControlFlow;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use blebridge_domain::command::PlatformCommand;
use blebridge_domain::error::BridgeError;
use blebridge_domain::event::{EventKind, Fallible, PlatformEvent};
use blebridge_domain::id::{Identified, Identifier};

use crate::event_channel::{EventChannel, Subscription, lock};
use crate::identity;
use crate::ports::Platform;

/// Picks the payload of interest out of an event.
pub type Extractor<T> = fn(&PlatformEvent) -> Option<&T>;

/// Builder for a one-shot correlated operation.
pub struct Correlation<'c, T> {
    channel: &'c EventChannel,
    kind: EventKind,
    extract: Extractor<T>,
    target: Option<Identifier>,
    timeout: Option<Duration>,
}

impl<'c, T> Correlation<'c, T>
where
    T: Fallible + Identified + Clone + Send + 'static,
{
    /// Wait for the first `kind` event whose payload `extract` yields.
    pub fn new(channel: &'c EventChannel, kind: EventKind, extract: Extractor<T>) -> Self {
        Self {
            channel,
            kind,
            extract,
            target: None,
            timeout: None,
        }
    }

    /// Only accept events whose identifier equals `target`'s.
    #[must_use]
    pub fn for_target(mut self, target: &impl Identified) -> Self {
        self.target = target.identifier().map(Identifier::new);
        self
    }

    /// Fail with [`BridgeError::Timeout`] if nothing terminal arrives in time.
    #[must_use]
    pub fn with_timeout(mut self, after: Duration) -> Self {
        self.timeout = Some(after);
        self
    }

    /// Register the listener without issuing anything.
    pub fn arm(self) -> Pending<T> {
        let (sender, receiver) = oneshot::channel();
        let slot = Mutex::new(Some(sender));
        let extract = self.extract;
        let target = self.target.clone();

        let subscription = self.channel.subscribe(self.kind, move |event| {
            let Some(payload) = extract(event) else {
                return ControlFlow::Continue(());
            };
            if let Some(target) = &target {
                if !identity::matches(target, payload) {
                    return ControlFlow::Continue(());
                }
            }
            if let Some(sender) = lock(&slot).take() {
                // The waiter may already have given up; nothing to do then.
                let _ = sender.send(payload.clone());
            }
            ControlFlow::Break(())
        });

        tracing::debug!(kind = %self.kind, target = ?self.target, "correlation armed");

        Pending {
            kind: self.kind,
            target: self.target,
            timeout: self.timeout,
            subscription,
            receiver,
        }
    }

    /// Arm the listener, issue `command`, then wait for the terminal event.
    ///
    /// # Errors
    ///
    /// See [`Pending::wait`].
    pub async fn run<P>(self, platform: &P, command: PlatformCommand) -> Result<T, BridgeError>
    where
        P: Platform + ?Sized,
    {
        let pending = self.arm();
        tracing::debug!(command = command.name(), "issuing platform command");
        platform.issue(command);
        pending.wait().await
    }
}

/// An armed correlation waiting for its terminal event.
#[must_use = "a pending correlation does nothing unless waited on"]
pub struct Pending<T> {
    kind: EventKind,
    target: Option<Identifier>,
    timeout: Option<Duration>,
    subscription: Subscription,
    receiver: oneshot::Receiver<T>,
}

impl<T: Fallible> Pending<T> {
    /// Wait for the terminal event. Resolves exactly once.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Platform`] when the terminal payload carries `error`
    /// - [`BridgeError::Timeout`] when the deadline elapses first
    /// - [`BridgeError::Cancelled`] when the listener was torn down externally
    pub async fn wait(self) -> Result<T, BridgeError> {
        let Self {
            kind,
            target,
            timeout,
            subscription,
            receiver,
        } = self;

        let received = match timeout {
            Some(after) => {
                if let Ok(received) = tokio::time::timeout(after, receiver).await {
                    received
                } else {
                    subscription.dispose();
                    tracing::warn!(%kind, ?target, ?after, "no terminal event before deadline");
                    return Err(BridgeError::Timeout { event: kind, after });
                }
            }
            None => receiver.await,
        };
        subscription.dispose();

        let payload = received.map_err(|_| BridgeError::Cancelled)?;
        if let Some(error) = payload.error() {
            tracing::debug!(%kind, ?target, %error, "platform rejected operation");
            return Err(BridgeError::Platform(error.clone()));
        }
        tracing::debug!(%kind, ?target, "correlation fulfilled");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use blebridge_domain::characteristic::CharacteristicValue;
    use blebridge_domain::device::Device;
    use blebridge_domain::event::Acknowledgement;

    use crate::testing::{RecordingPlatform, wait_for_listeners};

    fn connected(id: &str) -> PlatformEvent {
        PlatformEvent::DeviceConnected(Acknowledgement::for_target(id))
    }

    #[tokio::test]
    async fn should_fulfil_with_matching_payload_and_release_listener() {
        let channel = EventChannel::new();
        let pending = Correlation::new(&channel, EventKind::DeviceConnected, PlatformEvent::acknowledgement)
            .for_target(&Device::new("D1"))
            .arm();

        channel.publish(connected("D1"));

        let ack = pending.wait().await.unwrap();
        assert_eq!(ack.identifier(), Some("D1"));
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_ignore_events_for_other_targets() {
        let channel = EventChannel::new();
        let pending = Correlation::new(&channel, EventKind::DeviceConnected, PlatformEvent::acknowledgement)
            .for_target(&Device::new("D1"))
            .arm();

        assert_eq!(channel.publish(connected("D2")), 1);
        assert_eq!(channel.listener_count(), 1);
        channel.publish(connected("D1"));

        assert_eq!(pending.wait().await.unwrap().identifier(), Some("D1"));
    }

    #[tokio::test]
    async fn should_fail_with_error_field_and_release_listener() {
        let channel = EventChannel::new();
        let pending = Correlation::new(&channel, EventKind::ScanStarted, PlatformEvent::acknowledgement).arm();

        channel.publish(PlatformEvent::ScanStarted(
            Acknowledgement::ok().with_error("Bluetooth disabled"),
        ));

        let err = pending.wait().await.unwrap_err();
        assert!(matches!(&err, BridgeError::Platform(e) if e.message() == "Bluetooth disabled"));
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn should_resolve_only_once_when_terminal_events_repeat() {
        let channel = EventChannel::new();
        let pending = Correlation::new(&channel, EventKind::ScanStarted, PlatformEvent::acknowledgement).arm();

        assert_eq!(channel.publish(PlatformEvent::ScanStarted(Acknowledgement::ok())), 1);
        assert_eq!(channel.publish(PlatformEvent::ScanStarted(Acknowledgement::ok())), 0);

        assert!(pending.wait().await.is_ok());
    }

    #[tokio::test]
    async fn should_catch_event_emitted_while_the_command_is_issued() {
        let channel = EventChannel::new();
        let platform = RecordingPlatform::replying(&channel, |command| match command {
            PlatformCommand::Connect { device } => vec![PlatformEvent::DeviceConnected(
                Acknowledgement::for_target(device.identifier.clone()),
            )],
            _ => Vec::new(),
        });
        let device = Device::new("D1");

        let ack = Correlation::new(&channel, EventKind::DeviceConnected, PlatformEvent::acknowledgement)
            .for_target(&device)
            .run(&platform, PlatformCommand::Connect { device: device.clone() })
            .await
            .unwrap();

        assert_eq!(ack.identifier(), Some("D1"));
        assert_eq!(platform.commands().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_at_deadline_and_drop_late_event() {
        let channel = EventChannel::new();
        let pending = Correlation::new(&channel, EventKind::CharacteristicRead, PlatformEvent::characteristic_value)
            .for_target(&Identifier::new("C1"))
            .with_timeout(Duration::from_millis(5000))
            .arm();
        let task = tokio::spawn(pending.wait());

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert!(!task.is_finished());
        assert_eq!(channel.listener_count(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Timeout { event: EventKind::CharacteristicRead, after } if after == Duration::from_millis(5000)
        ));
        assert_eq!(channel.listener_count(), 0);

        let late = PlatformEvent::CharacteristicRead(CharacteristicValue::from_bytes("C1", b"late"));
        assert_eq!(channel.publish(late), 0);
    }

    #[tokio::test]
    async fn should_report_cancelled_when_channel_is_cleared() {
        let channel = EventChannel::new();
        let pending = Correlation::new(&channel, EventKind::DeviceConnected, PlatformEvent::acknowledgement)
            .for_target(&Device::new("D1"))
            .arm();

        channel.clear();

        assert!(matches!(pending.wait().await, Err(BridgeError::Cancelled)));
    }

    #[tokio::test]
    async fn should_release_listener_when_waiter_is_dropped() {
        let channel = Arc::new(EventChannel::new());
        let pending = Correlation::new(&channel, EventKind::DeviceConnected, PlatformEvent::acknowledgement).arm();
        let task = tokio::spawn(pending.wait());
        wait_for_listeners(&channel, 1).await;

        task.abort();
        let _ = task.await;

        assert_eq!(channel.listener_count(), 0);
    }
}
