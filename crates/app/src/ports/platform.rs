//! Platform port: the native Bluetooth stack, seen from the core.
//!
//! A platform accepts fire-and-forget [`PlatformCommand`]s and reports
//! every outcome later as [`PlatformEvent`]s pushed into an [`EventSender`].

use std::sync::Arc;

use tokio::sync::mpsc;

use blebridge_domain::command::PlatformCommand;
use blebridge_domain::event::PlatformEvent;

/// Queue through which a platform delivers its events to the core.
pub type EventSender = mpsc::UnboundedSender<PlatformEvent>;

/// Issues imperative commands to the Bluetooth stack.
///
/// Implementations must not block: the outcome of a command is only ever
/// reported through events, possibly long after `issue` returned. A failure
/// to carry out a command is reported as an event with an `error` field.
pub trait Platform: Send + Sync + 'static {
    /// Hand a command to the platform.
    fn issue(&self, command: PlatformCommand);
}

impl<T: Platform + ?Sized> Platform for Arc<T> {
    fn issue(&self, command: PlatformCommand) {
        (**self).issue(command);
    }
}
