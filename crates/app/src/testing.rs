//! Test doubles shared by the unit tests of this crate.

use std::sync::Mutex;

use blebridge_domain::command::PlatformCommand;
use blebridge_domain::event::PlatformEvent;

use crate::event_channel::{EventChannel, lock};
use crate::ports::Platform;

type Responder = Box<dyn Fn(&PlatformCommand) -> Vec<PlatformEvent> + Send + Sync>;

/// Records every command; optionally answers synchronously on a channel.
#[derive(Default)]
pub(crate) struct RecordingPlatform {
    commands: Mutex<Vec<PlatformCommand>>,
    reply: Option<(EventChannel, Responder)>,
}

impl RecordingPlatform {
    /// Publish `responder`'s events on `channel` from within `issue`.
    pub(crate) fn replying<F>(channel: &EventChannel, responder: F) -> Self
    where
        F: Fn(&PlatformCommand) -> Vec<PlatformEvent> + Send + Sync + 'static,
    {
        Self {
            commands: Mutex::new(Vec::new()),
            reply: Some((channel.clone(), Box::new(responder))),
        }
    }

    pub(crate) fn commands(&self) -> Vec<PlatformCommand> {
        lock(&self.commands).clone()
    }
}

impl Platform for RecordingPlatform {
    fn issue(&self, command: PlatformCommand) {
        lock(&self.commands).push(command.clone());
        if let Some((channel, responder)) = &self.reply {
            for event in responder(&command) {
                channel.publish(event);
            }
        }
    }
}

/// Yield until `channel` has at least `count` listeners.
pub(crate) async fn wait_for_listeners(channel: &EventChannel, count: usize) {
    for _ in 0..1000 {
        if channel.listener_count() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {count} listeners, found {}", channel.listener_count());
}
