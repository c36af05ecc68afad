//! Continuing subscriptions: open-ended event sequences forwarded to a sink.
//!
//! Unlike a [`Correlation`](crate::correlation::Correlation), a forwarded
//! stream never ends on its own. It lives until the returned
//! [`Subscription`] is disposed or dropped. Items reach the sink in channel
//! dispatch order, without buffering.

use std::ops::ControlFlow;
use std::sync::Mutex;

use blebridge_domain::event::EventKind;

use crate::correlation::Extractor;
use crate::event_channel::{EventChannel, Subscription, lock};

/// Forward every `kind` payload accepted by `filter` to `sink`.
pub fn forward<T, F, S>(
    channel: &EventChannel,
    kind: EventKind,
    extract: Extractor<T>,
    filter: F,
    sink: S,
) -> Subscription
where
    T: Clone + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
    S: FnMut(T) + Send + 'static,
{
    let sink = Mutex::new(sink);
    channel.subscribe(kind, move |event| {
        if let Some(item) = extract(event) {
            if filter(item) {
                let mut sink = lock(&sink);
                (*sink)(item.clone());
            }
        }
        ControlFlow::Continue(())
    })
}

/// Forward every `kind` payload to `sink`, unfiltered.
pub fn forward_all<T, S>(
    channel: &EventChannel,
    kind: EventKind,
    extract: Extractor<T>,
    sink: S,
) -> Subscription
where
    T: Clone + 'static,
    S: FnMut(T) + Send + 'static,
{
    forward(channel, kind, extract, |_| true, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use blebridge_domain::event::PlatformEvent;
    use blebridge_domain::id::Identifier;
    use blebridge_domain::service::Service;

    use crate::identity;

    fn service(id: &str, device: &str) -> PlatformEvent {
        PlatformEvent::ServiceDiscovered(Service {
            identifier: Identifier::new(id),
            device: Identifier::new(device),
            uuid: uuid::Uuid::nil(),
        })
    }

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl FnMut(Service) + Send + 'static) {
        let items = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&items);
        (items, move |s: Service| lock(&sink).push(s.identifier.to_string()))
    }

    #[test]
    fn should_forward_in_dispatch_order() {
        let channel = EventChannel::new();
        let (items, sink) = collector();
        let _sub = forward_all(&channel, EventKind::ServiceDiscovered, PlatformEvent::service, sink);

        for id in ["S1", "S2", "S3"] {
            channel.publish(service(id, "D1"));
        }

        assert_eq!(*lock(&items), ["S1", "S2", "S3"]);
    }

    #[test]
    fn should_stop_forwarding_after_dispose() {
        let channel = EventChannel::new();
        let (items, sink) = collector();
        let sub = forward_all(&channel, EventKind::ServiceDiscovered, PlatformEvent::service, sink);

        channel.publish(service("S1", "D1"));
        channel.publish(service("S2", "D1"));
        sub.dispose();
        channel.publish(service("S3", "D1"));

        assert_eq!(*lock(&items), ["S1", "S2"]);
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn should_apply_filter() {
        let channel = EventChannel::new();
        let (items, sink) = collector();
        let device = Identifier::new("D1");
        let _sub = forward(
            &channel,
            EventKind::ServiceDiscovered,
            PlatformEvent::service,
            move |s: &Service| identity::matches(&device, &s.device),
            sink,
        );

        channel.publish(service("S1", "D1"));
        channel.publish(service("S2", "D2"));

        assert_eq!(*lock(&items), ["S1"]);
    }

    #[test]
    fn should_never_terminate_on_its_own() {
        let channel = EventChannel::new();
        let (items, sink) = collector();
        let sub = forward_all(&channel, EventKind::ServiceDiscovered, PlatformEvent::service, sink);

        for n in 0..50 {
            channel.publish(service(&format!("S{n}"), "D1"));
        }

        assert!(sub.is_active());
        assert_eq!(lock(&items).len(), 50);
    }
}
