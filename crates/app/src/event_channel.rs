//! In-process event channel: one shared bus, many independent listeners.
//!
//! Platform collaborators push [`PlatformEvent`]s into an unbounded queue;
//! [`EventChannel::spawn_pump`] drains it and dispatches each event, in
//! delivery order, to every active listener registered for its kind.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use blebridge_domain::event::{EventKind, PlatformEvent};

type Handler = dyn Fn(&PlatformEvent) -> ControlFlow<()> + Send + Sync;

/// Lock a mutex, recovering the data if a listener panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
    /// Listeners whose handler is running on this thread.
    static DISPATCHING: RefCell<Vec<*const Listener>> = const { RefCell::new(Vec::new()) };
}

/// Marks a listener as running on the current thread until dropped.
struct Dispatching(*const Listener);

impl Dispatching {
    fn enter(listener: &Listener) -> Self {
        let ptr = std::ptr::from_ref(listener);
        DISPATCHING.with_borrow_mut(|running| running.push(ptr));
        Self(ptr)
    }

    fn is_current(listener: &Listener) -> bool {
        DISPATCHING.with_borrow(|running| running.iter().any(|ptr| std::ptr::eq(*ptr, listener)))
    }
}

impl Drop for Dispatching {
    fn drop(&mut self) {
        DISPATCHING.with_borrow_mut(|running| {
            if let Some(pos) = running.iter().rposition(|ptr| std::ptr::eq(*ptr, self.0)) {
                running.remove(pos);
            }
        });
    }
}

struct Listener {
    kind: EventKind,
    active: AtomicBool,
    /// Held for the whole handler call, so disposal from another thread
    /// waits for an in-flight invocation. `None` once released.
    handler: Mutex<Option<Box<Handler>>>,
}

impl Listener {
    /// Run the handler unless the listener is inactive, or already running
    /// further up this thread's stack.
    fn invoke(&self, event: &PlatformEvent) -> Option<ControlFlow<()>> {
        if Dispatching::is_current(self) {
            return None;
        }
        let mut slot = lock(&self.handler);
        if !self.active.load(Ordering::SeqCst) {
            return None;
        }
        let handler = slot.as_ref()?;
        let flow = {
            let _running = Dispatching::enter(self);
            handler(event)
        };
        // disposed by the handler itself
        let released = if self.active.load(Ordering::SeqCst) {
            None
        } else {
            slot.take()
        };
        drop(slot);
        drop(released);
        Some(flow)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns whether this call did the deactivation. Once it returns, the
    /// handler is not running on any other thread and never runs again.
    fn deactivate(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if !Dispatching::is_current(self) {
            let released = lock(&self.handler).take();
            drop(released);
        }
        was_active
    }
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Arc<Listener>>>,
}

impl Registry {
    fn dispose(&self, id: u64, listener: &Listener) {
        if listener.deactivate() {
            lock(&self.listeners).remove(&id);
        }
    }
}

/// Process-wide publish/subscribe bus for platform events.
///
/// Cheap to clone; every clone shares the same listener registry.
#[derive(Clone, Default)]
pub struct EventChannel {
    registry: Arc<Registry>,
}

impl EventChannel {
    /// Create a channel with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    ///
    /// The handler keeps receiving events until the returned [`Subscription`]
    /// is disposed (or dropped), or until it returns [`ControlFlow::Break`].
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&PlatformEvent) -> ControlFlow<()> + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: Box<Handler> = Box::new(handler);
        let listener = Arc::new(Listener {
            kind,
            active: AtomicBool::new(true),
            handler: Mutex::new(Some(handler)),
        });
        lock(&self.registry.listeners).insert(id, Arc::clone(&listener));
        tracing::trace!(%kind, id, "listener armed");

        Subscription {
            id,
            listener,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Dispatch `event` to every active listener of its kind.
    ///
    /// Listeners are invoked in registration order. A listener disposed
    /// during this dispatch (by an earlier listener, or by itself) is not
    /// invoked afterwards. Disposal from another thread waits for a running
    /// handler to return. A listener is not re-entered by a nested publish
    /// from its own handler. Returns the number of handlers invoked.
    pub fn publish(&self, event: PlatformEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<(u64, Arc<Listener>)> = lock(&self.registry.listeners)
            .iter()
            .filter(|(_, listener)| listener.kind == kind)
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        let mut invoked = 0;
        for (id, listener) in targets {
            let Some(flow) = listener.invoke(&event) else {
                continue;
            };
            invoked += 1;
            if flow.is_break() {
                self.registry.dispose(id, &listener);
            }
        }

        tracing::trace!(%kind, invoked, "platform event dispatched");
        invoked
    }

    /// Number of active listeners, all kinds included.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.registry.listeners).len()
    }

    /// Number of active listeners registered for `kind`.
    #[must_use]
    pub fn listener_count_for(&self, kind: EventKind) -> usize {
        lock(&self.registry.listeners)
            .values()
            .filter(|listener| listener.kind == kind)
            .count()
    }

    /// Dispose every listener.
    ///
    /// Pending one-shot operations resolve with
    /// [`BridgeError::Cancelled`](blebridge_domain::error::BridgeError::Cancelled).
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *lock(&self.registry.listeners));
        let count = drained.len();
        for listener in drained.values() {
            listener.deactivate();
        }
        tracing::debug!(count, "all listeners disposed");
    }

    /// Spawn the task that drains the platform event queue into this channel.
    ///
    /// The task ends when every sender of the queue has been dropped.
    #[must_use]
    pub fn spawn_pump(&self, mut events: mpsc::UnboundedReceiver<PlatformEvent>) -> JoinHandle<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                channel.publish(event);
            }
            tracing::debug!("platform event queue closed");
        })
    }
}

/// Disposable registration on an [`EventChannel`].
///
/// Disposal is idempotent and also happens on drop. Once disposed, the
/// handler is never invoked again.
#[must_use = "dropping a Subscription disposes it"]
pub struct Subscription {
    id: u64,
    listener: Arc<Listener>,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Stop receiving events. Calling this more than once has no effect.
    ///
    /// If the handler is running on another thread, this waits for it to
    /// return; a handler may dispose its own subscription.
    pub fn dispose(&self) {
        match self.registry.upgrade() {
            Some(registry) => registry.dispose(self.id, &self.listener),
            None => {
                self.listener.deactivate();
            }
        }
    }

    /// Whether the handler may still be invoked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.listener.is_active()
    }

    /// The event kind this subscription listens to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.listener.kind
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.listener.kind)
            .field("active", &self.is_active())
            .finish()
    }
}
