// ── Per-component event bus ──
//
// Listeners run synchronously inside `emit`, in subscription order, before
// the emitting call returns. Every `subscribe` hands back a `Subscription`
// that detaches the listener when released or dropped.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    listeners: Vec<(u64, Listener<E>)>,
}

/// A typed publish/subscribe channel owned by one component instance.
pub struct EventBus<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener. It stays attached until the returned
    /// [`Subscription`] is released or dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, Arc::new(listener)));
            id
        };

        let registry: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .listeners
                        .retain(|(lid, _)| *lid != id);
                }
            })),
        }
    }

    /// Deliver `event` to every listener before returning.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe
    /// or unsubscribe from inside a callback.
    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Forward every event into an unbounded channel, for async consumers.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = self.subscribe(move |event: &E| {
            // Receiver gone just means nobody is listening any more
            let _ = tx.send(event.clone());
        });
        (sub, rx)
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Subscription handles ─────────────────────────────────────────────

/// Handle to one registered listener.
#[must_use = "dropping a Subscription detaches the listener immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Detach the listener now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// Subscriptions collected by an owner and released together at teardown.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subs: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sub: Subscription) {
        self.subs.push(sub);
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Detach every collected listener.
    pub fn release_all(&mut self) {
        for sub in self.subs.drain(..) {
            sub.unsubscribe();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn listeners_run_before_emit_returns() {
        let bus = EventBus::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe(move |v| sink.lock().unwrap().push(*v));

        bus.emit(&1);
        bus.emit(&2);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn dropping_subscription_detaches() {
        let bus = EventBus::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = bus.subscribe(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&());
        drop(sub);
        bus.emit(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn release_all_detaches_every_listener() {
        let bus = EventBus::<u8>::new();
        let mut set = SubscriptionSet::new();
        set.push(bus.subscribe(|_| {}));
        set.push(bus.subscribe(|_| {}));
        assert_eq!(bus.listener_count(), 2);

        set.release_all();

        assert!(set.is_empty());
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = EventBus::<u8>::new();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        sub.unsubscribe();
    }

    #[test]
    fn channel_subscription_forwards_events() {
        let bus = EventBus::<String>::new();
        let (_sub, mut rx) = bus.subscribe_channel();

        bus.emit(&"stream-enabled".to_string());

        assert_eq!(rx.try_recv().unwrap(), "stream-enabled");
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_emit() {
        let bus = Arc::new(EventBus::<()>::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let sub = bus.subscribe(move |()| {
            inner.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        bus.emit(&());

        assert_eq!(bus.listener_count(), 0);
    }
}
