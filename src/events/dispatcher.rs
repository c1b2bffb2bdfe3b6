use super::types::Event;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Subscriber registered with the [`EventDispatcher`].
///
/// `handle_event` runs on the emitting task and must not block; listeners
/// that do I/O hand work off to their own executor.
pub trait EventListener: Send + Sync {
    fn name(&self) -> &str;

    fn accepts(&self, _event: &Event) -> bool {
        true
    }

    fn handle_event(&self, event: &Event);
}

/// Fan-out of engine events to registered listeners and broadcast subscribers
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    sender: broadcast::Sender<Event>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_names())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Register a listener; a listener with the same name is replaced
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        let mut listeners = self.listeners.write();
        listeners.retain(|existing| existing.name() != listener.name());
        debug!(listener = listener.name(), "EVENTS: Registered listener");
        listeners.push(listener);
    }

    pub fn remove_listener(&self, name: &str) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|existing| existing.name() != name);
        before != listeners.len()
    }

    pub fn listener_names(&self) -> Vec<String> {
        self.listeners
            .read()
            .iter()
            .map(|l| l.name().to_string())
            .collect()
    }

    /// Receive every event on a broadcast channel
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Deliver one event to every interested listener, exactly once each
    pub fn dispatch(&self, event: impl Into<Event>) {
        let event = event.into();
        let listeners: Vec<Arc<dyn EventListener>> = self.listeners.read().clone();

        for listener in listeners.iter().filter(|l| l.accepts(&event)) {
            trace!(listener = listener.name(), "EVENTS: Delivering event");
            listener.handle_event(&event);
        }

        // No subscribers is fine; events are never retained
        let _ = self.sender.send(event);
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}
