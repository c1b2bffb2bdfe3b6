use crate::events::{ConnectionStatusEvent, ErrorEvent, Event, EventListener, ServerEvent};
use parking_lot::Mutex;
use std::time::Duration;

/// Event listener that keeps everything it sees
#[derive(Debug)]
pub struct RecordingListener {
    name: String,
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn errors(&self) -> Vec<ErrorEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors_for(&self, channel_id: &str) -> Vec<ErrorEvent> {
        self.errors()
            .into_iter()
            .filter(|e| e.channel_id.as_deref() == Some(channel_id))
            .collect()
    }

    pub fn server_events(&self) -> Vec<ServerEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Server(server) => Some(server.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connection_events(&self) -> Vec<ConnectionStatusEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::ConnectionStatus(status) => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Poll until `predicate` holds or `timeout` elapses
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[Event]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(self.events.lock().as_slice()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl EventListener for RecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
