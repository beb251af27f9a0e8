// Event Bus - Pub/Sub for Cross-Component Events
//
// In-memory event streaming over tokio broadcast channels. Carries events
// that already passed the boundary enforcer; subscribers receive them in
// publish order. Events are not persisted; a subscriber that lags past the
// channel capacity observes a Lagged error rather than silent loss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::component::ComponentId;

/// A cross-component event after boundary validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentEvent {
    pub name: String,
    pub payload: Value,
    pub source: ComponentId,
    pub published_at: DateTime<Utc>,
}

/// Event bus for publishing and subscribing to component events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ComponentEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Capacity bounds how many events can buffer before old ones drop.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a validated event to all subscribers.
    pub fn publish(&self, event: ComponentEvent) {
        debug!(name = %event.name, source = %event.source, "publishing event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("no subscribers listening to event");
        }
    }

    /// Subscribe to every event on the bus.
    pub fn subscribe_all(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            name_filter: None,
        }
    }

    /// Subscribe to events with a specific name. Unsubscription is dropping
    /// the returned handle.
    pub fn subscribe(&self, event_name: &str) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            name_filter: Some(event_name.to_string()),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver handle; filters by event name when one was requested.
pub struct EventSubscription {
    receiver: broadcast::Receiver<ComponentEvent>,
    name_filter: Option<String>,
}

impl EventSubscription {
    /// Receive the next matching event (waits until one is available).
    pub async fn recv(&mut self) -> Result<ComponentEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("event subscription lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive a matching event without waiting.
    pub fn try_recv(&mut self) -> Result<ComponentEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("event subscription lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, event: &ComponentEvent) -> bool {
        self.name_filter
            .as_deref()
            .map(|name| event.name == name)
            .unwrap_or(true)
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, source: ComponentId) -> ComponentEvent {
        ComponentEvent {
            name: name.to_string(),
            payload: json!({"k": 1}),
            source,
            published_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe_all();
        let source = ComponentId::new();

        bus.publish(event("app-refresh", source));

        let received = sub.recv().await.unwrap();
        assert_eq!(received.name, "app-refresh");
        assert_eq!(received.source, source);
    }

    #[tokio::test]
    async fn test_named_subscription_filters() {
        let bus = EventBus::new(10);
        let source = ComponentId::new();
        let mut sub = bus.subscribe("app-save");

        bus.publish(event("app-refresh", source));
        bus.publish(event("app-save", source));

        let received = sub.recv().await.unwrap();
        assert_eq!(received.name, "app-save");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe_all();
        let mut sub2 = bus.subscribe_all();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(event("app-refresh", ComponentId::new()));

        assert!(sub1.recv().await.is_ok());
        assert!(sub2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_unsubscribe_by_drop() {
        let bus = EventBus::new(10);
        let sub = bus.subscribe("app-save");
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe_all();
        assert!(matches!(sub.try_recv(), Err(EventBusError::Empty)));
    }
}
