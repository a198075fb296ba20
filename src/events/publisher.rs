use super::types::OrchestrationEvent;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast publisher for orchestration lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl PublishedEvent {
    /// Decode the context back into the typed event
    pub fn orchestration_event(&self) -> Result<OrchestrationEvent, PublishError> {
        Ok(serde_json::from_value(self.context.clone())?)
    }
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event_name: impl Into<String>, context: Value) {
        let event = PublishedEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };
        // No subscribers is fine; events are fire-and-forget
        if self.sender.send(event).is_err() {
            trace!("Event published with no subscribers");
        }
    }

    pub fn publish_event(&self, event: &OrchestrationEvent) -> Result<(), PublishError> {
        let context = serde_json::to_value(event)?;
        self.publish(event.name(), context);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;
    use crate::state_machine::Status;

    #[tokio::test]
    async fn test_publish_typed_event() {
        let publisher = EventPublisher::default();
        let mut receiver = publisher.subscribe();

        let event = OrchestrationEvent::NodeStatusUpdate {
            plan_execution_id: "pe-1".into(),
            node_execution_id: "ne-1".into(),
            from: Status::Running,
            to: Status::Succeeded,
        };
        publisher.publish_event(&event).unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.name, events::NODE_STATUS_UPDATE);
        assert_eq!(received.orchestration_event().unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = EventPublisher::new(4);
        publisher.publish("anything", serde_json::json!({}));
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
