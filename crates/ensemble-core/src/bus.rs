use crate::error::EnsembleResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Subject an agent listens on for dispatched tasks: `agents.<id>.tasks`.
pub fn agent_task_subject(agent_id: Uuid) -> String {
    format!("agents.{agent_id}.tasks")
}

/// A payload delivered on a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    /// Subject the message was published on.
    pub subject: String,
    /// Opaque bytes. For task dispatch this is a JSON-encoded task.
    pub payload: Vec<u8>,
    /// UTC time of publication.
    pub published_at: DateTime<Utc>,
}

impl BusMessage {
    /// Creates a message stamped with the current time.
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
            published_at: Utc::now(),
        }
    }
}

/// Callback invoked for every message on a subscribed subject.
pub type MessageHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Publish/subscribe transport used to hand tasks to agents.
///
/// The orchestrator never looks inside payloads beyond serializing a task;
/// execution happens on the other side of the bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` on `subject`.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> EnsembleResult<()>;

    /// Register `handler` for every future message on `subject`.
    async fn subscribe(&self, subject: &str, handler: MessageHandler) -> EnsembleResult<()>;
}

/// Process-local bus. Publishing calls every handler of the subject inline.
///
/// Keeps a log of everything published so callers can inspect what was
/// dispatched.
#[derive(Default)]
pub struct InMemoryBus {
    handlers: RwLock<HashMap<String, Vec<MessageHandler>>>,
    published: RwLock<Vec<BusMessage>>,
}

impl InMemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published so far, oldest first.
    pub fn published(&self) -> Vec<BusMessage> {
        self.published.read().clone()
    }

    /// Messages published on one subject, oldest first.
    pub fn published_on(&self, subject: &str) -> Vec<BusMessage> {
        self.published
            .read()
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Number of handlers registered on `subject`.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.handlers.read().get(subject).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> EnsembleResult<()> {
        let message = BusMessage::new(subject, payload);
        // Clone the handler list so no lock is held while handlers run.
        let handlers: Vec<MessageHandler> = self
            .handlers
            .read()
            .get(subject)
            .cloned()
            .unwrap_or_default();

        self.published.write().push(message.clone());

        if handlers.is_empty() {
            tracing::debug!(subject, "InMemoryBus: no subscribers");
        }
        for handler in handlers {
            handler(message.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str, handler: MessageHandler) -> EnsembleResult<()> {
        self.handlers
            .write()
            .entry(subject.to_string())
            .or_default()
            .push(handler);
        tracing::debug!(subject, "InMemoryBus: subscribed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_agent_task_subject() {
        let id = Uuid::nil();
        assert_eq!(
            agent_task_subject(id),
            "agents.00000000-0000-0000-0000-000000000000.tasks"
        );
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers_of_subject_only() {
        let bus = InMemoryBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        bus.subscribe(
            "agents.a.tasks",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

        bus.publish("agents.a.tasks", b"one".to_vec()).await.unwrap();
        bus.publish("agents.b.tasks", b"two".to_vec()).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.published().len(), 2);
        assert_eq!(bus.published_on("agents.a.tasks")[0].payload, b"one");
    }

    #[tokio::test]
    async fn test_subscriber_count() {
        let bus = InMemoryBus::new();
        assert_eq!(bus.subscriber_count("x"), 0);
        bus.subscribe("x", Arc::new(|_| {})).await.unwrap();
        bus.subscribe("x", Arc::new(|_| {})).await.unwrap();
        assert_eq!(bus.subscriber_count("x"), 2);
    }
}
