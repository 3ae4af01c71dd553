//! Artifact change events
//!
//! Repositories emit one event per successful push, delete or yank toggle.
//! Delivery is fire-and-forget: a failed publish is logged and never turns a
//! successful mutation into an error.

use chrono::{DateTime, Utc};
use depot_core::ArtifactDescriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Add,
    Remove,
    Change,
}

/// One change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub repository: String,
    pub path: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ArtifactEvent {
    /// Build an event from the descriptor it concerns
    pub fn for_descriptor(
        event_type: EventType,
        descriptor: &ArtifactDescriptor,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            repository: descriptor.repository.clone(),
            path: descriptor.path.clone(),
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            group: descriptor.group().map(String::from),
            timestamp,
        }
    }
}

#[derive(Debug, Error)]
#[error("event publish failed: {0}")]
pub struct PublishError(pub String);

/// Sink for change records
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ArtifactEvent) -> Result<(), PublishError>;
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: ArtifactEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Forwards events to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<ArtifactEvent>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ArtifactEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: ArtifactEvent) -> Result<(), PublishError> {
        self.tx
            .send(event)
            .map_err(|_| PublishError("receiver dropped".to_string()))
    }
}

/// Publish and log failures
pub(crate) fn emit(publisher: &dyn EventPublisher, event: ArtifactEvent) {
    let (repository, path) = (event.repository.clone(), event.path.clone());
    if let Err(e) = publisher.publish(event) {
        tracing::warn!(%repository, %path, "dropping artifact event: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::Ecosystem;

    #[test]
    fn test_event_shape() {
        let d = ArtifactDescriptor::new(Ecosystem::Maven, "app", "1.0", "com/acme/app/1.0/app-1.0.jar")
            .with_metadata("groupId", "com.acme");
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let event = ArtifactEvent::for_descriptor(EventType::Add, &d, at);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "add");
        assert_eq!(json["group"], "com.acme");
        assert_eq!(json["version"], "1.0");
    }

    #[test]
    fn test_channel_publisher() {
        let (publisher, mut rx) = ChannelPublisher::new();
        let d = ArtifactDescriptor::new(Ecosystem::Generic, "tool", "2", "tool/2/tool");
        emit(&publisher, ArtifactEvent::for_descriptor(EventType::Remove, &d, Utc::now()));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.event_type, EventType::Remove);
        assert_eq!(received.group, None);

        drop(rx);
        assert!(publisher
            .publish(ArtifactEvent::for_descriptor(EventType::Change, &d, Utc::now()))
            .is_err());
    }
}
