//! Event Publisher Adapters
//!
//! [`LoggingEventPublisher`] turns domain events into tracing records keyed
//! by blob id. [`InMemoryEventCollector`] keeps them for inspection.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use crate::domain::types::BlobId;
use crate::error::Result;

/// Publishes domain events as structured log records.
///
/// Events that report a degraded operation (a member that failed a write,
/// a retried read, a dropped committee view) are always logged at warn.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher {
    audit: bool,
}

impl LoggingEventPublisher {
    /// Log routine events at debug level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log routine events at info level, for an audit trail of reads and writes.
    pub fn audit() -> Self {
        Self { audit: true }
    }

    fn is_degraded(event: &DomainEvent) -> bool {
        matches!(
            event,
            DomainEvent::NodeWriteFailed { .. }
                | DomainEvent::ReadRetried { .. }
                | DomainEvent::CommitteeInvalidated { .. }
        )
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let event_type = event.event_type();
        let blob_id = event.blob_id().map(tracing::field::display);
        let json = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));

        match (Self::is_degraded(&event), self.audit) {
            (true, _) => warn!(event_type, blob_id, event = %json, "Domain event"),
            (false, true) => info!(event_type, blob_id, event = %json, "Domain event"),
            (false, false) => debug!(event_type, blob_id, event = %json, "Domain event"),
        }
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// Keeps every published event in order.
///
/// Lets tests and embedding applications see what a client did to a blob.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: RwLock<Vec<DomainEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.read().clone()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.filtered(|e| e.event_type() == event_type)
    }

    /// Events about `blob_id`, oldest first.
    pub fn events_for_blob(&self, blob_id: &BlobId) -> Vec<DomainEvent> {
        self.filtered(|e| e.blob_id() == Some(blob_id))
    }

    fn filtered(&self, keep: impl Fn(&DomainEvent) -> bool) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| keep(e))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }
}
