//! Domain Events
//!
//! Immutable records of things that happened to a blob or to the client's
//! view of the committee. Published through [`EventPublisher`] for audit
//! logging and for tests that need to observe side effects.
//!
//! [`EventPublisher`]: super::ports::EventPublisher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{BlobId, Epoch, ObjectId};

/// Domain event representing a significant occurrence in the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Read Events
    // =========================================================================
    /// A blob was reconstructed and verified.
    BlobRead {
        blob_id: BlobId,
        size_bytes: u64,
        slivers_fetched: usize,
        failed_requests: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A read hit an epoch-relative error and is retried.
    ReadRetried {
        blob_id: BlobId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Write Events
    // =========================================================================
    /// Storage was reserved and the blob registered on the ledger.
    BlobRegistered {
        blob_id: BlobId,
        object_id: ObjectId,
        encoded_size: u64,
        storage_cost: u64,
        write_cost: u64,
        timestamp: DateTime<Utc>,
    },

    /// A committee member failed to store its slivers or confirm.
    NodeWriteFailed {
        blob_id: BlobId,
        node_index: usize,
        weight: usize,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A blob was certified on the ledger.
    BlobCertified {
        blob_id: BlobId,
        object_id: ObjectId,
        epoch: Epoch,
        signers: usize,
        timestamp: DateTime<Utc>,
    },

    /// A full write completed.
    BlobWritten {
        blob_id: BlobId,
        object_id: ObjectId,
        size_bytes: u64,
        failed_weight: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Committee Events
    // =========================================================================
    /// All cached ledger state was dropped.
    CommitteeInvalidated {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::BlobRead { timestamp, .. } => *timestamp,
            DomainEvent::ReadRetried { timestamp, .. } => *timestamp,
            DomainEvent::BlobRegistered { timestamp, .. } => *timestamp,
            DomainEvent::NodeWriteFailed { timestamp, .. } => *timestamp,
            DomainEvent::BlobCertified { timestamp, .. } => *timestamp,
            DomainEvent::BlobWritten { timestamp, .. } => *timestamp,
            DomainEvent::CommitteeInvalidated { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::BlobRead { .. } => "BlobRead",
            DomainEvent::ReadRetried { .. } => "ReadRetried",
            DomainEvent::BlobRegistered { .. } => "BlobRegistered",
            DomainEvent::NodeWriteFailed { .. } => "NodeWriteFailed",
            DomainEvent::BlobCertified { .. } => "BlobCertified",
            DomainEvent::BlobWritten { .. } => "BlobWritten",
            DomainEvent::CommitteeInvalidated { .. } => "CommitteeInvalidated",
        }
    }

    /// Get the blob ID if applicable.
    pub fn blob_id(&self) -> Option<&BlobId> {
        match self {
            DomainEvent::BlobRead { blob_id, .. } => Some(blob_id),
            DomainEvent::ReadRetried { blob_id, .. } => Some(blob_id),
            DomainEvent::BlobRegistered { blob_id, .. } => Some(blob_id),
            DomainEvent::NodeWriteFailed { blob_id, .. } => Some(blob_id),
            DomainEvent::BlobCertified { blob_id, .. } => Some(blob_id),
            DomainEvent::BlobWritten { blob_id, .. } => Some(blob_id),
            DomainEvent::CommitteeInvalidated { .. } => None,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    pub fn blob_read(
        blob_id: BlobId,
        size_bytes: u64,
        slivers_fetched: usize,
        failed_requests: usize,
        duration: Duration,
    ) -> Self {
        DomainEvent::BlobRead {
            blob_id,
            size_bytes,
            slivers_fetched,
            failed_requests,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    pub fn read_retried(blob_id: BlobId, reason: impl Into<String>) -> Self {
        DomainEvent::ReadRetried {
            blob_id,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn blob_registered(
        blob_id: BlobId,
        object_id: ObjectId,
        encoded_size: u64,
        storage_cost: u64,
        write_cost: u64,
    ) -> Self {
        DomainEvent::BlobRegistered {
            blob_id,
            object_id,
            encoded_size,
            storage_cost,
            write_cost,
            timestamp: Utc::now(),
        }
    }

    pub fn node_write_failed(
        blob_id: BlobId,
        node_index: usize,
        weight: usize,
        reason: impl Into<String>,
    ) -> Self {
        DomainEvent::NodeWriteFailed {
            blob_id,
            node_index,
            weight,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn blob_certified(blob_id: BlobId, object_id: ObjectId, epoch: Epoch, signers: usize) -> Self {
        DomainEvent::BlobCertified {
            blob_id,
            object_id,
            epoch,
            signers,
            timestamp: Utc::now(),
        }
    }

    pub fn blob_written(
        blob_id: BlobId,
        object_id: ObjectId,
        size_bytes: u64,
        failed_weight: usize,
        duration: Duration,
    ) -> Self {
        DomainEvent::BlobWritten {
            blob_id,
            object_id,
            size_bytes,
            failed_weight,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    pub fn committee_invalidated(reason: impl Into<String>) -> Self {
        DomainEvent::CommitteeInvalidated {
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}
