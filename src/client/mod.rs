//! Blob Client
//!
//! Read, write and certification protocol on top of the domain ports.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           BlobClient                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  read_blob ──▶ epoch retry ──▶ certification epoch ──▶ slivers    │
//! │  write_blob ──▶ encode ──▶ register ──▶ store ──▶ certify         │
//! │  get_verified_blob_status │ storage_cost │ delete │ extend        │
//! └──────────────────────────────────────────────────────────────────┘
//!          │                 │                │              │
//!          ▼                 ▼                ▼              ▼
//!    CommitteeView     StorageNodeApi     LedgerApi      BlobCodec
//! ```
//!
//! # Components
//!
//! - **Read path** (`read.rs`): metadata lookup, weighted sliver fan-out with
//!   per-class quorum aborts, decoding and verification
//! - **Write path** (`write.rs`): registration, per-node distribution under
//!   the fault budget
//! - **Certification** (`certify.rs`): canonical message, BLS aggregation
//! - **Status** (`status.rs`): verified blob status, certification epoch
//! - **Retry** (`retry.rs`): one retry after invalidating the committee view
//! - **Lifecycle** (`lifecycle.rs`): cost, delete, extend

mod certify;
mod lifecycle;
mod read;
mod retry;
mod status;
mod write;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::warn;

use crate::committee::CommitteeView;
use crate::config::ClientConfig;
use crate::domain::events::DomainEvent;
use crate::domain::ports::{BlobCodec, EventPublisher, LedgerApi, StorageNodeApi};
use crate::domain::types::{BlobId, StorageNode};
use crate::encoding::sizing::is_quorum;
use crate::error::{Error, FailureClass, Result};
use crate::metrics::ClientMetrics;
use crate::adapters::LoggingEventPublisher;

pub use certify::{aggregate_confirmations, confirmation_message, verify_confirmation, BLS_DST};
pub use lifecycle::BlobExtension;
pub use write::{WriteBlobOptions, WriteBlobResult};

/// Client for reading, writing and certifying blobs.
///
/// Every instance owns its committee cache and metrics registry.
pub struct BlobClient {
    config: ClientConfig,
    ledger: Arc<dyn LedgerApi>,
    nodes: Arc<dyn StorageNodeApi>,
    codec: Arc<dyn BlobCodec>,
    events: Arc<dyn EventPublisher>,
    committee: CommitteeView,
    metrics: ClientMetrics,
}

impl std::fmt::Debug for BlobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobClient")
            .field("config", &self.config)
            .field("committee", &self.committee)
            .finish()
    }
}

impl BlobClient {
    pub fn new(
        config: ClientConfig,
        ledger: Arc<dyn LedgerApi>,
        nodes: Arc<dyn StorageNodeApi>,
        codec: Arc<dyn BlobCodec>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            committee: CommitteeView::new(Arc::clone(&ledger)),
            metrics: ClientMetrics::new()?,
            events: Arc::new(LoggingEventPublisher::new()),
            config,
            ledger,
            nodes,
            codec,
        })
    }

    /// Replace the default logging publisher.
    pub fn with_event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn committee_view(&self) -> &CommitteeView {
        &self.committee
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// Event delivery never fails an operation.
    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, "Failed to publish domain event");
        }
    }
}

// =============================================================================
// Fan-out helpers
// =============================================================================

/// Members in a random order where nodes holding more shards tend to come
/// first. Members without shards are left out.
fn weighted_order(nodes: &[StorageNode]) -> Vec<&StorageNode> {
    let eligible: Vec<&StorageNode> = nodes.iter().filter(|node| node.weight() > 0).collect();
    let mut rng = rand::thread_rng();
    match eligible.choose_multiple_weighted(&mut rng, eligible.len(), |node| node.weight() as f64) {
        Ok(order) => order.copied().collect(),
        Err(e) => {
            warn!(error = %e, "Weighted sampling failed, using uniform order");
            let mut order = eligible;
            order.shuffle(&mut rng);
            order
        }
    }
}

/// Failed shard weight per failure class. A node contributes its weight to
/// a class at most once.
#[derive(Debug)]
struct FailureTally {
    n_shards: u16,
    seen: HashMap<FailureClass, HashSet<usize>>,
    weights: HashMap<FailureClass, usize>,
}

impl FailureTally {
    fn new(n_shards: u16) -> Self {
        Self {
            n_shards,
            seen: HashMap::new(),
            weights: HashMap::new(),
        }
    }

    /// Record a failure and return the class weight afterwards.
    fn record(&mut self, node: &StorageNode, class: FailureClass) -> usize {
        let weight = self.weights.entry(class).or_insert(0);
        if self.seen.entry(class).or_default().insert(node.index) {
            *weight += node.weight();
        }
        *weight
    }

    fn weight(&self, class: FailureClass) -> usize {
        self.weights.get(&class).copied().unwrap_or(0)
    }

    fn is_quorum(&self, class: FailureClass) -> bool {
        is_quorum(self.weight(class), self.n_shards)
    }

    fn total(&self) -> usize {
        self.weights.values().sum()
    }

    /// Fatal read error once a class reaches quorum weight.
    fn read_abort(&self, blob_id: &BlobId) -> Option<Error> {
        if self.is_quorum(FailureClass::NotFound) {
            Some(Error::BlobDoesNotExist(*blob_id))
        } else if self.is_quorum(FailureClass::Blocked) {
            Some(Error::BlobBlocked(*blob_id))
        } else if self.is_quorum(FailureClass::Other) {
            Some(Error::ReadFailed {
                blob_id: *blob_id,
                reason: format!(
                    "{} shards failed with transport or protocol errors",
                    self.weight(FailureClass::Other)
                ),
            })
        } else {
            None
        }
    }
}
