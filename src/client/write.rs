//! Write Path
//!
//! ```text
//! encode ──▶ group by node ──▶ register (ledger)
//!                                   │
//!            ┌──────────────────────┼──────────────────────┐
//!            ▼                      ▼                      ▼
//!     metadata, slivers,     metadata, slivers,     metadata, slivers,
//!     confirmation           confirmation           confirmation
//!            └──────────────────────┼──────────────────────┘
//!                                   ▼
//!                 failed weight <= f ? certify : abort
//! ```

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::BlobClient;
use crate::domain::events::DomainEvent;
use crate::domain::ports::{NodeResult, RegisterBlobRequest, TransactionDigest};
use crate::domain::types::{
    BlobId, BlobMetadata, BlobObject, BlobPersistence, Committee, ObjectId,
    SignedStorageConfirmation, SliversForNode, StorageNode,
};
use crate::encoding::grouping::group_by_node;
use crate::encoding::sizing::{encoded_blob_length, max_faulty, storage_cost};
use crate::error::{Error, Result};
use crate::pool::{with_timeout, TaskPool};

/// Parameters of a blob write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBlobOptions {
    /// Number of epochs to store the blob for
    pub epochs: u32,
    /// Register a deletable blob object
    pub deletable: bool,
    /// Address paying for the transactions
    pub sender: ObjectId,
    /// Address receiving the blob object
    pub owner: ObjectId,
}

impl WriteBlobOptions {
    /// Permanent blob owned by `sender`.
    pub fn new(sender: ObjectId, epochs: u32) -> Self {
        Self {
            epochs,
            deletable: false,
            sender,
            owner: sender,
        }
    }

    pub fn deletable(mut self, deletable: bool) -> Self {
        self.deletable = deletable;
        self
    }

    pub fn owner(mut self, owner: ObjectId) -> Self {
        self.owner = owner;
        self
    }
}

/// Outcome of a certified write.
#[derive(Debug, Clone)]
pub struct WriteBlobResult {
    pub blob_id: BlobId,
    pub blob_object: BlobObject,
    pub digest: TransactionDigest,
    /// Shard weight of members that did not confirm
    pub failed_weight: usize,
}

impl BlobClient {
    /// Encode, register, distribute and certify a blob.
    #[instrument(skip(self, blob, cancel), fields(size = blob.len(), epochs = options.epochs))]
    pub async fn write_blob(
        &self,
        blob: &[u8],
        options: &WriteBlobOptions,
        cancel: &CancellationToken,
    ) -> Result<WriteBlobResult> {
        let timeout = self.config.operation_timeout()?;
        let result = with_timeout(timeout, cancel, |token| async move {
            self.write_blob_inner(blob, options, &token).await
        })
        .await;

        self.metrics.record_write(&result);
        result
    }

    async fn write_blob_inner(
        &self,
        blob: &[u8],
        options: &WriteBlobOptions,
        cancel: &CancellationToken,
    ) -> Result<WriteBlobResult> {
        if options.epochs == 0 {
            return Err(Error::Config("a blob must be stored for at least one epoch".into()));
        }

        let started = Instant::now();
        let snapshot = self.committee.snapshot().await?;
        let committee = Arc::clone(&snapshot.current);
        let n_shards = committee.n_shards;
        let size = blob.len() as u64;

        let encoded = self.codec.encode(n_shards, blob)?;
        let blob_id = encoded.blob_id;
        let bundles = group_by_node(&committee, &blob_id, encoded.sliver_pairs)?;
        let metadata = encoded.metadata;
        let cost = storage_cost(size, options.epochs, &snapshot.system)?;
        let encoded_size = encoded_blob_length(size, n_shards);

        let registered = self
            .ledger
            .register_blob(RegisterBlobRequest {
                sender: options.sender,
                owner: options.owner,
                blob_id,
                root_hash: encoded.root_hash,
                size,
                encoded_size,
                epochs: options.epochs,
                deletable: options.deletable,
                storage_cost: cost.storage_cost,
                write_cost: cost.write_cost,
            })
            .await?;

        info!(%blob_id, object = %registered.id, total_cost = cost.total_cost, "Blob registered");
        self.publish(DomainEvent::blob_registered(
            blob_id,
            registered.id,
            encoded_size,
            cost.storage_cost,
            cost.write_cost,
        ))
        .await;

        let persistence = if options.deletable {
            BlobPersistence::Deletable(registered.id)
        } else {
            BlobPersistence::Permanent
        };

        let (confirmations, failed_weight) = self
            .store_on_committee(&committee, &metadata, &bundles, &persistence, cancel)
            .await?;

        let digest = self
            .certify_blob(
                options.sender,
                registered.id,
                &committee,
                &blob_id,
                &persistence,
                &confirmations,
            )
            .await?;

        let blob_object = self.ledger.blob_object(&registered.id).await?;

        info!(%blob_id, failed_weight, "Blob written");
        self.publish(DomainEvent::blob_written(
            blob_id,
            blob_object.id,
            size,
            failed_weight,
            started.elapsed(),
        ))
        .await;

        Ok(WriteBlobResult {
            blob_id,
            blob_object,
            digest,
            failed_weight,
        })
    }

    /// Run one store pipeline per member and collect the confirmations in
    /// member order. Fails as soon as the failed weight exceeds `f`.
    ///
    /// Members without shards only receive the metadata.
    async fn store_on_committee(
        &self,
        committee: &Committee,
        metadata: &BlobMetadata,
        bundles: &[SliversForNode],
        persistence: &BlobPersistence,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Option<SignedStorageConfirmation>>, usize)> {
        let blob_id = metadata.blob_id;
        let max_faulty = max_faulty(committee.n_shards);
        let capacity = self
            .config
            .max_concurrent_node_writes
            .unwrap_or(committee.len());
        let pool = TaskPool::new(capacity, cancel);

        let mut pipelines: FuturesUnordered<_> = committee
            .nodes
            .iter()
            .zip(bundles)
            .map(|(node, bundle)| {
                let pipeline =
                    pool.submit(self.store_on_node(node, metadata, bundle, persistence, pool.token()));
                async move { (node, pipeline.await) }
            })
            .collect();

        let mut confirmations = vec![None; committee.len()];
        let mut failed_weight = 0;

        while let Some((node, result)) = pipelines.next().await {
            let reason = match result {
                Ok(Ok(confirmation)) => {
                    confirmations[node.index] = confirmation;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            failed_weight += node.weight();
            warn!(node = %node.name, weight = node.weight(), failed_weight, error = %reason, "Node write failed");
            self.publish(DomainEvent::node_write_failed(
                blob_id,
                node.index,
                node.weight(),
                reason,
            ))
            .await;

            if failed_weight > max_faulty {
                pool.cancel_all();
                return Err(Error::TooManyWriteFailures {
                    blob_id,
                    failed_weight,
                    max_faulty,
                });
            }
        }

        Ok((confirmations, failed_weight))
    }

    /// Metadata first, then every sliver, then the signed confirmation.
    async fn store_on_node(
        &self,
        node: &StorageNode,
        metadata: &BlobMetadata,
        bundle: &SliversForNode,
        persistence: &BlobPersistence,
        cancel: &CancellationToken,
    ) -> NodeResult<Option<SignedStorageConfirmation>> {
        let blob_id = &metadata.blob_id;
        self.nodes.store_blob_metadata(node, metadata, cancel).await?;
        if node.weight() == 0 {
            debug!(node = %node.name, "Stored metadata on member without shards");
            return Ok(None);
        }

        let mut stores: FuturesUnordered<_> = bundle
            .primary
            .iter()
            .chain(&bundle.secondary)
            .map(|sliver| self.nodes.store_sliver(node, blob_id, sliver, cancel))
            .collect();
        while let Some(result) = stores.next().await {
            result?;
        }
        debug!(node = %node.name, slivers = bundle.len(), "Stored slivers");

        let confirmation = match persistence {
            BlobPersistence::Permanent => {
                self.nodes
                    .get_permanent_confirmation(node, blob_id, cancel)
                    .await?
            }
            BlobPersistence::Deletable(object_id) => {
                self.nodes
                    .get_deletable_confirmation(node, blob_id, object_id, cancel)
                    .await?
            }
        };
        Ok(Some(confirmation))
    }
}
