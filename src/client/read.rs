//! Read Path
//!
//! ```text
//! certification epoch ──▶ read committee ──▶ metadata (any node)
//!        │
//!        ▼
//! weighted candidates (node, shard) ──▶ fan-out of `primary_source_symbols`
//!        │   failure: classify, tally per class, replace with next candidate
//!        ▼
//! decode ──▶ recompute blob id ──▶ bytes
//! ```
//!
//! Nodes are untrusted individually. Each sliver is checked against the
//! metadata digests before it counts; a bad one is a failed request like any
//! other. Metadata comes from whichever node answers first and is only
//! vouched for by the final blob id check.

use std::future::Future;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{weighted_order, BlobClient, FailureTally};
use crate::domain::events::DomainEvent;
use crate::domain::ports::{NodeResult, StorageNodeApi};
use crate::domain::types::{
    BlobId, BlobMetadata, Committee, Sliver, SliverPairIndex, SliverType, StorageNode,
};
use crate::encoding::routing::ShardRouter;
use crate::encoding::sizing::{primary_sliver_size, primary_source_symbols};
use crate::error::{Error, FailureClass, NodeError, Result};
use crate::pool::{with_timeout, TaskPool};

impl BlobClient {
    /// Read and verify a blob.
    ///
    /// Epoch-relative failures are retried once with a fresh committee view.
    /// The configured operation timeout covers both attempts.
    #[instrument(skip(self, cancel))]
    pub async fn read_blob(&self, blob_id: &BlobId, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let timeout = self.config.operation_timeout()?;
        let result = with_timeout(timeout, cancel, |token| async move {
            self.with_epoch_retry(blob_id, || self.read_blob_once(blob_id, &token))
                .await
        })
        .await;

        self.metrics.record_read(&result);
        result
    }

    /// Metadata of a blob as served by the committee responsible for it.
    #[instrument(skip(self, cancel))]
    pub async fn get_blob_metadata(
        &self,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> Result<BlobMetadata> {
        self.with_epoch_retry(blob_id, || async move {
            let epoch = self.certification_epoch(blob_id, cancel).await?;
            let committee = self.committee.read_committee(epoch).await?;
            self.fetch_metadata(&committee, blob_id, cancel).await
        })
        .await
    }

    async fn read_blob_once(&self, blob_id: &BlobId, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let started = Instant::now();

        let epoch = self.certification_epoch(blob_id, cancel).await?;
        let committee = self.committee.read_committee(epoch).await?;
        let metadata = self.fetch_metadata(&committee, blob_id, cancel).await?;
        let (slivers, failed_requests) =
            self.fetch_primary_slivers(&committee, &metadata, cancel).await?;

        let blob =
            self.codec
                .decode_primary(committee.n_shards, metadata.unencoded_length, &slivers)?;

        let recomputed = self.codec.compute_metadata(committee.n_shards, &blob)?;
        if recomputed.blob_id != *blob_id {
            warn!(%blob_id, actual = %recomputed.blob_id, "Decoded blob does not match its id");
            return Err(Error::DecodingVerification {
                expected: *blob_id,
                actual: recomputed.blob_id,
            });
        }

        info!(
            %blob_id,
            size = blob.len(),
            epoch = committee.epoch,
            slivers = slivers.len(),
            failed_requests,
            "Blob read"
        );
        self.publish(DomainEvent::blob_read(
            *blob_id,
            blob.len() as u64,
            slivers.len(),
            failed_requests,
            started.elapsed(),
        ))
        .await;

        Ok(blob)
    }

    /// Ask members one at a time, heavier members first on average, until
    /// one returns metadata for `blob_id`.
    async fn fetch_metadata(
        &self,
        committee: &Committee,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> Result<BlobMetadata> {
        let mut failures = FailureTally::new(committee.n_shards);

        for node in weighted_order(&committee.nodes) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let error = match self.nodes.get_blob_metadata(node, blob_id, cancel).await {
                Ok(metadata)
                    if metadata.blob_id == *blob_id
                        && metadata.hashes.len() == committee.n_shards as usize =>
                {
                    debug!(node = %node.name, "Received blob metadata");
                    return Ok(metadata);
                }
                Ok(metadata) => NodeError::Other(format!(
                    "metadata for {} with {} pair hashes",
                    metadata.blob_id,
                    metadata.hashes.len()
                )),
                Err(_) if cancel.is_cancelled() => return Err(Error::Cancelled),
                Err(e) => e,
            };

            debug!(node = %node.name, error = %error, "Metadata request failed");
            failures.record(node, error.class());
            if failures.is_quorum(FailureClass::NotFound) {
                return Err(Error::BlobDoesNotExist(*blob_id));
            }
            if failures.is_quorum(FailureClass::Blocked) {
                return Err(Error::BlobBlocked(*blob_id));
            }
        }

        Err(Error::NoBlobMetadataReceived(*blob_id))
    }

    /// Collect `primary_source_symbols` primary slivers.
    ///
    /// Returns the slivers and the number of failed requests.
    async fn fetch_primary_slivers(
        &self,
        committee: &Committee,
        metadata: &BlobMetadata,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Sliver>, usize)> {
        let blob_id = &metadata.blob_id;
        let n_shards = committee.n_shards;
        let required = primary_source_symbols(n_shards);
        let router = ShardRouter::new(blob_id, n_shards);
        let sliver_size = primary_sliver_size(metadata.unencoded_length, n_shards);
        let pool = TaskPool::new(self.config.sliver_read_concurrency(sliver_size), cancel);

        let mut candidates = weighted_order(&committee.nodes)
            .into_iter()
            .flat_map(move |node| {
                node.shard_indices
                    .iter()
                    .map(move |shard| (node, router.pair_index(*shard)))
            });

        debug!(
            required,
            concurrency = pool.capacity(),
            sliver_size,
            "Fetching primary slivers"
        );

        let nodes = self.nodes.as_ref();
        let mut in_flight: FuturesUnordered<_> = candidates
            .by_ref()
            .take(required)
            .map(|(node, pair)| request_sliver(nodes, &pool, node, blob_id, pair))
            .collect();

        let mut slivers = Vec::with_capacity(required);
        let mut failures = FailureTally::new(n_shards);
        let mut failed_requests = 0;

        while let Some((node, pair, result)) = in_flight.next().await {
            let error = match result {
                Ok(Ok(sliver))
                    if sliver.pair_index == pair && sliver.sliver_type == SliverType::Primary =>
                {
                    match self.codec.verify_sliver(metadata, &sliver) {
                        Ok(()) => {
                            slivers.push(sliver);
                            if slivers.len() >= required {
                                pool.cancel_all();
                                break;
                            }
                            continue;
                        }
                        Err(e) => NodeError::Other(e.to_string()),
                    }
                }
                Ok(Ok(sliver)) => NodeError::Other(format!(
                    "asked for primary sliver {}, got {} sliver {}",
                    pair, sliver.sliver_type, sliver.pair_index
                )),
                Ok(Err(e)) => e,
                Err(e) => NodeError::Other(e.to_string()),
            };

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let class = error.class();
            failed_requests += 1;
            debug!(node = %node.name, %pair, error = %error, "Sliver request failed");
            self.metrics.record_sliver_failure(class);
            failures.record(node, class);

            if let Some(abort) = failures.read_abort(blob_id) {
                warn!(%blob_id, error = %abort, "Aborting read");
                pool.cancel_all();
                return Err(abort);
            }

            if let Some((node, pair)) = candidates.next() {
                in_flight.push(request_sliver(nodes, &pool, node, blob_id, pair));
            }
        }

        if slivers.len() < required {
            return Err(Error::NotEnoughSliversReceived {
                blob_id: *blob_id,
                received: slivers.len(),
                required,
            });
        }

        Ok((slivers, failed_requests))
    }
}

fn request_sliver<'a>(
    nodes: &'a dyn StorageNodeApi,
    pool: &'a TaskPool,
    node: &'a StorageNode,
    blob_id: &'a BlobId,
    pair: SliverPairIndex,
) -> impl Future<Output = (&'a StorageNode, SliverPairIndex, Result<NodeResult<Sliver>>)> + 'a {
    let request = pool.submit(nodes.get_sliver(
        node,
        blob_id,
        pair,
        SliverType::Primary,
        pool.token(),
    ));
    async move { (node, pair, request.await) }
}
