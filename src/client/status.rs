//! Verified Blob Status
//!
//! A single node's view of a blob cannot be trusted. Statuses are collected
//! from the committee until a quorum of shards has answered, and only a
//! status backed by more than `f` shards is accepted.

use std::collections::HashMap;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{BlobClient, FailureTally};
use crate::domain::types::{BlobId, BlobStatus, Epoch};
use crate::encoding::sizing::{is_above_validity, is_quorum};
use crate::error::{Error, FailureClass, Result};
use crate::pool::TaskPool;

impl BlobClient {
    /// Blob status confirmed by enough shards of the current committee.
    #[instrument(skip(self, cancel))]
    pub async fn get_verified_blob_status(
        &self,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> Result<BlobStatus> {
        let committee = self.committee.current().await?;
        let n_shards = committee.n_shards;
        let pool = TaskPool::new(self.config.status_concurrency, cancel);

        let mut requests: FuturesUnordered<_> = committee
            .nodes
            .iter()
            .filter(|node| node.weight() > 0)
            .map(|node| {
                let request = pool.submit(self.nodes.get_blob_status(node, blob_id, pool.token()));
                async move { (node, request.await) }
            })
            .collect();

        let mut responses: Vec<(BlobStatus, usize)> = Vec::new();
        let mut success_weight = 0;
        let mut failures = FailureTally::new(n_shards);

        while let Some((node, result)) = requests.next().await {
            match result {
                Ok(Ok(status)) => {
                    success_weight += node.weight();
                    responses.push((status, node.weight()));
                    if is_quorum(success_weight, n_shards) {
                        pool.cancel_all();
                        break;
                    }
                }
                Ok(Err(e)) => {
                    debug!(node = %node.name, error = %e, "Status request failed");
                    failures.record(node, e.class());
                    if failures.is_quorum(FailureClass::NotFound) {
                        pool.cancel_all();
                        return Err(Error::BlobNotCertified {
                            blob_id: *blob_id,
                            reason: "a quorum of shards does not know the blob".into(),
                        });
                    }
                }
                Err(_) if cancel.is_cancelled() => return Err(Error::Cancelled),
                Err(_) => {}
            }
        }
        drop(requests);

        if !is_quorum(success_weight, n_shards) {
            warn!(%blob_id, success_weight, n_shards, "Status quorum not reached");
            return Err(Error::BlobNotCertified {
                blob_id: *blob_id,
                reason: format!(
                    "only {} of {} shards reported a status",
                    success_weight, n_shards
                ),
            });
        }

        select_status(&responses, n_shards).ok_or_else(|| Error::BlobNotCertified {
            blob_id: *blob_id,
            reason: "no status is confirmed by enough shards".into(),
        })
    }

    /// Epoch the blob was certified in, as far as reads are concerned.
    ///
    /// Outside of an epoch change every certified blob is served by the
    /// current committee, so the nodes are only asked while shards migrate.
    #[instrument(skip(self, cancel))]
    pub async fn certification_epoch(
        &self,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> Result<Epoch> {
        let staking = self.committee.staking_state().await?;
        if !staking.is_transitioning() {
            return Ok(staking.epoch);
        }

        let status = self.get_verified_blob_status(blob_id, cancel).await?;
        let certified = match status {
            BlobStatus::Nonexistent | BlobStatus::Invalid => {
                return Err(Error::BlobNotCertified {
                    blob_id: *blob_id,
                    reason: "blob is nonexistent or invalid".into(),
                })
            }
            status => status.initial_certified_epoch().ok_or_else(|| {
                Error::BlobNotCertified {
                    blob_id: *blob_id,
                    reason: "blob is registered but not certified".into(),
                }
            })?,
        };

        if certified > staking.epoch {
            return Err(Error::BehindCurrentEpoch {
                current: staking.epoch,
                certified,
            });
        }

        Ok(certified)
    }
}

/// Most advanced status whose cumulative weight is above validity.
fn select_status(responses: &[(BlobStatus, usize)], n_shards: u16) -> Option<BlobStatus> {
    let mut weights: HashMap<BlobStatus, usize> = HashMap::new();
    for (status, weight) in responses {
        *weights.entry(*status).or_insert(0) += weight;
    }

    weights
        .into_iter()
        .filter(|(_, weight)| is_above_validity(*weight, n_shards))
        .max_by_key(|(status, weight)| (status.priority(), *weight))
        .map(|(status, _)| status)
}
