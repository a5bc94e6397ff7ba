//! Epoch Retry
//!
//! Errors that can stem from a stale committee view get exactly one more
//! attempt after the whole view is dropped. There is no backoff: refetching
//! the ledger state either fixes the staleness or it does not.

use std::future::Future;

use tracing::warn;

use super::BlobClient;
use crate::domain::events::DomainEvent;
use crate::domain::types::BlobId;
use crate::error::Result;

impl BlobClient {
    /// Run `operation`, and run it once more after invalidating the
    /// committee view if the first attempt failed with an epoch-relative
    /// error. The second outcome is returned as is.
    pub async fn with_epoch_retry<T, F, Fut>(&self, blob_id: &BlobId, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match operation().await {
            Err(e) if e.is_epoch_transient() => {
                warn!(%blob_id, error = %e, "Possible epoch change, retrying with a fresh committee view");
                self.committee.invalidate_all();
                self.metrics.record_epoch_retry();
                self.publish(DomainEvent::committee_invalidated(e.to_string()))
                    .await;
                self.publish(DomainEvent::read_retried(*blob_id, e.to_string()))
                    .await;
                operation().await
            }
            result => result,
        }
    }
}
