//! Blob Lifecycle
//!
//! Pricing, deletion and extension of blob objects on the ledger.

use tracing::{info, instrument};

use super::BlobClient;
use crate::domain::ports::{ExtendBlobRequest, TransactionDigest};
use crate::domain::types::{BlobObject, Epoch, ObjectId, StorageCost};
use crate::encoding::sizing::storage_cost;
use crate::error::{Error, Result};

/// How far to extend a blob's storage period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobExtension {
    /// Add a number of epochs to the current end epoch
    Epochs(u32),
    /// Move the end epoch to the given epoch
    EndEpoch(Epoch),
}

impl BlobExtension {
    /// Epochs to pay for, given the blob's current end epoch.
    fn additional_epochs(&self, current_end: Epoch) -> u32 {
        match self {
            BlobExtension::Epochs(epochs) => *epochs,
            BlobExtension::EndEpoch(end) => end.saturating_sub(current_end),
        }
    }
}

impl BlobClient {
    /// Price of storing `size` unencoded bytes for `epochs` at current rates.
    pub async fn storage_cost(&self, size: u64, epochs: u32) -> Result<StorageCost> {
        let system = self.committee.system_state().await?;
        storage_cost(size, epochs, &system)
    }

    pub async fn blob_object(&self, blob_object_id: &ObjectId) -> Result<BlobObject> {
        self.ledger.blob_object(blob_object_id).await
    }

    /// Delete a deletable blob object.
    #[instrument(skip(self))]
    pub async fn delete_blob(
        &self,
        sender: ObjectId,
        blob_object_id: ObjectId,
    ) -> Result<TransactionDigest> {
        let blob = self.ledger.blob_object(&blob_object_id).await?;
        if !blob.deletable {
            return Err(Error::BlobNotDeletable(blob_object_id));
        }

        let digest = self.ledger.delete_blob(sender, blob_object_id).await?;
        info!(blob_id = %blob.blob_id, %digest, "Blob deleted");
        Ok(digest)
    }

    /// Extend the storage period of a blob object.
    ///
    /// Returns `None` without a transaction when the extension adds no epochs.
    #[instrument(skip(self))]
    pub async fn extend_blob(
        &self,
        sender: ObjectId,
        blob_object_id: ObjectId,
        extension: BlobExtension,
    ) -> Result<Option<TransactionDigest>> {
        let blob = self.ledger.blob_object(&blob_object_id).await?;
        let epochs = extension.additional_epochs(blob.end_epoch);
        if epochs == 0 {
            return Ok(None);
        }

        let cost = self.storage_cost(blob.size, epochs).await?;
        let digest = self
            .ledger
            .extend_blob(ExtendBlobRequest {
                sender,
                blob_object_id,
                epochs,
                storage_cost: cost.storage_cost,
            })
            .await?;

        info!(
            blob_id = %blob.blob_id,
            end_epoch = blob.end_epoch + epochs,
            %digest,
            "Blob extended"
        );
        Ok(Some(digest))
    }
}
