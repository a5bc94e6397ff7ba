//! HTTP Storage Node Adapter
//!
//! Implements the `StorageNodeApi` port over the storage nodes' REST surface.
//!
//! JSON responses are wrapped in a success envelope:
//!
//! ```json
//! { "success": { "code": 200, "data": { ... } } }
//! ```
//!
//! Slivers travel as raw `application/octet-stream` bodies. Status 404 maps
//! to [`NodeError::NotFound`] and 451 to [`NodeError::LegallyUnavailable`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::domain::ports::{NodeResult, StorageNodeApi};
use crate::domain::types::{
    BlobId, BlobMetadata, BlobStatus, ObjectId, SignedStorageConfirmation, Sliver,
    SliverPairIndex, SliverType, StorageNode,
};
use crate::error::{Error, NodeError, Result};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: Success<T>,
}

#[derive(Debug, Deserialize)]
struct Success<T> {
    data: T,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
enum ConfirmationResponse {
    Signed(SignedStorageConfirmation),
}

/// reqwest-based client for storage nodes.
#[derive(Debug, Clone)]
pub struct HttpStorageNodeClient {
    client: Client,
}

impl HttpStorageNodeClient {
    /// Create a client whose requests time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn blob_url(node: &StorageNode, blob_id: &BlobId, suffix: &str) -> String {
        format!("{}/v1/blobs/{}/{}", node.network_url(), blob_id, suffix)
    }

    fn sliver_url(
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: SliverPairIndex,
        sliver_type: SliverType,
    ) -> String {
        Self::blob_url(
            node,
            blob_id,
            &format!("slivers/{}/{}", pair_index, sliver_type.as_str()),
        )
    }

    async fn json<T: DeserializeOwned>(response: Response) -> NodeResult<T> {
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| NodeError::Other(format!("invalid response body: {}", e)))?;
        Ok(envelope.success.data)
    }
}

/// Map a status code to a node failure, keeping successes.
fn check_status(response: Response) -> NodeResult<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(NodeError::NotFound),
        StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => Err(NodeError::LegallyUnavailable),
        status => Err(NodeError::Other(format!("unexpected status {}", status))),
    }
}

/// Run a request until it completes or `cancel` fires.
async fn cancellable<T>(
    cancel: &CancellationToken,
    request: impl Future<Output = NodeResult<T>>,
) -> NodeResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(NodeError::Cancelled),
        result = request => result,
    }
}

fn transport(e: reqwest::Error) -> NodeError {
    if e.is_timeout() {
        NodeError::Other("request timed out".into())
    } else {
        NodeError::Other(e.to_string())
    }
}

#[async_trait]
impl StorageNodeApi for HttpStorageNodeClient {
    #[instrument(skip(self, node, cancel), fields(node = %node.name))]
    async fn get_blob_metadata(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> NodeResult<BlobMetadata> {
        let url = Self::blob_url(node, blob_id, "metadata");
        cancellable(cancel, async {
            let response = self.client.get(&url).send().await.map_err(transport)?;
            Self::json(check_status(response)?).await
        })
        .await
    }

    #[instrument(skip(self, node, cancel), fields(node = %node.name))]
    async fn get_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: SliverPairIndex,
        sliver_type: SliverType,
        cancel: &CancellationToken,
    ) -> NodeResult<Sliver> {
        let url = Self::sliver_url(node, blob_id, pair_index, sliver_type);
        cancellable(cancel, async {
            let response = self.client.get(&url).send().await.map_err(transport)?;
            let data = check_status(response)?.bytes().await.map_err(transport)?;
            debug!(bytes = data.len(), "Received sliver");
            Ok(Sliver {
                pair_index,
                sliver_type,
                data,
            })
        })
        .await
    }

    #[instrument(skip(self, node, metadata, cancel), fields(node = %node.name, blob_id = %metadata.blob_id))]
    async fn store_blob_metadata(
        &self,
        node: &StorageNode,
        metadata: &BlobMetadata,
        cancel: &CancellationToken,
    ) -> NodeResult<()> {
        let url = Self::blob_url(node, &metadata.blob_id, "metadata");
        cancellable(cancel, async {
            let response = self
                .client
                .put(&url)
                .json(metadata)
                .send()
                .await
                .map_err(transport)?;
            check_status(response).map(|_| ())
        })
        .await
    }

    #[instrument(skip(self, node, sliver, cancel), fields(node = %node.name, pair = %sliver.pair_index))]
    async fn store_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        sliver: &Sliver,
        cancel: &CancellationToken,
    ) -> NodeResult<()> {
        let url = Self::sliver_url(node, blob_id, sliver.pair_index, sliver.sliver_type);
        let body: Bytes = sliver.data.clone();
        cancellable(cancel, async {
            let response = self
                .client
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body)
                .send()
                .await
                .map_err(transport)?;
            check_status(response).map(|_| ())
        })
        .await
    }

    #[instrument(skip(self, node, cancel), fields(node = %node.name))]
    async fn get_blob_status(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> NodeResult<BlobStatus> {
        let url = Self::blob_url(node, blob_id, "status");
        cancellable(cancel, async {
            let response = self.client.get(&url).send().await.map_err(transport)?;
            Self::json(check_status(response)?).await
        })
        .await
    }

    #[instrument(skip(self, node, cancel), fields(node = %node.name))]
    async fn get_permanent_confirmation(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> NodeResult<SignedStorageConfirmation> {
        let url = Self::blob_url(node, blob_id, "confirmation/permanent");
        cancellable(cancel, async {
            let response = self.client.get(&url).send().await.map_err(transport)?;
            let ConfirmationResponse::Signed(confirmation) =
                Self::json(check_status(response)?).await?;
            Ok(confirmation)
        })
        .await
    }

    #[instrument(skip(self, node, cancel), fields(node = %node.name))]
    async fn get_deletable_confirmation(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        object_id: &ObjectId,
        cancel: &CancellationToken,
    ) -> NodeResult<SignedStorageConfirmation> {
        let url = Self::blob_url(
            node,
            blob_id,
            &format!("confirmation/deletable/{}", object_id),
        );
        cancellable(cancel, async {
            let response = self.client.get(&url).send().await.map_err(transport)?;
            let ConfirmationResponse::Signed(confirmation) =
                Self::json(check_status(response)?).await?;
            Ok(confirmation)
        })
        .await
    }
}
