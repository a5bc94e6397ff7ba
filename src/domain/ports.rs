//! Domain Ports (Port/Adapter Pattern)
//!
//! The read, write and certification logic only talks to the outside world
//! through the traits in this module. Adapters implement them for concrete
//! backends (HTTP storage nodes, a ledger gateway, a Reed-Solomon codec).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        BlobClient                            │
//! │      read path │ write path │ certification │ retry          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Ports (Traits)                          │
//! │  BlobCodec │ StorageNodeApi │ LedgerApi │ EventPublisher     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every async operation that reaches a storage node takes a
//! [`CancellationToken`]; implementations must stop promptly once it fires.

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::events::DomainEvent;
use super::types::{
    AggregatedCertificate, BlobId, BlobMetadata, BlobObject, BlobStatus, EncodedBlob, NodeId,
    ObjectId, SignedStorageConfirmation, Sliver, SliverPairIndex, SliverType, StakingState,
    StorageNode, StorageNodeInfo, SystemState, DIGEST_LEN,
};
use crate::error::{NodeError, Result};

/// Result of a single storage node request.
pub type NodeResult<T> = std::result::Result<T, NodeError>;

// =============================================================================
// Blob Codec Port
// =============================================================================

/// Port for the erasure code.
///
/// The codec owns sliver layout, digest commitments and blob id derivation.
/// The client treats its output as opaque.
pub trait BlobCodec: Send + Sync {
    /// Encode a blob into one sliver pair per shard.
    fn encode(&self, n_shards: u16, blob: &[u8]) -> Result<EncodedBlob>;

    /// Decode a blob from at least `primary_source_symbols(n_shards)` primary slivers.
    fn decode_primary(
        &self,
        n_shards: u16,
        unencoded_length: u64,
        slivers: &[Sliver],
    ) -> Result<Vec<u8>>;

    /// Recompute metadata (and therefore the blob id) from raw bytes.
    fn compute_metadata(&self, n_shards: u16, blob: &[u8]) -> Result<BlobMetadata>;

    /// Check a sliver served by a node against the digest committed to in
    /// `metadata`.
    fn verify_sliver(&self, metadata: &BlobMetadata, sliver: &Sliver) -> Result<()>;
}

// =============================================================================
// Storage Node Port
// =============================================================================

/// Port for the storage node HTTP surface.
#[async_trait]
pub trait StorageNodeApi: Send + Sync {
    /// `GET /v1/blobs/{blobId}/metadata`
    async fn get_blob_metadata(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> NodeResult<BlobMetadata>;

    /// `GET /v1/blobs/{blobId}/slivers/{pairIndex}/{primary|secondary}`
    async fn get_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: SliverPairIndex,
        sliver_type: SliverType,
        cancel: &CancellationToken,
    ) -> NodeResult<Sliver>;

    /// `PUT /v1/blobs/{blobId}/metadata`
    async fn store_blob_metadata(
        &self,
        node: &StorageNode,
        metadata: &BlobMetadata,
        cancel: &CancellationToken,
    ) -> NodeResult<()>;

    /// `PUT /v1/blobs/{blobId}/slivers/{pairIndex}/{primary|secondary}`
    async fn store_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        sliver: &Sliver,
        cancel: &CancellationToken,
    ) -> NodeResult<()>;

    /// `GET /v1/blobs/{blobId}/status`
    async fn get_blob_status(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> NodeResult<BlobStatus>;

    /// `GET /v1/blobs/{blobId}/confirmation/permanent`
    async fn get_permanent_confirmation(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> NodeResult<SignedStorageConfirmation>;

    /// `GET /v1/blobs/{blobId}/confirmation/deletable/{objectId}`
    async fn get_deletable_confirmation(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        object_id: &ObjectId,
        cancel: &CancellationToken,
    ) -> NodeResult<SignedStorageConfirmation>;
}

// =============================================================================
// Ledger Port
// =============================================================================

/// Digest of an executed ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionDigest(pub String);

impl fmt::Display for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reserve space and register a blob in one transaction.
#[derive(Debug, Clone)]
pub struct RegisterBlobRequest {
    /// Address of the signer paying for the transaction
    pub sender: ObjectId,
    /// Address receiving the blob object
    pub owner: ObjectId,
    pub blob_id: BlobId,
    pub root_hash: [u8; DIGEST_LEN],
    pub size: u64,
    pub encoded_size: u64,
    pub epochs: u32,
    pub deletable: bool,
    pub storage_cost: u64,
    pub write_cost: u64,
}

/// Submit an aggregated certificate for a registered blob.
#[derive(Debug, Clone)]
pub struct CertifyBlobRequest {
    pub sender: ObjectId,
    pub blob_object_id: ObjectId,
    pub certificate: AggregatedCertificate,
}

/// Extend the storage period of a blob object.
#[derive(Debug, Clone)]
pub struct ExtendBlobRequest {
    pub sender: ObjectId,
    pub blob_object_id: ObjectId,
    pub epochs: u32,
    pub storage_cost: u64,
}

/// Port for ledger object reads and transaction submission.
///
/// Argument encoding and transaction construction live behind this trait.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Current staking object (epoch, epoch state, committees).
    async fn staking_state(&self) -> Result<StakingState>;

    /// Current system object (pricing, shard count).
    async fn system_state(&self) -> Result<SystemState>;

    /// Staking pool records for the given nodes, in the same order.
    async fn storage_nodes(&self, node_ids: &[NodeId]) -> Result<Vec<StorageNodeInfo>>;

    /// Load a blob object by id.
    async fn blob_object(&self, object_id: &ObjectId) -> Result<BlobObject>;

    /// Reserve storage and register the blob, returning the created object.
    async fn register_blob(&self, request: RegisterBlobRequest) -> Result<BlobObject>;

    /// Certify a registered blob.
    async fn certify_blob(&self, request: CertifyBlobRequest) -> Result<TransactionDigest>;

    /// Delete a deletable blob object.
    async fn delete_blob(
        &self,
        sender: ObjectId,
        blob_object_id: ObjectId,
    ) -> Result<TransactionDigest>;

    /// Extend a blob's storage period.
    async fn extend_blob(&self, request: ExtendBlobRequest) -> Result<TransactionDigest>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()>;
}
