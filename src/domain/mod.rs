//! Domain Layer
//!
//! Value objects, ports for external collaborators, and domain events.
//!
//! - **Types** (`types.rs`) - Identifiers, committee topology, slivers, attestations
//! - **Ports** (`ports.rs`) - Trait abstractions for the codec, storage nodes and ledger
//! - **Events** (`events.rs`) - Domain events for audit and observation
//!
//! # Usage
//!
//! ```ignore
//! use slivernet::domain::ports::{BlobCodec, LedgerApi, StorageNodeApi};
//!
//! let client = BlobClient::new(config, ledger, nodes, codec);
//! let bytes = client.read_blob(&blob_id, &CancellationToken::new()).await?;
//! ```

pub mod events;
pub mod ports;
pub mod types;

pub use events::DomainEvent;
pub use ports::{
    BlobCodec, CertifyBlobRequest, EventPublisher, ExtendBlobRequest, LedgerApi, NodeResult,
    RegisterBlobRequest, StorageNodeApi, TransactionDigest,
};
pub use types::{
    AggregatedCertificate, BlobId, BlobMetadata, BlobObject, BlobPersistence, BlobStatus,
    Committee, DeletableCounts, EncodedBlob, Epoch, EpochState, NodeId, ObjectId, ShardIndex,
    SignedStorageConfirmation, Sliver, SliverPair, SliverPairIndex, SliverPairMetadata,
    SliverType, SliversForNode, StakingState, StorageCost, StorageNode, StorageNodeInfo,
    SystemState,
};
