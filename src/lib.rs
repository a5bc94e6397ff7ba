//! SliverNet - Erasure-Coded Blob Storage Client
//!
//! Reads, writes and certifies blobs on a network of storage nodes that each
//! own a subset of shards for the current epoch. Blobs are split into
//! primary and secondary slivers, one pair per shard; any quorum-sized set of
//! primary slivers reconstructs the blob.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         BlobClient                            │
//! │   read (retry once) │ write + certify │ status │ lifecycle    │
//! └──────────────────────────────────────────────────────────────┘
//!         │                   │                    │
//!         ▼                   ▼                    ▼
//!   CommitteeView         TaskPool            encoding
//!   (ledger cache)    (bounded fan-out)  (quorum math, routing)
//!         │                   │
//!         ▼                   ▼
//!     LedgerApi         StorageNodeApi           BlobCodec
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Implementations of the domain ports (HTTP nodes,
//!   Reed-Solomon codec, static ledger, event publishers)
//! - [`client`] - Read, write, certification and retry logic
//! - [`committee`] - Cached committee view with whole-cache invalidation
//! - [`config`] - Client configuration
//! - [`domain`] - Value objects, ports and events
//! - [`encoding`] - Quorum math, sizing and shard routing
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus counters
//! - [`pool`] - Bounded cancellable task pool and timeouts

pub mod adapters;
pub mod client;
pub mod committee;
pub mod config;
pub mod domain;
pub mod encoding;
pub mod error;
pub mod metrics;
pub mod pool;

pub use client::{BlobClient, BlobExtension, WriteBlobOptions, WriteBlobResult};
pub use committee::CommitteeView;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use pool::{with_timeout, TaskPool};
