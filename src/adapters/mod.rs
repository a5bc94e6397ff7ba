//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  BlobCodec │ StorageNodeApi │ LedgerApi │ EventPublisher   │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ ReedSolomonBlobCodec │ HttpStorageNodeClient │ StaticLedger │ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector             │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use slivernet::adapters::{HttpStorageNodeClient, ReedSolomonBlobCodec, StaticLedger};
//!
//! let ledger = Arc::new(StaticLedger::from_yaml_file("ledger.yaml")?);
//! let nodes = Arc::new(HttpStorageNodeClient::new(Duration::from_secs(30))?);
//! let client = BlobClient::new(config, ledger, nodes, Arc::new(ReedSolomonBlobCodec::new()))?;
//! ```

mod event_publisher;
mod http_node;
mod reed_solomon;
mod static_ledger;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use http_node::HttpStorageNodeClient;
pub use reed_solomon::{ReedSolomonBlobCodec, MAX_SHARDS};
pub use static_ledger::StaticLedger;
