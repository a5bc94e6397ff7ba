//! Static Ledger Adapter
//!
//! A read-only `LedgerApi` backed by a YAML snapshot of the ledger objects
//! the client needs. Useful for the CLI against a known committee and for
//! local testing. Transactions are rejected.
//!
//! ```yaml
//! staking:
//!   epoch: 12
//!   n_shards: 4
//!   epoch_state: epoch_change_done
//!   committee:
//!     - ["0x1", [0, 1]]
//!     - ["0x2", [2, 3]]
//! system:
//!   epoch: 12
//!   n_shards: 4
//!   storage_price_per_unit_size: 1000
//!   write_price_per_unit_size: 2000
//! nodes:
//!   - node_id: "0x1"
//!     name: alpha
//!     network_address: alpha.example:9185
//!     public_key: "a0b1..."
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::ports::{
    CertifyBlobRequest, ExtendBlobRequest, LedgerApi, RegisterBlobRequest, TransactionDigest,
};
use crate::domain::types::{
    BlobObject, NodeId, ObjectId, StakingState, StorageNodeInfo, SystemState,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
struct Snapshot {
    staking: StakingState,
    system: SystemState,
    nodes: Vec<StorageNodeInfo>,
    #[serde(default)]
    blobs: Vec<BlobObject>,
}

/// Ledger view loaded once from a file.
#[derive(Debug, Clone)]
pub struct StaticLedger {
    staking: StakingState,
    system: SystemState,
    nodes: HashMap<NodeId, StorageNodeInfo>,
    blobs: HashMap<ObjectId, BlobObject>,
}

impl StaticLedger {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid ledger snapshot: {}", e)))?;

        if snapshot.staking.n_shards != snapshot.system.n_shards {
            return Err(Error::Config(format!(
                "staking has {} shards but system has {}",
                snapshot.staking.n_shards, snapshot.system.n_shards
            )));
        }

        Ok(Self {
            staking: snapshot.staking,
            system: snapshot.system,
            nodes: snapshot
                .nodes
                .into_iter()
                .map(|node| (node.node_id, node))
                .collect(),
            blobs: snapshot
                .blobs
                .into_iter()
                .map(|blob| (blob.id, blob))
                .collect(),
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    fn read_only<T>(operation: &str) -> Result<T> {
        Err(Error::Ledger(format!(
            "{} requires a transaction; the static ledger is read-only",
            operation
        )))
    }
}

#[async_trait]
impl LedgerApi for StaticLedger {
    async fn staking_state(&self) -> Result<StakingState> {
        Ok(self.staking.clone())
    }

    async fn system_state(&self) -> Result<SystemState> {
        Ok(self.system)
    }

    async fn storage_nodes(&self, node_ids: &[NodeId]) -> Result<Vec<StorageNodeInfo>> {
        node_ids
            .iter()
            .map(|id| {
                self.nodes
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::Ledger(format!("staking pool {} not found", id)))
            })
            .collect()
    }

    async fn blob_object(&self, object_id: &ObjectId) -> Result<BlobObject> {
        self.blobs
            .get(object_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(format!("blob object {} not found", object_id)))
    }

    async fn register_blob(&self, _request: RegisterBlobRequest) -> Result<BlobObject> {
        Self::read_only("register_blob")
    }

    async fn certify_blob(&self, _request: CertifyBlobRequest) -> Result<TransactionDigest> {
        Self::read_only("certify_blob")
    }

    async fn delete_blob(
        &self,
        _sender: ObjectId,
        _blob_object_id: ObjectId,
    ) -> Result<TransactionDigest> {
        Self::read_only("delete_blob")
    }

    async fn extend_blob(&self, _request: ExtendBlobRequest) -> Result<TransactionDigest> {
        Self::read_only("extend_blob")
    }
}
