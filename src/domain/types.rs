//! Domain Value Objects
//!
//! Identifiers, committee topology, slivers, metadata and attestation
//! material shared by the read and write paths.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Committee generation.
pub type Epoch = u32;

/// Length of a blob identifier in bytes.
pub const BLOB_ID_LEN: usize = 32;

/// Length of a sliver digest in bytes.
pub const DIGEST_LEN: usize = 32;

// =============================================================================
// Identifiers
// =============================================================================

/// 256-bit content-derived blob identifier.
///
/// Rendered as unpadded URL-safe base64. The raw bytes are interpreted as a
/// big-endian integer for shard routing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId(pub [u8; BLOB_ID_LEN]);

impl BlobId {
    pub fn new(bytes: [u8; BLOB_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; BLOB_ID_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidBlobId(format!(
                "expected {} bytes, got {}",
                BLOB_ID_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; BLOB_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self)
    }
}

impl FromStr for BlobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| Error::InvalidBlobId(format!("{}: {}", s, e)))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for BlobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for BlobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; BLOB_ID_LEN]>::deserialize(deserializer).map(BlobId)
        }
    }
}

/// Ledger object identifier (32-byte address, rendered as `0x`-prefixed hex).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub [u8; 32]);

impl ObjectId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self)
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(format!("{:0>64}", trimmed))
            .map_err(|e| Error::Config(format!("invalid object id {}: {}", s, e)))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Config(format!("object id {} is longer than 32 bytes", s)))?;
        Ok(Self(array))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(ObjectId)
        }
    }
}

/// Storage node identifier on the ledger.
pub type NodeId = ObjectId;

/// Index of a shard in `[0, n_shards)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardIndex(pub u16);

impl fmt::Display for ShardIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a sliver pair in `[0, n_shards)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SliverPairIndex(pub u16);

impl fmt::Display for SliverPairIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Slivers and Metadata
// =============================================================================

/// Which half of a sliver pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliverType {
    Primary,
    Secondary,
}

impl SliverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SliverType::Primary => "primary",
            SliverType::Secondary => "secondary",
        }
    }
}

impl fmt::Display for SliverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An erasure-coded fragment, opaque outside of the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sliver {
    pub pair_index: SliverPairIndex,
    pub sliver_type: SliverType,
    pub data: Bytes,
}

/// Primary and secondary sliver for one shard of one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliverPair {
    pub primary: Sliver,
    pub secondary: Sliver,
}

impl SliverPair {
    pub fn index(&self) -> SliverPairIndex {
        self.primary.pair_index
    }
}

/// Digest commitments for one sliver pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliverPairMetadata {
    #[serde(with = "hex_digest")]
    pub primary_hash: [u8; DIGEST_LEN],
    #[serde(with = "hex_digest")]
    pub secondary_hash: [u8; DIGEST_LEN],
}

/// Per-pair digests plus the unencoded length, required for decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub blob_id: BlobId,
    pub unencoded_length: u64,
    pub hashes: Vec<SliverPairMetadata>,
}

/// Output of encoding a blob.
#[derive(Debug, Clone)]
pub struct EncodedBlob {
    pub blob_id: BlobId,
    pub root_hash: [u8; DIGEST_LEN],
    pub metadata: BlobMetadata,
    pub sliver_pairs: Vec<SliverPair>,
}

/// Slivers destined for one committee member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliversForNode {
    pub primary: Vec<Sliver>,
    pub secondary: Vec<Sliver>,
}

impl SliversForNode {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }
}

// =============================================================================
// Committee
// =============================================================================

/// A committee member and the shards it owns in the committee's epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNode {
    /// Position of the member in the committee (signer bitmap index)
    pub index: usize,
    pub id: NodeId,
    pub name: String,
    pub network_address: String,
    /// Compressed BLS12-381 G1 public key (min-pk)
    pub public_key: Vec<u8>,
    pub shard_indices: Vec<ShardIndex>,
}

impl StorageNode {
    pub fn network_url(&self) -> String {
        if self.network_address.starts_with("http://") || self.network_address.starts_with("https://")
        {
            self.network_address.clone()
        } else {
            format!("https://{}", self.network_address)
        }
    }

    /// Shard weight of the node.
    pub fn weight(&self) -> usize {
        self.shard_indices.len()
    }
}

/// Committee membership and shard assignment for one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committee {
    pub epoch: Epoch,
    pub n_shards: u16,
    pub nodes: Vec<StorageNode>,
    by_shard: Vec<usize>,
}

impl Committee {
    /// Build a committee, checking that every shard has exactly one owner.
    pub fn new(epoch: Epoch, n_shards: u16, nodes: Vec<StorageNode>) -> Result<Self> {
        if n_shards == 0 {
            return Err(Error::InvalidCommittee("n_shards must be positive".into()));
        }

        let mut by_shard = vec![usize::MAX; n_shards as usize];
        for (position, node) in nodes.iter().enumerate() {
            if node.index != position {
                return Err(Error::InvalidCommittee(format!(
                    "node {} has index {} at position {}",
                    node.id, node.index, position
                )));
            }
            for shard in &node.shard_indices {
                let slot = by_shard.get_mut(shard.0 as usize).ok_or_else(|| {
                    Error::InvalidCommittee(format!(
                        "shard {} out of range for {} shards",
                        shard, n_shards
                    ))
                })?;
                if *slot != usize::MAX {
                    return Err(Error::InvalidCommittee(format!(
                        "shard {} assigned more than once",
                        shard
                    )));
                }
                *slot = position;
            }
        }

        if let Some(orphan) = by_shard.iter().position(|owner| *owner == usize::MAX) {
            return Err(Error::InvalidCommittee(format!(
                "shard {} has no owner",
                orphan
            )));
        }

        Ok(Self {
            epoch,
            n_shards,
            nodes,
            by_shard,
        })
    }

    pub fn node_for_shard(&self, shard: ShardIndex) -> Option<&StorageNode> {
        self.by_shard
            .get(shard.0 as usize)
            .and_then(|position| self.nodes.get(*position))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// =============================================================================
// Ledger State
// =============================================================================

/// Phase of the staking contract's epoch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochState {
    /// Nodes are migrating shards from the previous committee.
    EpochChangeSync,
    /// Shard migration finished for the current epoch.
    EpochChangeDone,
    /// Parameters for the next epoch are selected.
    NextParamsSelected,
}

/// Shard assignment as recorded on the ledger, in committee order.
pub type ShardAssignment = Vec<(NodeId, Vec<u16>)>;

/// Staking object contents relevant to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingState {
    pub epoch: Epoch,
    pub n_shards: u16,
    pub epoch_state: EpochState,
    pub committee: ShardAssignment,
    #[serde(default)]
    pub previous_committee: ShardAssignment,
}

impl StakingState {
    pub fn is_transitioning(&self) -> bool {
        self.epoch_state == EpochState::EpochChangeSync
    }
}

/// System object contents relevant to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub epoch: Epoch,
    pub n_shards: u16,
    pub storage_price_per_unit_size: u64,
    pub write_price_per_unit_size: u64,
}

/// Staking-pool node record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNodeInfo {
    pub node_id: NodeId,
    pub name: String,
    pub network_address: String,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

/// On-chain blob object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobObject {
    pub id: ObjectId,
    pub blob_id: BlobId,
    pub size: u64,
    pub encoded_size: u64,
    pub registered_epoch: Epoch,
    pub certified_epoch: Option<Epoch>,
    pub end_epoch: Epoch,
    pub deletable: bool,
}

/// Cost of storing a blob, in the smallest unit of the payment coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageCost {
    pub storage_cost: u64,
    pub write_cost: u64,
    pub total_cost: u64,
}

// =============================================================================
// Blob Status
// =============================================================================

/// Counts of deletable blob objects for a blob id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletableCounts {
    pub count_deletable_total: u32,
    pub count_deletable_certified: u32,
}

/// Status of a blob as reported by a storage node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlobStatus {
    Nonexistent,
    Invalid,
    #[serde(rename_all = "camelCase")]
    Permanent {
        end_epoch: Epoch,
        is_certified: bool,
        initial_certified_epoch: Option<Epoch>,
        #[serde(default)]
        deletable_counts: DeletableCounts,
    },
    #[serde(rename_all = "camelCase")]
    Deletable {
        initial_certified_epoch: Option<Epoch>,
        #[serde(default)]
        deletable_counts: DeletableCounts,
    },
}

impl BlobStatus {
    /// Ordering used when several statuses are above validity: the most
    /// advanced status wins.
    pub fn priority(&self) -> u8 {
        match self {
            BlobStatus::Nonexistent => 0,
            BlobStatus::Deletable { .. } => 1,
            BlobStatus::Permanent { .. } => 2,
            BlobStatus::Invalid => 3,
        }
    }

    pub fn initial_certified_epoch(&self) -> Option<Epoch> {
        match self {
            BlobStatus::Permanent {
                initial_certified_epoch,
                ..
            }
            | BlobStatus::Deletable {
                initial_certified_epoch,
                ..
            } => *initial_certified_epoch,
            BlobStatus::Nonexistent | BlobStatus::Invalid => None,
        }
    }
}

// =============================================================================
// Attestations
// =============================================================================

/// Kind of blob a confirmation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobPersistence {
    Permanent,
    Deletable(ObjectId),
}

/// A node's signed attestation that it stores a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedStorageConfirmation {
    #[serde(with = "base64_bytes")]
    pub serialized_message: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// Aggregate signature plus the committee members that contributed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedCertificate {
    pub signature: Vec<u8>,
    pub signers: Vec<usize>,
    pub bitmap: Vec<u8>,
    pub serialized_message: Vec<u8>,
}

// =============================================================================
// Serde helpers
// =============================================================================

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        hex::decode(encoded.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

mod hex_digest {
    use super::*;

    pub fn serialize<S: Serializer>(
        bytes: &[u8; DIGEST_LEN],
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<[u8; DIGEST_LEN], D::Error> {
        let encoded = String::deserialize(d)?;
        let bytes = hex::decode(encoded).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("digest must be 32 bytes"))
    }
}
