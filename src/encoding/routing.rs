//! Shard Routing
//!
//! Maps sliver-pair indices to shard indices by rotating with a per-blob
//! offset, so that no node structurally owns pair 0 for every blob.
//!
//! ```text
//! offset     = big-endian(blob_id) mod n
//! shard      = (pair + offset) mod n
//! pair       = (n + shard - offset) mod n
//! ```

use crate::domain::types::{BlobId, ShardIndex, SliverPairIndex};

/// Big-endian value of `bytes` reduced modulo `modulus`, folded byte by byte
/// so arbitrarily long identifiers never overflow.
pub fn rotation_offset(bytes: &[u8], modulus: u16) -> u16 {
    if modulus == 0 {
        return 0;
    }
    let modulus = modulus as u32;
    bytes
        .iter()
        .fold(0u32, |acc, byte| (acc * 256 + *byte as u32) % modulus) as u16
}

/// Bijective pair/shard mapping for one blob and shard count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    n_shards: u16,
    offset: u16,
}

impl ShardRouter {
    /// `n_shards` must be non-zero; committees with zero shards are rejected
    /// before any routing happens.
    pub fn new(blob_id: &BlobId, n_shards: u16) -> Self {
        debug_assert!(n_shards > 0, "routing requires at least one shard");
        Self {
            n_shards,
            offset: rotation_offset(blob_id.as_bytes(), n_shards),
        }
    }

    pub fn n_shards(&self) -> u16 {
        self.n_shards
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    pub fn shard_index(&self, pair: SliverPairIndex) -> ShardIndex {
        let n = self.n_shards as u32;
        ShardIndex(((pair.0 as u32 + self.offset as u32) % n) as u16)
    }

    pub fn pair_index(&self, shard: ShardIndex) -> SliverPairIndex {
        let n = self.n_shards as u32;
        SliverPairIndex(((n + shard.0 as u32 - self.offset as u32) % n) as u16)
    }
}

/// Shard holding sliver pair `pair` of `blob_id`.
pub fn to_shard_index(pair: SliverPairIndex, blob_id: &BlobId, n_shards: u16) -> ShardIndex {
    ShardRouter::new(blob_id, n_shards).shard_index(pair)
}

/// Sliver pair stored on shard `shard` for `blob_id`.
pub fn to_pair_index(shard: ShardIndex, blob_id: &BlobId, n_shards: u16) -> SliverPairIndex {
    ShardRouter::new(blob_id, n_shards).pair_index(shard)
}
