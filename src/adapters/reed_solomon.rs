//! Reed-Solomon Blob Codec Adapter
//!
//! Implements the `BlobCodec` port with the `reed-solomon-erasure` crate.
//!
//! Primary slivers carry the blob split into `primary_source_symbols(n)`
//! data shards plus parity up to `n`; any that many primary slivers decode
//! the blob. Secondary slivers use `secondary_source_symbols(n)` data shards
//! over the same padded blob. Sliver lengths follow `primary_sliver_size`.
//!
//! Commitments are SHA-256:
//!
//! ```text
//! primary_hash[i]   = sha256(primary sliver i)
//! secondary_hash[i] = sha256(secondary sliver i)
//! root_hash         = sha256(primary_hash[0] || secondary_hash[0] || ...)
//! blob_id           = sha256(ENCODING_TAG || unencoded_length (le) || root_hash)
//! ```
//!
//! `galois_8` limits committees to 256 shards.

use bytes::Bytes;
use reed_solomon_erasure::galois_8::ReedSolomon;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::domain::ports::BlobCodec;
use crate::domain::types::{
    BlobId, BlobMetadata, EncodedBlob, Sliver, SliverPair, SliverPairIndex, SliverPairMetadata,
    SliverType, DIGEST_LEN,
};
use crate::encoding::sizing::{primary_source_symbols, secondary_source_symbols, symbol_size};
use crate::error::{Error, Result};

/// Domain separation byte mixed into every blob id.
const ENCODING_TAG: u8 = 0x01;

/// Largest committee the GF(2^8) code supports.
pub const MAX_SHARDS: u16 = 256;

/// Reference erasure codec for blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReedSolomonBlobCodec;

impl ReedSolomonBlobCodec {
    pub fn new() -> Self {
        Self
    }

    fn check_shards(n_shards: u16) -> Result<()> {
        if n_shards == 0 || n_shards > MAX_SHARDS {
            return Err(Error::Codec(format!(
                "unsupported shard count {} (1..={})",
                n_shards, MAX_SHARDS
            )));
        }
        Ok(())
    }

    /// Split `blob` into `data_shards` zero-padded chunks of `chunk_len`
    /// bytes and extend them with parity up to `n_shards`.
    fn encode_axis(
        blob: &[u8],
        data_shards: usize,
        n_shards: usize,
        chunk_len: usize,
    ) -> Result<Vec<Vec<u8>>> {
        let mut shards: Vec<Vec<u8>> = (0..data_shards)
            .map(|i| {
                let start = (i * chunk_len).min(blob.len());
                let end = ((i + 1) * chunk_len).min(blob.len());
                let mut shard = blob[start..end].to_vec();
                shard.resize(chunk_len, 0);
                shard
            })
            .collect();

        let parity_shards = n_shards - data_shards;
        if parity_shards == 0 {
            return Ok(shards);
        }

        shards.resize(n_shards, vec![0u8; chunk_len]);
        reed_solomon(data_shards, parity_shards)?
            .encode(&mut shards)
            .map_err(|e| Error::Codec(format!("Reed-Solomon encoding failed: {}", e)))?;
        Ok(shards)
    }

    fn commitments(pairs: &[SliverPair]) -> (Vec<SliverPairMetadata>, [u8; DIGEST_LEN]) {
        let hashes: Vec<SliverPairMetadata> = pairs
            .iter()
            .map(|pair| SliverPairMetadata {
                primary_hash: Sha256::digest(&pair.primary.data).into(),
                secondary_hash: Sha256::digest(&pair.secondary.data).into(),
            })
            .collect();

        let mut root = Sha256::new();
        for hash in &hashes {
            root.update(hash.primary_hash);
            root.update(hash.secondary_hash);
        }
        (hashes, root.finalize().into())
    }

    fn blob_id(unencoded_length: u64, root_hash: &[u8; DIGEST_LEN]) -> BlobId {
        let mut hasher = Sha256::new();
        hasher.update([ENCODING_TAG]);
        hasher.update(unencoded_length.to_le_bytes());
        hasher.update(root_hash);
        BlobId::new(hasher.finalize().into())
    }
}

fn reed_solomon(data_shards: usize, parity_shards: usize) -> Result<ReedSolomon> {
    ReedSolomon::new(data_shards, parity_shards)
        .map_err(|e| Error::Codec(format!("Failed to create Reed-Solomon codec: {}", e)))
}

impl BlobCodec for ReedSolomonBlobCodec {
    #[instrument(skip(self, blob), fields(blob_len = blob.len()))]
    fn encode(&self, n_shards: u16, blob: &[u8]) -> Result<EncodedBlob> {
        Self::check_shards(n_shards)?;
        let n = n_shards as usize;
        let primary_symbols = primary_source_symbols(n_shards);
        let secondary_symbols = secondary_source_symbols(n_shards);
        let symbol = symbol_size(blob.len() as u64, n_shards) as usize;

        let primary = Self::encode_axis(blob, primary_symbols, n, secondary_symbols * symbol)?;
        let secondary = Self::encode_axis(blob, secondary_symbols, n, primary_symbols * symbol)?;

        let sliver_pairs: Vec<SliverPair> = primary
            .into_iter()
            .zip(secondary)
            .enumerate()
            .map(|(i, (primary, secondary))| {
                let pair_index = SliverPairIndex(i as u16);
                SliverPair {
                    primary: Sliver {
                        pair_index,
                        sliver_type: SliverType::Primary,
                        data: Bytes::from(primary),
                    },
                    secondary: Sliver {
                        pair_index,
                        sliver_type: SliverType::Secondary,
                        data: Bytes::from(secondary),
                    },
                }
            })
            .collect();

        let (hashes, root_hash) = Self::commitments(&sliver_pairs);
        let blob_id = Self::blob_id(blob.len() as u64, &root_hash);

        debug!(
            %blob_id,
            n_shards,
            primary_symbols,
            secondary_symbols,
            symbol_size = symbol,
            "Encoded blob"
        );

        Ok(EncodedBlob {
            blob_id,
            root_hash,
            metadata: BlobMetadata {
                blob_id,
                unencoded_length: blob.len() as u64,
                hashes,
            },
            sliver_pairs,
        })
    }

    #[instrument(skip(self, slivers), fields(slivers = slivers.len()))]
    fn decode_primary(
        &self,
        n_shards: u16,
        unencoded_length: u64,
        slivers: &[Sliver],
    ) -> Result<Vec<u8>> {
        Self::check_shards(n_shards)?;
        let n = n_shards as usize;
        let required = primary_source_symbols(n_shards);
        let expected_len = secondary_source_symbols(n_shards)
            * symbol_size(unencoded_length, n_shards) as usize;

        let mut shards: Vec<Option<Vec<u8>>> = vec![None; n];
        let mut present = 0;
        for sliver in slivers {
            if sliver.sliver_type != SliverType::Primary {
                return Err(Error::Codec("only primary slivers can be decoded".into()));
            }
            let index = sliver.pair_index.0 as usize;
            if index >= n {
                return Err(Error::Codec(format!(
                    "sliver pair index {} out of range for {} shards",
                    index, n
                )));
            }
            if sliver.data.len() != expected_len {
                return Err(Error::Codec(format!(
                    "sliver {} has {} bytes, expected {}",
                    index,
                    sliver.data.len(),
                    expected_len
                )));
            }
            if shards[index].is_none() {
                shards[index] = Some(sliver.data.to_vec());
                present += 1;
            }
        }

        if present < required {
            return Err(Error::Codec(format!(
                "need {} primary slivers, have {}",
                required, present
            )));
        }

        if n > required {
            reed_solomon(required, n - required)?
                .reconstruct_data(&mut shards)
                .map_err(|e| Error::Codec(format!("Reed-Solomon decoding failed: {}", e)))?;
        }

        let mut blob = Vec::with_capacity(required * expected_len);
        for shard in shards.into_iter().take(required) {
            let shard = shard.ok_or_else(|| Error::Codec("data shard missing after decode".into()))?;
            blob.extend_from_slice(&shard);
        }
        blob.truncate(unencoded_length as usize);
        Ok(blob)
    }

    fn compute_metadata(&self, n_shards: u16, blob: &[u8]) -> Result<BlobMetadata> {
        Ok(self.encode(n_shards, blob)?.metadata)
    }

    fn verify_sliver(&self, metadata: &BlobMetadata, sliver: &Sliver) -> Result<()> {
        let n_shards = u16::try_from(metadata.hashes.len())
            .map_err(|_| Error::Codec(format!("{} pair hashes", metadata.hashes.len())))?;
        Self::check_shards(n_shards)?;
        let index = sliver.pair_index.0 as usize;
        let hashes = metadata.hashes.get(index).ok_or_else(|| {
            Error::Codec(format!(
                "sliver pair index {} out of range for {} shards",
                index, n_shards
            ))
        })?;

        // A primary sliver spans the secondary axis and vice versa.
        let symbol = symbol_size(metadata.unencoded_length, n_shards) as usize;
        let (expected_len, expected_hash) = match sliver.sliver_type {
            SliverType::Primary => (
                secondary_source_symbols(n_shards) * symbol,
                &hashes.primary_hash,
            ),
            SliverType::Secondary => (
                primary_source_symbols(n_shards) * symbol,
                &hashes.secondary_hash,
            ),
        };

        if sliver.data.len() != expected_len {
            return Err(Error::Codec(format!(
                "{} sliver {} has {} bytes, expected {}",
                sliver.sliver_type,
                index,
                sliver.data.len(),
                expected_len
            )));
        }
        let digest: [u8; DIGEST_LEN] = Sha256::digest(&sliver.data).into();
        if &digest != expected_hash {
            return Err(Error::Codec(format!(
                "{} sliver {} does not match its digest",
                sliver.sliver_type, index
            )));
        }
        Ok(())
    }
}
