//! Quorum Arithmetic and Encoding Sizes
//!
//! Byzantine fault thresholds and erasure-coding parameters derived from the
//! shard count. Every function here is pure and total.

use crate::domain::types::{StorageCost, SystemState, BLOB_ID_LEN, DIGEST_LEN};
use crate::error::{Error, Result};

/// Size of one storage unit used for pricing.
pub const BYTES_PER_UNIT_SIZE: u64 = 1024 * 1024;

/// Maximum number of faulty shards tolerated: `f = floor((n - 1) / 3)`.
pub fn max_faulty(n_shards: u16) -> usize {
    (n_shards as usize).saturating_sub(1) / 3
}

/// Minimum number of correct shards: `n - f`.
pub fn min_correct(n_shards: u16) -> usize {
    n_shards as usize - max_faulty(n_shards)
}

/// `weight > 2f`
pub fn is_quorum(weight: usize, n_shards: u16) -> bool {
    weight > 2 * max_faulty(n_shards)
}

/// `weight > f`
pub fn is_above_validity(weight: usize, n_shards: u16) -> bool {
    weight > max_faulty(n_shards)
}

/// Extra decoding margin that widens as the committee grows.
pub fn decoding_safety_limit(n_shards: u16) -> usize {
    match n_shards {
        0..=15 => 0,
        16..=30 => 1,
        31..=45 => 2,
        46..=60 => 3,
        61..=75 => 4,
        _ => 5,
    }
}

/// Number of primary source symbols, i.e. primary slivers needed to decode.
pub fn primary_source_symbols(n_shards: u16) -> usize {
    (min_correct(n_shards) - max_faulty(n_shards)).saturating_sub(decoding_safety_limit(n_shards))
}

/// Number of secondary source symbols.
pub fn secondary_source_symbols(n_shards: u16) -> usize {
    min_correct(n_shards).saturating_sub(decoding_safety_limit(n_shards))
}

/// Symbol size for a blob of `unencoded_length` bytes.
pub fn symbol_size(unencoded_length: u64, n_shards: u16) -> u64 {
    let source_symbols =
        (primary_source_symbols(n_shards) * secondary_source_symbols(n_shards)).max(1) as u64;
    (unencoded_length.max(1) - 1) / source_symbols + 1
}

/// Length in bytes of one primary sliver.
pub fn primary_sliver_size(unencoded_length: u64, n_shards: u16) -> u64 {
    secondary_source_symbols(n_shards) as u64 * symbol_size(unencoded_length, n_shards)
}

/// Total bytes stored across the committee for a blob, metadata included.
///
/// Every node keeps a full copy of the metadata (two digests per shard plus
/// the blob id), and each shard holds one primary and one secondary sliver.
pub fn encoded_blob_length(unencoded_length: u64, n_shards: u16) -> u64 {
    let n = n_shards as u64;
    let primary = primary_source_symbols(n_shards) as u64;
    let secondary = secondary_source_symbols(n_shards) as u64;

    let slivers_size = (primary + secondary) * symbol_size(unencoded_length, n_shards) * n;
    let metadata = n * DIGEST_LEN as u64 * 2 + BLOB_ID_LEN as u64;
    n * metadata + slivers_size
}

/// Number of storage units needed for `size` bytes.
pub fn storage_units_from_size(size: u64) -> u64 {
    size.div_ceil(BYTES_PER_UNIT_SIZE)
}

/// Storage and write cost for a blob of `unencoded_length` bytes kept for `epochs`.
pub fn storage_cost(unencoded_length: u64, epochs: u32, system: &SystemState) -> Result<StorageCost> {
    let encoded = encoded_blob_length(unencoded_length, system.n_shards);
    let units = storage_units_from_size(encoded);
    let overflow = || Error::Internal(format!("storage cost overflow for {} units", units));

    let storage_cost = units
        .checked_mul(system.storage_price_per_unit_size)
        .and_then(|cost| cost.checked_mul(epochs as u64))
        .ok_or_else(overflow)?;
    let write_cost = units
        .checked_mul(system.write_price_per_unit_size)
        .ok_or_else(overflow)?;
    let total_cost = storage_cost.checked_add(write_cost).ok_or_else(overflow)?;

    Ok(StorageCost {
        storage_cost,
        write_cost,
        total_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_thresholds_exhaustive() {
        for n in 1u16..=100 {
            let f = ((n - 1) / 3) as usize;
            assert_eq!(max_faulty(n), f);
            for weight in 0..=(n as usize) {
                assert_eq!(is_quorum(weight, n), weight > 2 * f, "n={} w={}", n, weight);
                assert_eq!(is_above_validity(weight, n), weight > f, "n={} w={}", n, weight);
            }
        }
    }

    #[test]
    fn test_primary_symbols_boundaries() {
        let expected = [
            (15u16, 7usize),
            (16, 5),
            (30, 11),
            (31, 9),
            (45, 15),
            (46, 13),
            (60, 19),
            (61, 17),
            (75, 23),
            (76, 21),
        ];
        for (n, primary) in expected {
            assert_eq!(primary_source_symbols(n), primary, "n={}", n);
        }
    }

    #[test]
    fn test_secondary_symbols() {
        assert_eq!(secondary_source_symbols(7), 5);
        assert_eq!(secondary_source_symbols(15), 11);
        assert_eq!(secondary_source_symbols(16), 10);
        assert_eq!(secondary_source_symbols(100), 62);
        assert_eq!(primary_source_symbols(100), 29);
    }

    #[test]
    fn test_safety_limit_steps() {
        assert_eq!(decoding_safety_limit(1), 0);
        assert_eq!(decoding_safety_limit(15), 0);
        assert_eq!(decoding_safety_limit(16), 1);
        assert_eq!(decoding_safety_limit(45), 2);
        assert_eq!(decoding_safety_limit(60), 3);
        assert_eq!(decoding_safety_limit(75), 4);
        assert_eq!(decoding_safety_limit(76), 5);
        assert_eq!(decoding_safety_limit(1000), 5);
    }

    #[test]
    fn test_encoded_length_small_committee() {
        // n=7: primary 3, secondary 5, symbol size 1 for tiny blobs.
        // metadata per node = 7*64+32 = 480, slivers = 8*1*7 = 56
        assert_eq!(encoded_blob_length(0, 7), 7 * 480 + 56);
        assert_eq!(encoded_blob_length(1, 7), 7 * 480 + 56);
        assert_eq!(encoded_blob_length(15, 7), 7 * 480 + 56);
        assert_eq!(encoded_blob_length(16, 7), 7 * 480 + 2 * 56);
    }

    #[test]
    fn test_encoded_length_monotonic() {
        for n in [7u16, 16, 100] {
            let mut previous = 0;
            for len in (0..5000u64).step_by(7) {
                let current = encoded_blob_length(len, n);
                assert!(current >= previous, "n={} len={}", n, len);
                previous = current;
            }
        }
    }

    #[test]
    fn test_storage_units() {
        assert_eq!(storage_units_from_size(0), 0);
        assert_eq!(storage_units_from_size(1), 1);
        assert_eq!(storage_units_from_size(BYTES_PER_UNIT_SIZE), 1);
        assert_eq!(storage_units_from_size(BYTES_PER_UNIT_SIZE + 1), 2);
    }

    #[test]
    fn test_storage_cost() {
        let system = SystemState {
            epoch: 1,
            n_shards: 7,
            storage_price_per_unit_size: 100,
            write_price_per_unit_size: 20,
        };
        let cost = storage_cost(10, 5, &system).unwrap();

        // encoded length is under one unit
        assert_eq!(cost.storage_cost, 500);
        assert_eq!(cost.write_cost, 20);
        assert_eq!(cost.total_cost, 520);
    }

    #[test]
    fn test_storage_cost_overflow() {
        let system = SystemState {
            epoch: 1,
            n_shards: 7,
            storage_price_per_unit_size: u64::MAX,
            write_price_per_unit_size: 1,
        };
        assert!(matches!(
            storage_cost(10, 2, &system),
            Err(Error::Internal(_))
        ));
    }
}
