//! Property-Based Tests for Routing and Quorum Arithmetic
//!
//! # Test Properties
//!
//! 1. **Bijection**: pair -> shard -> pair is the identity for any blob id
//! 2. **Monotonicity**: encoded length never shrinks as the blob grows
//! 3. **Thresholds**: quorum implies validity, and `f` shards alone are never a quorum

#![cfg(test)]

use proptest::prelude::*;

use super::routing::ShardRouter;
use super::sizing::{
    encoded_blob_length, is_above_validity, is_quorum, max_faulty, primary_source_symbols,
    secondary_source_symbols,
};
use crate::domain::types::{BlobId, ShardIndex, SliverPairIndex};

// =============================================================================
// Property Strategies
// =============================================================================

fn blob_id_strategy() -> impl Strategy<Value = BlobId> {
    prop::array::uniform32(any::<u8>()).prop_map(BlobId::new)
}

fn shard_count_strategy() -> impl Strategy<Value = u16> {
    1u16..=1000
}

// =============================================================================
// Routing Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: routing a pair to its shard and back yields the same pair.
    #[test]
    fn prop_routing_roundtrip(
        blob_id in blob_id_strategy(),
        n in shard_count_strategy(),
        raw_pair in any::<u16>(),
    ) {
        let router = ShardRouter::new(&blob_id, n);
        let pair = SliverPairIndex(raw_pair % n);
        let shard = router.shard_index(pair);

        prop_assert!(shard.0 < n);
        prop_assert_eq!(router.pair_index(shard), pair);
    }

    /// Property: the inverse direction also round-trips.
    #[test]
    fn prop_routing_inverse_roundtrip(
        blob_id in blob_id_strategy(),
        n in shard_count_strategy(),
        raw_shard in any::<u16>(),
    ) {
        let router = ShardRouter::new(&blob_id, n);
        let shard = ShardIndex(raw_shard % n);

        prop_assert_eq!(router.shard_index(router.pair_index(shard)), shard);
    }
}

// =============================================================================
// Sizing Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: encoded length is non-decreasing in the unencoded length.
    #[test]
    fn prop_encoded_length_monotonic(
        n in 4u16..=300,
        len in 0u64..50_000_000,
        delta in 0u64..1_000_000,
    ) {
        prop_assert!(encoded_blob_length(len, n) <= encoded_blob_length(len + delta, n));
    }

    /// Property: there are always at least as many secondary as primary symbols,
    /// and decoding never needs more than `n - 2f` slivers.
    #[test]
    fn prop_symbol_counts(n in shard_count_strategy()) {
        let f = max_faulty(n);
        prop_assert!(primary_source_symbols(n) <= secondary_source_symbols(n));
        prop_assert!(primary_source_symbols(n) <= n as usize - 2 * f);
        prop_assert!(primary_source_symbols(n) >= 1);
    }

    /// Property: a quorum is always above validity, and `f` alone is neither.
    #[test]
    fn prop_threshold_relations(n in shard_count_strategy(), weight in 0usize..2000) {
        if is_quorum(weight, n) {
            prop_assert!(is_above_validity(weight, n));
        }
        prop_assert!(!is_above_validity(max_faulty(n), n));
        prop_assert!(is_quorum(n as usize - max_faulty(n), n));
    }
}
