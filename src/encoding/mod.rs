//! Encoding Parameters and Shard Layout
//!
//! Pure arithmetic shared by the read and write paths.
//!
//! # Components
//!
//! - **Sizing** (`sizing.rs`): fault bound, quorum checks, source symbol
//!   counts, encoded length and storage pricing
//! - **Routing** (`routing.rs`): per-blob rotation between sliver-pair and
//!   shard indices
//! - **Grouping** (`grouping.rs`): bundles sliver pairs by owning node
//!
//! # Usage
//!
//! ```rust,ignore
//! use slivernet::encoding::{is_quorum, primary_source_symbols, ShardRouter};
//!
//! let router = ShardRouter::new(&blob_id, committee.n_shards);
//! let shard = router.shard_index(SliverPairIndex(0));
//! ```

pub mod grouping;
pub mod routing;
pub mod sizing;

#[cfg(test)]
mod proptest;

pub use grouping::group_by_node;
pub use routing::{rotation_offset, to_pair_index, to_shard_index, ShardRouter};
pub use sizing::{
    decoding_safety_limit, encoded_blob_length, is_above_validity, is_quorum, max_faulty,
    min_correct, primary_sliver_size, primary_source_symbols, secondary_source_symbols,
    storage_cost, storage_units_from_size, symbol_size, BYTES_PER_UNIT_SIZE,
};
