//! Sliver Distribution
//!
//! Groups the sliver pairs of an encoded blob by the committee member that
//! owns each pair's shard.

use crate::domain::types::{BlobId, Committee, SliverPair, SliversForNode};
use crate::encoding::routing::ShardRouter;
use crate::error::{Error, Result};

/// Produce one bundle per committee member, in member order.
///
/// Members owning no shard for this call still get an (empty) bundle so
/// bundle `i` always belongs to member `i`.
pub fn group_by_node(
    committee: &Committee,
    blob_id: &BlobId,
    sliver_pairs: Vec<SliverPair>,
) -> Result<Vec<SliversForNode>> {
    let router = ShardRouter::new(blob_id, committee.n_shards);
    let mut bundles = vec![SliversForNode::default(); committee.len()];

    for pair in sliver_pairs {
        let shard = router.shard_index(pair.index());
        let node = committee.node_for_shard(shard).ok_or_else(|| {
            Error::InvalidCommittee(format!("no node owns shard {}", shard))
        })?;

        let bundle = &mut bundles[node.index];
        bundle.primary.push(pair.primary);
        bundle.secondary.push(pair.secondary);
    }

    Ok(bundles)
}
