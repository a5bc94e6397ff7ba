//! Committee View
//!
//! Resolves committee membership and shard assignment from ledger state and
//! caches the result per client instance.
//!
//! # Cache States
//!
//! ```text
//!            snapshot()                  population done
//!   Empty ──────────────▶ Populating ───────────────────▶ Ready
//!     ▲                        │                            │
//!     └────────────────────────┴──── invalidate_all() ──────┘
//! ```
//!
//! Concurrent callers that arrive while the cache is populating await the
//! same shared future. A population that completes after `invalidate_all`
//! is handed to its waiters but never stored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::domain::ports::LedgerApi;
use crate::domain::types::{
    Committee, Epoch, NodeId, ShardAssignment, ShardIndex, StakingState, StorageNode,
    StorageNodeInfo, SystemState,
};
use crate::error::{Error, Result};

/// Ledger state resolved for one epoch.
#[derive(Debug, Clone)]
pub struct CommitteeSnapshot {
    pub staking: StakingState,
    pub system: SystemState,
    pub current: Arc<Committee>,
    /// Only present while the previous epoch's assignment is still recorded.
    pub previous: Option<Arc<Committee>>,
}

impl CommitteeSnapshot {
    pub fn epoch(&self) -> Epoch {
        self.staking.epoch
    }
}

type PopulateFuture = Shared<BoxFuture<'static, Result<Arc<CommitteeSnapshot>>>>;

enum CacheState {
    Empty,
    Populating(PopulateFuture),
    Ready(Arc<CommitteeSnapshot>),
}

/// Lazily populated, wholesale-invalidated view of the storage committee.
pub struct CommitteeView {
    ledger: Arc<dyn LedgerApi>,
    state: Mutex<CacheState>,
    invalidations: AtomicU64,
}

impl std::fmt::Debug for CommitteeView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock() {
            CacheState::Empty => "empty",
            CacheState::Populating(_) => "populating",
            CacheState::Ready(_) => "ready",
        };
        f.debug_struct("CommitteeView")
            .field("state", &state)
            .field("invalidations", &self.invalidations())
            .finish()
    }
}

impl CommitteeView {
    pub fn new(ledger: Arc<dyn LedgerApi>) -> Self {
        Self {
            ledger,
            state: Mutex::new(CacheState::Empty),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Cached snapshot, populating it from the ledger if needed.
    pub async fn snapshot(&self) -> Result<Arc<CommitteeSnapshot>> {
        let population = {
            let mut state = self.state.lock();
            match &*state {
                CacheState::Ready(snapshot) => return Ok(Arc::clone(snapshot)),
                CacheState::Populating(future) => future.clone(),
                CacheState::Empty => {
                    debug!("Populating committee view");
                    let future = fetch_snapshot(Arc::clone(&self.ledger)).boxed().shared();
                    *state = CacheState::Populating(future.clone());
                    future
                }
            }
        };

        let result = population.clone().await;

        let mut state = self.state.lock();
        let still_current =
            matches!(&*state, CacheState::Populating(future) if future.ptr_eq(&population));
        if still_current {
            *state = match &result {
                Ok(snapshot) => CacheState::Ready(Arc::clone(snapshot)),
                Err(_) => CacheState::Empty,
            };
        }

        result
    }

    /// Committee of the current epoch.
    pub async fn current(&self) -> Result<Arc<Committee>> {
        Ok(Arc::clone(&self.snapshot().await?.current))
    }

    /// Committee to read a blob from, given the epoch it was certified in.
    ///
    /// While the ledger is transitioning, blobs certified before the current
    /// epoch are still served by the previous committee.
    pub async fn read_committee(&self, certification_epoch: Epoch) -> Result<Arc<Committee>> {
        let snapshot = self.snapshot().await?;
        match &snapshot.previous {
            Some(previous)
                if snapshot.staking.is_transitioning()
                    && certification_epoch < snapshot.epoch() =>
            {
                debug!(
                    certification_epoch,
                    current_epoch = snapshot.epoch(),
                    "Reading from previous committee"
                );
                Ok(Arc::clone(previous))
            }
            _ => Ok(Arc::clone(&snapshot.current)),
        }
    }

    pub async fn staking_state(&self) -> Result<StakingState> {
        Ok(self.snapshot().await?.staking.clone())
    }

    pub async fn system_state(&self) -> Result<SystemState> {
        Ok(self.snapshot().await?.system)
    }

    /// Drop everything cached. The next access refetches from the ledger.
    pub fn invalidate_all(&self) {
        *self.state.lock() = CacheState::Empty;
        let count = self.invalidations.fetch_add(1, Ordering::SeqCst) + 1;
        info!(invalidations = count, "Committee view invalidated");
    }

    /// Number of times the cache has been invalidated.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[instrument(skip(ledger))]
async fn fetch_snapshot(ledger: Arc<dyn LedgerApi>) -> Result<Arc<CommitteeSnapshot>> {
    let (staking, system) = futures::try_join!(ledger.staking_state(), ledger.system_state())?;

    let mut node_ids: Vec<NodeId> = staking.committee.iter().map(|(id, _)| *id).collect();
    for (id, _) in &staking.previous_committee {
        if !node_ids.contains(id) {
            node_ids.push(*id);
        }
    }

    let infos = ledger.storage_nodes(&node_ids).await?;
    if infos.len() != node_ids.len() {
        return Err(Error::Ledger(format!(
            "requested {} staking pools, received {}",
            node_ids.len(),
            infos.len()
        )));
    }
    let infos: HashMap<NodeId, StorageNodeInfo> =
        infos.into_iter().map(|info| (info.node_id, info)).collect();

    let current = build_committee(staking.epoch, staking.n_shards, &staking.committee, &infos)?;
    let previous = if staking.previous_committee.is_empty() {
        None
    } else {
        Some(Arc::new(build_committee(
            staking.epoch.saturating_sub(1),
            staking.n_shards,
            &staking.previous_committee,
            &infos,
        )?))
    };

    info!(
        epoch = staking.epoch,
        members = current.len(),
        n_shards = staking.n_shards,
        transitioning = staking.is_transitioning(),
        "Committee view populated"
    );

    Ok(Arc::new(CommitteeSnapshot {
        staking,
        system,
        current: Arc::new(current),
        previous,
    }))
}

/// Join a ledger shard assignment with staking pool records.
pub fn build_committee(
    epoch: Epoch,
    n_shards: u16,
    assignment: &ShardAssignment,
    infos: &HashMap<NodeId, StorageNodeInfo>,
) -> Result<Committee> {
    let nodes = assignment
        .iter()
        .enumerate()
        .map(|(index, (node_id, shards))| {
            let info = infos
                .get(node_id)
                .ok_or_else(|| Error::Ledger(format!("no staking pool for node {}", node_id)))?;
            Ok(StorageNode {
                index,
                id: *node_id,
                name: info.name.clone(),
                network_address: info.network_address.clone(),
                public_key: info.public_key.clone(),
                shard_indices: shards.iter().copied().map(ShardIndex).collect(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Committee::new(epoch, n_shards, nodes)
}
