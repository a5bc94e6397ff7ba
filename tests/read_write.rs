//! End-to-end tests of the blob client against a simulated committee.
//!
//! `Network` plays both the storage nodes and the ledger. Every node holds a
//! real BLS key, stores what it is sent, signs confirmations over the
//! canonical message, and can be switched into a failure mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use blst::min_pk::{PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use slivernet::adapters::{InMemoryEventCollector, ReedSolomonBlobCodec};
use slivernet::client::{confirmation_message, BLS_DST};
use slivernet::domain::ports::{
    CertifyBlobRequest, ExtendBlobRequest, LedgerApi, NodeResult, RegisterBlobRequest,
    StorageNodeApi, TransactionDigest,
};
use slivernet::domain::types::{
    BlobId, BlobMetadata, BlobObject, BlobPersistence, BlobStatus, DeletableCounts, EpochState,
    NodeId, ObjectId, ShardAssignment, SignedStorageConfirmation, Sliver, SliverPairIndex,
    SliverType, StakingState, StorageNode, StorageNodeInfo, SystemState,
};
use slivernet::encoding::{max_faulty, storage_cost};
use slivernet::error::{FailureClass, NodeError};
use slivernet::{BlobClient, BlobExtension, ClientConfig, Error, WriteBlobOptions};

// =============================================================================
// Simulated network
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Honest,
    /// Every request fails at the transport level
    Unreachable,
    /// Serves metadata but has lost its slivers
    LostSlivers,
    /// Serves metadata but refuses slivers for legal reasons
    BlockedSlivers,
    /// Serves slivers with flipped bytes
    Corrupt,
    /// Serves flipped slivers together with metadata committing to them
    Forged,
    /// Sliver requests never complete until cancelled
    Stalled,
    /// Signs confirmations with a key that is not its own
    BadSignature,
}

struct SimNode {
    key: SecretKey,
    info: StorageNodeInfo,
    behavior: Mutex<Behavior>,
    metadata: Mutex<HashMap<BlobId, BlobMetadata>>,
    slivers: Mutex<HashMap<(BlobId, SliverPairIndex, SliverType), Sliver>>,
}

struct Network {
    nodes: HashMap<NodeId, SimNode>,
    staking: Mutex<StakingState>,
    pending_staking: Mutex<Option<StakingState>>,
    system: SystemState,
    statuses: Mutex<HashMap<BlobId, BlobStatus>>,
    blobs: Mutex<HashMap<ObjectId, BlobObject>>,
    certificates: Mutex<Vec<CertifyBlobRequest>>,
    extensions: Mutex<Vec<ExtendBlobRequest>>,
    transactions: AtomicU64,
}

const EPOCH: u32 = 5;

fn node_id(index: usize) -> NodeId {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&(index as u64 + 1).to_be_bytes());
    ObjectId::new(bytes)
}

/// One shard per node; node `i` owns shard `(i + rotate) % n`.
fn assignment(n: usize, rotate: usize) -> ShardAssignment {
    (0..n)
        .map(|i| (node_id(i), vec![((i + rotate) % n) as u16]))
        .collect()
}

fn secret_key(seed: u64) -> SecretKey {
    let mut ikm = [7u8; 32];
    ikm[..8].copy_from_slice(&seed.to_le_bytes());
    SecretKey::key_gen(&ikm, &[]).unwrap()
}

fn sender() -> ObjectId {
    ObjectId::new([0xAA; 32])
}

fn random_blob(size: usize, seed: u64) -> Vec<u8> {
    let mut blob = vec![0u8; size];
    StdRng::seed_from_u64(seed).fill_bytes(&mut blob);
    blob
}

fn flipped(mut sliver: Sliver) -> Sliver {
    sliver.data = sliver.data.iter().map(|b| b ^ 0xFF).collect::<Vec<u8>>().into();
    sliver
}

impl Network {
    fn new(n: usize) -> Arc<Self> {
        Self::with_idle_members(n, 0)
    }

    /// `n` single-shard members followed by `idle` members without shards.
    fn with_idle_members(n: usize, idle: usize) -> Arc<Self> {
        let mut committee = assignment(n, 0);
        committee.extend((n..n + idle).map(|i| (node_id(i), Vec::new())));

        let nodes = (0..n + idle)
            .map(|i| {
                let key = secret_key(i as u64);
                let info = StorageNodeInfo {
                    node_id: node_id(i),
                    name: format!("node-{}", i),
                    network_address: format!("node-{}.sim:9185", i),
                    public_key: key.sk_to_pk().compress().to_vec(),
                };
                let node = SimNode {
                    key,
                    info,
                    behavior: Mutex::new(Behavior::Honest),
                    metadata: Mutex::new(HashMap::new()),
                    slivers: Mutex::new(HashMap::new()),
                };
                (node_id(i), node)
            })
            .collect();

        Arc::new(Self {
            nodes,
            staking: Mutex::new(StakingState {
                epoch: EPOCH,
                n_shards: n as u16,
                epoch_state: EpochState::EpochChangeDone,
                committee,
                previous_committee: Vec::new(),
            }),
            pending_staking: Mutex::new(None),
            system: SystemState {
                epoch: EPOCH,
                n_shards: n as u16,
                storage_price_per_unit_size: 1_000,
                write_price_per_unit_size: 2_000,
            },
            statuses: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            certificates: Mutex::new(Vec::new()),
            extensions: Mutex::new(Vec::new()),
            transactions: AtomicU64::new(0),
        })
    }

    fn client(self: &Arc<Self>) -> (BlobClient, Arc<InMemoryEventCollector>) {
        self.client_with(ClientConfig::default())
    }

    fn client_with(self: &Arc<Self>, config: ClientConfig) -> (BlobClient, Arc<InMemoryEventCollector>) {
        let events = Arc::new(InMemoryEventCollector::new());
        let client = BlobClient::new(
            config,
            self.clone(),
            self.clone(),
            Arc::new(ReedSolomonBlobCodec::new()),
        )
        .unwrap()
        .with_event_publisher(events.clone());
        (client, events)
    }

    fn set_behavior(&self, indices: impl IntoIterator<Item = usize>, behavior: Behavior) {
        for i in indices {
            *self.nodes[&node_id(i)].behavior.lock() = behavior;
        }
    }

    fn reset_behavior(&self) {
        for node in self.nodes.values() {
            *node.behavior.lock() = Behavior::Honest;
        }
    }

    fn update_staking(&self, update: impl FnOnce(&mut StakingState)) {
        update(&mut self.staking.lock());
    }

    /// The next staking read still returns the current state, every later
    /// one returns `next`.
    fn advance_after_next_fetch(&self, next: StakingState) {
        *self.pending_staking.lock() = Some(next);
    }

    /// Rewrite the digests of `metadata` to match the flipped slivers held
    /// across the network.
    fn forge(&self, mut metadata: BlobMetadata) -> BlobMetadata {
        for node in self.nodes.values() {
            for ((blob_id, pair, sliver_type), sliver) in node.slivers.lock().iter() {
                if *blob_id != metadata.blob_id {
                    continue;
                }
                let digest: [u8; 32] = Sha256::digest(&flipped(sliver.clone()).data).into();
                let hashes = &mut metadata.hashes[pair.0 as usize];
                match sliver_type {
                    SliverType::Primary => hashes.primary_hash = digest,
                    SliverType::Secondary => hashes.secondary_hash = digest,
                }
            }
        }
        metadata
    }

    fn digest(&self, kind: &str) -> TransactionDigest {
        TransactionDigest(format!(
            "{}-{}",
            kind,
            self.transactions.fetch_add(1, Ordering::SeqCst)
        ))
    }

    fn sim_node(&self, node: &StorageNode) -> NodeResult<(&SimNode, Behavior)> {
        let sim = self
            .nodes
            .get(&node.id)
            .ok_or_else(|| NodeError::Other(format!("unknown node {}", node.id)))?;
        let behavior = *sim.behavior.lock();
        if behavior == Behavior::Unreachable {
            return Err(NodeError::Other("connection refused".into()));
        }
        Ok((sim, behavior))
    }

    fn confirm(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        persistence: BlobPersistence,
    ) -> NodeResult<SignedStorageConfirmation> {
        let (sim, behavior) = self.sim_node(node)?;
        if !sim.metadata.lock().contains_key(blob_id) {
            return Err(NodeError::NotFound);
        }

        let epoch = self.staking.lock().epoch;
        let message = confirmation_message(epoch, blob_id, &persistence)
            .map_err(|e| NodeError::Other(e.to_string()))?;
        let key = if behavior == Behavior::BadSignature {
            secret_key(10_000 + node.index as u64)
        } else {
            sim.key.clone()
        };

        Ok(SignedStorageConfirmation {
            signature: key.sign(&message, BLS_DST, &[]).compress().to_vec(),
            serialized_message: message,
        })
    }
}

#[async_trait]
impl StorageNodeApi for Network {
    async fn get_blob_metadata(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        _cancel: &CancellationToken,
    ) -> NodeResult<BlobMetadata> {
        tokio::task::yield_now().await;
        let (sim, behavior) = self.sim_node(node)?;
        let metadata = sim.metadata.lock().get(blob_id).cloned();
        let metadata = metadata.ok_or(NodeError::NotFound)?;
        if behavior == Behavior::Forged {
            return Ok(self.forge(metadata));
        }
        Ok(metadata)
    }

    async fn get_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: SliverPairIndex,
        sliver_type: SliverType,
        cancel: &CancellationToken,
    ) -> NodeResult<Sliver> {
        tokio::task::yield_now().await;
        let (sim, behavior) = self.sim_node(node)?;
        let stored = sim
            .slivers
            .lock()
            .get(&(*blob_id, pair_index, sliver_type))
            .cloned();

        match behavior {
            Behavior::LostSlivers => Err(NodeError::NotFound),
            Behavior::BlockedSlivers => Err(NodeError::LegallyUnavailable),
            Behavior::Stalled => {
                cancel.cancelled().await;
                Err(NodeError::Cancelled)
            }
            Behavior::Corrupt | Behavior::Forged => stored.map(flipped).ok_or(NodeError::NotFound),
            _ => stored.ok_or(NodeError::NotFound),
        }
    }

    async fn store_blob_metadata(
        &self,
        node: &StorageNode,
        metadata: &BlobMetadata,
        _cancel: &CancellationToken,
    ) -> NodeResult<()> {
        tokio::task::yield_now().await;
        let (sim, _) = self.sim_node(node)?;
        sim.metadata.lock().insert(metadata.blob_id, metadata.clone());
        Ok(())
    }

    async fn store_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        sliver: &Sliver,
        _cancel: &CancellationToken,
    ) -> NodeResult<()> {
        let (sim, _) = self.sim_node(node)?;
        sim.slivers.lock().insert(
            (*blob_id, sliver.pair_index, sliver.sliver_type),
            sliver.clone(),
        );
        Ok(())
    }

    async fn get_blob_status(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        _cancel: &CancellationToken,
    ) -> NodeResult<BlobStatus> {
        tokio::task::yield_now().await;
        self.sim_node(node)?;
        Ok(self
            .statuses
            .lock()
            .get(blob_id)
            .copied()
            .unwrap_or(BlobStatus::Nonexistent))
    }

    async fn get_permanent_confirmation(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        _cancel: &CancellationToken,
    ) -> NodeResult<SignedStorageConfirmation> {
        tokio::task::yield_now().await;
        self.confirm(node, blob_id, BlobPersistence::Permanent)
    }

    async fn get_deletable_confirmation(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        object_id: &ObjectId,
        _cancel: &CancellationToken,
    ) -> NodeResult<SignedStorageConfirmation> {
        tokio::task::yield_now().await;
        self.confirm(node, blob_id, BlobPersistence::Deletable(*object_id))
    }
}

#[async_trait]
impl LedgerApi for Network {
    async fn staking_state(&self) -> slivernet::Result<StakingState> {
        let mut staking = self.staking.lock();
        let current = staking.clone();
        if let Some(next) = self.pending_staking.lock().take() {
            *staking = next;
        }
        Ok(current)
    }

    async fn system_state(&self) -> slivernet::Result<SystemState> {
        Ok(self.system)
    }

    async fn storage_nodes(&self, node_ids: &[NodeId]) -> slivernet::Result<Vec<StorageNodeInfo>> {
        node_ids
            .iter()
            .map(|id| {
                self.nodes
                    .get(id)
                    .map(|node| node.info.clone())
                    .ok_or_else(|| Error::Ledger(format!("unknown pool {}", id)))
            })
            .collect()
    }

    async fn blob_object(&self, object_id: &ObjectId) -> slivernet::Result<BlobObject> {
        self.blobs
            .lock()
            .get(object_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(format!("no blob object {}", object_id)))
    }

    async fn register_blob(&self, request: RegisterBlobRequest) -> slivernet::Result<BlobObject> {
        let epoch = self.staking.lock().epoch;
        let expected = storage_cost(request.size, request.epochs, &self.system)?;
        if request.storage_cost != expected.storage_cost || request.write_cost != expected.write_cost {
            return Err(Error::Ledger("insufficient payment".into()));
        }

        let mut id = [0u8; 32];
        id[0] = 0xB0;
        id[24..].copy_from_slice(&self.transactions.fetch_add(1, Ordering::SeqCst).to_be_bytes());
        let object = BlobObject {
            id: ObjectId::new(id),
            blob_id: request.blob_id,
            size: request.size,
            encoded_size: request.encoded_size,
            registered_epoch: epoch,
            certified_epoch: None,
            end_epoch: epoch + request.epochs,
            deletable: request.deletable,
        };
        self.blobs.lock().insert(object.id, object.clone());
        Ok(object)
    }

    async fn certify_blob(&self, request: CertifyBlobRequest) -> slivernet::Result<TransactionDigest> {
        let staking = self.staking.lock().clone();
        let certificate = &request.certificate;

        let mut blobs = self.blobs.lock();
        let blob = blobs
            .get_mut(&request.blob_object_id)
            .ok_or_else(|| Error::Ledger("unknown blob object".into()))?;
        let persistence = if blob.deletable {
            BlobPersistence::Deletable(blob.id)
        } else {
            BlobPersistence::Permanent
        };
        if certificate.serialized_message != confirmation_message(staking.epoch, &blob.blob_id, &persistence)? {
            return Err(Error::Ledger("certificate message mismatch".into()));
        }

        let keys: Vec<PublicKey> = certificate
            .signers
            .iter()
            .map(|i| {
                let id = staking.committee[*i].0;
                PublicKey::from_bytes(&self.nodes[&id].info.public_key).unwrap()
            })
            .collect();
        let refs: Vec<&PublicKey> = keys.iter().collect();
        let signature = Signature::from_bytes(&certificate.signature)
            .map_err(|e| Error::Ledger(format!("bad signature: {:?}", e)))?;
        if signature.fast_aggregate_verify(true, &certificate.serialized_message, BLS_DST, &refs)
            != BLST_ERROR::BLST_SUCCESS
        {
            return Err(Error::Ledger("certificate does not verify".into()));
        }

        blob.certified_epoch = Some(staking.epoch);
        let status = if blob.deletable {
            BlobStatus::Deletable {
                initial_certified_epoch: Some(staking.epoch),
                deletable_counts: DeletableCounts {
                    count_deletable_total: 1,
                    count_deletable_certified: 1,
                },
            }
        } else {
            BlobStatus::Permanent {
                end_epoch: blob.end_epoch,
                is_certified: true,
                initial_certified_epoch: Some(staking.epoch),
                deletable_counts: DeletableCounts::default(),
            }
        };
        self.statuses.lock().insert(blob.blob_id, status);
        drop(blobs);

        self.certificates.lock().push(request);
        Ok(self.digest("certify"))
    }

    async fn delete_blob(
        &self,
        _sender: ObjectId,
        blob_object_id: ObjectId,
    ) -> slivernet::Result<TransactionDigest> {
        self.blobs
            .lock()
            .remove(&blob_object_id)
            .ok_or_else(|| Error::Ledger("unknown blob object".into()))?;
        Ok(self.digest("delete"))
    }

    async fn extend_blob(&self, request: ExtendBlobRequest) -> slivernet::Result<TransactionDigest> {
        let mut blobs = self.blobs.lock();
        let blob = blobs
            .get_mut(&request.blob_object_id)
            .ok_or_else(|| Error::Ledger("unknown blob object".into()))?;
        blob.end_epoch += request.epochs;
        drop(blobs);

        self.extensions.lock().push(request);
        Ok(self.digest("extend"))
    }
}

async fn write(client: &BlobClient, blob: &[u8]) -> slivernet::WriteBlobResult {
    client
        .write_blob(blob, &WriteBlobOptions::new(sender(), 3), &CancellationToken::new())
        .await
        .unwrap()
}

async fn read(client: &BlobClient, blob_id: &BlobId) -> slivernet::Result<Vec<u8>> {
    client.read_blob(blob_id, &CancellationToken::new()).await
}

// =============================================================================
// Round trips
// =============================================================================

async fn round_trips(n: usize) {
    let network = Network::new(n);
    let (client, _) = network.client();
    let f = max_faulty(n as u16);

    for (seed, size) in [0usize, 1, 1 << 20, 10 << 20].into_iter().enumerate() {
        let blob = random_blob(size, seed as u64);
        let written = write(&client, &blob).await;
        assert_eq!(written.failed_weight, 0);

        network.reset_behavior();
        assert_eq!(read(&client, &written.blob_id).await.unwrap(), blob, "size {}", size);

        network.set_behavior(0..f, Behavior::Unreachable);
        assert_eq!(
            read(&client, &written.blob_id).await.unwrap(),
            blob,
            "size {} with {} unreachable nodes",
            size,
            f
        );

        network.set_behavior(0..f, Behavior::Corrupt);
        assert_eq!(
            read(&client, &written.blob_id).await.unwrap(),
            blob,
            "size {} with {} corrupt nodes",
            size,
            f
        );
        network.reset_behavior();
    }

    assert_eq!(client.metrics().reads("success"), 12);
    assert_eq!(client.metrics().writes("success"), 4);
}

#[tokio::test]
async fn test_round_trip_seven_shards() {
    round_trips(7).await;
}

#[tokio::test]
async fn test_round_trip_hundred_shards() {
    round_trips(100).await;
}

#[tokio::test]
async fn test_read_publishes_event() {
    let network = Network::new(7);
    let (client, events) = network.client();
    let blob = random_blob(4096, 1);
    let written = write(&client, &blob).await;

    read(&client, &written.blob_id).await.unwrap();

    let reads = events.events_of_type("BlobRead");
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].blob_id(), Some(&written.blob_id));
    assert!(events.events_of_type("ReadRetried").is_empty());
}

// =============================================================================
// Read failures
// =============================================================================

#[tokio::test]
async fn test_not_found_quorum_means_blob_does_not_exist() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let written = write(&client, &random_blob(1024, 2)).await;

    network.set_behavior(0..5, Behavior::LostSlivers);
    network.set_behavior(5..7, Behavior::Unreachable);

    assert_eq!(
        read(&client, &written.blob_id).await,
        Err(Error::BlobDoesNotExist(written.blob_id))
    );
    assert!(client.metrics().sliver_failures(FailureClass::NotFound) >= 5);
    assert_eq!(client.metrics().epoch_retries(), 0);
}

#[tokio::test]
async fn test_blocked_quorum_means_blob_blocked() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let written = write(&client, &random_blob(1024, 3)).await;

    network.set_behavior(0..5, Behavior::BlockedSlivers);
    network.set_behavior(5..7, Behavior::Unreachable);

    assert_eq!(
        read(&client, &written.blob_id).await,
        Err(Error::BlobBlocked(written.blob_id))
    );
}

#[tokio::test]
async fn test_class_quorum_with_hundred_shards() {
    let network = Network::new(100);
    let (client, _) = network.client();
    let written = write(&client, &random_blob(1024, 4)).await;

    network.set_behavior(0..67, Behavior::LostSlivers);
    network.set_behavior(67..100, Behavior::Unreachable);

    assert_eq!(
        read(&client, &written.blob_id).await,
        Err(Error::BlobDoesNotExist(written.blob_id))
    );
}

#[tokio::test]
async fn test_mixed_failures_exhaust_candidates() {
    let network = Network::new(7);
    let (client, events) = network.client();
    let written = write(&client, &random_blob(1024, 5)).await;

    network.set_behavior(0..2, Behavior::LostSlivers);
    network.set_behavior(2..4, Behavior::BlockedSlivers);
    network.set_behavior(4..7, Behavior::Unreachable);

    assert_eq!(
        read(&client, &written.blob_id).await,
        Err(Error::NotEnoughSliversReceived {
            blob_id: written.blob_id,
            received: 0,
            required: 3,
        })
    );
    // epoch-relative, so retried once with the same outcome
    assert_eq!(events.events_of_type("ReadRetried").len(), 1);
    assert_eq!(client.metrics().reads("transient"), 1);
}

#[tokio::test]
async fn test_unknown_blob_does_not_exist() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let blob_id = BlobId::new([0x42; 32]);

    assert_eq!(read(&client, &blob_id).await, Err(Error::BlobDoesNotExist(blob_id)));
}

#[tokio::test]
async fn test_corrupt_slivers_are_replaced() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let blob = random_blob(1024, 6);
    let written = write(&client, &blob).await;

    network.set_behavior(0..2, Behavior::Corrupt);

    // weighted sampling puts the corrupt nodes in the first wave on most reads
    for _ in 0..20 {
        assert_eq!(read(&client, &written.blob_id).await.unwrap(), blob);
    }
    assert_eq!(client.metrics().reads("success"), 20);
    assert!(client.metrics().sliver_failures(FailureClass::Other) > 0);
    assert_eq!(client.metrics().epoch_retries(), 0);
}

#[tokio::test]
async fn test_corrupt_quorum_fails_read() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let written = write(&client, &random_blob(1024, 13)).await;

    network.set_behavior(0..7, Behavior::Corrupt);

    assert_matches!(
        read(&client, &written.blob_id).await,
        Err(Error::ReadFailed { blob_id, .. }) if blob_id == written.blob_id
    );
    assert_eq!(client.metrics().sliver_failures(FailureClass::Other), 5);
    assert_eq!(client.metrics().epoch_retries(), 0);
}

#[tokio::test]
async fn test_forged_metadata_fails_verification() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let written = write(&client, &random_blob(1024, 14)).await;

    network.set_behavior(0..7, Behavior::Forged);

    assert_matches!(
        read(&client, &written.blob_id).await,
        Err(Error::DecodingVerification { expected, .. }) if expected == written.blob_id
    );
    assert_eq!(client.metrics().epoch_retries(), 0);
}

#[tokio::test]
async fn test_cancelled_read() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let written = write(&client, &random_blob(1024, 7)).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(
        client.read_blob(&written.blob_id, &cancel).await,
        Err(Error::Cancelled)
    );
}

#[tokio::test]
async fn test_read_times_out() {
    let network = Network::new(7);
    let config = ClientConfig {
        operation_timeout: Some("50ms".into()),
        ..ClientConfig::default()
    };
    let (writer, _) = network.client();
    let written = write(&writer, &random_blob(1024, 8)).await;
    let (client, _) = network.client_with(config);

    network.set_behavior(0..7, Behavior::Stalled);

    assert_eq!(
        read(&client, &written.blob_id).await,
        Err(Error::Timeout(Duration::from_millis(50)))
    );
    assert_eq!(client.metrics().reads("cancelled"), 1);
}

// =============================================================================
// Writes and certification
// =============================================================================

#[tokio::test]
async fn test_write_tolerates_f_failures() {
    let network = Network::new(100);
    let (client, events) = network.client();
    network.set_behavior(0..33, Behavior::Unreachable);

    let written = write(&client, &random_blob(2048, 9)).await;

    assert_eq!(written.failed_weight, 33);
    assert_eq!(written.blob_object.certified_epoch, Some(EPOCH));
    assert_eq!(events.events_of_type("NodeWriteFailed").len(), 33);

    let history: Vec<_> = events
        .events_for_blob(&written.blob_id)
        .iter()
        .map(|e| e.event_type())
        .filter(|t| *t != "NodeWriteFailed")
        .collect();
    assert_eq!(history, ["BlobRegistered", "BlobCertified", "BlobWritten"]);

    let certificates = network.certificates.lock();
    assert_eq!(certificates[0].certificate.signers.len(), 67);
    assert!(certificates[0].certificate.signers.iter().all(|i| *i >= 33));
}

#[tokio::test]
async fn test_write_fails_beyond_f_failures() {
    let network = Network::new(100);
    let (client, _) = network.client();
    network.set_behavior(0..34, Behavior::Unreachable);

    let result = client
        .write_blob(
            &random_blob(2048, 10),
            &WriteBlobOptions::new(sender(), 3),
            &CancellationToken::new(),
        )
        .await;

    assert_matches!(
        result,
        Err(Error::TooManyWriteFailures {
            failed_weight: 34,
            max_faulty: 33,
            ..
        })
    );
    assert!(network.certificates.lock().is_empty());
    assert_eq!(client.metrics().writes("failure"), 1);
}

#[tokio::test]
async fn test_write_sends_metadata_to_members_without_shards() {
    let network = Network::with_idle_members(7, 1);
    let (client, events) = network.client();
    let blob = random_blob(1024, 15);

    let written = write(&client, &blob).await;

    assert_eq!(written.failed_weight, 0);
    let idle = &network.nodes[&node_id(7)];
    assert!(idle.metadata.lock().contains_key(&written.blob_id));
    assert!(idle.slivers.lock().is_empty());
    assert!(events.events_of_type("NodeWriteFailed").is_empty());

    let certificates = network.certificates.lock();
    assert_eq!(certificates[0].certificate.signers, vec![0, 1, 2, 3, 4, 5, 6]);
    drop(certificates);

    assert_eq!(read(&client, &written.blob_id).await.unwrap(), blob);
}

#[tokio::test]
async fn test_invalid_signature_is_excluded_from_certificate() {
    let network = Network::new(7);
    let (client, _) = network.client();
    network.set_behavior([3], Behavior::BadSignature);

    let written = write(&client, &random_blob(1024, 11)).await;
    assert_eq!(written.failed_weight, 0);

    let certificates = network.certificates.lock();
    let certificate = &certificates[0].certificate;
    assert_eq!(certificate.signers, vec![0, 1, 2, 4, 5, 6]);
    assert_eq!(certificate.bitmap, vec![0b0111_0111]);
}

#[tokio::test]
async fn test_invalid_signatures_can_break_quorum() {
    let network = Network::new(7);
    let (client, _) = network.client();
    network.set_behavior([0, 1], Behavior::BadSignature);
    network.set_behavior([2], Behavior::Unreachable);

    let result = client
        .write_blob(
            &random_blob(1024, 12),
            &WriteBlobOptions::new(sender(), 3),
            &CancellationToken::new(),
        )
        .await;

    assert_matches!(result, Err(Error::NotEnoughBlobConfirmations { weight: 4, .. }));
}

#[tokio::test]
async fn test_deletable_blob_lifecycle() {
    let network = Network::new(7);
    let (client, _) = network.client();

    let options = WriteBlobOptions::new(sender(), 2).deletable(true);
    let written = client
        .write_blob(&random_blob(1024, 13), &options, &CancellationToken::new())
        .await
        .unwrap();

    assert!(written.blob_object.deletable);
    assert_eq!(
        network.certificates.lock()[0].certificate.serialized_message,
        confirmation_message(
            EPOCH,
            &written.blob_id,
            &BlobPersistence::Deletable(written.blob_object.id)
        )
        .unwrap()
    );
    assert_matches!(
        client
            .get_verified_blob_status(&written.blob_id, &CancellationToken::new())
            .await,
        Ok(BlobStatus::Deletable { initial_certified_epoch: Some(EPOCH), .. })
    );

    client.delete_blob(sender(), written.blob_object.id).await.unwrap();
    assert_matches!(
        client.blob_object(&written.blob_object.id).await,
        Err(Error::Ledger(_))
    );
}

#[tokio::test]
async fn test_permanent_blob_cannot_be_deleted() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let written = write(&client, &random_blob(512, 14)).await;

    assert_eq!(
        client.delete_blob(sender(), written.blob_object.id).await,
        Err(Error::BlobNotDeletable(written.blob_object.id))
    );
}

#[tokio::test]
async fn test_extend_blob() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let written = write(&client, &random_blob(512, 15)).await;
    let end = written.blob_object.end_epoch;

    let digest = client
        .extend_blob(sender(), written.blob_object.id, BlobExtension::EndEpoch(end + 2))
        .await
        .unwrap();
    assert!(digest.is_some());
    assert_eq!(
        client.blob_object(&written.blob_object.id).await.unwrap().end_epoch,
        end + 2
    );

    let expected = client.storage_cost(512, 2).await.unwrap();
    assert_eq!(network.extensions.lock()[0].storage_cost, expected.storage_cost);

    let noop = client
        .extend_blob(sender(), written.blob_object.id, BlobExtension::EndEpoch(end))
        .await
        .unwrap();
    assert_eq!(noop, None);
    assert_eq!(network.extensions.lock().len(), 1);
}

#[tokio::test]
async fn test_verified_status_with_faulty_nodes() {
    let network = Network::new(7);
    let (client, _) = network.client();
    let written = write(&client, &random_blob(512, 16)).await;

    network.set_behavior(0..2, Behavior::Unreachable);
    assert_matches!(
        client
            .get_verified_blob_status(&written.blob_id, &CancellationToken::new())
            .await,
        Ok(BlobStatus::Permanent { initial_certified_epoch: Some(EPOCH), is_certified: true, .. })
    );

    network.set_behavior(0..3, Behavior::Unreachable);
    assert_matches!(
        client
            .get_verified_blob_status(&written.blob_id, &CancellationToken::new())
            .await,
        Err(Error::BlobNotCertified { .. })
    );
}

// =============================================================================
// Epoch changes
// =============================================================================

fn syncing(epoch: u32, n: usize) -> StakingState {
    StakingState {
        epoch,
        n_shards: n as u16,
        epoch_state: EpochState::EpochChangeSync,
        committee: assignment(n, 0),
        previous_committee: assignment(n, 0),
    }
}

fn certified_at(network: &Network, blob_id: BlobId, epoch: u32) {
    network.statuses.lock().insert(
        blob_id,
        BlobStatus::Permanent {
            end_epoch: 50,
            is_certified: true,
            initial_certified_epoch: Some(epoch),
            deletable_counts: DeletableCounts::default(),
        },
    );
}

#[tokio::test]
async fn test_read_retries_once_after_stale_epoch() {
    let network = Network::new(7);
    let (writer, _) = network.client();
    let blob = random_blob(4096, 17);
    let written = write(&writer, &blob).await;

    network.update_staking(|staking| *staking = syncing(EPOCH, 7));
    certified_at(&network, written.blob_id, EPOCH + 1);
    network.advance_after_next_fetch(syncing(EPOCH + 1, 7));

    let (reader, events) = network.client();
    assert_eq!(read(&reader, &written.blob_id).await.unwrap(), blob);

    assert_eq!(reader.committee_view().invalidations(), 1);
    assert_eq!(reader.metrics().epoch_retries(), 1);
    assert_eq!(reader.metrics().reads("success"), 1);
    assert_eq!(events.events_of_type("ReadRetried").len(), 1);
    assert_eq!(events.events_of_type("BlobRead").len(), 1);
}

#[tokio::test]
async fn test_read_fails_when_epoch_stays_stale() {
    let network = Network::new(7);
    let (writer, _) = network.client();
    let written = write(&writer, &random_blob(4096, 18)).await;

    network.update_staking(|staking| *staking = syncing(EPOCH, 7));
    certified_at(&network, written.blob_id, EPOCH + 1);

    let (reader, _) = network.client();
    assert_eq!(
        read(&reader, &written.blob_id).await,
        Err(Error::BehindCurrentEpoch {
            current: EPOCH,
            certified: EPOCH + 1,
        })
    );
    assert_eq!(reader.metrics().epoch_retries(), 1);
}

#[tokio::test]
async fn test_reads_from_previous_committee_during_epoch_change() {
    let network = Network::new(7);
    let (writer, _) = network.client();
    let blob = random_blob(4096, 19);
    let written = write(&writer, &blob).await;

    // shards move one node over in the next epoch; nodes have not synced yet
    network.update_staking(|staking| {
        *staking = StakingState {
            epoch: EPOCH + 1,
            n_shards: 7,
            epoch_state: EpochState::EpochChangeSync,
            committee: assignment(7, 1),
            previous_committee: assignment(7, 0),
        }
    });

    let (reader, _) = network.client();
    assert_eq!(read(&reader, &written.blob_id).await.unwrap(), blob);

    // once the change is marked done the new assignment is used
    network.update_staking(|staking| staking.epoch_state = EpochState::EpochChangeDone);
    let (reader, _) = network.client();
    assert_eq!(
        read(&reader, &written.blob_id).await,
        Err(Error::BlobDoesNotExist(written.blob_id))
    );
}

#[tokio::test]
async fn test_certification_epoch_rejects_uncertified_blob() {
    let network = Network::new(7);
    network.update_staking(|staking| *staking = syncing(EPOCH, 7));
    let (client, _) = network.client();
    let blob_id = BlobId::new([0x17; 32]);

    assert_matches!(
        client.certification_epoch(&blob_id, &CancellationToken::new()).await,
        Err(Error::BlobNotCertified { .. })
    );
}
