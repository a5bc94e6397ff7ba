//! Storage Confirmation Certification
//!
//! Checks each node's signed confirmation against the canonical message,
//! aggregates the valid BLS signatures (min-pk: G1 public keys, G2
//! signatures) and records contributing members in a signer bitmap.

use bitvec::prelude::*;
use blst::min_pk::{AggregateSignature, PublicKey, Signature};
use blst::BLST_ERROR;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::BlobClient;
use crate::domain::events::DomainEvent;
use crate::domain::ports::{CertifyBlobRequest, TransactionDigest};
use crate::domain::types::{
    AggregatedCertificate, BlobId, BlobPersistence, Committee, Epoch, ObjectId,
    SignedStorageConfirmation,
};
use crate::encoding::sizing::is_quorum;
use crate::error::{Error, Result};

/// Domain separation tag for confirmation signatures.
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Intent kind for blob certification messages.
const INTENT_BLOB_CERTIFICATION: u8 = 1;
const INTENT_VERSION: u8 = 0;
const INTENT_APP_STORAGE: u8 = 3;

#[derive(Serialize)]
struct Intent {
    kind: u8,
    version: u8,
    app_id: u8,
}

#[derive(Serialize)]
struct ConfirmationMessage<'a> {
    intent: Intent,
    epoch: Epoch,
    blob_id: &'a BlobId,
    blob_type: &'a BlobPersistence,
}

/// Canonical bytes a node signs to confirm it stores `blob_id` in `epoch`.
pub fn confirmation_message(
    epoch: Epoch,
    blob_id: &BlobId,
    persistence: &BlobPersistence,
) -> Result<Vec<u8>> {
    let message = ConfirmationMessage {
        intent: Intent {
            kind: INTENT_BLOB_CERTIFICATION,
            version: INTENT_VERSION,
            app_id: INTENT_APP_STORAGE,
        },
        epoch,
        blob_id,
        blob_type: persistence,
    };
    bincode::serialize(&message)
        .map_err(|e| Error::Internal(format!("cannot serialize confirmation message: {}", e)))
}

/// Parse a confirmation's signature if it was produced by `public_key` over
/// exactly `expected_message`.
pub fn verify_confirmation(
    public_key: &[u8],
    expected_message: &[u8],
    confirmation: &SignedStorageConfirmation,
) -> Result<Signature> {
    if confirmation.serialized_message != expected_message {
        return Err(Error::Signature("confirmation message mismatch".into()));
    }

    let public_key = PublicKey::key_validate(public_key)
        .map_err(|e| Error::Signature(format!("invalid public key: {:?}", e)))?;
    let signature = Signature::sig_validate(&confirmation.signature, true)
        .map_err(|e| Error::Signature(format!("invalid signature encoding: {:?}", e)))?;

    match signature.verify(true, expected_message, BLS_DST, &[], &public_key, true) {
        BLST_ERROR::BLST_SUCCESS => Ok(signature),
        e => Err(Error::Signature(format!("verification failed: {:?}", e))),
    }
}

/// Build an aggregated certificate from one (optional) confirmation per
/// committee member, in member order.
///
/// Invalid confirmations are dropped. The remaining ones must carry quorum
/// weight.
pub fn aggregate_confirmations(
    committee: &Committee,
    blob_id: &BlobId,
    persistence: &BlobPersistence,
    confirmations: &[Option<SignedStorageConfirmation>],
) -> Result<AggregatedCertificate> {
    if confirmations.len() != committee.len() {
        return Err(Error::InvalidConfirmationCount {
            expected: committee.len(),
            actual: confirmations.len(),
        });
    }

    let message = confirmation_message(committee.epoch, blob_id, persistence)?;

    let mut signatures = Vec::new();
    let mut signers = Vec::new();
    let mut weight = 0;
    for (node, confirmation) in committee.nodes.iter().zip(confirmations) {
        let Some(confirmation) = confirmation else {
            continue;
        };
        match verify_confirmation(&node.public_key, &message, confirmation) {
            Ok(signature) => {
                signatures.push(signature);
                signers.push(node.index);
                weight += node.weight();
            }
            Err(e) => warn!(node = %node.name, error = %e, "Discarding invalid confirmation"),
        }
    }

    if !is_quorum(weight, committee.n_shards) {
        return Err(Error::NotEnoughBlobConfirmations {
            blob_id: *blob_id,
            weight,
            n_shards: committee.n_shards,
        });
    }

    let refs: Vec<&Signature> = signatures.iter().collect();
    let aggregate = AggregateSignature::aggregate(&refs, false)
        .map_err(|e| Error::Signature(format!("aggregation failed: {:?}", e)))?
        .to_signature();

    let mut bitmap: BitVec<u8, Lsb0> = bitvec![u8, Lsb0; 0; committee.len()];
    for index in &signers {
        bitmap.set(*index, true);
    }

    debug!(signers = signers.len(), weight, "Aggregated confirmations");

    Ok(AggregatedCertificate {
        signature: aggregate.to_bytes().to_vec(),
        signers,
        bitmap: bitmap.into_vec(),
        serialized_message: message,
    })
}

impl BlobClient {
    /// Aggregate collected confirmations and submit the certification
    /// transaction.
    #[instrument(skip(self, committee, confirmations), fields(epoch = committee.epoch))]
    pub async fn certify_blob(
        &self,
        sender: ObjectId,
        blob_object_id: ObjectId,
        committee: &Committee,
        blob_id: &BlobId,
        persistence: &BlobPersistence,
        confirmations: &[Option<SignedStorageConfirmation>],
    ) -> Result<TransactionDigest> {
        let certificate = aggregate_confirmations(committee, blob_id, persistence, confirmations)?;
        let signers = certificate.signers.len();

        let digest = self
            .ledger
            .certify_blob(CertifyBlobRequest {
                sender,
                blob_object_id,
                certificate,
            })
            .await?;

        info!(%blob_id, %digest, signers, "Blob certified");
        self.publish(DomainEvent::blob_certified(
            *blob_id,
            blob_object_id,
            committee.epoch,
            signers,
        ))
        .await;

        Ok(digest)
    }
}
