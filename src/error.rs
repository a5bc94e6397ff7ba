//! Error types for the blob client

use thiserror::Error;

use crate::domain::types::{BlobId, Epoch, ObjectId};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading, writing or certifying blobs.
///
/// `Error` is `Clone` so a single failed committee population can be observed
/// by every caller that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Routing / Configuration Errors
    // =========================================================================
    /// Malformed blob identifier
    #[error("Invalid blob id: {0}")]
    InvalidBlobId(String),

    /// Confirmation array does not line up with the committee
    #[error("Invalid number of confirmations: expected one entry per committee member ({expected}), got {actual}")]
    InvalidConfirmationCount { expected: usize, actual: usize },

    /// Committee does not partition the shard space
    #[error("Invalid committee: {0}")]
    InvalidCommittee(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Protocol Errors (eligible for one retry after cache invalidation)
    // =========================================================================
    /// Blob is unknown, invalid or not certified
    #[error("Blob {blob_id} is not certified: {reason}")]
    BlobNotCertified { blob_id: BlobId, reason: String },

    /// The blob was certified in an epoch the client has not seen yet
    #[error("The client is at epoch {current} while the blob was certified at epoch {certified}")]
    BehindCurrentEpoch { current: Epoch, certified: Epoch },

    /// Not enough primary slivers could be fetched to decode
    #[error("Not enough slivers received for blob {blob_id}: have {received}, need {required}")]
    NotEnoughSliversReceived {
        blob_id: BlobId,
        received: usize,
        required: usize,
    },

    /// Valid confirmations do not carry quorum weight
    #[error("Not enough blob confirmations for {blob_id}: weight {weight} is not a quorum of {n_shards} shards")]
    NotEnoughBlobConfirmations {
        blob_id: BlobId,
        weight: usize,
        n_shards: u16,
    },

    /// No storage node returned metadata for the blob
    #[error("No blob metadata received for {0}")]
    NoBlobMetadataReceived(BlobId),

    // =========================================================================
    // Class-Quorum Aborts
    // =========================================================================
    /// A quorum of shards reported the blob as not found
    #[error("Blob {0} does not exist")]
    BlobDoesNotExist(BlobId),

    /// A quorum of shards reported the blob as legally unavailable
    #[error("Blob {0} is blocked")]
    BlobBlocked(BlobId),

    /// A quorum of shards failed for other reasons
    #[error("Reading blob {blob_id} failed on a quorum of shards: {reason}")]
    ReadFailed { blob_id: BlobId, reason: String },

    // =========================================================================
    // Integrity Errors
    // =========================================================================
    /// Decoded content does not hash to the requested blob id
    #[error("Decoding verification failed: expected blob id {expected}, reconstructed {actual}")]
    DecodingVerification { expected: BlobId, actual: BlobId },

    // =========================================================================
    // Threshold Breach
    // =========================================================================
    /// Node write failures exceeded the Byzantine fault bound
    #[error("Too many failures while writing blob {blob_id}: failed weight {failed_weight} exceeds {max_faulty}")]
    TooManyWriteFailures {
        blob_id: BlobId,
        failed_weight: usize,
        max_faulty: usize,
    },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// Ledger read or transaction failure, surfaced verbatim
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Storage node request failure outside of a quorum fan-out
    #[error("Storage node error: {0}")]
    Node(#[from] NodeError),

    /// Encoding or decoding failure in the blob codec
    #[error("Codec error: {0}")]
    Codec(String),

    /// Signature parsing or aggregation failure
    #[error("Signature error: {0}")]
    Signature(String),

    /// Deletion requested for a permanent blob object
    #[error("Blob object {0} is not deletable")]
    BlobNotDeletable(ObjectId),

    // =========================================================================
    // Cancellation / Time
    // =========================================================================
    /// Operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation exceeded its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error may be caused by a stale view of the committee and
    /// should be retried once after invalidating all caches.
    pub fn is_epoch_transient(&self) -> bool {
        matches!(
            self,
            Error::BlobNotCertified { .. }
                | Error::BehindCurrentEpoch { .. }
                | Error::NotEnoughSliversReceived { .. }
                | Error::NotEnoughBlobConfirmations { .. }
                | Error::NoBlobMetadataReceived(_)
        )
    }
}

/// Failure of a single storage node request.
///
/// These are classified per request and only surface to callers once a whole
/// class reaches quorum weight.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The node does not hold the requested resource
    #[error("not found")]
    NotFound,

    /// The node refuses to serve the resource for legal reasons
    #[error("legally unavailable")]
    LegallyUnavailable,

    /// The request was cancelled before completion
    #[error("request cancelled")]
    Cancelled,

    /// Any other failure (transport, status code, decoding)
    #[error("{0}")]
    Other(String),
}

impl NodeError {
    /// Failure class used for quorum accounting.
    pub fn class(&self) -> FailureClass {
        match self {
            NodeError::NotFound => FailureClass::NotFound,
            NodeError::LegallyUnavailable => FailureClass::Blocked,
            NodeError::Cancelled | NodeError::Other(_) => FailureClass::Other,
        }
    }
}

/// Failure classes tracked separately during a read fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    NotFound,
    Blocked,
    Other,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::NotFound => "not_found",
            FailureClass::Blocked => "blocked",
            FailureClass::Other => "other",
        }
    }
}
