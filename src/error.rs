//! Error and warning types surfaced at the core's API boundary.
//!
//! Per the propagation policy: every fallible operation returns a value
//! (never panics, never aborts) and on `Err` the input state is left
//! untouched by the caller. Non-fatal conditions are not errors; they are
//! reported as `Warning`s alongside a successful result.

use thiserror::Error;

/// `create_delta` exceeded the wire size budget.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("encoded delta exceeds size limit: {actual_bytes} bytes")]
pub struct SizeError {
    pub actual_bytes: usize,
}

/// `decode_delta` could not reconstruct a `Delta` from the given bytes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("invalid canonical encoding")]
    InvalidEncoding,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("version mismatch: expected `{expected}`, found `{found}`")]
    VersionMismatch { expected: String, found: String },
}

/// Declared `merkle_root` disagrees with the recomputed root.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("merkle root mismatch: expected {expected}, computed {computed}")]
pub struct MerkleMismatch {
    pub expected: String,
    pub computed: String,
}

/// Chunk metadata inconsistent, duplicated, missing, or failing reassembly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChunkError {
    #[error("inconsistent chunk metadata across frames")]
    InconsistentMetadata,

    #[error("duplicate chunk index {0}")]
    DuplicateIndex(u32),

    #[error("missing chunk index {0}")]
    MissingChunk(u32),

    #[error("reassembled payload hash does not match declared payload_hash")]
    HashMismatch,
}

/// A transaction kind string outside `{completion, attestation, ap_reveal}`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid transaction kind: {0}")]
pub struct InvalidKind(pub String);

/// `merge_delta` failed to validate the incoming delta.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error(transparent)]
    Merkle(#[from] MerkleMismatch),
}

/// Non-fatal conditions surfaced alongside a successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A merged transaction or block referenced an owner absent from the
    /// local node table. The merge proceeded and a provisional node was
    /// created at the current median reputation.
    UnknownOwner { pubkey: String },
}
