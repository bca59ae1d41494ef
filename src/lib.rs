//! A deterministic, offline-first Proof-of-Knowledge consensus core for a
//! classroom peer network.
//!
//! The crate is a pure library: no threads, no sockets, no disk I/O, no
//! wall-clock reads. Every operation is a function from an owned [`State`]
//! (plus caller-supplied timestamps) to a new `State`, so a host can run
//! it on any transport — optical codes, sneakernet USB drops, or a live
//! network — without this crate knowing the difference.
//!
//! Module layout mirrors the four engines plus the thin manager that
//! composes them:
//! - [`reputation`]: proportion-at-time, thought-leader bonus, bounded updates.
//! - [`consensus`]: weighted convergence, quorum, block proposal.
//! - [`delta`]: canonical encoding, Merkle roots, chunking for transport.
//! - [`merge`]: four-level conflict resolution and hybrid fork selection.
//! - [`state`]: the `State` type and the external API below.

pub mod config;
pub mod consensus;
pub mod delta;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod merge;
pub mod reputation;
pub mod state;
pub mod types;

pub use config::CoreConfig;
pub use delta::EncodedDelta;
pub use error::{ChunkError, DecodeError, MergeError, SizeError, Warning};
pub use state::{MergeOutcome, State};
pub use types::{Block, ConsensusStatus, Delta, Node, Timestamp, Transaction, TransactionKind, TxId};

/// Creates an empty replica with the given configuration.
pub fn init(config: CoreConfig) -> State {
    State::new(config)
}

/// Registers a node in the network.
pub fn add_node(state: State, pubkey: &str, archetype: &str) -> State {
    state.add_node(pubkey, archetype)
}

/// Designates `pubkey` as the local replica's current user.
pub fn set_current_user(state: State, pubkey: &str) -> State {
    state.set_current_user(pubkey)
}

/// Submits a completion, attestation, or AP-reveal transaction to
/// `owner`'s mempool.
pub fn submit(
    state: State,
    owner: &str,
    question_id: &str,
    answer: &[u8],
    kind: TransactionKind,
    timestamp: Timestamp,
) -> (State, TxId) {
    state.submit(owner, question_id, answer, kind, timestamp)
}

/// Proposes a block for `owner` from their mempool's ready transactions.
pub fn propose_block(state: State, owner: &str, timestamp: Timestamp) -> (State, Option<types::BlockId>) {
    state.propose_block(owner, timestamp)
}

/// Builds and encodes a sync delta of everything newer than `peer_timestamp`.
pub fn create_delta(state: &State, peer_timestamp: Timestamp, now: Timestamp) -> Result<EncodedDelta, SizeError> {
    state.create_delta(peer_timestamp, now)
}

/// Decodes a delta payload produced by [`create_delta`].
pub fn decode_delta(bytes: &[u8]) -> Result<Delta, DecodeError> {
    state::decode_delta(bytes)
}

/// Merges an incoming delta into the replica.
pub fn merge_delta(state: State, delta: Delta, now: Timestamp) -> Result<MergeOutcome, MergeError> {
    state.merge_delta(delta, now)
}

/// Reads a node's current reputation, or `1.0` if the node is unknown.
pub fn reputation(state: &State, pubkey: &str) -> f64 {
    state.reputation(pubkey)
}

/// Reads convergence/readiness for a question.
pub fn consensus_status(state: &State, question_id: &str) -> ConsensusStatus {
    state.consensus_status(question_id)
}
