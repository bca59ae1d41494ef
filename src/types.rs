//! Core data types for the Proof-of-Knowledge consensus engine (spec §3).

use crate::error::InvalidKind;
use crate::hashing::{self, map, CanonicalValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Milliseconds since an arbitrary but monotonic local epoch — never read
/// from the wall clock inside the core; always caller-supplied.
pub type Timestamp = i64;

pub type TxId = String;
pub type BlockId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Completion,
    Attestation,
    ApReveal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Completion => "completion",
            TransactionKind::Attestation => "attestation",
            TransactionKind::ApReveal => "ap_reveal",
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = InvalidKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" => Ok(TransactionKind::Completion),
            "attestation" => Ok(TransactionKind::Attestation),
            "ap_reveal" => Ok(TransactionKind::ApReveal),
            other => Err(InvalidKind(other.to_string())),
        }
    }
}

/// The opaque answer and its fingerprint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub answer: Vec<u8>,
    pub hash: String,
}

impl Payload {
    pub fn new(answer: Vec<u8>) -> Self {
        let hash = hashing::fingerprint(&answer);
        Self { answer, hash }
    }
}

/// An attestation transaction. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub timestamp: Timestamp,
    pub owner: String,
    pub question_id: String,
    pub kind: TransactionKind,
    pub payload: Payload,
}

impl Transaction {
    pub fn canonical(&self) -> CanonicalValue {
        map([
            ("id", CanonicalValue::Str(self.id.clone())),
            ("timestamp", CanonicalValue::Int(self.timestamp)),
            ("owner", CanonicalValue::Str(self.owner.clone())),
            ("question_id", CanonicalValue::Str(self.question_id.clone())),
            ("kind", CanonicalValue::Str(self.kind.as_str().to_string())),
            (
                "payload",
                map([
                    ("answer", CanonicalValue::Bytes(self.payload.answer.clone())),
                    ("hash", CanonicalValue::Str(self.payload.hash.clone())),
                ]),
            ),
        ])
    }

    pub fn digest(&self) -> [u8; 32] {
        hashing::sha256_bytes(&self.canonical().encode())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Pok,
}

/// A block of attestations mined by a proposer. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: BlockId,
    pub timestamp: Timestamp,
    pub proposer: String,
    pub kind: BlockKind,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Deterministic hash of a block's content, used as its identity.
    pub fn compute_hash(timestamp: Timestamp, proposer: &str, transactions: &[Transaction]) -> BlockId {
        let value = map([
            ("timestamp", CanonicalValue::Int(timestamp)),
            ("proposer", CanonicalValue::Str(proposer.to_string())),
            ("kind", CanonicalValue::Str(BlockKind::Pok.as_str().to_string())),
            (
                "transactions",
                CanonicalValue::Seq(transactions.iter().map(Transaction::canonical).collect()),
            ),
        ]);
        hashing::sha256_hex(&value.encode())
    }

    pub fn new(timestamp: Timestamp, proposer: String, transactions: Vec<Transaction>) -> Self {
        let hash = Self::compute_hash(timestamp, &proposer, &transactions);
        Self {
            hash,
            timestamp,
            proposer,
            kind: BlockKind::Pok,
            transactions,
        }
    }

    pub fn canonical(&self) -> CanonicalValue {
        map([
            ("hash", CanonicalValue::Str(self.hash.clone())),
            ("timestamp", CanonicalValue::Int(self.timestamp)),
            ("proposer", CanonicalValue::Str(self.proposer.clone())),
            ("kind", CanonicalValue::Str(self.kind.as_str().to_string())),
            (
                "transactions",
                CanonicalValue::Seq(self.transactions.iter().map(Transaction::canonical).collect()),
            ),
        ])
    }
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Pok => "pok",
        }
    }
}

/// An ordered sequence of blocks; a block's index is its height.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub blocks: Vec<Block>,
}

impl Chain {
    pub fn height(&self) -> usize {
        self.blocks.len()
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn contains_transaction(&self, id: &str) -> bool {
        self.blocks.iter().any(|b| b.transactions.iter().any(|t| t.id == id))
    }
}

/// A participant in the classroom PoK network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub pubkey: String,
    pub archetype: String,
    pub mempool: Vec<Transaction>,
    pub chain: Chain,
    #[serde(rename = "reputation")]
    reputation: f64,
    pub progress: i64,
    pub consensus_history: BTreeMap<String, String>,
}

impl Node {
    pub fn new(pubkey: String, archetype: String, initial_reputation: f64, cfg: &crate::config::ReputationConfig) -> Self {
        Self {
            pubkey,
            archetype,
            mempool: Vec::new(),
            chain: Chain::default(),
            reputation: initial_reputation.clamp(cfg.rep_min, cfg.rep_max),
            progress: 0,
            consensus_history: BTreeMap::new(),
        }
    }

    pub fn reputation(&self) -> f64 {
        self.reputation
    }

    /// Sets reputation, enforcing the `[rep_min, rep_max]` invariant at
    /// the single write site rather than trusting every caller to clamp.
    pub fn set_reputation(&mut self, value: f64, cfg: &crate::config::ReputationConfig) {
        self.reputation = value.clamp(cfg.rep_min, cfg.rep_max);
    }

    pub fn mempool_push(&mut self, tx: Transaction) {
        if !self.mempool.iter().any(|existing| existing.id == tx.id) {
            self.mempool.push(tx);
        }
    }

    pub fn mempool_remove_ids(&mut self, ids: &std::collections::HashSet<String>) {
        self.mempool.retain(|tx| !ids.contains(&tx.id));
    }
}

/// Size/count summary carried alongside a delta payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaMetadata {
    pub transaction_count: usize,
    pub block_count: usize,
    pub encoded_size: usize,
}

/// The compact synchronization payload (spec §4.4, §6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub version: String,
    pub timestamp: Timestamp,
    pub merkle_root: String,
    pub transactions: Vec<Transaction>,
    pub blocks: Vec<Block>,
    pub metadata: DeltaMetadata,
}

pub const DELTA_VERSION: &str = "1.0";

/// A frame of a payload split for transport over a fixed-capacity carrier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkFrame {
    pub version: String,
    pub total_chunks: u32,
    pub chunk_index: u32,
    pub payload_hash: String,
    pub chunk_bytes: Vec<u8>,
}

/// A record appended to sync history after each merge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub timestamp: Timestamp,
    pub merkle_root: String,
    pub conflicts_resolved: usize,
    pub transactions_merged: usize,
    pub blocks_merged: usize,
    pub warnings: Vec<String>,
    pub completed: bool,
}

/// Outcome of a convergence/readiness query for one question (spec §6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStatus {
    pub convergence: f64,
    pub attestation_count: usize,
    pub ready: bool,
}
