//! Thin state manager wrapping the engines into the external API surface
//! (spec §4.6, §6). `State` owns every node and is passed by value, the
//! same move-and-return convention the engines use.

use crate::config::CoreConfig;
use crate::consensus::{self, Proposal};
use crate::delta::{self, EncodedDelta};
use crate::error::{DecodeError, MergeError, SizeError};
use crate::merge;
use crate::reputation;
use crate::types::{
    Block, BlockId, Chain, ConsensusStatus, Delta, Node, SyncHistoryEntry, Timestamp, Transaction,
    TransactionKind, TxId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// The entire local replica: every known node's mempool and chain, the
/// current-user reference, the curriculum ordering used for progressive
/// quorum, and a log of past merges. No field is ever read from disk or
/// the network by this crate; the host owns persistence and transport.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub nodes: BTreeMap<String, Node>,
    /// The pubkey of the node this replica acts on behalf of, if any.
    /// Purely informational to this crate: every operation still takes
    /// its `owner`/`pubkey` argument explicitly, so hosts that never set
    /// this lose no functionality.
    pub current_user: Option<String>,
    pub curriculum: Vec<String>,
    pub sync_history: Vec<SyncHistoryEntry>,
    pub config: CoreConfig,
}

impl State {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            nodes: BTreeMap::new(),
            current_user: None,
            curriculum: Vec::new(),
            sync_history: Vec::new(),
            config,
        }
    }

    /// Designates `pubkey` as the local replica's current user.
    pub fn set_current_user(mut self, pubkey: &str) -> Self {
        self.current_user = Some(pubkey.to_string());
        self
    }

    /// Registers a node. A new node's reputation starts at the median of
    /// existing nodes' reputations (or `1.0` for the first node), so a
    /// late-joining student neither starts at the floor nor inherits an
    /// inflated early-adopter score.
    pub fn add_node(mut self, pubkey: &str, archetype: &str) -> Self {
        if self.nodes.contains_key(pubkey) {
            return self;
        }

        let initial_reputation = median_reputation(&self.nodes).unwrap_or(1.0);
        let node = Node::new(pubkey.to_string(), archetype.to_string(), initial_reputation, &self.config.reputation);
        info!(pubkey, archetype, initial_reputation, "node added");
        self.nodes.insert(pubkey.to_string(), node);
        self
    }

    /// Appends a completion or attestation transaction to `owner`'s
    /// mempool. Unknown owners are registered on the fly with the
    /// archetype `"unknown"`, matching the reputation engine's tolerance
    /// for attestations from nodes it has not yet met (spec §4.2).
    pub fn submit(
        mut self,
        owner: &str,
        question_id: &str,
        answer: &[u8],
        kind: TransactionKind,
        timestamp: Timestamp,
    ) -> (Self, TxId) {
        if !self.nodes.contains_key(owner) {
            self = self.add_node(owner, "unknown");
        }

        let id = format!("{owner}:{question_id}:{timestamp}:{kind:?}");
        let tx = Transaction {
            id: id.clone(),
            timestamp,
            owner: owner.to_string(),
            question_id: question_id.to_string(),
            kind,
            payload: crate::types::Payload::new(answer.to_vec()),
        };

        if !self.curriculum.iter().any(|q| q == question_id) {
            self.curriculum.push(question_id.to_string());
        }

        let node = self.nodes.get_mut(owner).expect("just ensured owner exists");
        node.mempool_push(tx);
        debug!(owner, question_id, %id, "transaction submitted");

        (self, id)
    }

    /// After a merge every node's `chain` holds an identical copy of the
    /// selected fork, and a transaction already mined into that chain may
    /// still sit in another node's mempool — so aggregating raw across
    /// nodes would count the same transaction once per node. Every
    /// cross-node aggregator here dedupes by transaction id.
    fn attestations_by_question(&self) -> HashMap<String, Vec<Transaction>> {
        let mut seen = HashSet::new();
        let mut by_question: HashMap<String, Vec<Transaction>> = HashMap::new();
        for node in self.nodes.values() {
            for tx in node.mempool.iter().chain(node.chain.blocks.iter().flat_map(|b| &b.transactions)) {
                if tx.kind != TransactionKind::Completion && seen.insert(tx.id.clone()) {
                    by_question.entry(tx.question_id.clone()).or_default().push(tx.clone());
                }
            }
        }
        by_question
    }

    fn reputations(&self) -> HashMap<String, f64> {
        self.nodes.iter().map(|(k, v)| (k.clone(), v.reputation())).collect()
    }

    /// Proposes and, if non-empty, appends a new block to `owner`'s chain
    /// from their mempool's ready transactions (spec §4.3's block
    /// proposal protocol), then applies reputation rewards for every
    /// question that just reached readiness.
    pub fn propose_block(mut self, owner: &str, timestamp: Timestamp) -> (Self, Option<BlockId>) {
        let active_nodes = self.nodes.len();
        let curriculum = self.curriculum.clone();
        let by_question = self.attestations_by_question();
        let reputations = self.reputations();

        let Some(node) = self.nodes.get(owner) else {
            return (self, None);
        };

        let proposal: Proposal = consensus::propose(
            &node.mempool,
            &by_question,
            active_nodes,
            &curriculum,
            Some(&reputations),
            &self.config.consensus,
        );

        if proposal.is_empty() {
            return (self, None);
        }

        let mut transactions = proposal.completions.clone();
        transactions.extend(proposal.attestations.clone());
        let block = Block::new(timestamp, owner.to_string(), transactions.clone());
        let block_id = block.hash.clone();

        let mined_ids: HashSet<String> = transactions.iter().map(|tx| tx.id.clone()).collect();
        let ready_questions: HashSet<String> = proposal.completions.iter().map(|tx| tx.question_id.clone()).collect();

        {
            let node = self.nodes.get_mut(owner).expect("checked above");
            node.mempool_remove_ids(&mined_ids);
            node.chain.blocks.push(block);
        }

        for question in &ready_questions {
            if let Some(final_hash) = consensus::consensus_answer(
                by_question.get(question).map(Vec::as_slice).unwrap_or(&[]),
                Some(&reputations),
                &self.config.consensus,
            ) {
                let attestations = by_question.get(question).cloned().unwrap_or_default();
                reputation::process_consensus_rewards(&attestations, &final_hash, &mut self.nodes, &self.config.reputation);
                for node in self.nodes.values_mut() {
                    node.consensus_history.insert(question.clone(), final_hash.clone());
                }
            }
        }

        info!(owner, block_id = %block_id, tx_count = mined_ids.len(), "block proposed");
        (self, Some(block_id))
    }

    /// Deduped by transaction id; see the note on `attestations_by_question`.
    fn all_transactions(&self) -> Vec<Transaction> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for node in self.nodes.values() {
            for tx in node.mempool.iter().chain(node.chain.blocks.iter().flat_map(|b| &b.transactions)) {
                if seen.insert(tx.id.clone()) {
                    out.push(tx.clone());
                }
            }
        }
        out
    }

    /// Deduped by block hash; every node's chain is an identical copy of
    /// the canonical fork after a merge, so naive aggregation would
    /// otherwise count each block once per node.
    fn all_blocks(&self) -> Vec<Block> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for node in self.nodes.values() {
            for block in &node.chain.blocks {
                if seen.insert(block.hash.clone()) {
                    out.push(block.clone());
                }
            }
        }
        out
    }

    /// Builds and encodes a delta of everything newer than
    /// `peer_timestamp` (spec §4.4, §6). Fails with `SizeError` if the
    /// encoded payload exceeds the configured size contract.
    pub fn create_delta(&self, peer_timestamp: Timestamp, now: Timestamp) -> Result<EncodedDelta, SizeError> {
        let delta = delta::build_delta(&self.all_transactions(), &self.all_blocks(), peer_timestamp, now);
        delta::encode_delta(&delta, &self.config.delta)
    }

    /// Applies a merge across every local chain and the delta's incoming
    /// transactions/blocks (spec §4.5), recording a `SyncHistoryEntry`
    /// regardless of outcome.
    pub fn merge_delta(mut self, delta: Delta, now: Timestamp) -> Result<MergeOutcome, MergeError> {
        let expected = delta::merkle_root(&delta.transactions, &delta.blocks);
        if expected != delta.merkle_root {
            return Err(MergeError::Merkle(crate::error::MerkleMismatch {
                expected: delta.merkle_root,
                computed: expected,
            }));
        }

        let local_transactions = self.all_transactions();
        let local_chains: Vec<Chain> = self.nodes.values().map(|n| n.chain.clone()).collect();
        let nodes_by_hash: HashMap<String, Node> =
            self.nodes.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        let result = merge::merge(
            local_transactions,
            delta.transactions.clone(),
            &local_chains,
            delta.blocks.clone(),
            &nodes_by_hash,
            &self.config.merge,
            &self.config.consensus,
        );

        let mut warnings = Vec::new();
        for tx in delta.transactions.iter().chain(delta.blocks.iter().flat_map(|b| &b.transactions)) {
            if !self.nodes.contains_key(&tx.owner) {
                warnings.push(format!("unknown owner: {}", tx.owner));
                self = self.add_node(&tx.owner, "unknown");
            }
        }

        for node in self.nodes.values_mut() {
            node.mempool.clear();
        }
        for (owner, txs) in &result.mempool_by_owner {
            if let Some(node) = self.nodes.get_mut(owner) {
                for tx in txs {
                    node.mempool_push(tx.clone());
                }
            }
        }

        for node in self.nodes.values_mut() {
            node.chain.blocks = result.selected_fork.blocks.clone();
        }

        let entry = SyncHistoryEntry {
            timestamp: now,
            merkle_root: delta.merkle_root.clone(),
            conflicts_resolved: delta.transactions.len() + delta.blocks.len(),
            transactions_merged: result.retained_transactions.len(),
            blocks_merged: result.selected_fork.blocks.len(),
            warnings: warnings.clone(),
            completed: true,
        };
        self.sync_history.push(entry.clone());

        info!(
            merged_transactions = entry.transactions_merged,
            merged_blocks = entry.blocks_merged,
            warning_count = warnings.len(),
            "merge complete"
        );

        Ok(MergeOutcome { state: self, entry, warnings })
    }

    pub fn reputation(&self, pubkey: &str) -> f64 {
        self.nodes.get(pubkey).map(|n| n.reputation()).unwrap_or(1.0)
    }

    pub fn consensus_status(&self, question_id: &str) -> ConsensusStatus {
        let by_question = self.attestations_by_question();
        let attestations = by_question.get(question_id).cloned().unwrap_or_default();
        let reputations = self.reputations();
        let question_index = self.curriculum.iter().position(|q| q == question_id).unwrap_or(0);

        let convergence = consensus::weighted_convergence(&attestations, Some(&reputations), &self.config.consensus);
        let ready = consensus::is_ready(
            &attestations,
            self.nodes.len(),
            question_index,
            self.curriculum.len(),
            Some(&reputations),
            &self.config.consensus,
        );

        ConsensusStatus {
            convergence,
            attestation_count: attestations.len(),
            ready,
        }
    }
}

/// Median node reputation, used to seed a newly joined node (spec §4.6).
fn median_reputation(nodes: &BTreeMap<String, Node>) -> Option<f64> {
    if nodes.is_empty() {
        return None;
    }
    let mut values: Vec<f64> = nodes.values().map(|n| n.reputation()).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

pub fn decode_delta(bytes: &[u8]) -> Result<Delta, DecodeError> {
    delta::decode_delta(bytes)
}

/// Result of a successful `State::merge_delta`.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub state: State,
    pub entry: SyncHistoryEntry,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_node_seeds_median_reputation() {
        let cfg = CoreConfig::default();
        let state = State::new(cfg.clone());
        let mut state = state.add_node("alice", "explorer");
        let mut alice = state.nodes.get_mut("alice").unwrap().clone();
        alice.set_reputation(5.0, &cfg.reputation);
        state.nodes.insert("alice".to_string(), alice);

        let state = state.add_node("bob", "builder");
        assert_eq!(state.reputation("bob"), 5.0);
    }

    #[test]
    fn set_current_user_records_the_pubkey() {
        let state = State::new(CoreConfig::default()).add_node("alice", "explorer");
        let state = state.set_current_user("alice");
        assert_eq!(state.current_user.as_deref(), Some("alice"));
    }

    #[test]
    fn submit_registers_unknown_owner_and_dedups() {
        let state = State::new(CoreConfig::default());
        let (state, id) = state.submit("alice", "q1", b"42", TransactionKind::Completion, 100);
        assert!(state.nodes.contains_key("alice"));
        let (state, _) = state.submit("alice", "q1", b"42", TransactionKind::Completion, 100);
        assert_eq!(state.nodes["alice"].mempool.len(), 1);
        assert!(id.contains("alice"));
    }

    #[test]
    fn create_then_decode_round_trip() {
        let state = State::new(CoreConfig::default());
        let (state, _) = state.submit("alice", "q1", b"42", TransactionKind::Attestation, 100);
        let encoded = state.create_delta(0, 200).unwrap();
        let decoded = decode_delta(&encoded.bytes).unwrap();
        assert_eq!(decoded.transactions.len(), 1);
    }

    #[test]
    fn merge_delta_rejects_tampered_root() {
        let state = State::new(CoreConfig::default());
        let (state, _) = state.submit("alice", "q1", b"42", TransactionKind::Attestation, 100);
        let mut delta = delta::build_delta(&state.all_transactions(), &[], -1, 200);
        delta.merkle_root = "tampered".to_string();
        let err = state.merge_delta(delta, 300).unwrap_err();
        assert!(matches!(err, MergeError::Merkle(_)));
    }

    #[test]
    fn aggregation_dedupes_transactions_shared_across_node_chains() {
        let cfg = CoreConfig::default();
        let state = State::new(cfg).add_node("alice", "explorer").add_node("bob", "builder");
        let (mut state, _) = state.submit("alice", "q1", b"42", TransactionKind::Attestation, 0);

        // Simulate what `merge_delta` does after selecting a fork: every
        // node's chain becomes an identical copy of the canonical blocks.
        let block = Block::new(10, "alice".to_string(), state.nodes["alice"].mempool.clone());
        for node in state.nodes.values_mut() {
            node.chain.blocks = vec![block.clone()];
        }

        assert_eq!(state.all_transactions().len(), 1);
        assert_eq!(state.all_blocks().len(), 1);
        assert_eq!(state.attestations_by_question().get("q1").unwrap().len(), 1);
    }

    #[test]
    fn unknown_question_status_is_not_ready() {
        let state = State::new(CoreConfig::default());
        let status = state.consensus_status("missing");
        assert!(!status.ready);
        assert_eq!(status.attestation_count, 0);
    }
}
