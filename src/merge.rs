//! Four-level conflict resolution and hybrid fork selection (spec §4.5).

use crate::config::{ConsensusConfig, MergeConfig};
use crate::consensus::weighted_convergence;
use crate::reputation::weight;
use crate::types::{Block, Chain, Node, Transaction};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

fn reputation_of(nodes: &HashMap<String, Node>, owner: &str) -> f64 {
    nodes.get(owner).map(|n| n.reputation()).unwrap_or(1.0)
}

fn weight_of(nodes: &HashMap<String, Node>, owner: &str) -> f64 {
    weight(reputation_of(nodes, owner))
}

/// §4.5 level 1: one transaction per distinct `id`, highest-reputation
/// owner wins ties broken by ascending public-key string.
pub fn level1_identity(transactions: Vec<Transaction>, nodes: &HashMap<String, Node>) -> Vec<Transaction> {
    let mut groups: HashMap<String, Vec<Transaction>> = HashMap::new();
    for tx in transactions {
        groups.entry(tx.id.clone()).or_default().push(tx);
    }

    let mut out = Vec::with_capacity(groups.len());
    for (_, mut group) in groups {
        if group.len() > 1 {
            group.sort_by(|a, b| {
                weight_of(nodes, &b.owner)
                    .partial_cmp(&weight_of(nodes, &a.owner))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.owner.cmp(&b.owner))
            });
        }
        out.push(group.into_iter().next().expect("group is non-empty"));
    }
    out
}

/// §4.5 level 2: clusters transactions within `cluster_window_ms` of each
/// other, normalizing only their ordering (descending weight, ascending
/// owner, ascending timestamp); every member is retained.
pub fn level2_cluster(mut transactions: Vec<Transaction>, nodes: &HashMap<String, Node>, cfg: &MergeConfig) -> Vec<Transaction> {
    transactions.sort_by_key(|tx| tx.timestamp);

    let mut clusters: Vec<Vec<Transaction>> = Vec::new();
    for tx in transactions {
        let starts_new_cluster = match clusters.last().and_then(|c| c.last()) {
            Some(last) => tx.timestamp - last.timestamp > cfg.cluster_window_ms,
            None => true,
        };
        if starts_new_cluster {
            clusters.push(vec![tx]);
        } else {
            clusters.last_mut().unwrap().push(tx);
        }
    }

    let mut out = Vec::new();
    for mut cluster in clusters {
        if cluster.len() > 1 {
            cluster.sort_by(|a, b| {
                weight_of(nodes, &b.owner)
                    .partial_cmp(&weight_of(nodes, &a.owner))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.owner.cmp(&b.owner))
                    .then_with(|| a.timestamp.cmp(&b.timestamp))
            });
        }
        out.extend(cluster);
    }
    out
}

/// §4.5 level 3: keeps only the latest transaction per `(owner,
/// question_id)` — a student's revision supersedes their earlier attempt.
pub fn level3_latest(transactions: Vec<Transaction>) -> Vec<Transaction> {
    let mut latest: HashMap<(String, String), Transaction> = HashMap::new();
    for tx in transactions {
        let key = (tx.owner.clone(), tx.question_id.clone());
        match latest.get(&key) {
            Some(existing) if existing.timestamp >= tx.timestamp => {}
            _ => {
                latest.insert(key, tx);
            }
        }
    }

    let mut out: Vec<Transaction> = latest.into_values().collect();
    out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.owner.cmp(&b.owner)));
    out
}

/// A candidate chain extension considered by hybrid fork selection.
#[derive(Debug, Clone)]
pub struct ForkCandidate {
    pub blocks: Vec<Block>,
}

impl ForkCandidate {
    pub fn height(&self) -> usize {
        self.blocks.len()
    }

    pub fn terminal_hash(&self) -> Option<&str> {
        self.blocks.last().map(|b| b.hash.as_str())
    }
}

/// §4.5 level 4 diversity bonus: rewards proposer variety, penalizes a
/// proposer dominating a fork.
pub fn diversity_bonus(fork: &ForkCandidate, cfg: &MergeConfig) -> f64 {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for block in &fork.blocks {
        *counts.entry(block.proposer.as_str()).or_insert(0) += 1;
    }

    let distinct_proposers = counts.len() as f64;
    let base = if distinct_proposers >= 3.0 {
        (distinct_proposers / 10.0 * cfg.diversity_base_cap).clamp(0.0, cfg.diversity_base_cap)
    } else {
        0.5 * cfg.diversity_base_cap * distinct_proposers / 3.0
    };

    let mut penalty = 0.0;
    for count in counts.values() {
        if *count > cfg.proposer_repeat_limit {
            let excess = (*count - cfg.proposer_repeat_limit) as f64;
            penalty += cfg.diversity_penalty_per_excess * excess;
        }
    }
    penalty = penalty.min(cfg.diversity_penalty_cap);

    (base - penalty).max(0.0)
}

/// §4.5 level 4 hybrid fork weight `W`.
pub fn fork_weight(
    fork: &ForkCandidate,
    nodes: &HashMap<String, Node>,
    merge_cfg: &MergeConfig,
    consensus_cfg: &ConsensusConfig,
) -> f64 {
    let reputation_term: f64 = fork.blocks.iter().map(|b| weight_of(nodes, &b.proposer)).sum();
    let recency_term: f64 = (0..fork.blocks.len())
        .map(|i| merge_cfg.recency_decay.powi(i as i32))
        .sum();

    let touched_questions: BTreeSet<&str> = fork
        .blocks
        .iter()
        .flat_map(|b| b.transactions.iter().map(|tx| tx.question_id.as_str()))
        .collect();

    let consensus_strength = if touched_questions.is_empty() {
        0.0
    } else {
        let reputations: HashMap<String, f64> =
            nodes.iter().map(|(k, v)| (k.clone(), v.reputation())).collect();
        let sum: f64 = touched_questions
            .iter()
            .map(|question| {
                let attestations: Vec<Transaction> = fork
                    .blocks
                    .iter()
                    .flat_map(|b| b.transactions.iter().filter(|tx| tx.question_id == *question).cloned())
                    .collect();
                weighted_convergence(&attestations, Some(&reputations), consensus_cfg)
            })
            .sum();
        sum / touched_questions.len() as f64
    };

    let diversity = diversity_bonus(fork, merge_cfg);

    merge_cfg.fork_weight_reputation * reputation_term
        + merge_cfg.fork_weight_recency * recency_term
        + merge_cfg.fork_weight_consensus * (consensus_strength + diversity)
}

/// §4.5 level 4: builds one candidate per local chain (unchanged, and
/// extended by any peer blocks proposed by that chain's terminal
/// proposer), then selects the maximum-weight candidate. Ties broken by
/// greater height, then ascending hash of the terminal block.
pub fn select_fork(
    local_chains: &[Chain],
    peer_blocks: &[Block],
    nodes: &HashMap<String, Node>,
    merge_cfg: &MergeConfig,
    consensus_cfg: &ConsensusConfig,
) -> ForkCandidate {
    let mut candidates: Vec<ForkCandidate> = Vec::new();

    for chain in local_chains {
        let mut blocks = chain.blocks.clone();
        if let Some(tip) = chain.tip() {
            let mut extension: Vec<Block> = peer_blocks
                .iter()
                .filter(|b| b.proposer == tip.proposer && !blocks.iter().any(|existing| existing.hash == b.hash))
                .cloned()
                .collect();
            extension.sort_by_key(|b| b.timestamp);
            blocks.extend(extension);
        }
        candidates.push(ForkCandidate { blocks });
    }

    if candidates.is_empty() {
        let mut blocks = peer_blocks.to_vec();
        blocks.sort_by_key(|b| b.timestamp);
        candidates.push(ForkCandidate { blocks });
    }

    candidates
        .into_iter()
        .map(|candidate| {
            let w = fork_weight(&candidate, nodes, merge_cfg, consensus_cfg);
            (candidate, w)
        })
        .max_by(|(a, wa), (b, wb)| {
            wa.partial_cmp(wb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.height().cmp(&b.height()))
                .then_with(|| b.terminal_hash().cmp(&a.terminal_hash()))
        })
        .map(|(candidate, _)| candidate)
        .expect("at least one candidate is always produced")
}

/// The full merge pipeline (levels 1-4), partitioning the survivors into
/// mempool-bound and chain-bound transactions per owner.
pub struct MergeResult {
    pub selected_fork: ForkCandidate,
    pub retained_transactions: Vec<Transaction>,
    pub mempool_by_owner: HashMap<String, Vec<Transaction>>,
}

pub fn merge(
    local_transactions: Vec<Transaction>,
    peer_transactions: Vec<Transaction>,
    local_chains: &[Chain],
    peer_blocks: Vec<Block>,
    nodes: &HashMap<String, Node>,
    merge_cfg: &MergeConfig,
    consensus_cfg: &ConsensusConfig,
) -> MergeResult {
    let mut all_transactions = local_transactions;
    all_transactions.extend(peer_transactions);

    let after_identity = level1_identity(all_transactions, nodes);
    debug!(count = after_identity.len(), "level 1 identity resolution complete");

    let after_clustering = level2_cluster(after_identity, nodes, merge_cfg);
    let retained_transactions = level3_latest(after_clustering);
    debug!(count = retained_transactions.len(), "level 3 latest-per-owner-question complete");

    let selected_fork = select_fork(local_chains, &peer_blocks, nodes, merge_cfg, consensus_cfg);
    let chain_tx_ids: std::collections::HashSet<&str> = selected_fork
        .blocks
        .iter()
        .flat_map(|b| b.transactions.iter().map(|tx| tx.id.as_str()))
        .collect();

    let mut mempool_by_owner: HashMap<String, Vec<Transaction>> = HashMap::new();
    for tx in &retained_transactions {
        if !chain_tx_ids.contains(tx.id.as_str()) {
            mempool_by_owner.entry(tx.owner.clone()).or_default().push(tx.clone());
        }
    }

    MergeResult {
        selected_fork,
        retained_transactions,
        mempool_by_owner,
    }
}
