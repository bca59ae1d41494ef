//! Reputation engine: proportion-at-time, thought-leader bonus, bounded
//! weight update (spec §4.2).
//!
//! Every function here is pure and takes its tunables from
//! `&ReputationConfig` rather than module-level constants, so a host can
//! probe alternate thresholds without forking the crate — defaults match
//! the spec's literal constants exactly.

use crate::config::ReputationConfig;
use crate::types::{Node, Timestamp, Transaction};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// §4.2 "Proportion at time": the share of the retained, pre-`target`
/// attestation window held by its most common answer hash.
///
/// Strict `<` excludes the target attestation itself, so an attester's
/// own vote never inflates its own proportion (testable property 4).
pub fn proportion_at_time(
    attestations: &[Transaction],
    target_timestamp: Timestamp,
    cfg: &ReputationConfig,
) -> f64 {
    let mut retained: Vec<&Transaction> = attestations
        .iter()
        .filter(|tx| tx.timestamp < target_timestamp)
        .collect();
    retained.sort_by_key(|tx| tx.timestamp);

    if retained.len() > cfg.max_replay_depth {
        retained = retained.split_off(retained.len() - cfg.max_replay_depth);
    }

    if retained.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tx in &retained {
        *counts.entry(tx.payload.hash.as_str()).or_insert(0) += 1;
    }

    let max_count = counts.values().copied().max().unwrap_or(0);
    max_count as f64 / retained.len() as f64
}

/// §4.2 "Bonus multiplier": reward early-correct minority votes only.
pub fn bonus_multiplier(
    proportion_at_time: f64,
    final_hash: &str,
    attestation_hash: &str,
    cfg: &ReputationConfig,
) -> f64 {
    if proportion_at_time < cfg.thought_leader_threshold && attestation_hash == final_hash {
        cfg.thought_leader_bonus
    } else {
        1.0
    }
}

/// §4.2 "Weight": monotone, saturating, defined at `r = 0`.
pub fn weight(reputation: f64) -> f64 {
    (1.0 + reputation).ln()
}

/// §4.2 "Update": bonus-weighted increment, clamped to `[rep_min, rep_max]`.
pub fn update(reputation: f64, bonus: f64, cfg: &ReputationConfig) -> f64 {
    (reputation + bonus * weight(reputation)).clamp(cfg.rep_min, cfg.rep_max)
}

/// §4.2 "Processing rewards for a consensus event": replays the
/// chronologically-sorted, final-hash-matching attestations for one
/// question, committing each reputation update before evaluating the
/// next so later correct attesters see elevated priors.
///
/// Unknown attesters are skipped silently; they never fail the batch.
pub fn process_consensus_rewards(
    attestations: &[Transaction],
    final_hash: &str,
    nodes: &mut BTreeMap<String, Node>,
    cfg: &ReputationConfig,
) {
    let mut matching: Vec<&Transaction> = attestations
        .iter()
        .filter(|tx| tx.payload.hash == final_hash)
        .collect();
    matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.owner.cmp(&b.owner)));

    for tx in matching {
        let Some(node) = nodes.get_mut(&tx.owner) else {
            debug!(owner = %tx.owner, "skipping reputation update for unknown attester");
            continue;
        };

        let proportion = proportion_at_time(attestations, tx.timestamp, cfg);
        let bonus = bonus_multiplier(proportion, final_hash, &tx.payload.hash, cfg);
        let new_reputation = update(node.reputation(), bonus, cfg);
        node.set_reputation(new_reputation, cfg);

        debug!(
            owner = %tx.owner,
            proportion,
            bonus,
            new_reputation,
            "applied reputation update"
        );
    }
}
