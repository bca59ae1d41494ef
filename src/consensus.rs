//! Consensus engine: weighted convergence, dynamic/progressive quorum,
//! readiness, consensus-answer selection, and block proposal (spec §4.3).

use crate::config::ConsensusConfig;
use crate::reputation::weight;
use crate::types::{Transaction, TransactionKind};
use std::collections::HashMap;

/// Per-attestation weight: `AP_REVEAL_WEIGHT` for an AP reveal,
/// `ln(1+reputation)` in weighted mode, `1.0` otherwise.
pub fn attestation_weight(
    tx: &Transaction,
    reputations: Option<&HashMap<String, f64>>,
    cfg: &ConsensusConfig,
) -> f64 {
    if tx.kind == TransactionKind::ApReveal {
        return cfg.ap_reveal_weight;
    }
    match reputations {
        Some(reps) => weight(reps.get(&tx.owner).copied().unwrap_or(1.0)),
        None => 1.0,
    }
}

/// §4.3 "Weighted convergence": dominant answer's share of total weight.
/// Empty input converges to `0.0`.
pub fn weighted_convergence(
    attestations: &[Transaction],
    reputations: Option<&HashMap<String, f64>>,
    cfg: &ConsensusConfig,
) -> f64 {
    if attestations.is_empty() {
        return 0.0;
    }

    let mut totals_by_hash: HashMap<&str, f64> = HashMap::new();
    let mut total_weight = 0.0;
    for tx in attestations {
        let w = attestation_weight(tx, reputations, cfg);
        *totals_by_hash.entry(tx.payload.hash.as_str()).or_insert(0.0) += w;
        total_weight += w;
    }

    if total_weight <= 0.0 {
        return 0.0;
    }

    let max_weight = totals_by_hash.values().cloned().fold(0.0_f64, f64::max);
    max_weight / total_weight
}

/// §4.3 "Consensus answer": the dominant `payload.hash`, ties broken by
/// ascending hex string.
pub fn consensus_answer(
    attestations: &[Transaction],
    reputations: Option<&HashMap<String, f64>>,
    cfg: &ConsensusConfig,
) -> Option<String> {
    let mut totals_by_hash: HashMap<&str, f64> = HashMap::new();
    for tx in attestations {
        let w = attestation_weight(tx, reputations, cfg);
        *totals_by_hash.entry(tx.payload.hash.as_str()).or_insert(0.0) += w;
    }

    totals_by_hash
        .into_iter()
        .max_by(|(hash_a, weight_a), (hash_b, weight_b)| {
            weight_a
                .partial_cmp(weight_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| hash_b.cmp(hash_a))
        })
        .map(|(hash, _)| hash.to_string())
}

/// §4.3 "Dynamic quorum": `max(BASE_QUORUM, floor(QUORUM_FRACTION * active_nodes))`.
pub fn dynamic_quorum(active_nodes: usize, cfg: &ConsensusConfig) -> usize {
    let fractional = (cfg.quorum_fraction * active_nodes as f64).floor() as usize;
    cfg.base_quorum.max(fractional)
}

/// §4.3 "Progressive quorum": early-curriculum questions need fewer
/// attestations than late-curriculum ones.
pub fn progressive_quorum(question_index: usize, curriculum_size: usize, cfg: &ConsensusConfig) -> usize {
    if question_index < curriculum_size / 2 {
        cfg.early_progress_quorum
    } else {
        cfg.late_progress_quorum
    }
}

/// §4.3 "Effective quorum": the stricter of dynamic and progressive.
pub fn effective_quorum(
    active_nodes: usize,
    question_index: usize,
    curriculum_size: usize,
    cfg: &ConsensusConfig,
) -> usize {
    dynamic_quorum(active_nodes, cfg).max(progressive_quorum(question_index, curriculum_size, cfg))
}

/// §4.3 "Readiness check": enough attestations, converged enough.
pub fn is_ready(
    attestations: &[Transaction],
    active_nodes: usize,
    question_index: usize,
    curriculum_size: usize,
    reputations: Option<&HashMap<String, f64>>,
    cfg: &ConsensusConfig,
) -> bool {
    let quorum = effective_quorum(active_nodes, question_index, curriculum_size, cfg);
    attestations.len() >= quorum
        && weighted_convergence(attestations, reputations, cfg) >= cfg.convergence_threshold
}

/// The transactions a node would mine into a new PoK block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Proposal {
    pub completions: Vec<Transaction>,
    pub attestations: Vec<Transaction>,
}

impl Proposal {
    pub fn is_empty(&self) -> bool {
        self.completions.is_empty() && self.attestations.is_empty()
    }
}

/// §4.3 "Block proposal protocol": every ready completion in the
/// proposer's mempool, plus every mempool attestation referencing a
/// question that became ready. Pure function of its inputs, so calling
/// it twice with an unchanged mempool yields an empty proposal the
/// second time (testable property 8) once the first proposal's
/// transactions have been moved out of the mempool by the caller.
pub fn propose(
    owner_mempool: &[Transaction],
    attestations_by_question: &HashMap<String, Vec<Transaction>>,
    active_nodes: usize,
    curriculum: &[String],
    reputations: Option<&HashMap<String, f64>>,
    cfg: &ConsensusConfig,
) -> Proposal {
    let mut completions = Vec::new();
    let mut ready_questions = std::collections::HashSet::new();

    for tx in owner_mempool.iter().filter(|tx| tx.kind == TransactionKind::Completion) {
        let atts = attestations_by_question
            .get(&tx.question_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let question_index = curriculum
            .iter()
            .position(|q| q == &tx.question_id)
            .unwrap_or(0);

        if is_ready(atts, active_nodes, question_index, curriculum.len(), reputations, cfg) {
            completions.push(tx.clone());
            ready_questions.insert(tx.question_id.clone());
        }
    }

    let attestations = owner_mempool
        .iter()
        .filter(|tx| tx.kind != TransactionKind::Completion && ready_questions.contains(&tx.question_id))
        .cloned()
        .collect();

    Proposal { completions, attestations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;

    fn tx(kind: TransactionKind, owner: &str, question: &str, hash: &str, ts: i64) -> Transaction {
        Transaction {
            id: format!("{owner}-{question}-{ts}"),
            timestamp: ts,
            owner: owner.to_string(),
            question_id: question.to_string(),
            kind,
            payload: Payload {
                answer: vec![],
                hash: hash.to_string(),
            },
        }
    }

    /// Seed scenario S2.
    #[test]
    fn convergence_with_ap_reveal_s2() {
        let cfg = ConsensusConfig::default();
        let attestations = vec![
            tx(TransactionKind::Attestation, "a", "q", "H_A", 0),
            tx(TransactionKind::Attestation, "b", "q", "H_A", 1),
            tx(TransactionKind::Attestation, "c", "q", "H_B", 2),
            tx(TransactionKind::ApReveal, "teacher", "q", "H_A", 3),
        ];

        let unweighted: Vec<Transaction> = attestations
            .iter()
            .cloned()
            .filter(|t| t.kind != TransactionKind::ApReveal)
            .collect();
        let plain_convergence = weighted_convergence(&unweighted, None, &cfg);
        assert!((plain_convergence - 0.75).abs() < 1e-9);

        let weighted = weighted_convergence(&attestations, None, &cfg);
        assert!((weighted - 12.0 / 13.0).abs() < 1e-9);
    }

    /// Seed scenario S3.
    #[test]
    fn dynamic_quorum_s3() {
        let cfg = ConsensusConfig::default();
        assert_eq!(dynamic_quorum(5, &cfg), 3);
        assert_eq!(dynamic_quorum(20, &cfg), 6);
        assert_eq!(dynamic_quorum(40, &cfg), 12);
    }

    #[test]
    fn quorum_is_monotone_in_active_nodes() {
        let cfg = ConsensusConfig::default();
        let mut previous = dynamic_quorum(0, &cfg);
        for n in 1..200 {
            let current = dynamic_quorum(n, &cfg);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn convergence_is_bounded() {
        let cfg = ConsensusConfig::default();
        let attestations = vec![
            tx(TransactionKind::Attestation, "a", "q", "H_A", 0),
            tx(TransactionKind::Attestation, "b", "q", "H_B", 1),
        ];
        let c = weighted_convergence(&attestations, None, &cfg);
        assert!((0.0..=1.0).contains(&c));
        assert_eq!(weighted_convergence(&[], None, &cfg), 0.0);
    }

    #[test]
    fn proposal_is_idempotent_on_unchanged_mempool() {
        let cfg = ConsensusConfig::default();
        let curriculum = vec!["q".to_string()];
        let completion = tx(TransactionKind::Completion, "alice", "q", "H_A", 100);
        let mempool = vec![completion];
        let mut by_question = HashMap::new();
        by_question.insert(
            "q".to_string(),
            vec![
                tx(TransactionKind::Attestation, "a", "q", "H_A", 0),
                tx(TransactionKind::Attestation, "b", "q", "H_A", 1),
                tx(TransactionKind::Attestation, "c", "q", "H_A", 2),
            ],
        );

        let first = propose(&mempool, &by_question, 10, &curriculum, None, &cfg);
        assert!(!first.is_empty());

        // Once the proposal's transactions are removed from the mempool
        // (the state manager's job), a second call sees nothing to mine.
        let second = propose(&[], &by_question, 10, &curriculum, None, &cfg);
        assert!(second.is_empty());
    }
}
