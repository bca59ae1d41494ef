//! Property-based tests for the universal invariants.

use pok_core::config::{ConsensusConfig, CoreConfig, MergeConfig, ReputationConfig};
use pok_core::consensus::{dynamic_quorum, weighted_convergence};
use pok_core::merge::merge;
use pok_core::reputation::update;
use pok_core::types::{Payload, Transaction, TransactionKind};
use proptest::prelude::*;
use std::collections::HashMap;

fn attestation(owner: &str, ts: i64, hash: &str) -> Transaction {
    Transaction {
        id: format!("{owner}-{ts}"),
        timestamp: ts,
        owner: owner.to_string(),
        question_id: "q".to_string(),
        kind: TransactionKind::Attestation,
        payload: Payload {
            answer: vec![],
            hash: hash.to_string(),
        },
    }
}

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (
        prop::sample::select(vec!["t1", "t2", "t3"]),
        prop::sample::select(vec!["alice", "bob", "carol"]),
        prop::sample::select(vec!["q1", "q2"]),
        0i64..20,
        prop::sample::select(vec!["H_A", "H_B"]),
    )
        .prop_map(|(id, owner, question_id, timestamp, hash)| Transaction {
            id: id.to_string(),
            timestamp,
            owner: owner.to_string(),
            question_id: question_id.to_string(),
            kind: TransactionKind::Attestation,
            payload: Payload {
                answer: vec![],
                hash: hash.to_string(),
            },
        })
}

proptest! {
    /// Property 1: reputation stays within [rep_min, rep_max] after any
    /// sequence of bounded updates.
    #[test]
    fn reputation_bounds_hold(
        start in 0.1_f64..10.0,
        bonuses in prop::collection::vec(1.0_f64..2.5, 0..200),
    ) {
        let cfg = ReputationConfig::default();
        let mut r = start;
        for bonus in bonuses {
            r = update(r, bonus, &cfg);
            prop_assert!(r >= cfg.rep_min && r <= cfg.rep_max);
        }
    }

    /// Property 9: dynamic quorum never decreases as active_nodes grows.
    #[test]
    fn quorum_is_monotone(a in 0usize..500, delta in 0usize..500) {
        let cfg = ConsensusConfig::default();
        let b = a + delta;
        prop_assert!(dynamic_quorum(b, &cfg) >= dynamic_quorum(a, &cfg));
    }

    /// Property 10: weighted convergence is always in [0, 1].
    #[test]
    fn convergence_is_always_bounded(
        hashes in prop::collection::vec(prop::sample::select(vec!["H_A", "H_B", "H_C"]), 0..100),
    ) {
        let cfg = ConsensusConfig::default();
        let attestations: Vec<Transaction> = hashes
            .into_iter()
            .enumerate()
            .map(|(i, hash)| attestation(&format!("node{i}"), i as i64, hash))
            .collect();
        let c = weighted_convergence(&attestations, None, &cfg);
        prop_assert!((0.0..=1.0).contains(&c));
    }

    /// Property 2: determinism — replaying the same operation sequence
    /// against two independently constructed initial states produces
    /// structurally identical states.
    #[test]
    fn replaying_the_same_ops_is_deterministic(
        ops in prop::collection::vec(
            (
                prop::sample::select(vec!["alice", "bob", "carol"]),
                prop::sample::select(vec!["q1", "q2"]),
                0u8..4,
                0i64..1000,
            ),
            0..30,
        ),
    ) {
        let run = |ops: &[(&'static str, &'static str, u8, i64)]| {
            let mut state = pok_core::init(CoreConfig::default());
            for (owner, question, answer, ts) in ops {
                let (next, _) = pok_core::submit(state, owner, question, &[*answer], TransactionKind::Attestation, *ts);
                state = next;
            }
            state
        };

        let a = run(&ops);
        let b = run(&ops);
        prop_assert_eq!(a, b);
    }

    /// Property 5: zero-loss merge — every transaction on either side of
    /// a merge survives by id, or is superseded by a transaction with the
    /// same (owner, question_id) and a strictly later timestamp.
    #[test]
    fn merge_never_drops_a_transaction_without_a_newer_replacement(
        local in prop::collection::vec(arb_transaction(), 0..20),
        peer in prop::collection::vec(arb_transaction(), 0..20),
    ) {
        let nodes = HashMap::new();
        let merge_cfg = MergeConfig::default();
        let consensus_cfg = ConsensusConfig::default();

        let result = merge(local.clone(), peer.clone(), &[], vec![], &nodes, &merge_cfg, &consensus_cfg);

        for t in local.iter().chain(peer.iter()) {
            let same_id = result.retained_transactions.iter().any(|r| r.id == t.id);
            let superseded = result
                .retained_transactions
                .iter()
                .any(|r| r.owner == t.owner && r.question_id == t.question_id && r.timestamp > t.timestamp);
            prop_assert!(same_id || superseded);
        }
    }
}
