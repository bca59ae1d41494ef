//! Benchmarks for the consensus and merge hot paths.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pok_core::config::{ConsensusConfig, MergeConfig};
use pok_core::consensus::weighted_convergence;
use pok_core::merge::merge;
use pok_core::types::{Payload, Transaction, TransactionKind};
use std::collections::HashMap;

fn make_attestations(n: usize) -> Vec<Transaction> {
    (0..n)
        .map(|i| Transaction {
            id: format!("tx{i}"),
            timestamp: i as i64,
            owner: format!("node{}", i % 30),
            question_id: "q1".to_string(),
            kind: TransactionKind::Attestation,
            payload: Payload {
                answer: vec![],
                hash: if i % 3 == 0 { "H_A".to_string() } else { "H_B".to_string() },
            },
        })
        .collect()
}

fn bench_weighted_convergence(c: &mut Criterion) {
    let cfg = ConsensusConfig::default();
    let attestations = make_attestations(200);

    c.bench_function("weighted_convergence_200", |b| {
        b.iter(|| weighted_convergence(black_box(&attestations), None, black_box(&cfg)))
    });
}

fn bench_merge_pipeline(c: &mut Criterion) {
    let merge_cfg = MergeConfig::default();
    let consensus_cfg = ConsensusConfig::default();
    let nodes = HashMap::new();
    let local = make_attestations(200);
    let peer = make_attestations(200);

    c.bench_function("merge_400_transactions", |b| {
        b.iter(|| {
            merge(
                black_box(local.clone()),
                black_box(peer.clone()),
                &[],
                vec![],
                black_box(&nodes),
                black_box(&merge_cfg),
                black_box(&consensus_cfg),
            )
        })
    });
}

criterion_group!(benches, bench_weighted_convergence, bench_merge_pipeline);
criterion_main!(benches);
