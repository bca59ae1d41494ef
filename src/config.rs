//! Tunable constants for every engine, bundled into one `CoreConfig`.
//!
//! Every constant named in the spec's component design sections has a
//! field here with a `Default` impl matching the spec's literal value.
//! Engine functions take `&CoreConfig` (or a sub-config) instead of
//! hard-coding the numbers, so a host can run controlled experiments
//! without forking the crate. Defaults reproduce the spec exactly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationConfig {
    pub thought_leader_threshold: f64,
    pub thought_leader_bonus: f64,
    pub rep_min: f64,
    pub rep_max: f64,
    pub max_replay_depth: usize,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            thought_leader_threshold: 0.5,
            thought_leader_bonus: 2.5,
            rep_min: 0.1,
            rep_max: 10.0,
            max_replay_depth: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub convergence_threshold: f64,
    pub ap_reveal_weight: f64,
    pub base_quorum: usize,
    pub quorum_fraction: f64,
    pub early_progress_quorum: usize,
    pub late_progress_quorum: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            convergence_threshold: 0.7,
            ap_reveal_weight: 10.0,
            base_quorum: 3,
            quorum_fraction: 0.3,
            early_progress_quorum: 2,
            late_progress_quorum: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaConfig {
    /// Hard size contract: `create_delta` must return a payload no larger
    /// than this, or `SizeError`.
    pub max_encoded_bytes: usize,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            max_encoded_bytes: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// §4.5 level 2: timestamp clustering window, in milliseconds.
    pub cluster_window_ms: i64,
    /// §4.5 level 4: block count above which a proposer is penalized.
    pub proposer_repeat_limit: u32,
    /// Penalty subtracted per block beyond `proposer_repeat_limit`.
    pub diversity_penalty_per_excess: f64,
    /// Upper bound on the total diversity penalty.
    pub diversity_penalty_cap: f64,
    /// Ceiling on the diversity bonus's `base` term before penalties.
    pub diversity_base_cap: f64,
    /// Per-block-position recency decay base (`0.95^i`).
    pub recency_decay: f64,
    /// Weight of the reputation term in the hybrid fork weight `W`.
    pub fork_weight_reputation: f64,
    /// Weight of the recency term in the hybrid fork weight `W`.
    pub fork_weight_recency: f64,
    /// Weight of the consensus-strength + diversity term in `W`.
    pub fork_weight_consensus: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            cluster_window_ms: 1000,
            proposer_repeat_limit: 5,
            diversity_penalty_per_excess: 0.10,
            diversity_penalty_cap: 0.50,
            diversity_base_cap: 0.15,
            recency_decay: 0.95,
            fork_weight_reputation: 0.35,
            fork_weight_recency: 0.35,
            fork_weight_consensus: 0.30,
        }
    }
}

/// Root configuration threaded through every engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    pub reputation: ReputationConfig,
    pub consensus: ConsensusConfig,
    pub delta: DeltaConfig,
    pub merge: MergeConfig,
}
