//! Tuning knobs for the search engine and the reference library.
//!
//! Every struct has a `Default` and serde support so a partial JSON config
//! file only needs to name the fields it changes.

use serde::{Deserialize, Serialize};

/// How many ranked generators get to commit for each expanded plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Every applicable generator commits.
    #[default]
    All,
    /// Only the `n` best-ranked generators commit.
    TopK(usize),
    /// Only the single best-ranked generator commits.
    Best,
}

impl CommitPolicy {
    /// Number of speculations to commit out of `available`.
    pub fn limit(self, available: usize) -> usize {
        match self {
            CommitPolicy::All => available,
            CommitPolicy::TopK(n) => available.min(n.max(1)),
            CommitPolicy::Best => available.min(1),
        }
    }
}

/// Configuration for the best-first search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub policy: CommitPolicy,
    /// Frontier size above which the most expensive plans are pruned.
    pub max_frontier: usize,
    /// Upper bound on frontier pops before the search gives up.
    pub max_iterations: usize,
    /// Number of complete plans to collect before stopping.
    pub results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            policy: CommitPolicy::All,
            max_frontier: 4096,
            max_iterations: 100_000,
            results: 1,
        }
    }
}

/// Weights turning traffic shares and resources into a scalar plan cost.
///
/// Traffic weights multiply the fraction of all traffic that ends in each
/// class. Lower cost is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub dropped: f64,
    pub forwarded: f64,
    pub broadcast: f64,
    pub recirculated: f64,
    /// Traffic punted to the switch CPU.
    pub cpu: f64,
    /// Traffic sent to the software controller.
    pub controller: f64,
    /// Cost per bit of placed switch memory.
    pub memory_bit: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        CostWeights {
            dropped: 0.0,
            forwarded: 0.0,
            broadcast: 0.0,
            recirculated: 1.0,
            cpu: 10.0,
            controller: 100.0,
            memory_bit: 1e-7,
        }
    }
}

/// Parameters of the reference generator library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Entries requested for a full match-action table.
    pub table_entries: u64,
    /// Cache sizes tried by the cached table generator, one candidate each.
    pub cache_capacities: Vec<u64>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        LibraryConfig {
            table_entries: 65_536,
            cache_capacities: vec![1024, 4096],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_policy_limits() {
        assert_eq!(CommitPolicy::All.limit(5), 5);
        assert_eq!(CommitPolicy::TopK(2).limit(5), 2);
        assert_eq!(CommitPolicy::TopK(9).limit(5), 5);
        assert_eq!(CommitPolicy::Best.limit(5), 1);
        assert_eq!(CommitPolicy::Best.limit(0), 0);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: SearchConfig = serde_json::from_str(r#"{ "policy": { "top_k": 3 } }"#).unwrap();
        assert_eq!(cfg.policy, CommitPolicy::TopK(3));
        assert_eq!(cfg.results, 1);

        let weights: CostWeights = serde_json::from_str(r#"{ "controller": 5.0 }"#).unwrap();
        assert_eq!(weights.controller, 5.0);
        assert_eq!(weights.cpu, CostWeights::default().cpu);
    }
}
