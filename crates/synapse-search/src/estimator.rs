//! Cache hit-rate estimation.
//!
//! The estimator is a seam: generators that size caches ask the
//! [`SearchEnv`](crate::SearchEnv)'s estimator instead of hard-coding a
//! traffic model.

use crate::profiler::FlowStats;

/// Estimates the fraction of packets a cache with `capacity` entries serves.
pub trait HitRateEstimator: Send + Sync {
    fn cache_hit_rate(&self, stats: &FlowStats, capacity: u64) -> f64;
}

/// Assumes flows are independent and the cache keeps the heaviest ones.
///
/// The top-k flows occupy the first entries; any remaining capacity holds
/// average-sized flows drawn from the rest, bounded by the packets those
/// flows actually carry.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndependentFlowEstimator;

impl HitRateEstimator for IndependentFlowEstimator {
    fn cache_hit_rate(&self, stats: &FlowStats, capacity: u64) -> f64 {
        if stats.total_packets == 0 || capacity == 0 {
            return 0.0;
        }
        let slots = usize::try_from(capacity).unwrap_or(usize::MAX);
        let heavy: u64 = stats.top_k.iter().take(slots).sum();

        let known: u64 = stats.top_k.iter().sum();
        let rest_packets = stats.total_packets.saturating_sub(known);
        let rest_flows = stats.total_flows.saturating_sub(stats.top_k.len() as u64);
        let spare = capacity.saturating_sub(stats.top_k.len() as u64);
        let light = if rest_flows == 0 {
            0.0
        } else {
            let avg = rest_packets as f64 / rest_flows as f64;
            (avg * spare as f64).min(rest_packets as f64)
        };

        ((heavy as f64 + light) / stats.total_packets as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_core::Expr;

    fn stats(total_packets: u64, total_flows: u64, top_k: Vec<u64>) -> FlowStats {
        FlowStats {
            key: Expr::symbol("k", 32),
            total_packets,
            total_flows,
            top_k,
        }
    }

    #[test]
    fn uniform_flows_scale_with_capacity() {
        let s = stats(1000, 100, vec![]);
        let est = IndependentFlowEstimator;
        assert!((est.cache_hit_rate(&s, 10) - 0.1).abs() < 1e-9);
        assert!((est.cache_hit_rate(&s, 1000) - 1.0).abs() < 1e-9);
        assert_eq!(est.cache_hit_rate(&s, 0), 0.0);
    }

    #[test]
    fn heavy_hitters_fill_small_caches() {
        let s = stats(1000, 101, vec![800]);
        let est = IndependentFlowEstimator;
        assert!((est.cache_hit_rate(&s, 1) - 0.8).abs() < 1e-9);
        assert!((est.cache_hit_rate(&s, 11) - 0.82).abs() < 1e-9);
    }

    #[test]
    fn hit_rate_is_monotonic_in_capacity() {
        let s = stats(10_000, 500, vec![3000, 1000, 500]);
        let est = IndependentFlowEstimator;
        let rates: Vec<f64> = [1, 2, 3, 10, 100, 1000]
            .iter()
            .map(|c| est.cache_hit_rate(&s, *c))
            .collect();
        assert!(rates.windows(2).all(|w| w[0] <= w[1]));
        assert!(rates[rates.len() - 1] <= 1.0);
    }

    #[test]
    fn empty_stats_never_hit() {
        assert_eq!(IndependentFlowEstimator.cache_hit_rate(&stats(0, 0, vec![]), 64), 0.0);
    }
}
