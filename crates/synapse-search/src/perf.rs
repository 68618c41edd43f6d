//! Additive traffic-class counters.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::CostWeights;

/// Fractions of all traffic ending in each class, as accumulated by the
/// modules of a plan.
///
/// Generators that emit a terminal or a cross-target module add the share of
/// traffic reaching that node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerfOracle {
    pub dropped: f64,
    pub forwarded: BTreeMap<u32, f64>,
    pub broadcast: f64,
    /// Traffic sent back through the pipeline, per recirculation port.
    pub recirculated: BTreeMap<u32, f64>,
    pub cpu: f64,
    pub controller: f64,
}

impl PerfOracle {
    pub fn new() -> Self {
        PerfOracle::default()
    }

    pub fn add_dropped(&mut self, share: f64) {
        self.dropped += share;
    }

    pub fn add_forwarded(&mut self, port: u32, share: f64) {
        *self.forwarded.entry(port).or_insert(0.0) += share;
    }

    pub fn add_broadcast(&mut self, share: f64) {
        self.broadcast += share;
    }

    pub fn add_recirculated(&mut self, port: u32, share: f64) {
        *self.recirculated.entry(port).or_insert(0.0) += share;
    }

    pub fn add_cpu(&mut self, share: f64) {
        self.cpu += share;
    }

    pub fn add_controller(&mut self, share: f64) {
        self.controller += share;
    }

    /// Adds every counter of `other` into `self`.
    pub fn merge(&mut self, other: &PerfOracle) {
        self.dropped += other.dropped;
        for (port, share) in &other.forwarded {
            self.add_forwarded(*port, *share);
        }
        self.broadcast += other.broadcast;
        for (port, share) in &other.recirculated {
            self.add_recirculated(*port, *share);
        }
        self.cpu += other.cpu;
        self.controller += other.controller;
    }

    pub fn total_forwarded(&self) -> f64 {
        self.forwarded.values().sum()
    }

    pub fn total_recirculated(&self) -> f64 {
        self.recirculated.values().sum()
    }

    /// Share of traffic whose fate is settled by a terminal module.
    pub fn handled(&self) -> f64 {
        self.dropped + self.total_forwarded() + self.broadcast
    }

    pub fn cost(&self, weights: &CostWeights) -> f64 {
        self.dropped * weights.dropped
            + self.total_forwarded() * weights.forwarded
            + self.broadcast * weights.broadcast
            + self.total_recirculated() * weights.recirculated
            + self.cpu * weights.cpu
            + self.controller * weights.controller
    }
}
