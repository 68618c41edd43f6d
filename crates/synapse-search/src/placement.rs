//! Physical resources and the capacity oracle that decides whether they fit.

use std::fmt;

use serde::{Deserialize, Serialize};
use synapse_core::ObjAddr;

/// Identifier of a placed resource, unique within one plan's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Exact-match table populated by the control plane.
    Table,
    /// Table with data-plane insertion and a bounded number of entries.
    CachedTable,
}

/// A request for a resource backing a stateful object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub kind: ResourceKind,
    pub key_bits: u32,
    pub value_bits: u32,
    pub entries: u64,
}

impl ResourceRequest {
    pub fn bits(&self) -> u64 {
        self.entries.saturating_mul(u64::from(self.key_bits + self.value_bits))
    }
}

/// A placed physical resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub obj: ObjAddr,
    pub request: ResourceRequest,
}

impl Resource {
    pub fn bits(&self) -> u64 {
        self.request.bits()
    }
}

/// Running usage of one target's resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityState {
    pub resources: usize,
    pub entries: u64,
    pub bits: u64,
}

/// Decides whether a resource fits next to what is already placed.
pub trait PlacementOracle: Send + Sync {
    fn fits(&self, resource: &Resource, state: &CapacityState) -> bool;

    /// Records `resource` as placed.
    fn commit(&self, resource: &Resource, state: &mut CapacityState) {
        state.resources += 1;
        state.entries += resource.request.entries;
        state.bits += resource.bits();
    }
}

/// Reference oracle: independent upper bounds on count, entries and bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityModel {
    pub max_resources: usize,
    pub max_entries: u64,
    pub max_bits: u64,
}

impl CapacityModel {
    /// A model that accepts everything.
    pub fn unbounded() -> Self {
        CapacityModel {
            max_resources: usize::MAX,
            max_entries: u64::MAX,
            max_bits: u64::MAX,
        }
    }
}

impl Default for CapacityModel {
    fn default() -> Self {
        CapacityModel {
            max_resources: 16,
            max_entries: 1 << 20,
            max_bits: 64 << 20,
        }
    }
}

impl PlacementOracle for CapacityModel {
    fn fits(&self, resource: &Resource, state: &CapacityState) -> bool {
        state.resources < self.max_resources
            && state.entries.saturating_add(resource.request.entries) <= self.max_entries
            && state.bits.saturating_add(resource.bits()) <= self.max_bits
    }
}
