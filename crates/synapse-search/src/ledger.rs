//! The resource ledger carried by every execution plan.
//!
//! A ledger records which data-structure implementation each stateful object
//! uses on each target, the physical resources placed so far, the traffic
//! profile and the accumulated performance counters. Plans own their ledger
//! by value; cloning a plan clones its ledger, so sibling candidates never
//! observe each other's placements.
//!
//! Implementation decisions are monotonic: once an object is bound to an
//! implementation on a target, that binding holds for every descendant plan.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use synapse_core::ObjAddr;
use tracing::debug;

use crate::config::CostWeights;
use crate::error::PlacementError;
use crate::perf::PerfOracle;
use crate::placement::{CapacityState, PlacementOracle, Resource, ResourceId, ResourceRequest};
use crate::profiler::Profiler;
use crate::target::TargetType;

/// Data-structure implementation of a stateful object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsImpl {
    SwitchTable,
    SwitchCachedTable,
    SoftwareMap,
    SoftwareVector,
    SoftwareChain,
}

impl DsImpl {
    pub fn available_on(self, target: TargetType) -> bool {
        match self {
            DsImpl::SwitchTable | DsImpl::SwitchCachedTable => target == TargetType::Switch,
            DsImpl::SoftwareMap | DsImpl::SoftwareVector | DsImpl::SoftwareChain => {
                target.is_software()
            }
        }
    }
}

/// Placement state of one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetState {
    pub capacity: CapacityState,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    impls: BTreeMap<(TargetType, ObjAddr), DsImpl>,
    targets: BTreeMap<TargetType, TargetState>,
    profiler: Profiler,
    perf: PerfOracle,
    extra_cost: f64,
    next_resource: u32,
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::new(Profiler::new())
    }
}

impl Ledger {
    pub fn new(profiler: Profiler) -> Self {
        Ledger {
            impls: BTreeMap::new(),
            targets: BTreeMap::new(),
            profiler,
            perf: PerfOracle::new(),
            extra_cost: 0.0,
            next_resource: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Implementation decisions
    // -----------------------------------------------------------------------

    /// Binds `obj` to `imp` on `target`. Saving the binding already recorded
    /// is a no-op.
    pub fn save_ds_impl(
        &mut self,
        target: TargetType,
        obj: ObjAddr,
        imp: DsImpl,
    ) -> Result<(), PlacementError> {
        if !imp.available_on(target) {
            return Err(PlacementError::WrongTarget { target, imp });
        }
        match self.impls.get(&(target, obj)) {
            Some(existing) if *existing == imp => Ok(()),
            Some(existing) => Err(PlacementError::Conflict {
                target,
                obj,
                existing: *existing,
                requested: imp,
            }),
            None => {
                self.impls.insert((target, obj), imp);
                Ok(())
            }
        }
    }

    /// Returns `true` if `obj` is already bound to exactly `imp` on `target`.
    pub fn check_ds_impl(&self, target: TargetType, obj: ObjAddr, imp: DsImpl) -> bool {
        self.impls.get(&(target, obj)) == Some(&imp)
    }

    /// Returns `true` if binding `obj` to `imp` on `target` would succeed.
    pub fn can_impl_ds(&self, target: TargetType, obj: ObjAddr, imp: DsImpl) -> bool {
        imp.available_on(target) && self.impls.get(&(target, obj)).map_or(true, |e| *e == imp)
    }

    pub fn ds_impl(&self, target: TargetType, obj: ObjAddr) -> Option<DsImpl> {
        self.impls.get(&(target, obj)).copied()
    }

    /// Every binding, ordered by target then object.
    pub fn ds_impls(&self) -> impl Iterator<Item = (TargetType, ObjAddr, DsImpl)> + '_ {
        self.impls.iter().map(|((t, o), i)| (*t, *o, *i))
    }

    // -----------------------------------------------------------------------
    // Physical resources
    // -----------------------------------------------------------------------

    pub fn target_state(&self, target: TargetType) -> Option<&TargetState> {
        self.targets.get(&target)
    }

    pub fn resources(&self, target: TargetType) -> &[Resource] {
        self.targets.get(&target).map_or(&[], |s| s.resources.as_slice())
    }

    pub fn resource_for(&self, target: TargetType, obj: ObjAddr) -> Option<&Resource> {
        self.resources(target).iter().find(|r| r.obj == obj)
    }

    /// Total bits of placed memory across targets.
    pub fn memory_bits(&self) -> u64 {
        self.targets
            .values()
            .flat_map(|s| s.resources.iter())
            .map(Resource::bits)
            .sum()
    }

    /// Returns `true` if [`build_or_reuse`](Self::build_or_reuse) would
    /// succeed, without changing the ledger.
    pub fn would_fit(
        &self,
        oracle: &dyn PlacementOracle,
        target: TargetType,
        obj: ObjAddr,
        imp: DsImpl,
        request: ResourceRequest,
    ) -> bool {
        if !self.can_impl_ds(target, obj, imp) {
            return false;
        }
        if self.check_ds_impl(target, obj, imp) && self.resource_for(target, obj).is_some() {
            return true;
        }
        let state = self.target_state(target).map(|s| s.capacity).unwrap_or_default();
        oracle.fits(&self.candidate_resource(obj, request), &state)
    }

    /// Returns the resource backing `obj` on `target`, placing a new one if
    /// the object has none yet. `None` means the implementation conflicts
    /// with an earlier decision or the placement oracle rejected it.
    pub fn build_or_reuse(
        &mut self,
        oracle: &dyn PlacementOracle,
        target: TargetType,
        obj: ObjAddr,
        imp: DsImpl,
        request: ResourceRequest,
    ) -> Option<ResourceId> {
        if !self.can_impl_ds(target, obj, imp) {
            debug!(%target, %obj, ?imp, "implementation conflicts with an earlier decision");
            return None;
        }
        if self.check_ds_impl(target, obj, imp) {
            if let Some(existing) = self.resource_for(target, obj) {
                return Some(existing.id);
            }
        }

        let resource = self.candidate_resource(obj, request);
        let state = self.targets.entry(target).or_default();
        if !oracle.fits(&resource, &state.capacity) {
            debug!(%target, %obj, bits = resource.bits(), "resource does not fit");
            return None;
        }
        oracle.commit(&resource, &mut state.capacity);
        let id = resource.id;
        state.resources.push(resource);
        self.next_resource += 1;
        self.save_ds_impl(target, obj, imp).ok()?;
        Some(id)
    }

    fn candidate_resource(&self, obj: ObjAddr, request: ResourceRequest) -> Resource {
        Resource {
            id: ResourceId(self.next_resource),
            obj,
            request,
        }
    }

    // -----------------------------------------------------------------------
    // Traffic and cost
    // -----------------------------------------------------------------------

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut Profiler {
        &mut self.profiler
    }

    pub fn perf(&self) -> &PerfOracle {
        &self.perf
    }

    pub fn perf_mut(&mut self) -> &mut PerfOracle {
        &mut self.perf
    }

    /// Adds a fixed, generator-declared cost.
    pub fn add_cost(&mut self, cost: f64) {
        self.extra_cost += cost;
    }

    pub fn cost(&self, weights: &CostWeights) -> f64 {
        self.perf.cost(weights) + self.memory_bits() as f64 * weights.memory_bit + self.extra_cost
    }
}
