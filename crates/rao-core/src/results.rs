//! Immutable value snapshots exchanged between optimization steps.
//!
//! - [`SensitivityResult`]: flows and flow sensitivities for one network
//!   snapshot, produced by the external sensitivity computer
//! - [`RangeActionActivation`]: the (range action, state) → setpoint map
//!   produced every iteration; only the best-so-far is retained
//! - [`CostBreakdown`]: functional plus named virtual costs from the
//!   external objective evaluator
//!
//! None of these mutate after creation; iterations communicate by handing
//! fresh snapshots forward.

use crate::cnec::Side;
use crate::ids::{CnecId, RangeActionId, StateId};
use crate::perimeter::OptimizationPerimeter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Outcome of one sensitivity computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensitivityStatus {
    Success,
    Failure,
}

/// Flows and flow sensitivities on one network snapshot.
///
/// Dense maps keyed by entity identifiers: every optimized CNEC side is
/// affected by every range action to some degree, and fillers look values
/// up by id rather than by shared references.
#[derive(Debug, Clone)]
pub struct SensitivityResult {
    status: SensitivityStatus,
    flows: HashMap<(CnecId, Side), f64>,
    commercial_flows: HashMap<(CnecId, Side), f64>,
    ptdf_sums: HashMap<(CnecId, Side), f64>,
    sensitivities: HashMap<(CnecId, Side, RangeActionId), f64>,
}

impl SensitivityResult {
    /// Start building a successful result.
    pub fn builder() -> SensitivityResultBuilder {
        SensitivityResultBuilder::new()
    }

    /// A failed computation carrying no usable values.
    pub fn failure() -> Self {
        Self {
            status: SensitivityStatus::Failure,
            flows: HashMap::new(),
            commercial_flows: HashMap::new(),
            ptdf_sums: HashMap::new(),
            sensitivities: HashMap::new(),
        }
    }

    pub fn status(&self) -> SensitivityStatus {
        self.status
    }

    pub fn is_failure(&self) -> bool {
        self.status == SensitivityStatus::Failure
    }

    /// Flow in MW on (cnec, side), if computed.
    pub fn flow(&self, cnec: &CnecId, side: Side) -> Option<f64> {
        self.flows.get(&(cnec.clone(), side)).copied()
    }

    /// Commercial (exchange-driven) flow in MW on (cnec, side).
    pub fn commercial_flow(&self, cnec: &CnecId, side: Side) -> Option<f64> {
        self.commercial_flows.get(&(cnec.clone(), side)).copied()
    }

    /// Zonal PTDF absolute sum for the relative-margin denominator.
    pub fn ptdf_zonal_sum(&self, cnec: &CnecId, side: Side) -> Option<f64> {
        self.ptdf_sums.get(&(cnec.clone(), side)).copied()
    }

    /// Sensitivity of the (cnec, side) flow to `action`'s setpoint.
    /// Missing entries read as 0.0 (no influence).
    pub fn sensitivity(&self, cnec: &CnecId, side: Side, action: &RangeActionId) -> f64 {
        self.sensitivities
            .get(&(cnec.clone(), side, action.clone()))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Builder for [`SensitivityResult`].
pub struct SensitivityResultBuilder {
    result: SensitivityResult,
}

impl SensitivityResultBuilder {
    pub fn new() -> Self {
        Self {
            result: SensitivityResult {
                status: SensitivityStatus::Success,
                flows: HashMap::new(),
                commercial_flows: HashMap::new(),
                ptdf_sums: HashMap::new(),
                sensitivities: HashMap::new(),
            },
        }
    }

    pub fn flow(mut self, cnec: CnecId, side: Side, mw: f64) -> Self {
        self.result.flows.insert((cnec, side), mw);
        self
    }

    pub fn commercial_flow(mut self, cnec: CnecId, side: Side, mw: f64) -> Self {
        self.result.commercial_flows.insert((cnec, side), mw);
        self
    }

    pub fn ptdf_zonal_sum(mut self, cnec: CnecId, side: Side, sum: f64) -> Self {
        self.result.ptdf_sums.insert((cnec, side), sum);
        self
    }

    pub fn sensitivity(
        mut self,
        cnec: CnecId,
        side: Side,
        action: RangeActionId,
        value: f64,
    ) -> Self {
        self.result.sensitivities.insert((cnec, side, action), value);
        self
    }

    pub fn build(self) -> SensitivityResult {
        self.result
    }
}

impl Default for SensitivityResultBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Mapping (range action, state) → setpoint, with discrete tap positions
/// where the device has them.
///
/// Invariant: exactly one setpoint per eligible pair of the perimeter it
/// was built from. Grouped actions resolve to setpoints consistent with one
/// shared virtual coordinate; the group filler enforces this in the linear
/// problem and the rounder preserves it by rounding the shared coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeActionActivation {
    setpoints: HashMap<(RangeActionId, StateId), f64>,
    taps: HashMap<(RangeActionId, StateId), i32>,
}

impl RangeActionActivation {
    /// Empty activation.
    pub fn new() -> Self {
        Self {
            setpoints: HashMap::new(),
            taps: HashMap::new(),
        }
    }

    /// Activation at pre-perimeter setpoints: every eligible pair (free and
    /// fixed) at its action's initial setpoint, discrete devices at the
    /// nearest position.
    pub fn from_perimeter(perimeter: &OptimizationPerimeter) -> Self {
        let mut activation = Self::new();
        for (action, state) in perimeter.optimized_pairs().chain(perimeter.fixed_pairs()) {
            activation.set(action.id.clone(), state.clone(), action.initial_setpoint);
            if let Some(taps) = &action.taps {
                activation.set_tap(
                    action.id.clone(),
                    state.clone(),
                    taps.nearest_tap(action.initial_setpoint),
                );
            }
        }
        activation
    }

    /// Record a setpoint.
    pub fn set(&mut self, action: RangeActionId, state: StateId, setpoint: f64) {
        self.setpoints.insert((action, state), setpoint);
    }

    /// Record a discrete tap position.
    pub fn set_tap(&mut self, action: RangeActionId, state: StateId, tap: i32) {
        self.taps.insert((action, state), tap);
    }

    /// Setpoint for (action, state), if present.
    pub fn setpoint(&self, action: &RangeActionId, state: &StateId) -> Option<f64> {
        self.setpoints
            .get(&(action.clone(), state.clone()))
            .copied()
    }

    /// Tap position for (action, state), if the device is discrete.
    pub fn tap(&self, action: &RangeActionId, state: &StateId) -> Option<i32> {
        self.taps.get(&(action.clone(), state.clone())).copied()
    }

    /// Iterate over all (action, state, setpoint) entries.
    pub fn entries(&self) -> impl Iterator<Item = (&RangeActionId, &StateId, f64)> {
        self.setpoints.iter().map(|((a, s), v)| (a, s, *v))
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.setpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setpoints.is_empty()
    }

    /// Whether two activations agree on every pair within `tolerance`.
    ///
    /// Differing key sets never compare equal.
    pub fn is_same_as(&self, other: &Self, tolerance: f64) -> bool {
        if self.setpoints.len() != other.setpoints.len() {
            return false;
        }
        self.setpoints.iter().all(|(key, value)| {
            other
                .setpoints
                .get(key)
                .is_some_and(|v| (v - value).abs() <= tolerance)
        })
    }
}

impl Default for RangeActionActivation {
    fn default() -> Self {
        Self::new()
    }
}

/// Cost breakdown: functional cost plus named virtual costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    functional_cost: f64,
    virtual_costs: BTreeMap<String, f64>,
}

impl CostBreakdown {
    pub fn new(functional_cost: f64) -> Self {
        Self {
            functional_cost,
            virtual_costs: BTreeMap::new(),
        }
    }

    /// Attach a named virtual cost (overwrites an existing name).
    pub fn with_virtual_cost(mut self, name: impl Into<String>, cost: f64) -> Self {
        self.virtual_costs.insert(name.into(), cost);
        self
    }

    pub fn functional_cost(&self) -> f64 {
        self.functional_cost
    }

    /// A named virtual cost, 0.0 when absent.
    pub fn virtual_cost(&self, name: &str) -> f64 {
        self.virtual_costs.get(name).copied().unwrap_or(0.0)
    }

    /// Names of all recorded virtual costs, in deterministic order.
    pub fn virtual_cost_names(&self) -> impl Iterator<Item = &str> {
        self.virtual_costs.keys().map(String::as_str)
    }

    /// Functional cost plus the sum of virtual costs.
    pub fn total(&self) -> f64 {
        self.functional_cost + self.virtual_costs.values().sum::<f64>()
    }
}
