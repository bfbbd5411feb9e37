//! Optimizer configuration.
//!
//! Plain serde-serializable structs with defaults, so a study pipeline can
//! embed the optimizer settings in its parameter files. The filler list of
//! the linear problem is assembled from these flags at build time; there is
//! no runtime reflection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How discretizable devices are modeled in the linear problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapModel {
    /// Keep setpoints continuous and defer discretization to the tap
    /// rounder, with one refinement re-solve around the rounded candidate.
    /// Faster; the default.
    ApproximatedIntegers,
    /// Model taps as explicit integer variables with up/down direction
    /// indicators. Exact, slower.
    ExactIntegers,
}

/// Which margin objective the problem maximizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginObjective {
    /// Maximize the minimum margin in MW.
    Absolute,
    /// Maximize the minimum margin divided by the zonal PTDF sum when
    /// positive; negative margins stay absolute.
    Relative,
}

/// Caps on how many range actions may deviate from their pre-perimeter
/// setpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeActionLimits {
    /// Cap on the total number of used range actions
    pub max_active_range_actions: Option<usize>,
    /// Per-operator caps, keyed by operator name
    pub max_per_operator: BTreeMap<String, usize>,
}

/// Solver backend configuration, fixed once at problem construction.
///
/// Carried in parameter files but not yet forwarded to the backend; the
/// clarabel path in particular has no time-limit or gap hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum solve time (seconds), applied where the backend supports it
    pub max_time_seconds: f64,
    /// MIP optimality gap tolerance, applied where the backend supports it
    pub mip_gap: f64,
    /// Whether to enable verbose solver output
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_time_seconds: 10.0,
            mip_gap: 1e-4,
            verbose: false,
        }
    }
}

/// Configuration of the iterating linear optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearOptimizerConfig {
    /// Iteration cap of the outer loop
    pub max_iterations: usize,
    /// Per-pair setpoint tolerance for declaring convergence
    pub convergence_tolerance: f64,
    /// Discrete device modeling mode
    pub tap_model: TapModel,
    /// Margin objective variant
    pub margin_objective: MarginObjective,
    /// Objective penalty per unit of setpoint variation (damps drift
    /// between equivalent optima)
    pub setpoint_variation_penalty: f64,
    /// Sensitivities below this magnitude are dropped from the flow
    /// linearization
    pub sensitivity_threshold: f64,
    /// Objective cost per MW of monitored-only violation
    pub mnec_violation_cost: f64,
    /// Objective cost per MW of loop-flow violation
    pub loop_flow_violation_cost: f64,
    /// Floor for the zonal PTDF sum in the relative-margin denominator
    pub ptdf_sum_lower_bound: f64,
    /// Tolerated hard-bound overshoot (MW) when the tap rounder checks a
    /// candidate position
    pub rounding_flow_epsilon_mw: f64,
    /// Usage-count limits, if any
    pub limits: Option<RangeActionLimits>,
    /// Narrow setpoint bounds around the best solution and retry once when
    /// an iteration stops improving
    pub range_shrinking: bool,
    /// Backend solver settings
    pub solver: SolverConfig,
}

impl Default for LinearOptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            convergence_tolerance: 1e-6,
            tap_model: TapModel::ApproximatedIntegers,
            margin_objective: MarginObjective::Absolute,
            setpoint_variation_penalty: 0.01,
            sensitivity_threshold: 1e-6,
            mnec_violation_cost: 10.0,
            loop_flow_violation_cost: 10.0,
            ptdf_sum_lower_bound: 0.01,
            rounding_flow_epsilon_mw: 0.5,
            limits: None,
            range_shrinking: false,
            solver: SolverConfig::default(),
        }
    }
}
