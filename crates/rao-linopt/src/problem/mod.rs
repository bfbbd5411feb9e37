//! Linear problem assembly.
//!
//! [`LinearProblem`] couples an [`LpModel`] with an ordered list of
//! [`ProblemFiller`]s and a registry mapping domain-level keys to solver
//! handles. Fillers create variables and constraints on first fill, then
//! update coefficients and bounds in place on later iterations; the
//! registry is how a filler finds entities another filler created (the
//! margin filler reads the flow variables the core filler registered).
//!
//! Lifecycle per optimization:
//!
//! 1. `fill` once with the initial sensitivities
//! 2. repeat: `solve`, read values, round, apply, recompute sensitivities
//! 3. `update` with the fresh snapshot before the next solve
//!
//! `update_around_solution` is the extra hook of the approximated-integer
//! mode: it narrows continuous setpoints around a rounded candidate for one
//! refinement solve.

pub mod fillers;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rao_core::ids::{CnecId, GroupId, RangeActionId, StateId};
use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{RangeActionActivation, SensitivityResult};
use rao_core::Side;
use thiserror::Error;

use crate::config::{LinearOptimizerConfig, MarginObjective, TapModel};
use crate::solver::{ConId, LpModel, SolverStatus, VarId};

pub use fillers::ProblemFiller;

/// Errors raised while building or updating the linear problem.
#[derive(Debug, Error)]
pub enum LinearProblemError {
    #[error("variable already registered: {0}")]
    DuplicateVariable(String),

    #[error("constraint already registered: {0}")]
    DuplicateConstraint(String),

    #[error("variable not found: {0}")]
    MissingVariable(String),

    #[error("constraint not found: {0}")]
    MissingConstraint(String),

    #[error("sensitivity result is unusable")]
    UnusableSensitivity,

    #[error("range action {action} has no tap conversion")]
    MissingTaps { action: RangeActionId },

    #[error("no reference setpoint for {action} at {state}")]
    MissingReference { action: RangeActionId, state: StateId },
}

/// Domain-level identity of a solver variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableKey {
    /// Continuous setpoint of (action, state)
    SetPoint(RangeActionId, StateId),
    /// |setpoint - previous-iteration setpoint|, penalized
    SetPointVariation(RangeActionId, StateId),
    /// |setpoint - pre-perimeter setpoint|, drives usage indicators
    InitialDeviation(RangeActionId, StateId),
    /// Linearized flow on (cnec, side)
    Flow(CnecId, Side),
    /// Minimum margin over optimized CNECs (maximized)
    MinMargin,
    /// Minimum relative (PTDF-scaled) positive margin
    MinRelativeMargin,
    /// Monitored-constraint violation slack on (cnec, side)
    MnecViolation(CnecId, Side),
    /// Loop-flow violation slack on (cnec, side)
    LoopFlowViolation(CnecId, Side),
    /// Integer upward tap variation from the reference position
    TapVariationUp(RangeActionId, StateId),
    /// Integer downward tap variation from the reference position
    TapVariationDown(RangeActionId, StateId),
    /// Binary: tap moved upward
    TapUpIndicator(RangeActionId, StateId),
    /// Binary: tap moved downward
    TapDownIndicator(RangeActionId, StateId),
    /// Binary: action deviates from its pre-perimeter setpoint
    ActionUsed(RangeActionId, StateId),
    /// Shared virtual coordinate of an aligned group
    GroupCoordinate(GroupId),
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKey::SetPoint(a, s) => write!(f, "setpoint[{a},{s}]"),
            VariableKey::SetPointVariation(a, s) => write!(f, "variation[{a},{s}]"),
            VariableKey::InitialDeviation(a, s) => write!(f, "deviation[{a},{s}]"),
            VariableKey::Flow(c, side) => write!(f, "flow[{c},{side}]"),
            VariableKey::MinMargin => write!(f, "min-margin"),
            VariableKey::MinRelativeMargin => write!(f, "min-relative-margin"),
            VariableKey::MnecViolation(c, side) => write!(f, "mnec-violation[{c},{side}]"),
            VariableKey::LoopFlowViolation(c, side) => {
                write!(f, "loop-flow-violation[{c},{side}]")
            }
            VariableKey::TapVariationUp(a, s) => write!(f, "tap-up[{a},{s}]"),
            VariableKey::TapVariationDown(a, s) => write!(f, "tap-down[{a},{s}]"),
            VariableKey::TapUpIndicator(a, s) => write!(f, "tap-up-used[{a},{s}]"),
            VariableKey::TapDownIndicator(a, s) => write!(f, "tap-down-used[{a},{s}]"),
            VariableKey::ActionUsed(a, s) => write!(f, "used[{a},{s}]"),
            VariableKey::GroupCoordinate(g) => write!(f, "group[{g}]"),
        }
    }
}

/// Domain-level identity of a solver constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstraintKey {
    /// Flow variable equals its sensitivity-based linearization
    FlowDefinition(CnecId, Side),
    /// variation >= setpoint - reference
    VariationAbove(RangeActionId, StateId),
    /// variation >= reference - setpoint
    VariationBelow(RangeActionId, StateId),
    /// deviation >= setpoint - initial
    InitialDeviationAbove(RangeActionId, StateId),
    /// deviation >= initial - setpoint
    InitialDeviationBelow(RangeActionId, StateId),
    /// flow + min-margin <= upper bound
    MarginUpper(CnecId, Side),
    /// min-margin - flow <= -lower bound
    MarginLower(CnecId, Side),
    /// flow + ptdf * relative-margin <= upper bound
    RelativeMarginUpper(CnecId, Side),
    /// ptdf * relative-margin - flow <= -lower bound
    RelativeMarginLower(CnecId, Side),
    /// flow - violation <= upper bound (monitored)
    MnecUpper(CnecId, Side),
    /// flow + violation >= lower bound (monitored)
    MnecLower(CnecId, Side),
    /// flow - violation <= commercial + limit
    LoopFlowUpper(CnecId, Side),
    /// flow + violation >= commercial - limit
    LoopFlowLower(CnecId, Side),
    /// setpoint linked to integer tap variations
    TapToSetPoint(RangeActionId, StateId),
    /// at most one movement direction
    TapDirection(RangeActionId, StateId),
    /// upward variation capped by its indicator
    TapUpLink(RangeActionId, StateId),
    /// downward variation capped by its indicator
    TapDownLink(RangeActionId, StateId),
    /// deviation capped by the usage indicator
    UsageLink(RangeActionId, StateId),
    /// total active range actions cap
    MaxUsedActions,
    /// per-operator active range actions cap
    MaxUsedPerOperator(String),
    /// member setpoint tied to the group coordinate
    GroupCoupling(RangeActionId, StateId),
}

impl fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKey::FlowDefinition(c, side) => write!(f, "flow-def[{c},{side}]"),
            ConstraintKey::VariationAbove(a, s) => write!(f, "variation-above[{a},{s}]"),
            ConstraintKey::VariationBelow(a, s) => write!(f, "variation-below[{a},{s}]"),
            ConstraintKey::InitialDeviationAbove(a, s) => {
                write!(f, "deviation-above[{a},{s}]")
            }
            ConstraintKey::InitialDeviationBelow(a, s) => {
                write!(f, "deviation-below[{a},{s}]")
            }
            ConstraintKey::MarginUpper(c, side) => write!(f, "margin-upper[{c},{side}]"),
            ConstraintKey::MarginLower(c, side) => write!(f, "margin-lower[{c},{side}]"),
            ConstraintKey::RelativeMarginUpper(c, side) => {
                write!(f, "rel-margin-upper[{c},{side}]")
            }
            ConstraintKey::RelativeMarginLower(c, side) => {
                write!(f, "rel-margin-lower[{c},{side}]")
            }
            ConstraintKey::MnecUpper(c, side) => write!(f, "mnec-upper[{c},{side}]"),
            ConstraintKey::MnecLower(c, side) => write!(f, "mnec-lower[{c},{side}]"),
            ConstraintKey::LoopFlowUpper(c, side) => write!(f, "loop-flow-upper[{c},{side}]"),
            ConstraintKey::LoopFlowLower(c, side) => write!(f, "loop-flow-lower[{c},{side}]"),
            ConstraintKey::TapToSetPoint(a, s) => write!(f, "tap-to-setpoint[{a},{s}]"),
            ConstraintKey::TapDirection(a, s) => write!(f, "tap-direction[{a},{s}]"),
            ConstraintKey::TapUpLink(a, s) => write!(f, "tap-up-link[{a},{s}]"),
            ConstraintKey::TapDownLink(a, s) => write!(f, "tap-down-link[{a},{s}]"),
            ConstraintKey::UsageLink(a, s) => write!(f, "usage-link[{a},{s}]"),
            ConstraintKey::MaxUsedActions => write!(f, "max-used-actions"),
            ConstraintKey::MaxUsedPerOperator(op) => write!(f, "max-used-per-operator[{op}]"),
            ConstraintKey::GroupCoupling(a, s) => write!(f, "group-coupling[{a},{s}]"),
        }
    }
}

/// The assembled linear problem: model, registries and fillers.
pub struct LinearProblem {
    perimeter: Arc<OptimizationPerimeter>,
    model: LpModel,
    fillers: Vec<Box<dyn ProblemFiller>>,
    vars: HashMap<VariableKey, VarId>,
    cons: HashMap<ConstraintKey, ConId>,
    filled: bool,
}

impl LinearProblem {
    /// Start building a problem over a perimeter.
    pub fn builder(perimeter: Arc<OptimizationPerimeter>) -> LinearProblemBuilder {
        LinearProblemBuilder {
            perimeter,
            fillers: Vec::new(),
        }
    }

    pub fn perimeter(&self) -> &OptimizationPerimeter {
        &self.perimeter
    }

    /// Shared handle to the perimeter, for callers that need to walk it
    /// while mutating the problem.
    pub fn perimeter_arc(&self) -> &Arc<OptimizationPerimeter> {
        &self.perimeter
    }

    /// Register a continuous variable under a key.
    pub fn add_variable(
        &mut self,
        key: VariableKey,
        lower: f64,
        upper: f64,
    ) -> Result<VarId, LinearProblemError> {
        if self.vars.contains_key(&key) {
            return Err(LinearProblemError::DuplicateVariable(key.to_string()));
        }
        let id = self.model.add_variable(key.to_string(), lower, upper);
        self.vars.insert(key, id);
        Ok(id)
    }

    /// Register an integer variable under a key.
    pub fn add_integer_variable(
        &mut self,
        key: VariableKey,
        lower: f64,
        upper: f64,
    ) -> Result<VarId, LinearProblemError> {
        if self.vars.contains_key(&key) {
            return Err(LinearProblemError::DuplicateVariable(key.to_string()));
        }
        let id = self
            .model
            .add_integer_variable(key.to_string(), lower, upper);
        self.vars.insert(key, id);
        Ok(id)
    }

    /// Register a constraint under a key.
    pub fn add_constraint(
        &mut self,
        key: ConstraintKey,
        lower: f64,
        upper: f64,
    ) -> Result<ConId, LinearProblemError> {
        if self.cons.contains_key(&key) {
            return Err(LinearProblemError::DuplicateConstraint(key.to_string()));
        }
        let id = self.model.add_constraint(key.to_string(), lower, upper);
        self.cons.insert(key, id);
        Ok(id)
    }

    /// Look up a registered variable.
    pub fn variable(&self, key: &VariableKey) -> Result<VarId, LinearProblemError> {
        self.vars
            .get(key)
            .copied()
            .ok_or_else(|| LinearProblemError::MissingVariable(key.to_string()))
    }

    /// Whether a variable key is registered.
    pub fn has_variable(&self, key: &VariableKey) -> bool {
        self.vars.contains_key(key)
    }

    /// Look up a registered constraint.
    pub fn constraint(&self, key: &ConstraintKey) -> Result<ConId, LinearProblemError> {
        self.cons
            .get(key)
            .copied()
            .ok_or_else(|| LinearProblemError::MissingConstraint(key.to_string()))
    }

    pub fn model(&self) -> &LpModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut LpModel {
        &mut self.model
    }

    /// Value of a registered variable in the last solution.
    pub fn value(&self, key: &VariableKey) -> Result<f64, LinearProblemError> {
        Ok(self.model.value(self.variable(key)?))
    }

    /// First fill: create all variables and constraints.
    pub fn fill(
        &mut self,
        sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        if sensitivity.is_failure() {
            return Err(LinearProblemError::UnusableSensitivity);
        }
        self.for_each_filler(|filler, problem| filler.fill(problem, sensitivity, reference))?;
        self.filled = true;
        Ok(())
    }

    /// Between-iterations update: refresh coefficients and bounds in place.
    pub fn update(
        &mut self,
        sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        if sensitivity.is_failure() {
            return Err(LinearProblemError::UnusableSensitivity);
        }
        self.for_each_filler(|filler, problem| {
            filler.update_between_iterations(problem, sensitivity, reference)
        })
    }

    /// Narrow the problem around a rounded candidate for one refinement
    /// solve (approximated-integer mode).
    pub fn update_around_solution(
        &mut self,
        rounded: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        self.for_each_filler(|filler, problem| filler.update_around_solution(problem, rounded))
    }

    /// Whether `fill` has run.
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Solve the current model state.
    pub fn solve(&mut self) -> SolverStatus {
        self.model.solve()
    }

    /// Read the solved setpoints into an activation over the full
    /// perimeter, fixed pairs carried over from `reference`.
    pub fn read_activation(
        &self,
        reference: &RangeActionActivation,
    ) -> Result<RangeActionActivation, LinearProblemError> {
        let mut activation = RangeActionActivation::new();
        let main = self.perimeter.main_state().clone();
        for (action, state) in self.perimeter.optimized_pairs() {
            let key = VariableKey::SetPoint(action.id.clone(), main.clone());
            activation.set(action.id.clone(), state.clone(), self.value(&key)?);
        }
        for (action, state) in self.perimeter.fixed_pairs() {
            let setpoint = reference.setpoint(&action.id, state).ok_or_else(|| {
                LinearProblemError::MissingReference {
                    action: action.id.clone(),
                    state: state.clone(),
                }
            })?;
            activation.set(action.id.clone(), state.clone(), setpoint);
            if let Some(tap) = reference.tap(&action.id, state) {
                activation.set_tap(action.id.clone(), state.clone(), tap);
            }
        }
        Ok(activation)
    }

    // Runs `f` over every filler with the filler list temporarily moved
    // out, so fillers can mutate the problem they are part of.
    fn for_each_filler(
        &mut self,
        mut f: impl FnMut(
            &mut Box<dyn ProblemFiller>,
            &mut LinearProblem,
        ) -> Result<(), LinearProblemError>,
    ) -> Result<(), LinearProblemError> {
        let mut fillers = std::mem::take(&mut self.fillers);
        let result = fillers.iter_mut().try_for_each(|filler| f(filler, self));
        self.fillers = fillers;
        result
    }
}

/// Builder selecting the filler list.
pub struct LinearProblemBuilder {
    perimeter: Arc<OptimizationPerimeter>,
    fillers: Vec<Box<dyn ProblemFiller>>,
}

impl LinearProblemBuilder {
    /// Append a filler. Fill and update run in insertion order.
    pub fn with_filler(mut self, filler: Box<dyn ProblemFiller>) -> Self {
        self.fillers.push(filler);
        self
    }

    /// Standard filler list for a configuration.
    pub fn from_config(mut self, config: &LinearOptimizerConfig) -> Self {
        let perimeter = Arc::clone(&self.perimeter);
        self = self.with_filler(Box::new(fillers::CoreProblemFiller::new(
            Arc::clone(&perimeter),
            config.setpoint_variation_penalty,
            config.sensitivity_threshold,
        )));
        self = match config.margin_objective {
            MarginObjective::Absolute => self.with_filler(Box::new(
                fillers::MaxMinMarginFiller::new(Arc::clone(&perimeter)),
            )),
            MarginObjective::Relative => self.with_filler(Box::new(
                fillers::MaxMinRelativeMarginFiller::new(
                    Arc::clone(&perimeter),
                    config.ptdf_sum_lower_bound,
                ),
            )),
        };
        self = self.with_filler(Box::new(fillers::MonitoredCnecFiller::new(
            Arc::clone(&perimeter),
            config.mnec_violation_cost,
        )));
        self = self.with_filler(Box::new(fillers::LoopFlowFiller::new(
            Arc::clone(&perimeter),
            config.loop_flow_violation_cost,
        )));
        if config.tap_model == TapModel::ExactIntegers {
            self = self.with_filler(Box::new(fillers::DiscreteTapFiller::new(Arc::clone(
                &perimeter,
            ))));
        }
        self = self.with_filler(Box::new(fillers::GroupFiller::new(Arc::clone(&perimeter))));
        if let Some(limits) = &config.limits {
            self = self.with_filler(Box::new(fillers::UsageLimitFiller::new(
                Arc::clone(&perimeter),
                limits.clone(),
            )));
        }
        self
    }

    pub fn build(self) -> LinearProblem {
        LinearProblem {
            perimeter: self.perimeter,
            model: LpModel::new(),
            fillers: self.fillers,
            vars: HashMap::new(),
            cons: HashMap::new(),
            filled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::cnec::FlowCnec;
    use rao_core::range_action::RangeAction;

    fn perimeter() -> Arc<OptimizationPerimeter> {
        let state = StateId::new("preventive");
        let mut perimeter = OptimizationPerimeter::new(state.clone());
        perimeter.add_range_action(
            state.clone(),
            RangeAction::builder(RangeActionId::new("pst1"), "PST 1")
                .range(-10.0, 10.0)
                .build(),
        );
        perimeter.add_cnec(
            FlowCnec::builder(CnecId::new("c1"), "Line 1", state)
                .upper_bound_mw(100.0)
                .build(),
        );
        Arc::new(perimeter)
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let mut problem = LinearProblem::builder(perimeter()).build();
        let key = VariableKey::MinMargin;
        problem
            .add_variable(key.clone(), f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();
        let err = problem
            .add_variable(key, f64::NEG_INFINITY, f64::INFINITY)
            .unwrap_err();
        assert!(matches!(err, LinearProblemError::DuplicateVariable(_)));
    }

    #[test]
    fn test_missing_lookup_reports_key() {
        let problem = LinearProblem::builder(perimeter()).build();
        let err = problem
            .variable(&VariableKey::SetPoint(
                RangeActionId::new("pst1"),
                StateId::new("preventive"),
            ))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "variable not found: setpoint[pst1,preventive]"
        );
    }

    #[test]
    fn test_fill_rejects_failed_sensitivity() {
        let config = LinearOptimizerConfig::default();
        let perimeter = perimeter();
        let mut problem = LinearProblem::builder(Arc::clone(&perimeter))
            .from_config(&config)
            .build();
        let reference = RangeActionActivation::from_perimeter(&perimeter);
        let err = problem
            .fill(&SensitivityResult::failure(), &reference)
            .unwrap_err();
        assert!(matches!(err, LinearProblemError::UnusableSensitivity));
        assert!(!problem.is_filled());
    }
}
