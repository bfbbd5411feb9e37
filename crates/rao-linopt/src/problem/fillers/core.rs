//! Core filler: setpoints, variation penalties and flow linearization.

use std::sync::Arc;

use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{RangeActionActivation, SensitivityResult};

use crate::problem::{ConstraintKey, LinearProblem, LinearProblemError, VariableKey};

use super::ProblemFiller;

/// Creates one setpoint variable per optimized (action, state) pair, a
/// penalized variation variable measuring movement from the reference
/// activation, and one flow variable per (CNEC, side) tied to the
/// first-order linearization
///
/// `flow = reference_flow + sum(sensitivity * (setpoint - reference))`
///
/// Sensitivities below the threshold are dropped from the rows so that
/// numerically-dead couplings do not bloat the problem.
pub struct CoreProblemFiller {
    perimeter: Arc<OptimizationPerimeter>,
    variation_penalty: f64,
    sensitivity_threshold: f64,
}

impl CoreProblemFiller {
    pub fn new(
        perimeter: Arc<OptimizationPerimeter>,
        variation_penalty: f64,
        sensitivity_threshold: f64,
    ) -> Self {
        Self {
            perimeter,
            variation_penalty,
            sensitivity_threshold,
        }
    }

    /// Rewrite the variation constraints so variation measures movement
    /// from `reference`.
    fn recenter_variations(
        &self,
        problem: &mut LinearProblem,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let main = self.perimeter.main_state().clone();
        for (action, _) in self.perimeter.optimized_pairs() {
            let reference_setpoint =
                reference.setpoint(&action.id, &main).ok_or_else(|| {
                    LinearProblemError::MissingReference {
                        action: action.id.clone(),
                        state: main.clone(),
                    }
                })?;
            let above =
                problem.constraint(&ConstraintKey::VariationAbove(action.id.clone(), main.clone()))?;
            let below =
                problem.constraint(&ConstraintKey::VariationBelow(action.id.clone(), main.clone()))?;
            problem
                .model_mut()
                .set_constraint_bounds(above, -reference_setpoint, f64::INFINITY);
            problem
                .model_mut()
                .set_constraint_bounds(below, reference_setpoint, f64::INFINITY);
        }
        Ok(())
    }

    /// Rewrite every flow-definition row from the latest sensitivities.
    fn refresh_flow_definitions(
        &self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let main = self.perimeter.main_state().clone();
        for cnec in self.perimeter.cnecs() {
            for &side in &cnec.sides {
                let flow_key = VariableKey::Flow(cnec.id.clone(), side);
                if !problem.has_variable(&flow_key) {
                    continue;
                }
                let Some(reference_flow) = sensitivity.flow(&cnec.id, side) else {
                    continue;
                };
                let flow_var = problem.variable(&flow_key)?;
                let con =
                    problem.constraint(&ConstraintKey::FlowDefinition(cnec.id.clone(), side))?;
                problem.model_mut().set_coefficient(con, flow_var, 1.0);

                let mut rhs = reference_flow;
                for (action, _) in self.perimeter.optimized_pairs() {
                    let setpoint_var = problem
                        .variable(&VariableKey::SetPoint(action.id.clone(), main.clone()))?;
                    let mut coefficient = sensitivity.sensitivity(&cnec.id, side, &action.id);
                    if coefficient.abs() < self.sensitivity_threshold {
                        coefficient = 0.0;
                    }
                    let reference_setpoint =
                        reference.setpoint(&action.id, &main).ok_or_else(|| {
                            LinearProblemError::MissingReference {
                                action: action.id.clone(),
                                state: main.clone(),
                            }
                        })?;
                    problem
                        .model_mut()
                        .set_coefficient(con, setpoint_var, -coefficient);
                    rhs -= coefficient * reference_setpoint;
                }
                problem.model_mut().set_constraint_bounds(con, rhs, rhs);
            }
        }
        Ok(())
    }
}

impl ProblemFiller for CoreProblemFiller {
    fn fill(
        &mut self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let main = self.perimeter.main_state().clone();

        for (action, _) in self.perimeter.optimized_pairs() {
            let (min, max) = action.admissible_range(&main);
            let setpoint =
                problem.add_variable(VariableKey::SetPoint(action.id.clone(), main.clone()), min, max)?;

            let variation = problem.add_variable(
                VariableKey::SetPointVariation(action.id.clone(), main.clone()),
                0.0,
                f64::INFINITY,
            )?;
            problem
                .model_mut()
                .set_objective_coefficient(variation, self.variation_penalty);

            // variation >= |setpoint - reference|, bounds recentered below
            let above = problem.add_constraint(
                ConstraintKey::VariationAbove(action.id.clone(), main.clone()),
                f64::NEG_INFINITY,
                f64::INFINITY,
            )?;
            problem.model_mut().set_coefficient(above, variation, 1.0);
            problem.model_mut().set_coefficient(above, setpoint, -1.0);

            let below = problem.add_constraint(
                ConstraintKey::VariationBelow(action.id.clone(), main.clone()),
                f64::NEG_INFINITY,
                f64::INFINITY,
            )?;
            problem.model_mut().set_coefficient(below, variation, 1.0);
            problem.model_mut().set_coefficient(below, setpoint, 1.0);
        }

        for cnec in self.perimeter.cnecs() {
            for &side in &cnec.sides {
                if sensitivity.flow(&cnec.id, side).is_none() {
                    continue;
                }
                problem.add_variable(
                    VariableKey::Flow(cnec.id.clone(), side),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                )?;
                problem.add_constraint(
                    ConstraintKey::FlowDefinition(cnec.id.clone(), side),
                    0.0,
                    0.0,
                )?;
            }
        }

        self.recenter_variations(problem, reference)?;
        self.refresh_flow_definitions(problem, sensitivity, reference)
    }

    fn update_between_iterations(
        &mut self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let main = self.perimeter.main_state().clone();
        // Undo any narrowing left over from a refinement solve
        for (action, _) in self.perimeter.optimized_pairs() {
            let (min, max) = action.admissible_range(&main);
            let setpoint =
                problem.variable(&VariableKey::SetPoint(action.id.clone(), main.clone()))?;
            problem.model_mut().set_variable_bounds(setpoint, min, max);
        }
        self.recenter_variations(problem, reference)?;
        self.refresh_flow_definitions(problem, sensitivity, reference)
    }

    fn update_around_solution(
        &mut self,
        problem: &mut LinearProblem,
        rounded: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let main = self.perimeter.main_state().clone();
        for (action, _) in self.perimeter.optimized_pairs() {
            let Some(taps) = &action.taps else {
                continue;
            };
            let Some(tap) = rounded.tap(&action.id, &main) else {
                continue;
            };
            let (admissible_min, admissible_max) = action.admissible_range(&main);
            let low = taps
                .value(tap - 1)
                .or_else(|| taps.value(tap))
                .unwrap_or(admissible_min);
            let high = taps
                .value(tap + 1)
                .or_else(|| taps.value(tap))
                .unwrap_or(admissible_max);
            let setpoint =
                problem.variable(&VariableKey::SetPoint(action.id.clone(), main.clone()))?;
            problem.model_mut().set_variable_bounds(
                setpoint,
                low.min(high).max(admissible_min),
                low.max(high).min(admissible_max),
            );
        }
        self.recenter_variations(problem, rounded)
    }
}
