//! Relative (PTDF-scaled) max-min margin objective.

use std::sync::Arc;

use rao_core::cnec::FlowCnec;
use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{RangeActionActivation, SensitivityResult};
use rao_core::Side;

use crate::problem::{ConstraintKey, LinearProblem, LinearProblemError, VariableKey};

use super::ProblemFiller;

/// Maximizes the minimum relative margin: margin divided by the zonal PTDF
/// absolute sum while all margins are positive, plain MW margin while any
/// margin is negative.
///
/// Two staged variables keep this a single LP. `MM <= 0` carries the worst
/// absolute margin capped at zero and `RM >= 0` the worst scaled positive
/// margin. The scaled rows include `MM`:
///
/// `flow + ptdf * RM + MM <= upper`
///
/// so while some margin is negative the rows stay feasible with `RM = 0`,
/// and once every margin is positive `MM` saturates at zero and the rows
/// reduce to the scaled margin. `MM`'s objective weight is `1 / floor`,
/// which dominates any `RM` gain obtainable by pushing `MM` below its true
/// value (the binding row trades them at rate `1 / ptdf <= 1 / floor`).
///
/// PTDF sums move with each sensitivity snapshot, so the scaled-row
/// coefficients are rewritten between iterations. Sums are floored to keep
/// the scaling bounded on near-radial lines.
pub struct MaxMinRelativeMarginFiller {
    perimeter: Arc<OptimizationPerimeter>,
    ptdf_sum_lower_bound: f64,
}

impl MaxMinRelativeMarginFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>, ptdf_sum_lower_bound: f64) -> Self {
        Self {
            perimeter,
            ptdf_sum_lower_bound,
        }
    }

    fn ptdf_scale(&self, sensitivity: &SensitivityResult, cnec: &FlowCnec, side: Side) -> f64 {
        sensitivity
            .ptdf_zonal_sum(&cnec.id, side)
            .unwrap_or(1.0)
            .max(self.ptdf_sum_lower_bound)
    }

    fn refresh_scaled_rows(
        &self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
    ) -> Result<(), LinearProblemError> {
        let relative_margin = problem.variable(&VariableKey::MinRelativeMargin)?;
        for cnec in self.perimeter.optimized_cnecs() {
            for &side in &cnec.sides {
                if !problem.has_variable(&VariableKey::Flow(cnec.id.clone(), side)) {
                    continue;
                }
                let scale = self.ptdf_scale(sensitivity, cnec, side);
                if cnec.upper_bound_mw.is_some() {
                    let con = problem
                        .constraint(&ConstraintKey::RelativeMarginUpper(cnec.id.clone(), side))?;
                    problem
                        .model_mut()
                        .set_coefficient(con, relative_margin, scale);
                }
                if cnec.lower_bound_mw.is_some() {
                    let con = problem
                        .constraint(&ConstraintKey::RelativeMarginLower(cnec.id.clone(), side))?;
                    problem
                        .model_mut()
                        .set_coefficient(con, relative_margin, scale);
                }
            }
        }
        Ok(())
    }
}

impl ProblemFiller for MaxMinRelativeMarginFiller {
    fn fill(
        &mut self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
        _reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let min_margin =
            problem.add_variable(VariableKey::MinMargin, f64::NEG_INFINITY, 0.0)?;
        problem
            .model_mut()
            .set_objective_coefficient(min_margin, -1.0 / self.ptdf_sum_lower_bound);
        let relative_margin =
            problem.add_variable(VariableKey::MinRelativeMargin, 0.0, f64::INFINITY)?;
        problem
            .model_mut()
            .set_objective_coefficient(relative_margin, -1.0);

        let mut bounded = false;
        for cnec in self.perimeter.optimized_cnecs() {
            for &side in &cnec.sides {
                let flow_key = VariableKey::Flow(cnec.id.clone(), side);
                if !problem.has_variable(&flow_key) {
                    continue;
                }
                let flow = problem.variable(&flow_key)?;
                if let Some(upper) = cnec.upper_bound_mw {
                    let absolute = problem.add_constraint(
                        ConstraintKey::MarginUpper(cnec.id.clone(), side),
                        f64::NEG_INFINITY,
                        upper,
                    )?;
                    problem.model_mut().set_coefficient(absolute, flow, 1.0);
                    problem.model_mut().set_coefficient(absolute, min_margin, 1.0);
                    let scaled = problem.add_constraint(
                        ConstraintKey::RelativeMarginUpper(cnec.id.clone(), side),
                        f64::NEG_INFINITY,
                        upper,
                    )?;
                    problem.model_mut().set_coefficient(scaled, flow, 1.0);
                    problem.model_mut().set_coefficient(scaled, min_margin, 1.0);
                    bounded = true;
                }
                if let Some(lower) = cnec.lower_bound_mw {
                    let absolute = problem.add_constraint(
                        ConstraintKey::MarginLower(cnec.id.clone(), side),
                        f64::NEG_INFINITY,
                        -lower,
                    )?;
                    problem.model_mut().set_coefficient(absolute, flow, -1.0);
                    problem.model_mut().set_coefficient(absolute, min_margin, 1.0);
                    let scaled = problem.add_constraint(
                        ConstraintKey::RelativeMarginLower(cnec.id.clone(), side),
                        f64::NEG_INFINITY,
                        -lower,
                    )?;
                    problem.model_mut().set_coefficient(scaled, flow, -1.0);
                    problem.model_mut().set_coefficient(scaled, min_margin, 1.0);
                    bounded = true;
                }
            }
        }

        if !bounded {
            problem.model_mut().set_variable_bounds(min_margin, 0.0, 0.0);
            problem
                .model_mut()
                .set_variable_bounds(relative_margin, 0.0, 0.0);
        }

        self.refresh_scaled_rows(problem, sensitivity)
    }

    fn update_between_iterations(
        &mut self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
        _reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        self.refresh_scaled_rows(problem, sensitivity)
    }
}
