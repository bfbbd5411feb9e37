//! Exact integer tap modeling.

use std::sync::Arc;

use rao_core::perimeter::OptimizationPerimeter;
use rao_core::range_action::RangeAction;
use rao_core::results::{RangeActionActivation, SensitivityResult};

use crate::problem::{ConstraintKey, LinearProblem, LinearProblemError, VariableKey};

use super::ProblemFiller;

/// Ties each discrete device's setpoint to integer tap variations.
///
/// Per discrete (action, state) pair: integer variables `DT_up` and
/// `DT_down` counting tap steps away from the reference position, binary
/// direction indicators with `B_up + B_down <= 1`, big-M links capping
/// each variation by its indicator, and the coupling equality
///
/// `setpoint = ref_value + c_up * DT_up - c_down * DT_down`
///
/// where `c_up` / `c_down` are the average tap-to-value slopes from the
/// reference position to the range ends. The slopes, variation bounds and
/// reference value are all recentered when the reference activation moves,
/// which keeps the linearization error small for non-uniform tap tables.
pub struct DiscreteTapFiller {
    perimeter: Arc<OptimizationPerimeter>,
}

impl DiscreteTapFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>) -> Self {
        Self { perimeter }
    }

    fn reference_tap(
        action: &RangeAction,
        reference: &RangeActionActivation,
        main: &rao_core::ids::StateId,
    ) -> Result<i32, LinearProblemError> {
        let taps = action
            .taps
            .as_ref()
            .ok_or_else(|| LinearProblemError::MissingTaps {
                action: action.id.clone(),
            })?;
        if let Some(tap) = reference.tap(&action.id, main) {
            return Ok(tap);
        }
        let setpoint = reference.setpoint(&action.id, main).ok_or_else(|| {
            LinearProblemError::MissingReference {
                action: action.id.clone(),
                state: main.clone(),
            }
        })?;
        Ok(taps.nearest_tap(setpoint))
    }

    /// Recenter variation bounds, slopes and the coupling rhs around the
    /// reference activation.
    fn recenter(
        &self,
        problem: &mut LinearProblem,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let main = self.perimeter.main_state().clone();
        for (action, _) in self.perimeter.optimized_pairs() {
            let Some(taps) = &action.taps else {
                continue;
            };
            let ref_tap = Self::reference_tap(action, reference, &main)?;
            let min_tap = taps.min_tap();
            let max_tap = taps.max_tap();
            let range_up = f64::from(max_tap - ref_tap);
            let range_down = f64::from(ref_tap - min_tap);
            let slope_up = taps.average_slope(ref_tap, max_tap);
            let slope_down = taps.average_slope(min_tap, ref_tap);
            let ref_value = taps.value(ref_tap).unwrap_or(action.initial_setpoint);

            let up = problem
                .variable(&VariableKey::TapVariationUp(action.id.clone(), main.clone()))?;
            problem.model_mut().set_variable_bounds(up, 0.0, range_up);
            let down = problem
                .variable(&VariableKey::TapVariationDown(action.id.clone(), main.clone()))?;
            problem
                .model_mut()
                .set_variable_bounds(down, 0.0, range_down);

            let coupling = problem
                .constraint(&ConstraintKey::TapToSetPoint(action.id.clone(), main.clone()))?;
            problem.model_mut().set_coefficient(coupling, up, -slope_up);
            problem
                .model_mut()
                .set_coefficient(coupling, down, slope_down);
            problem
                .model_mut()
                .set_constraint_bounds(coupling, ref_value, ref_value);

            let up_link =
                problem.constraint(&ConstraintKey::TapUpLink(action.id.clone(), main.clone()))?;
            let up_indicator = problem
                .variable(&VariableKey::TapUpIndicator(action.id.clone(), main.clone()))?;
            problem
                .model_mut()
                .set_coefficient(up_link, up_indicator, -range_up.max(1.0));
            let down_link =
                problem.constraint(&ConstraintKey::TapDownLink(action.id.clone(), main.clone()))?;
            let down_indicator = problem
                .variable(&VariableKey::TapDownIndicator(action.id.clone(), main.clone()))?;
            problem
                .model_mut()
                .set_coefficient(down_link, down_indicator, -range_down.max(1.0));
        }
        Ok(())
    }
}

impl ProblemFiller for DiscreteTapFiller {
    fn fill(
        &mut self,
        problem: &mut LinearProblem,
        _sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let main = self.perimeter.main_state().clone();
        for (action, _) in self.perimeter.optimized_pairs() {
            if action.taps.is_none() {
                continue;
            }
            let setpoint =
                problem.variable(&VariableKey::SetPoint(action.id.clone(), main.clone()))?;

            let up = problem.add_integer_variable(
                VariableKey::TapVariationUp(action.id.clone(), main.clone()),
                0.0,
                0.0,
            )?;
            let down = problem.add_integer_variable(
                VariableKey::TapVariationDown(action.id.clone(), main.clone()),
                0.0,
                0.0,
            )?;
            let up_indicator = problem.add_integer_variable(
                VariableKey::TapUpIndicator(action.id.clone(), main.clone()),
                0.0,
                1.0,
            )?;
            let down_indicator = problem.add_integer_variable(
                VariableKey::TapDownIndicator(action.id.clone(), main.clone()),
                0.0,
                1.0,
            )?;

            let coupling = problem.add_constraint(
                ConstraintKey::TapToSetPoint(action.id.clone(), main.clone()),
                0.0,
                0.0,
            )?;
            problem.model_mut().set_coefficient(coupling, setpoint, 1.0);

            let direction = problem.add_constraint(
                ConstraintKey::TapDirection(action.id.clone(), main.clone()),
                f64::NEG_INFINITY,
                1.0,
            )?;
            problem
                .model_mut()
                .set_coefficient(direction, up_indicator, 1.0);
            problem
                .model_mut()
                .set_coefficient(direction, down_indicator, 1.0);

            let up_link = problem.add_constraint(
                ConstraintKey::TapUpLink(action.id.clone(), main.clone()),
                f64::NEG_INFINITY,
                0.0,
            )?;
            problem.model_mut().set_coefficient(up_link, up, 1.0);
            let down_link = problem.add_constraint(
                ConstraintKey::TapDownLink(action.id.clone(), main.clone()),
                f64::NEG_INFINITY,
                0.0,
            )?;
            problem.model_mut().set_coefficient(down_link, down, 1.0);
        }
        self.recenter(problem, reference)
    }

    fn update_between_iterations(
        &mut self,
        problem: &mut LinearProblem,
        _sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        self.recenter(problem, reference)
    }

    fn update_around_solution(
        &mut self,
        problem: &mut LinearProblem,
        rounded: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        self.recenter(problem, rounded)
    }
}
