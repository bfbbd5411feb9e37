//! Absolute max-min margin objective.

use std::sync::Arc;

use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{RangeActionActivation, SensitivityResult};

use crate::problem::{ConstraintKey, LinearProblem, LinearProblemError, VariableKey};

use super::ProblemFiller;

/// Maximizes the minimum margin in MW over all optimized CNEC sides.
///
/// One free variable `MM` with objective weight -1 and, per bounded side,
/// `flow + MM <= upper` and `MM - flow <= -lower`. CNEC bounds never move
/// between iterations, so fill is the whole job.
pub struct MaxMinMarginFiller {
    perimeter: Arc<OptimizationPerimeter>,
}

impl MaxMinMarginFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>) -> Self {
        Self { perimeter }
    }
}

impl ProblemFiller for MaxMinMarginFiller {
    fn fill(
        &mut self,
        problem: &mut LinearProblem,
        _sensitivity: &SensitivityResult,
        _reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let min_margin = problem.add_variable(
            VariableKey::MinMargin,
            f64::NEG_INFINITY,
            f64::INFINITY,
        )?;
        problem.model_mut().set_objective_coefficient(min_margin, -1.0);

        let mut bounded = false;
        for cnec in self.perimeter.optimized_cnecs() {
            for &side in &cnec.sides {
                let flow_key = VariableKey::Flow(cnec.id.clone(), side);
                if !problem.has_variable(&flow_key) {
                    continue;
                }
                let flow = problem.variable(&flow_key)?;
                if let Some(upper) = cnec.upper_bound_mw {
                    let con = problem.add_constraint(
                        ConstraintKey::MarginUpper(cnec.id.clone(), side),
                        f64::NEG_INFINITY,
                        upper,
                    )?;
                    problem.model_mut().set_coefficient(con, flow, 1.0);
                    problem.model_mut().set_coefficient(con, min_margin, 1.0);
                    bounded = true;
                }
                if let Some(lower) = cnec.lower_bound_mw {
                    let con = problem.add_constraint(
                        ConstraintKey::MarginLower(cnec.id.clone(), side),
                        f64::NEG_INFINITY,
                        -lower,
                    )?;
                    problem.model_mut().set_coefficient(con, flow, -1.0);
                    problem.model_mut().set_coefficient(con, min_margin, 1.0);
                    bounded = true;
                }
            }
        }

        // Nothing constrains MM when no optimized side carries a bound;
        // pin it so the objective stays bounded.
        if !bounded {
            problem.model_mut().set_variable_bounds(min_margin, 0.0, 0.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::fillers::CoreProblemFiller;
    use crate::solver::SolverStatus;
    use rao_core::cnec::FlowCnec;
    use rao_core::ids::{CnecId, RangeActionId, StateId};
    use rao_core::range_action::RangeAction;
    use rao_core::Side;

    fn state() -> StateId {
        StateId::new("preventive")
    }

    #[test]
    fn test_margin_maximized_against_two_bounds() {
        // flow = 100 - 5 * setpoint on c1 (ub 120), flow = 20 + 2 * setpoint
        // on c2 (ub 60). The optimum balances both margins.
        let mut perimeter = OptimizationPerimeter::new(state());
        perimeter.add_range_action(
            state(),
            RangeAction::builder(RangeActionId::new("pst1"), "PST 1")
                .range(-10.0, 10.0)
                .build(),
        );
        perimeter.add_cnec(
            FlowCnec::builder(CnecId::new("c1"), "Line 1", state())
                .upper_bound_mw(120.0)
                .build(),
        );
        perimeter.add_cnec(
            FlowCnec::builder(CnecId::new("c2"), "Line 2", state())
                .upper_bound_mw(60.0)
                .build(),
        );
        let perimeter = Arc::new(perimeter);

        let sensitivity = SensitivityResult::builder()
            .flow(CnecId::new("c1"), Side::One, 100.0)
            .flow(CnecId::new("c2"), Side::One, 20.0)
            .sensitivity(CnecId::new("c1"), Side::One, RangeActionId::new("pst1"), -5.0)
            .sensitivity(CnecId::new("c2"), Side::One, RangeActionId::new("pst1"), 2.0)
            .build();
        let reference = RangeActionActivation::from_perimeter(&perimeter);

        let mut problem = LinearProblem::builder(Arc::clone(&perimeter)).build();
        CoreProblemFiller::new(Arc::clone(&perimeter), 0.0, 1e-6)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        MaxMinMarginFiller::new(Arc::clone(&perimeter))
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();

        assert_eq!(problem.solve(), SolverStatus::Optimal);
        // Margins equalize: 120 - (100 - 5v) = 60 - (20 + 2v) -> v = 20/7
        let setpoint = problem
            .value(&VariableKey::SetPoint(RangeActionId::new("pst1"), state()))
            .unwrap();
        assert!((setpoint - 20.0 / 7.0).abs() < 1e-3);
        let margin = problem.value(&VariableKey::MinMargin).unwrap();
        assert!((margin - (20.0 + 5.0 * 20.0 / 7.0)).abs() < 1e-3);
    }

    #[test]
    fn test_unbounded_margin_pinned() {
        let mut perimeter = OptimizationPerimeter::new(state());
        perimeter.add_range_action(
            state(),
            RangeAction::builder(RangeActionId::new("pst1"), "PST 1")
                .range(-10.0, 10.0)
                .build(),
        );
        // CNEC with no bounds
        perimeter.add_cnec(FlowCnec::builder(CnecId::new("c1"), "Line 1", state()).build());
        let perimeter = Arc::new(perimeter);

        let sensitivity = SensitivityResult::builder()
            .flow(CnecId::new("c1"), Side::One, 50.0)
            .build();
        let reference = RangeActionActivation::from_perimeter(&perimeter);

        let mut problem = LinearProblem::builder(Arc::clone(&perimeter)).build();
        CoreProblemFiller::new(Arc::clone(&perimeter), 0.01, 1e-6)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        MaxMinMarginFiller::new(Arc::clone(&perimeter))
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();

        assert_eq!(problem.solve(), SolverStatus::Optimal);
        assert!(problem.value(&VariableKey::MinMargin).unwrap().abs() < 1e-6);
    }
}
