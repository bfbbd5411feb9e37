//! Loop-flow containment.

use std::sync::Arc;

use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{RangeActionActivation, SensitivityResult};

use crate::problem::{ConstraintKey, LinearProblem, LinearProblemError, VariableKey};

use super::ProblemFiller;

/// Caps the loop flow (total flow minus commercial flow) on flagged CNECs.
///
/// The commercial flow is a constant per sensitivity snapshot, so the cap
/// becomes a band on the flow variable, softened by a penalized violation
/// slack `V >= 0`:
///
/// `commercial - limit - V <= flow <= commercial + limit + V`
///
/// The band is re-centered between iterations as the commercial flows move
/// with the injections.
pub struct LoopFlowFiller {
    perimeter: Arc<OptimizationPerimeter>,
    violation_cost: f64,
}

impl LoopFlowFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>, violation_cost: f64) -> Self {
        Self {
            perimeter,
            violation_cost,
        }
    }

    fn recenter_bands(
        &self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
    ) -> Result<(), LinearProblemError> {
        for cnec in self.perimeter.cnecs() {
            let Some(limit) = cnec.loop_flow_limit_mw else {
                continue;
            };
            for &side in &cnec.sides {
                if !problem.has_variable(&VariableKey::LoopFlowViolation(cnec.id.clone(), side)) {
                    continue;
                }
                let commercial = sensitivity
                    .commercial_flow(&cnec.id, side)
                    .unwrap_or(0.0);
                let upper =
                    problem.constraint(&ConstraintKey::LoopFlowUpper(cnec.id.clone(), side))?;
                problem
                    .model_mut()
                    .set_constraint_bounds(upper, f64::NEG_INFINITY, commercial + limit);
                let lower =
                    problem.constraint(&ConstraintKey::LoopFlowLower(cnec.id.clone(), side))?;
                problem
                    .model_mut()
                    .set_constraint_bounds(lower, commercial - limit, f64::INFINITY);
            }
        }
        Ok(())
    }
}

impl ProblemFiller for LoopFlowFiller {
    fn fill(
        &mut self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
        _reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        for cnec in self.perimeter.cnecs() {
            if cnec.loop_flow_limit_mw.is_none() {
                continue;
            }
            for &side in &cnec.sides {
                let flow_key = VariableKey::Flow(cnec.id.clone(), side);
                if !problem.has_variable(&flow_key) {
                    continue;
                }
                let flow = problem.variable(&flow_key)?;
                let violation = problem.add_variable(
                    VariableKey::LoopFlowViolation(cnec.id.clone(), side),
                    0.0,
                    f64::INFINITY,
                )?;
                problem
                    .model_mut()
                    .set_objective_coefficient(violation, self.violation_cost);

                let upper = problem.add_constraint(
                    ConstraintKey::LoopFlowUpper(cnec.id.clone(), side),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                )?;
                problem.model_mut().set_coefficient(upper, flow, 1.0);
                problem.model_mut().set_coefficient(upper, violation, -1.0);

                let lower = problem.add_constraint(
                    ConstraintKey::LoopFlowLower(cnec.id.clone(), side),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                )?;
                problem.model_mut().set_coefficient(lower, flow, 1.0);
                problem.model_mut().set_coefficient(lower, violation, 1.0);
            }
        }
        self.recenter_bands(problem, sensitivity)
    }

    fn update_between_iterations(
        &mut self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
        _reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        self.recenter_bands(problem, sensitivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::fillers::{CoreProblemFiller, MaxMinMarginFiller};
    use crate::solver::SolverStatus;
    use rao_core::cnec::FlowCnec;
    use rao_core::ids::{CnecId, RangeActionId, StateId};
    use rao_core::range_action::RangeAction;
    use rao_core::Side;

    fn state() -> StateId {
        StateId::new("preventive")
    }

    #[test]
    fn test_loop_flow_band_blocks_margin_gain() {
        // c1's margin improves as the setpoint rises, but c2's loop flow
        // (flow minus 30 MW commercial) may not exceed 25 MW.
        let mut perimeter = OptimizationPerimeter::new(state());
        perimeter.add_range_action(
            state(),
            RangeAction::builder(RangeActionId::new("pst1"), "PST 1")
                .range(-10.0, 10.0)
                .build(),
        );
        perimeter.add_cnec(
            FlowCnec::builder(CnecId::new("c1"), "Line 1", state())
                .upper_bound_mw(100.0)
                .build(),
        );
        perimeter.add_cnec(
            FlowCnec::builder(CnecId::new("c2"), "Line 2", state())
                .upper_bound_mw(200.0)
                .loop_flow_limit_mw(25.0)
                .build(),
        );
        let perimeter = Arc::new(perimeter);

        let sensitivity = SensitivityResult::builder()
            .flow(CnecId::new("c1"), Side::One, 80.0)
            .flow(CnecId::new("c2"), Side::One, 45.0)
            .commercial_flow(CnecId::new("c2"), Side::One, 30.0)
            .sensitivity(CnecId::new("c1"), Side::One, RangeActionId::new("pst1"), -1.0)
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
        LoopFlowFiller::new(Arc::clone(&perimeter), 100.0)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();

        assert_eq!(problem.solve(), SolverStatus::Optimal);
        // c2 flow may reach 55 MW, hit at setpoint 5
        let setpoint = problem
            .value(&VariableKey::SetPoint(RangeActionId::new("pst1"), state()))
            .unwrap();
        assert!((setpoint - 5.0).abs() < 1e-3);
        let violation = problem
            .value(&VariableKey::LoopFlowViolation(CnecId::new("c2"), Side::One))
            .unwrap();
        assert!(violation < 1e-5);
    }
}
