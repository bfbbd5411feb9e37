//! Soft bounds on monitored CNECs.

use std::sync::Arc;

use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{RangeActionActivation, SensitivityResult};

use crate::problem::{ConstraintKey, LinearProblem, LinearProblemError, VariableKey};

use super::ProblemFiller;

/// Keeps monitored CNECs inside their bounds through a penalized slack.
///
/// Monitored CNECs do not enter the margin objective; instead each bounded
/// side gets a violation variable `V >= 0` with `flow - V <= upper` and
/// `flow + V >= lower`, priced per MW in the objective. The optimizer may
/// overload a monitored line only when the margin gained elsewhere pays
/// for it.
pub struct MonitoredCnecFiller {
    perimeter: Arc<OptimizationPerimeter>,
    violation_cost: f64,
}

impl MonitoredCnecFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>, violation_cost: f64) -> Self {
        Self {
            perimeter,
            violation_cost,
        }
    }
}

impl ProblemFiller for MonitoredCnecFiller {
    fn fill(
        &mut self,
        problem: &mut LinearProblem,
        _sensitivity: &SensitivityResult,
        _reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        for cnec in self.perimeter.cnecs() {
            if !cnec.monitored {
                continue;
            }
            for &side in &cnec.sides {
                let flow_key = VariableKey::Flow(cnec.id.clone(), side);
                if !problem.has_variable(&flow_key) {
                    continue;
                }
                if cnec.upper_bound_mw.is_none() && cnec.lower_bound_mw.is_none() {
                    continue;
                }
                let flow = problem.variable(&flow_key)?;
                let violation = problem.add_variable(
                    VariableKey::MnecViolation(cnec.id.clone(), side),
                    0.0,
                    f64::INFINITY,
                )?;
                problem
                    .model_mut()
                    .set_objective_coefficient(violation, self.violation_cost);

                if let Some(upper) = cnec.upper_bound_mw {
                    let con = problem.add_constraint(
                        ConstraintKey::MnecUpper(cnec.id.clone(), side),
                        f64::NEG_INFINITY,
                        upper,
                    )?;
                    problem.model_mut().set_coefficient(con, flow, 1.0);
                    problem.model_mut().set_coefficient(con, violation, -1.0);
                }
                if let Some(lower) = cnec.lower_bound_mw {
                    let con = problem.add_constraint(
                        ConstraintKey::MnecLower(cnec.id.clone(), side),
                        lower,
                        f64::INFINITY,
                    )?;
                    problem.model_mut().set_coefficient(con, flow, 1.0);
                    problem.model_mut().set_coefficient(con, violation, 1.0);
                }
            }
        }
        Ok(())
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
    fn test_monitored_bound_respected_when_cheap() {
        // Optimized c1 wants the setpoint high; monitored c2 blocks at
        // setpoint 5. The violation cost outweighs the margin gain, so the
        // solver stops at the monitored bound.
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
                .upper_bound_mw(60.0)
                .monitored_only()
                .build(),
        );
        let perimeter = Arc::new(perimeter);

        let sensitivity = SensitivityResult::builder()
            .flow(CnecId::new("c1"), Side::One, 80.0)
            .flow(CnecId::new("c2"), Side::One, 50.0)
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
        MonitoredCnecFiller::new(Arc::clone(&perimeter), 10.0)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();

        assert_eq!(problem.solve(), SolverStatus::Optimal);
        let setpoint = problem
            .value(&VariableKey::SetPoint(RangeActionId::new("pst1"), state()))
            .unwrap();
        // c2 hits 60 MW at setpoint 5; each further step buys 1 MW of
        // margin for 20 units of violation cost
        assert!((setpoint - 5.0).abs() < 1e-3);
        let violation = problem
            .value(&VariableKey::MnecViolation(CnecId::new("c2"), Side::One))
            .unwrap();
        assert!(violation < 1e-5);
    }

    #[test]
    fn test_monitored_cnec_gets_no_margin_row() {
        let mut perimeter = OptimizationPerimeter::new(state());
        perimeter.add_cnec(
            FlowCnec::builder(CnecId::new("c2"), "Line 2", state())
                .upper_bound_mw(60.0)
                .monitored_only()
                .build(),
        );
        let perimeter = Arc::new(perimeter);

        let sensitivity = SensitivityResult::builder()
            .flow(CnecId::new("c2"), Side::One, 50.0)
            .build();
        let reference = RangeActionActivation::from_perimeter(&perimeter);

        let mut problem = LinearProblem::builder(Arc::clone(&perimeter)).build();
        CoreProblemFiller::new(Arc::clone(&perimeter), 0.0, 1e-6)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        MaxMinMarginFiller::new(Arc::clone(&perimeter))
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        MonitoredCnecFiller::new(Arc::clone(&perimeter), 10.0)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();

        // No optimized bound exists, so the min margin stays pinned
        assert!(problem
            .constraint(&ConstraintKey::MarginUpper(CnecId::new("c2"), Side::One))
            .is_err());
        assert!(problem
            .constraint(&ConstraintKey::MnecUpper(CnecId::new("c2"), Side::One))
            .is_ok());
    }
}
