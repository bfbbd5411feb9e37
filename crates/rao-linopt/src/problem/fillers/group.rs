//! Aligned range-action groups.

use std::sync::Arc;

use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{RangeActionActivation, SensitivityResult};

use crate::problem::{ConstraintKey, LinearProblem, LinearProblemError, VariableKey};

use super::ProblemFiller;

/// Ties grouped range actions to one shared virtual coordinate.
///
/// Per group a free variable `G` and per member the equality
/// `setpoint = scale * G`. Members keep their own setpoint bounds, so the
/// coordinate is implicitly restricted to the intersection of the scaled
/// member ranges; disjoint ranges surface as an infeasible problem.
pub struct GroupFiller {
    perimeter: Arc<OptimizationPerimeter>,
}

impl GroupFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>) -> Self {
        Self { perimeter }
    }
}

impl ProblemFiller for GroupFiller {
    fn fill(
        &mut self,
        problem: &mut LinearProblem,
        _sensitivity: &SensitivityResult,
        _reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let main = self.perimeter.main_state().clone();
        for (group, members) in self.perimeter.groups() {
            let coordinate = problem.add_variable(
                VariableKey::GroupCoordinate(group.clone()),
                f64::NEG_INFINITY,
                f64::INFINITY,
            )?;
            for action in members {
                let setpoint =
                    problem.variable(&VariableKey::SetPoint(action.id.clone(), main.clone()))?;
                let coupling = problem.add_constraint(
                    ConstraintKey::GroupCoupling(action.id.clone(), main.clone()),
                    0.0,
                    0.0,
                )?;
                problem.model_mut().set_coefficient(coupling, setpoint, 1.0);
                problem
                    .model_mut()
                    .set_coefficient(coupling, coordinate, -action.group_scale);
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
    use rao_core::ids::{CnecId, GroupId, RangeActionId, StateId};
    use rao_core::range_action::RangeAction;
    use rao_core::Side;

    fn state() -> StateId {
        StateId::new("preventive")
    }

    #[test]
    fn test_grouped_setpoints_stay_aligned() {
        let mut perimeter = OptimizationPerimeter::new(state());
        for id in ["pst1", "pst2"] {
            perimeter.add_range_action(
                state(),
                RangeAction::builder(RangeActionId::new(id), id)
                    .range(-10.0, 10.0)
                    .group(GroupId::new("g1"))
                    .build(),
            );
        }
        perimeter.add_cnec(
            FlowCnec::builder(CnecId::new("c1"), "Line 1", state())
                .upper_bound_mw(100.0)
                .build(),
        );
        let perimeter = Arc::new(perimeter);

        // Only pst1 influences the flow; the coupling must drag pst2 along.
        let sensitivity = SensitivityResult::builder()
            .flow(CnecId::new("c1"), Side::One, 90.0)
            .sensitivity(CnecId::new("c1"), Side::One, RangeActionId::new("pst1"), -2.0)
            .build();
        let reference = RangeActionActivation::from_perimeter(&perimeter);

        let mut problem = LinearProblem::builder(Arc::clone(&perimeter)).build();
        CoreProblemFiller::new(Arc::clone(&perimeter), 0.01, 1e-6)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        MaxMinMarginFiller::new(Arc::clone(&perimeter))
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        GroupFiller::new(Arc::clone(&perimeter))
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();

        assert_eq!(problem.solve(), SolverStatus::Optimal);
        let s1 = problem
            .value(&VariableKey::SetPoint(RangeActionId::new("pst1"), state()))
            .unwrap();
        let s2 = problem
            .value(&VariableKey::SetPoint(RangeActionId::new("pst2"), state()))
            .unwrap();
        assert!((s1 - s2).abs() < 1e-4);
        assert!((s1 - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_scaled_member_follows_coordinate() {
        let mut perimeter = OptimizationPerimeter::new(state());
        perimeter.add_range_action(
            state(),
            RangeAction::builder(RangeActionId::new("hvdc1"), "HVDC 1")
                .range(-100.0, 100.0)
                .group(GroupId::new("g1"))
                .group_scale(10.0)
                .build(),
        );
        perimeter.add_range_action(
            state(),
            RangeAction::builder(RangeActionId::new("pst1"), "PST 1")
                .range(-10.0, 10.0)
                .group(GroupId::new("g1"))
                .build(),
        );
        perimeter.add_cnec(
            FlowCnec::builder(CnecId::new("c1"), "Line 1", state())
                .upper_bound_mw(100.0)
                .build(),
        );
        let perimeter = Arc::new(perimeter);

        let sensitivity = SensitivityResult::builder()
            .flow(CnecId::new("c1"), Side::One, 96.0)
            .sensitivity(CnecId::new("c1"), Side::One, RangeActionId::new("pst1"), -2.0)
            .build();
        let reference = RangeActionActivation::from_perimeter(&perimeter);

        let mut problem = LinearProblem::builder(Arc::clone(&perimeter)).build();
        CoreProblemFiller::new(Arc::clone(&perimeter), 0.01, 1e-6)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        MaxMinMarginFiller::new(Arc::clone(&perimeter))
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        GroupFiller::new(Arc::clone(&perimeter))
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();

        assert_eq!(problem.solve(), SolverStatus::Optimal);
        let hvdc = problem
            .value(&VariableKey::SetPoint(RangeActionId::new("hvdc1"), state()))
            .unwrap();
        let pst = problem
            .value(&VariableKey::SetPoint(RangeActionId::new("pst1"), state()))
            .unwrap();
        assert!((hvdc - 10.0 * pst).abs() < 1e-3);
    }
}
