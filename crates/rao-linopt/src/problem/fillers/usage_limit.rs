//! Range-action usage limits.

use std::sync::Arc;

use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{RangeActionActivation, SensitivityResult};

use crate::config::RangeActionLimits;
use crate::problem::{ConstraintKey, LinearProblem, LinearProblemError, VariableKey};

use super::ProblemFiller;

const FALLBACK_BIG_M: f64 = 1e6;

/// Caps how many range actions may deviate from their pre-perimeter
/// setpoint, overall and per operator.
///
/// Per optimized pair: a deviation variable `D >= |setpoint - initial|`
/// (the initial setpoint, unlike the variation reference, never moves
/// between iterations), a binary usage indicator `U` with the big-M link
/// `D <= M * U`, and cardinality rows summing the indicators. `M` is the
/// widest admissible excursion from the initial setpoint.
pub struct UsageLimitFiller {
    perimeter: Arc<OptimizationPerimeter>,
    limits: RangeActionLimits,
}

impl UsageLimitFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>, limits: RangeActionLimits) -> Self {
        Self { perimeter, limits }
    }
}

impl ProblemFiller for UsageLimitFiller {
    fn fill(
        &mut self,
        problem: &mut LinearProblem,
        _sensitivity: &SensitivityResult,
        _reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let main = self.perimeter.main_state().clone();
        let mut indicators = Vec::new();

        for (action, _) in self.perimeter.optimized_pairs() {
            let setpoint =
                problem.variable(&VariableKey::SetPoint(action.id.clone(), main.clone()))?;
            let initial = action.initial_setpoint;

            let deviation = problem.add_variable(
                VariableKey::InitialDeviation(action.id.clone(), main.clone()),
                0.0,
                f64::INFINITY,
            )?;
            let above = problem.add_constraint(
                ConstraintKey::InitialDeviationAbove(action.id.clone(), main.clone()),
                -initial,
                f64::INFINITY,
            )?;
            problem.model_mut().set_coefficient(above, deviation, 1.0);
            problem.model_mut().set_coefficient(above, setpoint, -1.0);
            let below = problem.add_constraint(
                ConstraintKey::InitialDeviationBelow(action.id.clone(), main.clone()),
                initial,
                f64::INFINITY,
            )?;
            problem.model_mut().set_coefficient(below, deviation, 1.0);
            problem.model_mut().set_coefficient(below, setpoint, 1.0);

            let used = problem.add_integer_variable(
                VariableKey::ActionUsed(action.id.clone(), main.clone()),
                0.0,
                1.0,
            )?;
            let (min, max) = action.admissible_range(&main);
            let excursion_up = if max.is_finite() { max - initial } else { FALLBACK_BIG_M };
            let excursion_down = if min.is_finite() { initial - min } else { FALLBACK_BIG_M };
            let big_m = excursion_up.abs().max(excursion_down.abs()).max(1.0);
            let link = problem.add_constraint(
                ConstraintKey::UsageLink(action.id.clone(), main.clone()),
                f64::NEG_INFINITY,
                0.0,
            )?;
            problem.model_mut().set_coefficient(link, deviation, 1.0);
            problem.model_mut().set_coefficient(link, used, -big_m);

            indicators.push((action.operator.clone(), used));
        }

        if let Some(max_total) = self.limits.max_active_range_actions {
            let con = problem.add_constraint(
                ConstraintKey::MaxUsedActions,
                f64::NEG_INFINITY,
                max_total as f64,
            )?;
            for (_, used) in &indicators {
                problem.model_mut().set_coefficient(con, *used, 1.0);
            }
        }

        for (operator, cap) in &self.limits.max_per_operator {
            let members: Vec<_> = indicators
                .iter()
                .filter(|(op, _)| op.as_deref() == Some(operator))
                .map(|(_, used)| *used)
                .collect();
            if members.is_empty() {
                continue;
            }
            let con = problem.add_constraint(
                ConstraintKey::MaxUsedPerOperator(operator.clone()),
                f64::NEG_INFINITY,
                *cap as f64,
            )?;
            for used in members {
                problem.model_mut().set_coefficient(con, used, 1.0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::fillers::{CoreProblemFiller, MaxMinMarginFiller};
    use rao_core::cnec::FlowCnec;
    use rao_core::ids::{CnecId, RangeActionId, StateId};
    use rao_core::range_action::RangeAction;
    use rao_core::Side;

    fn state() -> StateId {
        StateId::new("preventive")
    }

    fn build_problem(limits: RangeActionLimits) -> (Arc<OptimizationPerimeter>, LinearProblem) {
        let mut perimeter = OptimizationPerimeter::new(state());
        for (id, operator) in [("pst1", "A"), ("pst2", "A"), ("pst3", "B")] {
            perimeter.add_range_action(
                state(),
                RangeAction::builder(RangeActionId::new(id), id)
                    .operator(operator)
                    .range(-10.0, 10.0)
                    .build(),
            );
        }
        perimeter.add_cnec(
            FlowCnec::builder(CnecId::new("c1"), "Line 1", state())
                .upper_bound_mw(80.0)
                .build(),
        );
        let perimeter = Arc::new(perimeter);

        let mut builder = SensitivityResult::builder().flow(CnecId::new("c1"), Side::One, 150.0);
        for id in ["pst1", "pst2", "pst3"] {
            builder = builder.sensitivity(
                CnecId::new("c1"),
                Side::One,
                RangeActionId::new(id),
                -5.0,
            );
        }
        let sensitivity = builder.build();
        let reference = RangeActionActivation::from_perimeter(&perimeter);

        let mut problem = LinearProblem::builder(Arc::clone(&perimeter)).build();
        CoreProblemFiller::new(Arc::clone(&perimeter), 0.01, 1e-6)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        MaxMinMarginFiller::new(Arc::clone(&perimeter))
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        UsageLimitFiller::new(Arc::clone(&perimeter), limits)
            .fill(&mut problem, &sensitivity, &reference)
            .unwrap();
        (perimeter, problem)
    }

    fn moved_count(problem: &LinearProblem) -> usize {
        ["pst1", "pst2", "pst3"]
            .iter()
            .filter(|id| {
                problem
                    .value(&VariableKey::SetPoint(RangeActionId::new(**id), state()))
                    .unwrap()
                    .abs()
                    > 1e-4
            })
            .count()
    }

    #[test]
    fn test_total_cap_limits_moved_actions() {
        let limits = RangeActionLimits {
            max_active_range_actions: Some(1),
            max_per_operator: Default::default(),
        };
        let (_, mut problem) = build_problem(limits);
        assert!(problem.solve().is_usable());
        assert!(moved_count(&problem) <= 1);
        // The one allowed action is used in full
        let total: f64 = ["pst1", "pst2", "pst3"]
            .iter()
            .map(|id| {
                problem
                    .value(&VariableKey::SetPoint(RangeActionId::new(*id), state()))
                    .unwrap()
            })
            .sum();
        assert!((total - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_per_operator_cap() {
        let mut per_operator = std::collections::BTreeMap::new();
        per_operator.insert("A".to_string(), 1);
        let limits = RangeActionLimits {
            max_active_range_actions: None,
            max_per_operator: per_operator,
        };
        let (_, mut problem) = build_problem(limits);
        assert!(problem.solve().is_usable());

        let moved_a = ["pst1", "pst2"]
            .iter()
            .filter(|id| {
                problem
                    .value(&VariableKey::SetPoint(RangeActionId::new(**id), state()))
                    .unwrap()
                    .abs()
                    > 1e-4
            })
            .count();
        assert!(moved_a <= 1);
        // Operator B is unconstrained and helps in full
        let pst3 = problem
            .value(&VariableKey::SetPoint(RangeActionId::new("pst3"), state()))
            .unwrap();
        assert!((pst3 - 10.0).abs() < 1e-3);
    }
}
