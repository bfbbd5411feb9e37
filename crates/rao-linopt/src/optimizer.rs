//! Iterating linear optimizer.

use std::sync::Arc;

use rao_core::interfaces::{NetworkActions, ObjectiveEvaluator, SensitivityComputer};
use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{CostBreakdown, RangeActionActivation, SensitivityResult};

use crate::config::{LinearOptimizerConfig, TapModel};
use crate::problem::{LinearProblem, LinearProblemError};
use crate::rounding::TapRounder;
use crate::solver::SolverStatus;

/// Terminal status of an optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// The loop converged: re-solving no longer improves the cost
    Optimal,
    /// A cost improvement was found but the loop ended on a later solver
    /// failure
    Feasible,
    /// The first linear problem was infeasible
    Infeasible,
    /// The first linear problem was unbounded
    Unbounded,
    /// The solver failed for another reason on the first iteration
    Abnormal,
    /// A sensitivity computation failed; the best previous activation is
    /// returned
    SensitivityFailure,
    /// The iteration cap was hit while still improving
    MaxIterationsReached,
}

/// Best activation found by the loop, with its cost and the sensitivity
/// snapshot it was evaluated on.
pub struct LinearOptimizationResult {
    pub status: OptimizationStatus,
    pub activation: RangeActionActivation,
    pub cost: CostBreakdown,
    pub sensitivity: SensitivityResult,
    pub iterations: usize,
}

impl LinearOptimizationResult {
    /// One-line human-readable outcome.
    pub fn summary(&self) -> String {
        format!(
            "{:?} after {} iteration(s), cost {:.2} (functional {:.2})",
            self.status,
            self.iterations,
            self.cost.total(),
            self.cost.functional_cost()
        )
    }
}

/// Policy for narrowing setpoint ranges around the incumbent when an
/// iteration stops improving.
pub trait RangeNarrowing {
    /// Narrowed (min, max) around `best`, within `full`.
    fn narrow(&self, full: (f64, f64), best: f64) -> (f64, f64);
}

/// Pulls each range end toward the incumbent by a fixed factor.
pub struct ProportionalNarrowing {
    pub factor: f64,
}

impl Default for ProportionalNarrowing {
    fn default() -> Self {
        Self { factor: 0.5 }
    }
}

impl RangeNarrowing for ProportionalNarrowing {
    fn narrow(&self, full: (f64, f64), best: f64) -> (f64, f64) {
        let (min, max) = full;
        let best = best.clamp(min, max);
        let low = if min.is_finite() {
            best - self.factor * (best - min)
        } else {
            min
        };
        let high = if max.is_finite() {
            best + self.factor * (max - best)
        } else {
            max
        };
        (low, high)
    }
}

/// The outer loop: solve the linear approximation, round, re-apply, check
/// against fresh sensitivities, repeat.
///
/// Every iteration re-anchors the problem on the most recent sensitivity
/// snapshot of the incumbent; a candidate is adopted only when the
/// objective evaluator confirms a strictly lower total cost on the real
/// (recomputed) flows. On exit the network snapshot is left at the
/// returned activation.
pub struct IteratingLinearOptimizer {
    config: LinearOptimizerConfig,
    narrowing: Box<dyn RangeNarrowing>,
}

impl IteratingLinearOptimizer {
    pub fn new(config: LinearOptimizerConfig) -> Self {
        Self {
            config,
            narrowing: Box::new(ProportionalNarrowing::default()),
        }
    }

    /// Replace the range-narrowing policy.
    pub fn with_narrowing(mut self, narrowing: Box<dyn RangeNarrowing>) -> Self {
        self.narrowing = narrowing;
        self
    }

    pub fn config(&self) -> &LinearOptimizerConfig {
        &self.config
    }

    /// Run the loop. `initial_sensitivity` must have been computed on
    /// `network` in its incoming state.
    pub fn optimize<N: NetworkActions>(
        &self,
        perimeter: Arc<OptimizationPerimeter>,
        network: &mut N,
        sensitivity_computer: &mut dyn SensitivityComputer<N>,
        objective: &dyn ObjectiveEvaluator,
        initial_sensitivity: SensitivityResult,
    ) -> Result<LinearOptimizationResult, LinearProblemError> {
        let mut best_activation = RangeActionActivation::from_perimeter(&perimeter);
        if initial_sensitivity.is_failure() {
            return Ok(LinearOptimizationResult {
                status: OptimizationStatus::SensitivityFailure,
                activation: best_activation,
                cost: CostBreakdown::new(f64::INFINITY),
                sensitivity: initial_sensitivity,
                iterations: 0,
            });
        }
        let mut best_sensitivity = initial_sensitivity;
        let mut best_cost = objective.evaluate(&best_sensitivity, &best_activation);

        let mut problem = LinearProblem::builder(Arc::clone(&perimeter))
            .from_config(&self.config)
            .build();
        problem.fill(&best_sensitivity, &best_activation)?;
        let rounder = TapRounder::new(
            Arc::clone(&perimeter),
            self.config.rounding_flow_epsilon_mw,
        );
        let has_discrete = perimeter
            .optimized_pairs()
            .any(|(action, _)| action.taps.is_some());

        let mut status = OptimizationStatus::MaxIterationsReached;
        let mut iterations = 0;
        let mut shrunk = false;

        for iteration in 1..=self.config.max_iterations {
            iterations = iteration;

            let solve_status = problem.solve();
            if !solve_status.is_usable() {
                // The network still sits at the incumbent
                status = if iteration == 1 {
                    match solve_status {
                        SolverStatus::Infeasible => OptimizationStatus::Infeasible,
                        SolverStatus::Unbounded => OptimizationStatus::Unbounded,
                        _ => OptimizationStatus::Abnormal,
                    }
                } else {
                    OptimizationStatus::Feasible
                };
                break;
            }

            let linear = problem.read_activation(&best_activation)?;
            let mut candidate = rounder.round(&linear, &best_sensitivity, &best_activation);

            // One refinement solve with setpoints narrowed to the rounded
            // taps' neighborhoods
            if has_discrete && self.config.tap_model == TapModel::ApproximatedIntegers {
                problem.update_around_solution(&candidate)?;
                if problem.solve().is_usable() {
                    let refined = problem.read_activation(&best_activation)?;
                    candidate = rounder.round(&refined, &best_sensitivity, &best_activation);
                }
            }

            if candidate.is_same_as(&best_activation, self.config.convergence_tolerance) {
                status = OptimizationStatus::Optimal;
                break;
            }

            apply_activation(network, &perimeter, &candidate);
            let candidate_sensitivity = sensitivity_computer.compute(network, &candidate);
            if candidate_sensitivity.is_failure() {
                apply_activation(network, &perimeter, &best_activation);
                status = OptimizationStatus::SensitivityFailure;
                break;
            }

            let candidate_cost = objective.evaluate(&candidate_sensitivity, &candidate);
            if candidate_cost.total() < best_cost.total() {
                best_activation = candidate;
                best_sensitivity = candidate_sensitivity;
                best_cost = candidate_cost;
                problem.update(&best_sensitivity, &best_activation)?;
            } else {
                apply_activation(network, &perimeter, &best_activation);
                if self.config.range_shrinking && !shrunk {
                    shrunk = true;
                    problem.update(&best_sensitivity, &best_activation)?;
                    self.shrink_ranges(&mut problem, &best_activation)?;
                    continue;
                }
                status = OptimizationStatus::Optimal;
                break;
            }
        }

        Ok(LinearOptimizationResult {
            status,
            activation: best_activation,
            cost: best_cost,
            sensitivity: best_sensitivity,
            iterations,
        })
    }

    fn shrink_ranges(
        &self,
        problem: &mut LinearProblem,
        best: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        use crate::problem::VariableKey;
        let perimeter = Arc::clone(problem.perimeter_arc());
        let main = perimeter.main_state().clone();
        for (action, _) in perimeter.optimized_pairs() {
            let full = action.admissible_range(&main);
            let best_setpoint = best
                .setpoint(&action.id, &main)
                .unwrap_or(action.initial_setpoint);
            let (low, high) = self.narrowing.narrow(full, best_setpoint);
            let setpoint =
                problem.variable(&VariableKey::SetPoint(action.id.clone(), main.clone()))?;
            problem.model_mut().set_variable_bounds(setpoint, low, high);
        }
        Ok(())
    }
}

/// Push every pair of `activation` onto the network snapshot.
fn apply_activation<N: NetworkActions>(
    network: &mut N,
    perimeter: &OptimizationPerimeter,
    activation: &RangeActionActivation,
) {
    for (action, state) in perimeter.optimized_pairs().chain(perimeter.fixed_pairs()) {
        if let Some(setpoint) = activation.setpoint(&action.id, state) {
            network.apply(action, setpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proportional_narrowing_halves_distances() {
        let narrowing = ProportionalNarrowing::default();
        let (low, high) = narrowing.narrow((-10.0, 10.0), 4.0);
        assert!((low - (-3.0)).abs() < 1e-12);
        assert!((high - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_narrowing_keeps_infinite_ends() {
        let narrowing = ProportionalNarrowing::default();
        let (low, high) = narrowing.narrow((f64::NEG_INFINITY, 10.0), 0.0);
        assert!(low.is_infinite());
        assert!((high - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_narrowing_clamps_outside_best() {
        let narrowing = ProportionalNarrowing::default();
        let (low, high) = narrowing.narrow((-1.0, 1.0), 5.0);
        assert!((low - 0.0).abs() < 1e-12);
        assert!((high - 1.0).abs() < 1e-12);
    }
}
