//! Thin boundary over the linear/mixed-integer solver.
//!
//! [`LpModel`] owns the durable problem description: variable bounds,
//! integrality flags, objective coefficients and sparse constraint rows.
//! Fillers mutate this description in place between iterations; every
//! `solve()` lowers the current state into a fresh `good_lp` model and
//! reads the values back. The model store, not the backend handle, is what
//! survives across iterations - this is what makes the two-phase
//! fill/update lifecycle of the linear problem cheap.
//!
//! ## Integer variables
//!
//! With the default pure-Rust Clarabel backend the LP relaxation is solved
//! and fractional integer variables are then fixed by a sequential rounding
//! dive: fix the most fractional variable to its best-objective integer
//! bound, re-solve, repeat. A dived solution reports
//! [`SolverStatus::Feasible`] rather than `Optimal`. With the
//! `solver-highs` feature the integrality flags are handed to HiGHS and
//! solved exactly.

use std::collections::HashMap;
use std::fmt;

use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};

#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs as lp_backend;

#[cfg(all(feature = "solver-clarabel", not(feature = "solver-highs")))]
use good_lp::solvers::clarabel::clarabel as lp_backend;

#[cfg(not(any(feature = "solver-clarabel", feature = "solver-highs")))]
compile_error!("enable at least one solver backend: solver-clarabel or solver-highs");

/// Handle to a solver variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle to a solver constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConId(usize);

impl ConId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Terminal status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// Proven optimal for the lowered problem
    Optimal,
    /// A feasible solution without an optimality proof (rounding dive)
    Feasible,
    Infeasible,
    Unbounded,
    /// Backend failure that is neither infeasibility nor unboundedness
    Abnormal,
    /// No solve attempted yet
    NotSolved,
}

impl SolverStatus {
    /// Whether a solution is available to read back.
    pub fn is_usable(&self) -> bool {
        matches!(self, SolverStatus::Optimal | SolverStatus::Feasible)
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::Feasible => "feasible",
            SolverStatus::Infeasible => "infeasible",
            SolverStatus::Unbounded => "unbounded",
            SolverStatus::Abnormal => "abnormal",
            SolverStatus::NotSolved => "not-solved",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
struct VarRecord {
    name: String,
    lower: f64,
    upper: f64,
    integer: bool,
    objective: f64,
}

#[derive(Debug, Clone)]
struct ConRecord {
    name: String,
    lower: f64,
    upper: f64,
    coefficients: HashMap<usize, f64>,
}

/// Mutable linear/mixed-integer model with in-place coefficient updates.
#[derive(Debug)]
pub struct LpModel {
    vars: Vec<VarRecord>,
    cons: Vec<ConRecord>,
    solution: Vec<f64>,
    status: SolverStatus,
}

impl LpModel {
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            cons: Vec::new(),
            solution: Vec::new(),
            status: SolverStatus::NotSolved,
        }
    }

    /// Add a continuous variable. Infinite bounds mean unbounded.
    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.push_variable(name.into(), lower, upper, false)
    }

    /// Add an integer variable.
    pub fn add_integer_variable(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
    ) -> VarId {
        self.push_variable(name.into(), lower, upper, true)
    }

    fn push_variable(&mut self, name: String, lower: f64, upper: f64, integer: bool) -> VarId {
        self.vars.push(VarRecord {
            name,
            lower,
            upper,
            integer,
            objective: 0.0,
        });
        VarId(self.vars.len() - 1)
    }

    /// Replace the bounds of a variable.
    pub fn set_variable_bounds(&mut self, var: VarId, lower: f64, upper: f64) {
        let record = &mut self.vars[var.0];
        record.lower = lower;
        record.upper = upper;
    }

    /// Set (replace) the minimized-objective coefficient of a variable.
    pub fn set_objective_coefficient(&mut self, var: VarId, coefficient: f64) {
        self.vars[var.0].objective = coefficient;
    }

    /// Add an empty constraint `lower <= row <= upper`. Coefficients are
    /// set afterwards, and may be rewritten between solves.
    pub fn add_constraint(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> ConId {
        self.cons.push(ConRecord {
            name: name.into(),
            lower,
            upper,
            coefficients: HashMap::new(),
        });
        ConId(self.cons.len() - 1)
    }

    /// Set (replace) one coefficient of a constraint row.
    pub fn set_coefficient(&mut self, con: ConId, var: VarId, coefficient: f64) {
        self.cons[con.0].coefficients.insert(var.0, coefficient);
    }

    /// Replace the bounds of a constraint row.
    pub fn set_constraint_bounds(&mut self, con: ConId, lower: f64, upper: f64) {
        let record = &mut self.cons[con.0];
        record.lower = lower;
        record.upper = upper;
    }

    /// Name a variable was registered under.
    pub fn variable_name(&self, var: VarId) -> &str {
        &self.vars[var.0].name
    }

    /// Name a constraint was registered under.
    pub fn constraint_name(&self, con: ConId) -> &str {
        &self.cons[con.0].name
    }

    pub fn num_variables(&self) -> usize {
        self.vars.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.cons.len()
    }

    /// Status of the last solve.
    pub fn status(&self) -> SolverStatus {
        self.status
    }

    /// Value of `var` in the last usable solution, 0.0 before any solve.
    pub fn value(&self, var: VarId) -> f64 {
        self.solution.get(var.0).copied().unwrap_or(0.0)
    }

    /// Objective value of the last usable solution.
    pub fn objective_value(&self) -> f64 {
        self.objective_of(&self.solution)
    }

    fn objective_of(&self, values: &[f64]) -> f64 {
        self.vars
            .iter()
            .zip(values)
            .map(|(v, x)| v.objective * x)
            .sum()
    }

    /// Lower the current model state into the backend and solve.
    pub fn solve(&mut self) -> SolverStatus {
        let mut fixed: HashMap<usize, (f64, f64)> = HashMap::new();

        let mut values = match self.lower_and_solve(&fixed) {
            Ok(values) => values,
            Err(status) => {
                self.status = status;
                return status;
            }
        };

        let mut dived = false;
        // Rounding dive for fractional integer variables. With the HiGHS
        // backend the relaxation already comes back integral and the loop
        // exits immediately.
        for _ in 0..self.vars.len() {
            let Some(target) = self.most_fractional(&values, &fixed) else {
                break;
            };
            dived = true;
            match self.fix_best_direction(target, &values, &mut fixed) {
                Some(next_values) => values = next_values,
                None => {
                    self.status = SolverStatus::Abnormal;
                    return self.status;
                }
            }
        }

        self.solution = values;
        self.status = if dived {
            SolverStatus::Feasible
        } else {
            SolverStatus::Optimal
        };
        self.status
    }

    /// Index of the integer variable farthest from integrality, if any.
    fn most_fractional(
        &self,
        values: &[f64],
        fixed: &HashMap<usize, (f64, f64)>,
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, record) in self.vars.iter().enumerate() {
            if !record.integer || fixed.contains_key(&idx) {
                continue;
            }
            let value = values[idx];
            let frac = (value - value.round()).abs();
            if frac <= 1e-6 {
                continue;
            }
            if best.map_or(true, |(_, f)| frac > f) {
                best = Some((idx, frac));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Fix `target` to whichever of floor/ceil yields the best feasible
    /// objective, re-solving the relaxation for each direction.
    fn fix_best_direction(
        &self,
        target: usize,
        values: &[f64],
        fixed: &mut HashMap<usize, (f64, f64)>,
    ) -> Option<Vec<f64>> {
        let record = &self.vars[target];
        let value = values[target];
        let mut candidates = vec![value.floor(), value.ceil()];
        candidates.retain(|c| *c >= record.lower - 1e-9 && *c <= record.upper + 1e-9);
        candidates.dedup();

        let mut best: Option<(f64, f64, Vec<f64>)> = None;
        for candidate in candidates {
            fixed.insert(target, (candidate, candidate));
            if let Ok(solution) = self.lower_and_solve(fixed) {
                let objective = self.objective_of(&solution);
                if best.as_ref().map_or(true, |(_, obj, _)| objective < *obj) {
                    best = Some((candidate, objective, solution));
                }
            }
            fixed.remove(&target);
        }

        best.map(|(candidate, _, solution)| {
            fixed.insert(target, (candidate, candidate));
            solution
        })
    }

    /// Build a backend model from the current state (with per-variable
    /// bound overrides from the dive) and solve it.
    fn lower_and_solve(
        &self,
        overrides: &HashMap<usize, (f64, f64)>,
    ) -> Result<Vec<f64>, SolverStatus> {
        let mut problem = ProblemVariables::new();
        let mut handles: Vec<Variable> = Vec::with_capacity(self.vars.len());

        for (idx, record) in self.vars.iter().enumerate() {
            let (lower, upper) = overrides
                .get(&idx)
                .copied()
                .unwrap_or((record.lower, record.upper));
            let mut definition = variable();
            if lower.is_finite() {
                definition = definition.min(lower);
            }
            if upper.is_finite() {
                definition = definition.max(upper);
            }
            #[cfg(feature = "solver-highs")]
            if record.integer {
                definition = definition.integer();
            }
            handles.push(problem.add(definition));
        }

        let mut objective = Expression::from(0.0);
        for (idx, record) in self.vars.iter().enumerate() {
            if record.objective != 0.0 {
                objective += record.objective * handles[idx];
            }
        }

        let mut model = problem.minimise(objective).using(lp_backend);

        for record in &self.cons {
            let mut row = Expression::from(0.0);
            for (&var_idx, &coefficient) in &record.coefficients {
                if coefficient != 0.0 {
                    row += coefficient * handles[var_idx];
                }
            }
            if record.lower.is_finite() && record.lower == record.upper {
                model = model.with(constraint!(row == record.lower));
                continue;
            }
            if record.upper.is_finite() {
                model = model.with(constraint!(row.clone() <= record.upper));
            }
            if record.lower.is_finite() {
                model = model.with(constraint!(row >= record.lower));
            }
        }

        match model.solve() {
            Ok(solution) => Ok(handles.iter().map(|h| solution.value(*h)).collect()),
            Err(good_lp::ResolutionError::Infeasible) => Err(SolverStatus::Infeasible),
            Err(good_lp::ResolutionError::Unbounded) => Err(SolverStatus::Unbounded),
            Err(_) => Err(SolverStatus::Abnormal),
        }
    }
}

impl Default for LpModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_lp() {
        // maximize x + y subject to x + y <= 10, x <= 6
        let mut model = LpModel::new();
        let x = model.add_variable("x", 0.0, 6.0);
        let y = model.add_variable("y", 0.0, f64::INFINITY);
        model.set_objective_coefficient(x, -1.0);
        model.set_objective_coefficient(y, -1.0);
        let budget = model.add_constraint("budget", f64::NEG_INFINITY, 10.0);
        model.set_coefficient(budget, x, 1.0);
        model.set_coefficient(budget, y, 1.0);

        let status = model.solve();
        assert_eq!(status, SolverStatus::Optimal);
        assert!((model.value(x) + model.value(y) - 10.0).abs() < 1e-4);
        assert!((model.objective_value() + 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_equality_constraint() {
        let mut model = LpModel::new();
        let x = model.add_variable("x", 0.0, 10.0);
        let y = model.add_variable("y", 0.0, 10.0);
        model.set_objective_coefficient(y, 1.0);
        let link = model.add_constraint("link", 4.0, 4.0);
        model.set_coefficient(link, x, 1.0);
        model.set_coefficient(link, y, 1.0);

        assert_eq!(model.solve(), SolverStatus::Optimal);
        // y minimized to 0, x picks up the equality
        assert!(model.value(y).abs() < 1e-4);
        assert!((model.value(x) - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_infeasible_detected() {
        let mut model = LpModel::new();
        let x = model.add_variable("x", 0.0, 1.0);
        let con = model.add_constraint("impossible", 5.0, f64::INFINITY);
        model.set_coefficient(con, x, 1.0);
        assert_eq!(model.solve(), SolverStatus::Infeasible);
        assert!(!model.status().is_usable());
    }

    #[test]
    fn test_update_in_place_changes_solution() {
        let mut model = LpModel::new();
        let x = model.add_variable("x", 0.0, 100.0);
        model.set_objective_coefficient(x, -1.0);
        let cap = model.add_constraint("cap", f64::NEG_INFINITY, 10.0);
        model.set_coefficient(cap, x, 1.0);

        assert_eq!(model.solve(), SolverStatus::Optimal);
        assert!((model.value(x) - 10.0).abs() < 1e-4);

        // Rewrite the row coefficient: 2x <= 10 now
        model.set_coefficient(cap, x, 2.0);
        assert_eq!(model.solve(), SolverStatus::Optimal);
        assert!((model.value(x) - 5.0).abs() < 1e-4);

        // Relax the bound
        model.set_constraint_bounds(cap, f64::NEG_INFINITY, 40.0);
        assert_eq!(model.solve(), SolverStatus::Optimal);
        assert!((model.value(x) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_integer_dive_respects_cardinality() {
        // Two binaries, at most one active, each unlocks 10 units of
        // reward. The relaxation splits them; the dive must not.
        let mut model = LpModel::new();
        let a = model.add_variable("a", 0.0, 10.0);
        let b = model.add_variable("b", 0.0, 10.0);
        let ua = model.add_integer_variable("ua", 0.0, 1.0);
        let ub = model.add_integer_variable("ub", 0.0, 1.0);
        model.set_objective_coefficient(a, -1.0);
        model.set_objective_coefficient(b, -1.0);

        let link_a = model.add_constraint("link_a", f64::NEG_INFINITY, 0.0);
        model.set_coefficient(link_a, a, 1.0);
        model.set_coefficient(link_a, ua, -10.0);
        let link_b = model.add_constraint("link_b", f64::NEG_INFINITY, 0.0);
        model.set_coefficient(link_b, b, 1.0);
        model.set_coefficient(link_b, ub, -10.0);
        let cardinality = model.add_constraint("cardinality", f64::NEG_INFINITY, 1.0);
        model.set_coefficient(cardinality, ua, 1.0);
        model.set_coefficient(cardinality, ub, 1.0);

        let status = model.solve();
        assert!(status.is_usable());
        let used = model.value(ua).round() + model.value(ub).round();
        assert!(used <= 1.0 + 1e-6);
        // Exactly one side delivers its 10 units
        assert!((model.value(a) + model.value(b) - 10.0).abs() < 1e-3);
    }
}
