//! # rao-linopt: Iterating Linear Remedial Action Optimizer
//!
//! This crate optimizes continuous and discrete remedial-action setpoints
//! against monitored branch-flow constraints, by iterating a linear
//! approximation of the network response: solve the LP, round taps, apply
//! to the network, recompute real sensitivities, and repeat until the cost
//! stops improving.
//!
//! ## Linear Problem
//!
//! The problem is assembled by an ordered list of fillers, each owning one
//! concern:
//!
//! | Filler | Concern |
//! |--------|---------|
//! | [`problem::fillers::CoreProblemFiller`] | Setpoints, variation penalty, flow linearization |
//! | [`problem::fillers::MaxMinMarginFiller`] | Absolute max-min margin objective |
//! | [`problem::fillers::MaxMinRelativeMarginFiller`] | PTDF-scaled margin objective |
//! | [`problem::fillers::MonitoredCnecFiller`] | Soft bounds on monitored CNECs |
//! | [`problem::fillers::LoopFlowFiller`] | Loop-flow containment bands |
//! | [`problem::fillers::DiscreteTapFiller`] | Exact integer tap variables |
//! | [`problem::fillers::GroupFiller`] | Aligned range-action groups |
//! | [`problem::fillers::UsageLimitFiller`] | Usage-count caps |
//!
//! Fillers create their variables and constraints once on `fill` and only
//! rewrite coefficients and bounds on later iterations, so the solver model
//! is rebuilt cheaply from the same structure every solve.
//!
//! ## Solver Backends
//!
//! The default `solver-clarabel` feature solves through the pure-Rust
//! Clarabel backend of `good_lp`; integer variables are then fixed by a
//! rounding dive. The `solver-highs` feature delegates the full MILP to
//! HiGHS instead.
//!
//! ## Example
//!
//! ```ignore
//! use rao_linopt::{IteratingLinearOptimizer, LinearOptimizerConfig};
//!
//! let optimizer = IteratingLinearOptimizer::new(LinearOptimizerConfig::default());
//! let result = optimizer.optimize(
//!     perimeter,
//!     &mut network,
//!     &mut sensitivity_computer,
//!     &objective,
//!     initial_sensitivity,
//! )?;
//! println!("{}", result.summary());
//! ```

pub mod config;
pub mod optimizer;
pub mod problem;
pub mod rounding;
pub mod solver;

pub use config::{
    LinearOptimizerConfig, MarginObjective, RangeActionLimits, SolverConfig, TapModel,
};
pub use optimizer::{
    IteratingLinearOptimizer, LinearOptimizationResult, OptimizationStatus,
    ProportionalNarrowing, RangeNarrowing,
};
pub use problem::{
    ConstraintKey, LinearProblem, LinearProblemBuilder, LinearProblemError, ProblemFiller,
    VariableKey,
};
pub use rounding::TapRounder;
pub use solver::{ConId, LpModel, SolverStatus, VarId};
