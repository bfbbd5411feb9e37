//! Problem fillers.
//!
//! Each filler owns one slice of the linear problem: it creates its
//! variables and constraints on `fill`, and rewrites the data that depends
//! on the latest sensitivity snapshot on `update_between_iterations`. The
//! structural shape (which variables and constraints exist) is fixed after
//! `fill`; only coefficients and bounds move.

mod core;
mod discrete_tap;
mod group;
mod loop_flow;
mod max_min_margin;
mod monitored;
mod relative_margin;
mod usage_limit;

pub use self::core::CoreProblemFiller;
pub use discrete_tap::DiscreteTapFiller;
pub use group::GroupFiller;
pub use loop_flow::LoopFlowFiller;
pub use max_min_margin::MaxMinMarginFiller;
pub use monitored::MonitoredCnecFiller;
pub use relative_margin::MaxMinRelativeMarginFiller;
pub use usage_limit::UsageLimitFiller;

use rao_core::results::{RangeActionActivation, SensitivityResult};

use super::{LinearProblem, LinearProblemError};

/// One self-contained slice of the linear problem.
pub trait ProblemFiller {
    /// Create this filler's variables and constraints. Runs exactly once.
    fn fill(
        &mut self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError>;

    /// Refresh sensitivity-dependent coefficients and bounds before the
    /// next iteration's solve.
    fn update_between_iterations(
        &mut self,
        problem: &mut LinearProblem,
        sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let _ = (problem, sensitivity, reference);
        Ok(())
    }

    /// Narrow the problem around a rounded candidate before a refinement
    /// solve. Only meaningful in the approximated-integer mode.
    fn update_around_solution(
        &mut self,
        problem: &mut LinearProblem,
        rounded: &RangeActionActivation,
    ) -> Result<(), LinearProblemError> {
        let _ = (problem, rounded);
        Ok(())
    }
}
