//! External collaborator interfaces.
//!
//! The optimizer consumes three services it does not implement:
//!
//! - [`NetworkActions`]: the working network snapshot, mutated in place by
//!   applying range-action setpoints
//! - [`SensitivityComputer`]: recomputes flows and sensitivities on a
//!   mutated snapshot
//! - [`ObjectiveEvaluator`]: turns a flow/sensitivity snapshot and an
//!   activation into a cost breakdown
//!
//! The network type is a generic parameter, not a trait object, so
//! collaborators keep their concrete snapshot type end to end; the
//! optimizer only requires the mutation primitive.

use crate::range_action::RangeAction;
use crate::results::{CostBreakdown, RangeActionActivation, SensitivityResult};

/// A working network snapshot that range actions can be applied to.
///
/// `apply` mutates the snapshot in place and must be idempotent when called
/// again with the same setpoint. The snapshot is exclusively owned by one
/// optimization call for its whole duration.
pub trait NetworkActions {
    fn apply(&mut self, action: &RangeAction, setpoint: f64);
}

/// Recomputes flows and flow sensitivities on a network snapshot.
///
/// `activation` carries the full candidate activation, including
/// secondary-state pairs: the computer treats those as already-applied
/// remedial actions, not as quantities to optimize. A failed computation is
/// reported through the result status, never as a panic.
pub trait SensitivityComputer<N: NetworkActions + ?Sized> {
    fn compute(&mut self, network: &N, activation: &RangeActionActivation) -> SensitivityResult;
}

/// Evaluates the scalar objective on refreshed flow results.
pub trait ObjectiveEvaluator {
    fn evaluate(
        &self,
        sensitivity: &SensitivityResult,
        activation: &RangeActionActivation,
    ) -> CostBreakdown;
}
