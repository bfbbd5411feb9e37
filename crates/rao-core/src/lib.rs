//! # rao-core: Remedial Action Optimization Core Model
//!
//! Provides the domain model consumed by the iterating linear optimizer in
//! `rao-linopt`: adjustable remedial actions, monitored branch-flow
//! constraints, the optimization perimeter, and the immutable value
//! snapshots exchanged with external collaborators.
//!
//! ## Design Philosophy
//!
//! The optimizer never owns a network representation. Everything it needs
//! from the outside world crosses three narrow trait boundaries
//! ([`NetworkActions`], [`SensitivityComputer`], [`ObjectiveEvaluator`]),
//! and everything it produces is an immutable value type. This keeps one
//! optimization call strictly sequential and side-effect free outside its
//! exclusively-owned network snapshot.
//!
//! ## Core Data Structures
//!
//! - [`RangeAction`] - an adjustable device (PST tap, HVDC setpoint,
//!   injection) with admissible bounds and optional tap discretization
//! - [`FlowCnec`] - a monitored branch flow under one operating state
//! - [`OptimizationPerimeter`] - the states, actions and CNECs optimized
//!   together in one call
//! - [`RangeActionActivation`] - the (action, state) → setpoint result
//! - [`SensitivityResult`] - flows and flow sensitivities for one network
//!   snapshot
//! - [`CostBreakdown`] - functional plus named virtual costs
//!
//! ## ID System
//!
//! Every element carries a string newtype ID ([`RangeActionId`], [`CnecId`],
//! [`StateId`], [`GroupId`]). IDs come from the upstream data model and are
//! the keys from which solver variable and constraint names are derived, so
//! two fillers can address the same entity without sharing object
//! references.

pub mod cnec;
pub mod error;
pub mod ids;
pub mod interfaces;
pub mod perimeter;
pub mod range_action;
pub mod results;
pub mod units;

pub use cnec::{FlowCnec, FlowCnecBuilder, Side};
pub use error::{RaoError, RaoResult};
pub use ids::{CnecId, GroupId, RangeActionId, StateId};
pub use interfaces::{NetworkActions, ObjectiveEvaluator, SensitivityComputer};
pub use perimeter::OptimizationPerimeter;
pub use range_action::{RangeAction, RangeActionBuilder, TapConversion};
pub use results::{
    CostBreakdown, RangeActionActivation, SensitivityResult, SensitivityResultBuilder,
    SensitivityStatus,
};
pub use units::Unit;
