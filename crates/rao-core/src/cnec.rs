//! Monitored branch-flow constraints (CNECs).
//!
//! A CNEC is one monitored branch under one operating state. Both ends of
//! the branch can be monitored independently (tap changers and HVDC make
//! the two sides differ). Bounds are directional and expressed in MW; the
//! upstream model converts ampere thresholds before the optimizer runs.

use crate::ids::{CnecId, StateId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monitored side of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    One,
    Two,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::One => f.write_str("one"),
            Side::Two => f.write_str("two"),
        }
    }
}

/// A (monitored branch, operating state) pair with directional flow bounds.
///
/// Immutable input, built once via [`FlowCnecBuilder`].
///
/// Flags:
/// - `optimized`: the CNEC's margin enters the min-margin objective and its
///   bounds are the hard bounds the tap rounder defends
/// - `monitored`: the CNEC is tracked but must never force infeasibility;
///   violations are penalized, not forbidden
/// - `loop_flow_limit_mw`: if present, the commercial-flow-adjusted flow is
///   kept below this threshold with the same soft-violation pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCnec {
    /// Unique identifier
    pub id: CnecId,
    /// Human-readable name
    pub name: String,
    /// Operating state (preventive, or a contingency-instant pair)
    pub state: StateId,
    /// Monitored sides
    pub sides: Vec<Side>,
    /// Lower directional bound (MW)
    pub lower_bound_mw: Option<f64>,
    /// Upper directional bound (MW)
    pub upper_bound_mw: Option<f64>,
    /// Participates in the margin objective
    pub optimized: bool,
    /// Monitored-only: soft limit, penalized instead of hard-bounded
    pub monitored: bool,
    /// Loop-flow threshold (MW), if the CNEC is loop-flow-limited
    pub loop_flow_limit_mw: Option<f64>,
}

impl FlowCnec {
    /// Start building a CNEC.
    pub fn builder(
        id: impl Into<String>,
        name: impl Into<String>,
        state: StateId,
    ) -> FlowCnecBuilder {
        FlowCnecBuilder::new(id, name, state)
    }

    /// Whether a loop-flow limit applies.
    pub fn is_loop_flow_limited(&self) -> bool {
        self.loop_flow_limit_mw.is_some()
    }

    /// Margin of `flow_mw` against the directional bounds, positive when
    /// inside. Unbounded directions contribute infinite margin.
    pub fn margin(&self, flow_mw: f64) -> f64 {
        let upper_margin = self.upper_bound_mw.map_or(f64::INFINITY, |ub| ub - flow_mw);
        let lower_margin = self.lower_bound_mw.map_or(f64::INFINITY, |lb| flow_mw - lb);
        upper_margin.min(lower_margin)
    }
}

/// Builder for [`FlowCnec`].
pub struct FlowCnecBuilder {
    cnec: FlowCnec,
}

impl FlowCnecBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: StateId) -> Self {
        Self {
            cnec: FlowCnec {
                id: CnecId::new(id),
                name: name.into(),
                state,
                sides: vec![Side::One],
                lower_bound_mw: None,
                upper_bound_mw: None,
                optimized: true,
                monitored: false,
                loop_flow_limit_mw: None,
            },
        }
    }

    /// Replace the monitored sides (default: side one only).
    pub fn sides(mut self, sides: Vec<Side>) -> Self {
        self.cnec.sides = sides;
        self
    }

    /// Set the upper directional bound in MW.
    pub fn upper_bound_mw(mut self, bound: f64) -> Self {
        self.cnec.upper_bound_mw = Some(bound);
        self
    }

    /// Set the lower directional bound in MW.
    pub fn lower_bound_mw(mut self, bound: f64) -> Self {
        self.cnec.lower_bound_mw = Some(bound);
        self
    }

    /// Mark the CNEC monitored-only: excluded from the margin objective,
    /// bounded softly through a penalized violation variable.
    pub fn monitored_only(mut self) -> Self {
        self.cnec.optimized = false;
        self.cnec.monitored = true;
        self
    }

    /// Attach a loop-flow threshold in MW.
    pub fn loop_flow_limit_mw(mut self, limit: f64) -> Self {
        self.cnec.loop_flow_limit_mw = Some(limit);
        self
    }

    pub fn build(self) -> FlowCnec {
        self.cnec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> StateId {
        StateId::new("preventive")
    }

    #[test]
    fn test_builder_defaults() {
        let cnec = FlowCnec::builder("c1", "Line 1-2", state()).build();
        assert!(cnec.optimized);
        assert!(!cnec.monitored);
        assert_eq!(cnec.sides, vec![Side::One]);
        assert!(!cnec.is_loop_flow_limited());
    }

    #[test]
    fn test_monitored_only_flag() {
        let cnec = FlowCnec::builder("c1", "Line 1-2", state())
            .monitored_only()
            .upper_bound_mw(500.0)
            .build();
        assert!(!cnec.optimized);
        assert!(cnec.monitored);
    }

    #[test]
    fn test_margin_directional() {
        let cnec = FlowCnec::builder("c1", "Line 1-2", state())
            .upper_bound_mw(100.0)
            .lower_bound_mw(-100.0)
            .build();
        assert!((cnec.margin(80.0) - 20.0).abs() < 1e-12);
        assert!((cnec.margin(-95.0) - 5.0).abs() < 1e-12);
        assert!(cnec.margin(120.0) < 0.0);
    }

    #[test]
    fn test_margin_one_sided() {
        let cnec = FlowCnec::builder("c1", "Line 1-2", state())
            .upper_bound_mw(100.0)
            .build();
        // No lower bound: margin is driven by the upper side only
        assert!((cnec.margin(-1e6) - (100.0 + 1e6)).abs() < 1e-6);
    }
}
