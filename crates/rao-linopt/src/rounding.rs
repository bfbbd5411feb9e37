//! Discrete tap rounding of a continuous linear optimum.

use std::cmp::Ordering;
use std::sync::Arc;

use rao_core::cnec::Side;
use rao_core::ids::{CnecId, GroupId};
use rao_core::perimeter::OptimizationPerimeter;
use rao_core::results::{RangeActionActivation, SensitivityResult};

use std::collections::HashMap;

/// Projects the continuous setpoints of discrete devices onto their tap
/// grids without spoiling the linear optimum.
///
/// Devices are rounded one by one in identifier order, each against flow
/// estimates that already account for the rounding of the devices before
/// it. A candidate tap is acceptable when no optimized CNEC bound ends up
/// violated by more than it already was at the continuous optimum, plus a
/// small tolerance; this degradation guard lets the rounder keep working
/// on grids where some margins are negative to begin with. When no
/// candidate passes, the device falls back to its previous position.
///
/// Grouped devices stay aligned: the first member rounded establishes the
/// group coordinate and later members target it instead of their own
/// continuous value.
pub struct TapRounder {
    perimeter: Arc<OptimizationPerimeter>,
    flow_epsilon_mw: f64,
}

struct FlowRow {
    cnec: CnecId,
    side: Side,
    lower: Option<f64>,
    upper: Option<f64>,
    flow: f64,
    baseline_violation: f64,
}

fn violation(flow: f64, lower: Option<f64>, upper: Option<f64>) -> f64 {
    let over = upper.map_or(0.0, |ub| (flow - ub).max(0.0));
    let under = lower.map_or(0.0, |lb| (lb - flow).max(0.0));
    over.max(under)
}

impl TapRounder {
    pub fn new(perimeter: Arc<OptimizationPerimeter>, flow_epsilon_mw: f64) -> Self {
        Self {
            perimeter,
            flow_epsilon_mw,
        }
    }

    /// Round `linear` (a solved continuous activation) against the flow
    /// estimates derived from `sensitivity`, which was computed at
    /// `reference`.
    pub fn round(
        &self,
        linear: &RangeActionActivation,
        sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> RangeActionActivation {
        let main = self.perimeter.main_state().clone();
        let mut result = linear.clone();
        let mut rows = self.flow_rows(linear, sensitivity, reference);

        let mut group_coordinates: HashMap<GroupId, f64> = HashMap::new();

        let mut discrete: Vec<_> = self
            .perimeter
            .optimized_pairs()
            .map(|(action, _)| action)
            .filter(|action| action.taps.is_some())
            .collect();
        discrete.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        for action in discrete {
            let Some(taps) = &action.taps else {
                continue;
            };
            let linear_value = linear
                .setpoint(&action.id, &main)
                .unwrap_or(action.initial_setpoint);
            let target = action
                .group
                .as_ref()
                .and_then(|group| group_coordinates.get(group))
                .map(|coordinate| coordinate * action.group_scale)
                .unwrap_or(linear_value);
            let previous_tap = reference
                .tap(&action.id, &main)
                .unwrap_or_else(|| taps.nearest_tap(target));

            let (min_setpoint, max_setpoint) = action.admissible_range(&main);
            let mut candidates: Vec<(i32, f64)> = taps
                .taps()
                .filter(|(_, value)| {
                    *value >= min_setpoint - 1e-9 && *value <= max_setpoint + 1e-9
                })
                .collect();
            candidates.sort_by(|(tap_a, value_a), (tap_b, value_b)| {
                (value_a - target)
                    .abs()
                    .partial_cmp(&(value_b - target).abs())
                    .unwrap_or(Ordering::Equal)
                    .then((tap_a - previous_tap).abs().cmp(&(tap_b - previous_tap).abs()))
                    .then(tap_a.cmp(tap_b))
            });

            let chosen = candidates
                .iter()
                .find(|(_, value)| {
                    self.acceptable(&rows, sensitivity, &action.id, *value, linear_value)
                })
                .copied()
                .or_else(|| taps.value(previous_tap).map(|value| (previous_tap, value)))
                .or_else(|| candidates.first().copied());

            let Some((tap, value)) = chosen else {
                continue;
            };
            for row in &mut rows {
                row.flow +=
                    sensitivity.sensitivity(&row.cnec, row.side, &action.id) * (value - linear_value);
            }
            result.set(action.id.clone(), main.clone(), value);
            result.set_tap(action.id.clone(), main.clone(), tap);
            if let Some(group) = &action.group {
                let coordinate = if action.group_scale != 0.0 {
                    value / action.group_scale
                } else {
                    value
                };
                group_coordinates.entry(group.clone()).or_insert(coordinate);
            }
        }

        result
    }

    /// Flow estimates at the continuous optimum, one row per bounded
    /// optimized CNEC side.
    fn flow_rows(
        &self,
        linear: &RangeActionActivation,
        sensitivity: &SensitivityResult,
        reference: &RangeActionActivation,
    ) -> Vec<FlowRow> {
        let main = self.perimeter.main_state().clone();
        let mut rows = Vec::new();
        for cnec in self.perimeter.optimized_cnecs() {
            if cnec.lower_bound_mw.is_none() && cnec.upper_bound_mw.is_none() {
                continue;
            }
            for &side in &cnec.sides {
                let Some(mut flow) = sensitivity.flow(&cnec.id, side) else {
                    continue;
                };
                for (action, _) in self.perimeter.optimized_pairs() {
                    let solved = linear
                        .setpoint(&action.id, &main)
                        .unwrap_or(action.initial_setpoint);
                    let at_reference = reference
                        .setpoint(&action.id, &main)
                        .unwrap_or(action.initial_setpoint);
                    flow += sensitivity.sensitivity(&cnec.id, side, &action.id)
                        * (solved - at_reference);
                }
                let baseline_violation =
                    violation(flow, cnec.lower_bound_mw, cnec.upper_bound_mw);
                rows.push(FlowRow {
                    cnec: cnec.id.clone(),
                    side,
                    lower: cnec.lower_bound_mw,
                    upper: cnec.upper_bound_mw,
                    flow,
                    baseline_violation,
                });
            }
        }
        rows
    }

    fn acceptable(
        &self,
        rows: &[FlowRow],
        sensitivity: &SensitivityResult,
        action: &rao_core::ids::RangeActionId,
        candidate_value: f64,
        linear_value: f64,
    ) -> bool {
        rows.iter().all(|row| {
            let shifted = row.flow
                + sensitivity.sensitivity(&row.cnec, row.side, action)
                    * (candidate_value - linear_value);
            violation(shifted, row.lower, row.upper)
                <= row.baseline_violation + self.flow_epsilon_mw
        })
    }
}
