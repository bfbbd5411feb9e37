//! Adjustable remedial actions with admissible setpoint ranges.
//!
//! A [`RangeAction`] references one adjustable device: a phase-shifting
//! transformer tap, an HVDC setpoint or a redispatchable injection. The
//! admissible setpoint range may differ per operating state (curative
//! ranges are often relative to the preventive position). Discretizable
//! devices additionally carry a [`TapConversion`] describing the
//! tap-position ↔ physical-value mapping read from the device model.

use crate::error::RaoError;
use crate::ids::{GroupId, RangeActionId, StateId};
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ordered mapping between discrete device positions and achievable
/// physical values (e.g. PST tap → phase-shift angle).
///
/// The mapping is not assumed equidistant: real transformer tap tables are
/// denser around neutral. Lookups are by exact position; the nearest
/// position for a continuous target value is found by scanning the ordered
/// table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapConversion {
    map: BTreeMap<i32, f64>,
}

impl TapConversion {
    /// Create a conversion from an explicit position → value table.
    pub fn new(map: BTreeMap<i32, f64>) -> Result<Self, RaoError> {
        if map.is_empty() {
            return Err(RaoError::Data("empty tap conversion table".into()));
        }
        Ok(TapConversion { map })
    }

    /// Create a linear conversion: positions `min_tap..=max_tap` mapped
    /// evenly onto `[min_value, max_value]`. Reversed arguments are
    /// normalized, keeping the position ↔ value pairing.
    pub fn linear(min_tap: i32, max_tap: i32, min_value: f64, max_value: f64) -> Self {
        let (min_tap, max_tap, min_value, max_value) = if min_tap <= max_tap {
            (min_tap, max_tap, min_value, max_value)
        } else {
            (max_tap, min_tap, max_value, min_value)
        };
        let span = (max_tap - min_tap).max(1) as f64;
        let map = (min_tap..=max_tap)
            .map(|t| {
                let frac = (t - min_tap) as f64 / span;
                (t, min_value + frac * (max_value - min_value))
            })
            .collect();
        TapConversion { map }
    }

    /// Physical value achievable at `tap`, if the position exists.
    pub fn value(&self, tap: i32) -> Option<f64> {
        self.map.get(&tap).copied()
    }

    /// Lowest tap position.
    pub fn min_tap(&self) -> i32 {
        *self.map.keys().next().expect("table is non-empty")
    }

    /// Highest tap position.
    pub fn max_tap(&self) -> i32 {
        *self.map.keys().next_back().expect("table is non-empty")
    }

    /// Ordered iterator over (position, value) pairs.
    pub fn taps(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.map.iter().map(|(t, v)| (*t, *v))
    }

    /// Tap position whose value is closest to `target`.
    ///
    /// Ties are broken toward the lower position; the result is
    /// deterministic for a given table.
    pub fn nearest_tap(&self, target: f64) -> i32 {
        let mut best_tap = self.min_tap();
        let mut best_dist = f64::INFINITY;
        for (tap, value) in self.taps() {
            let dist = (value - target).abs();
            if dist < best_dist {
                best_dist = dist;
                best_tap = tap;
            }
        }
        best_tap
    }

    /// Average value change per tap step between two positions.
    ///
    /// Returns 0.0 when the positions coincide or either is missing, so
    /// linearized coefficients degrade to "no effect" instead of NaN.
    pub fn average_slope(&self, from_tap: i32, to_tap: i32) -> f64 {
        if from_tap == to_tap {
            return 0.0;
        }
        match (self.value(from_tap), self.value(to_tap)) {
            (Some(a), Some(b)) => (b - a) / (to_tap - from_tap) as f64,
            _ => 0.0,
        }
    }
}

/// An adjustable remedial action with admissible setpoint bounds.
///
/// Immutable input, built once before optimization starts via
/// [`RangeActionBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAction {
    /// Unique identifier
    pub id: RangeActionId,
    /// Human-readable name
    pub name: String,
    /// Operator (TSO) owning the action, used by per-operator usage limits
    pub operator: Option<String>,
    /// Aligned-action group; members must share one virtual coordinate
    pub group: Option<GroupId>,
    /// Native units per virtual-coordinate unit for grouped actions
    pub group_scale: f64,
    /// Native unit of the setpoint
    pub unit: Unit,
    /// Pre-perimeter setpoint (the "not used" reference for usage limits)
    pub initial_setpoint: f64,
    /// Admissible range when no state-specific range applies
    pub default_range: (f64, f64),
    /// State-specific admissible ranges
    state_ranges: HashMap<StateId, (f64, f64)>,
    /// Tap discretization, present for discretizable devices
    pub taps: Option<TapConversion>,
}

impl RangeAction {
    /// Start building a range action.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> RangeActionBuilder {
        RangeActionBuilder::new(id, name)
    }

    /// Admissible setpoint range at `state`.
    pub fn admissible_range(&self, state: &StateId) -> (f64, f64) {
        self.state_ranges
            .get(state)
            .copied()
            .unwrap_or(self.default_range)
    }

    /// Whether this action is modeled with discrete positions.
    pub fn is_discrete(&self) -> bool {
        self.taps.is_some()
    }
}

/// Builder for [`RangeAction`].
pub struct RangeActionBuilder {
    action: RangeAction,
}

impl RangeActionBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            action: RangeAction {
                id: RangeActionId::new(id),
                name: name.into(),
                operator: None,
                group: None,
                group_scale: 1.0,
                unit: Unit::Megawatt,
                initial_setpoint: 0.0,
                default_range: (f64::NEG_INFINITY, f64::INFINITY),
                state_ranges: HashMap::new(),
                taps: None,
            },
        }
    }

    /// Set the operator (TSO) name.
    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.action.operator = Some(operator.into());
        self
    }

    /// Put the action in an alignment group.
    pub fn group(mut self, group: GroupId) -> Self {
        self.action.group = Some(group);
        self
    }

    /// Scale from the group's virtual coordinate to this member's unit.
    pub fn group_scale(mut self, scale: f64) -> Self {
        self.action.group_scale = scale;
        self
    }

    /// Set the setpoint unit.
    pub fn unit(mut self, unit: Unit) -> Self {
        self.action.unit = unit;
        self
    }

    /// Set the pre-perimeter setpoint.
    pub fn initial_setpoint(mut self, setpoint: f64) -> Self {
        self.action.initial_setpoint = setpoint;
        self
    }

    /// Set the default admissible range.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.action.default_range = (min, max);
        self
    }

    /// Override the admissible range for one state.
    pub fn state_range(mut self, state: StateId, min: f64, max: f64) -> Self {
        self.action.state_ranges.insert(state, (min, max));
        self
    }

    /// Attach a tap discretization table.
    pub fn taps(mut self, taps: TapConversion) -> Self {
        self.action.taps = Some(taps);
        self
    }

    pub fn build(self) -> RangeAction {
        self.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_conversion_endpoints() {
        let conv = TapConversion::linear(-5, 5, -10.0, 10.0);
        assert_eq!(conv.min_tap(), -5);
        assert_eq!(conv.max_tap(), 5);
        assert!((conv.value(-5).unwrap() + 10.0).abs() < 1e-12);
        assert!((conv.value(5).unwrap() - 10.0).abs() < 1e-12);
        assert!((conv.value(0).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_linear_reversed_arguments_normalized() {
        let forward = TapConversion::linear(-5, 5, -10.0, 10.0);
        let reversed = TapConversion::linear(5, -5, 10.0, -10.0);
        assert_eq!(forward, reversed);
        assert_eq!(reversed.min_tap(), -5);
        assert_eq!(reversed.max_tap(), 5);
    }

    #[test]
    fn test_nearest_tap_exact_positions() {
        // Strictly monotonic map: every achievable value rounds back to its
        // own position, no drift.
        let conv = TapConversion::linear(-10, 10, -6.3, 6.3);
        for (tap, value) in conv.taps().collect::<Vec<_>>() {
            assert_eq!(conv.nearest_tap(value), tap);
        }
    }

    #[test]
    fn test_nearest_tap_between_positions() {
        let conv = TapConversion::linear(0, 4, 0.0, 4.0);
        assert_eq!(conv.nearest_tap(1.4), 1);
        assert_eq!(conv.nearest_tap(2.6), 3);
        // Midpoint ties break toward the lower position
        assert_eq!(conv.nearest_tap(1.5), 1);
    }

    #[test]
    fn test_average_slope() {
        let conv = TapConversion::linear(-5, 5, -10.0, 10.0);
        assert!((conv.average_slope(-5, 5) - 2.0).abs() < 1e-12);
        assert_eq!(conv.average_slope(3, 3), 0.0);
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(TapConversion::new(BTreeMap::new()).is_err());
    }

    #[test]
    fn test_state_specific_range() {
        let preventive = StateId::new("preventive");
        let curative = StateId::new("curative");
        let action = RangeAction::builder("pst1", "PST 1")
            .range(-6.3, 6.3)
            .state_range(curative.clone(), -3.0, 3.0)
            .build();

        assert_eq!(action.admissible_range(&preventive), (-6.3, 6.3));
        assert_eq!(action.admissible_range(&curative), (-3.0, 3.0));
    }

    #[test]
    fn test_builder_defaults() {
        let action = RangeAction::builder("hvdc1", "HVDC 1")
            .operator("X")
            .initial_setpoint(100.0)
            .build();
        assert_eq!(action.operator.as_deref(), Some("X"));
        assert_eq!(action.group_scale, 1.0);
        assert!(!action.is_discrete());
    }
}
