//! Optimization perimeter: the states, range actions and CNECs optimized
//! together in one call.
//!
//! The perimeter is partitioned into one main state, whose range actions
//! are the free variables of the linear problem, and zero or more secondary
//! states whose range actions are treated as already applied: their
//! setpoints are constants supplied to the sensitivity computer, never
//! re-optimized here. The outer search tree decides which secondary
//! activations to try; this core only optimizes the main-state continuum.

use crate::cnec::FlowCnec;
use crate::ids::{GroupId, RangeActionId, StateId};
use crate::range_action::RangeAction;
use std::collections::{BTreeMap, HashMap};

/// The set of states being optimized together. Immutable per optimization
/// call; shared into problem fillers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct OptimizationPerimeter {
    main_state: StateId,
    secondary_states: Vec<StateId>,
    cnecs: Vec<FlowCnec>,
    range_actions: HashMap<StateId, Vec<RangeAction>>,
}

impl OptimizationPerimeter {
    /// Create a perimeter around `main_state`.
    pub fn new(main_state: StateId) -> Self {
        Self {
            main_state,
            secondary_states: Vec::new(),
            cnecs: Vec::new(),
            range_actions: HashMap::new(),
        }
    }

    /// Register a secondary state (fixed, already-applied actions).
    pub fn add_secondary_state(&mut self, state: StateId) {
        if state != self.main_state && !self.secondary_states.contains(&state) {
            self.secondary_states.push(state);
        }
    }

    /// Add a monitored CNEC.
    pub fn add_cnec(&mut self, cnec: FlowCnec) {
        self.cnecs.push(cnec);
    }

    /// Make a range action eligible at `state`.
    pub fn add_range_action(&mut self, state: StateId, action: RangeAction) {
        self.range_actions.entry(state).or_default().push(action);
    }

    /// The main (free-variable) state.
    pub fn main_state(&self) -> &StateId {
        &self.main_state
    }

    /// Secondary (fixed) states.
    pub fn secondary_states(&self) -> &[StateId] {
        &self.secondary_states
    }

    /// Whether `state` is a secondary state of this perimeter.
    pub fn is_secondary(&self, state: &StateId) -> bool {
        self.secondary_states.contains(state)
    }

    /// All monitored CNECs.
    pub fn cnecs(&self) -> &[FlowCnec] {
        &self.cnecs
    }

    /// CNECs participating in the margin objective.
    pub fn optimized_cnecs(&self) -> impl Iterator<Item = &FlowCnec> {
        self.cnecs.iter().filter(|c| c.optimized)
    }

    /// Range actions eligible at `state`.
    pub fn range_actions_at(&self, state: &StateId) -> &[RangeAction] {
        self.range_actions
            .get(state)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The free (range action, state) pairs of the linear problem: every
    /// eligible action at the main state.
    pub fn optimized_pairs(&self) -> impl Iterator<Item = (&RangeAction, &StateId)> {
        self.range_actions_at(&self.main_state)
            .iter()
            .map(move |a| (a, &self.main_state))
    }

    /// The fixed (range action, state) pairs: eligible actions at secondary
    /// states, applied but not re-optimized.
    pub fn fixed_pairs(&self) -> impl Iterator<Item = (&RangeAction, &StateId)> {
        self.secondary_states
            .iter()
            .flat_map(move |s| self.range_actions_at(s).iter().map(move |a| (a, s)))
    }

    /// Find a main-state action by id.
    pub fn main_action(&self, id: &RangeActionId) -> Option<&RangeAction> {
        self.range_actions_at(&self.main_state)
            .iter()
            .find(|a| &a.id == id)
    }

    /// Alignment groups among main-state actions, in deterministic order.
    pub fn groups(&self) -> BTreeMap<GroupId, Vec<&RangeAction>> {
        let mut groups: BTreeMap<GroupId, Vec<&RangeAction>> = BTreeMap::new();
        for action in self.range_actions_at(&self.main_state) {
            if let Some(group) = &action.group {
                groups.entry(group.clone()).or_default().push(action);
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_action::RangeAction;

    fn main_state() -> StateId {
        StateId::new("preventive")
    }

    #[test]
    fn test_partitioned_pairs() {
        let curative = StateId::new("curative");
        let mut perimeter = OptimizationPerimeter::new(main_state());
        perimeter.add_secondary_state(curative.clone());
        perimeter.add_range_action(
            main_state(),
            RangeAction::builder("pst1", "PST 1").build(),
        );
        perimeter.add_range_action(
            curative.clone(),
            RangeAction::builder("pst2", "PST 2").build(),
        );

        assert_eq!(perimeter.optimized_pairs().count(), 1);
        assert_eq!(perimeter.fixed_pairs().count(), 1);
        assert!(perimeter.is_secondary(&curative));
        assert!(!perimeter.is_secondary(&main_state()));
    }

    #[test]
    fn test_main_state_not_registered_as_secondary() {
        let mut perimeter = OptimizationPerimeter::new(main_state());
        perimeter.add_secondary_state(main_state());
        assert!(perimeter.secondary_states().is_empty());
    }

    #[test]
    fn test_groups_only_cover_main_state() {
        let group = GroupId::new("aligned");
        let curative = StateId::new("curative");
        let mut perimeter = OptimizationPerimeter::new(main_state());
        perimeter.add_secondary_state(curative.clone());
        perimeter.add_range_action(
            main_state(),
            RangeAction::builder("pst1", "PST 1").group(group.clone()).build(),
        );
        perimeter.add_range_action(
            main_state(),
            RangeAction::builder("pst2", "PST 2").group(group.clone()).build(),
        );
        perimeter.add_range_action(
            curative,
            RangeAction::builder("pst3", "PST 3").group(group.clone()).build(),
        );

        let groups = perimeter.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&group].len(), 2);
    }
}
