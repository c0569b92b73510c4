//! # Action Module
//!
//! Actions are the edges of the planning graph. Each one has:
//!
//! * a unique name,
//! * a precondition set that must match the current state exactly,
//! * an effect set (a "reaction") overwriting facts when applied,
//! * a strictly positive weight used as the edge cost.
//!
//! The [`ActionList`] is the registry the planner searches over. It can be
//! built incrementally, one fact at a time, or loaded from the `actions:`
//! section of the configuration document.
//!
//! ```
//! use goap_agent::{ActionList, State};
//!
//! let mut actions = ActionList::new();
//! actions.add_reaction("move", [("at_workshop", true)]);
//! actions.add_reaction("gather", [("has_materials", true)]);
//! actions.add_condition("craft", [("at_workshop", true), ("has_materials", true)]);
//! actions.add_reaction("craft", [("item_crafted", true)]);
//! actions.set_weight("gather", 2.0).unwrap();
//! actions.set_weight("craft", 3.0).unwrap();
//!
//! assert_eq!(actions.len(), 3);
//! assert_eq!(actions.get("move").unwrap().weight, 1.0);
//! ```

use std::collections::BTreeSet;

use serde::de::{Deserializer, Error as _};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::config::{ActionConfig, ActionsConfig};
use crate::state::{FactValue, State};
use crate::{GoapError, Result};

/// Weight given to actions that never had one set.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A single planning action.
///
/// # Examples
///
/// ```
/// use goap_agent::{Action, State};
///
/// let mut chop_wood = Action::new("chop_wood", 2.0).unwrap();
/// chop_wood.preconditions.set("has_axe", true);
/// chop_wood.effects.set("has_wood", true);
///
/// let mut state = State::new();
/// state.set("has_axe", true);
/// state.set("has_wood", false);
/// assert!(chop_wood.can_perform(&state));
///
/// chop_wood.apply_effects(&mut state);
/// assert_eq!(state.get("has_wood"), Some(&true.into()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    /// Cost of the edge; always finite and > 0.
    pub weight: f64,
    pub preconditions: State,
    pub effects: State,
}

impl Action {
    /// Creates an action with no preconditions and no effects.
    ///
    /// # Errors
    ///
    /// Returns [`GoapError::InvalidActionCost`] when `weight` is zero,
    /// negative or not finite.
    pub fn new(name: impl Into<String>, weight: f64) -> Result<Self> {
        let name = name.into();
        check_weight(&name, weight)?;
        Ok(Self {
            name,
            weight,
            preconditions: State::new(),
            effects: State::new(),
        })
    }

    /// True iff every declared precondition matches `state` exactly.
    pub fn can_perform(&self, state: &State) -> bool {
        state.satisfies(&self.preconditions)
    }

    /// Overwrites every effect key in `state`.
    pub fn apply_effects(&self, state: &mut State) {
        state.apply_effects(&self.effects);
    }

    /// Every fact key this action reads or writes.
    pub fn referenced_keys(&self) -> impl Iterator<Item = &String> {
        self.preconditions.keys().chain(self.effects.keys())
    }
}

fn check_weight(name: &str, weight: f64) -> Result<()> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err(GoapError::InvalidActionCost {
            action: name.to_string(),
            weight,
        });
    }
    Ok(())
}

/// The registry of actions available to one planning cycle.
///
/// Iteration follows insertion order, which keeps successor generation (and
/// therefore FIFO tie-breaking in the search) deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionList {
    actions: Vec<Action>,
}

impl ActionList {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Builds a registry from the `actions:` configuration section.
    pub fn from_config(config: &ActionsConfig) -> Result<Self> {
        let mut list = Self::new();
        list.reload(config)?;
        Ok(list)
    }

    /// Replaces the whole registry with the content of `config`.
    ///
    /// Calling this twice with the same configuration yields the same list.
    /// On error the registry is left unchanged.
    pub fn reload(&mut self, config: &ActionsConfig) -> Result<()> {
        let mut actions = Vec::with_capacity(config.len());
        for (name, entry) in config {
            let weight = entry.weight.unwrap_or(DEFAULT_WEIGHT);
            let mut action = Action::new(name.clone(), weight)?;
            action.preconditions = entry.conditions.clone();
            action.effects = entry.reactions.clone();
            actions.push(action);
        }
        log::debug!("Loaded {} actions into the registry", actions.len());
        self.actions = actions;
        Ok(())
    }

    /// Converts the registry back into its configuration shape.
    pub fn to_config(&self) -> ActionsConfig {
        self.actions
            .iter()
            .map(|action| {
                (
                    action.name.clone(),
                    ActionConfig {
                        conditions: action.preconditions.clone(),
                        reactions: action.effects.clone(),
                        weight: Some(action.weight),
                    },
                )
            })
            .collect()
    }

    fn entry(&mut self, name: &str) -> &mut Action {
        let idx = match self.actions.iter().position(|a| a.name == name) {
            Some(idx) => idx,
            None => {
                self.actions.push(Action {
                    name: name.to_string(),
                    weight: DEFAULT_WEIGHT,
                    preconditions: State::new(),
                    effects: State::new(),
                });
                self.actions.len() - 1
            }
        };
        &mut self.actions[idx]
    }

    /// Adds precondition facts to `name`, creating the action if needed.
    pub fn add_condition<I, K, V>(&mut self, name: &str, facts: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FactValue>,
    {
        let action = self.entry(name);
        for (key, value) in facts {
            action.preconditions.set(key, value);
        }
    }

    /// Adds effect facts to `name`, creating the action if needed.
    pub fn add_reaction<I, K, V>(&mut self, name: &str, facts: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FactValue>,
    {
        let action = self.entry(name);
        for (key, value) in facts {
            action.effects.set(key, value);
        }
    }

    /// Sets the weight of `name`, creating the action if needed.
    pub fn set_weight(&mut self, name: &str, weight: f64) -> Result<()> {
        check_weight(name, weight)?;
        self.entry(name).weight = weight;
        Ok(())
    }

    /// Inserts a fully built action, replacing any action with the same name.
    pub fn insert(&mut self, action: Action) {
        match self.actions.iter_mut().find(|a| a.name == action.name) {
            Some(existing) => *existing = action,
            None => self.actions.push(action),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Union of every key read or written by any action.
    pub fn referenced_keys(&self) -> BTreeSet<&str> {
        self.actions
            .iter()
            .flat_map(|a| a.referenced_keys())
            .map(String::as_str)
            .collect()
    }
}

impl From<Vec<Action>> for ActionList {
    fn from(actions: Vec<Action>) -> Self {
        let mut list = ActionList::new();
        for action in actions {
            list.insert(action);
        }
        list
    }
}

impl<'a> IntoIterator for &'a ActionList {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

impl Serialize for ActionList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_config().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ActionList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let config = ActionsConfig::deserialize(deserializer)?;
        ActionList::from_config(&config).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_valid_action() {
        let action = Action::new("test_action", 1.0).unwrap();
        assert_eq!(action.name, "test_action");
        assert_eq!(action.weight, 1.0);
        assert!(action.preconditions.is_empty());
        assert!(action.effects.is_empty());
    }

    #[test]
    fn test_create_invalid_action() {
        for weight in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = Action::new("test_action", weight);
            assert!(matches!(result, Err(GoapError::InvalidActionCost { .. })));
        }
    }

    #[test]
    fn test_can_perform_with_empty_preconditions() {
        let action = Action::new("test_action", 1.0).unwrap();
        assert!(action.can_perform(&State::new()));
    }

    #[test]
    fn test_can_perform_requires_exact_match() {
        let mut action = Action::new("test_action", 1.0).unwrap();
        action.preconditions.set("gold", 10);

        let mut state = State::new();
        state.set("gold", 10);
        assert!(action.can_perform(&state));

        // no threshold semantics: more gold is still a mismatch
        state.set("gold", 11);
        assert!(!action.can_perform(&state));
    }

    #[test]
    fn test_can_perform_with_missing_preconditions() {
        let mut action = Action::new("test_action", 1.0).unwrap();
        action.preconditions.set("has_tool", true);
        assert!(!action.can_perform(&State::new()));
    }

    #[test]
    fn test_apply_effects_overwrite() {
        let mut action = Action::new("test_action", 1.0).unwrap();
        action.effects.set("has_result", true);

        let mut state = State::new();
        state.set("has_result", false);
        state.set("other", 5);
        action.apply_effects(&mut state);

        assert_eq!(state.get("has_result"), Some(&true.into()));
        assert_eq!(state.get("other"), Some(&5.into()));
    }

    #[test]
    fn test_incremental_registration_accumulates() {
        let mut list = ActionList::new();
        list.add_condition("fight", [("healthy", true)]);
        list.add_condition("fight", [("has_weapon", true)]);
        list.add_reaction("fight", [("monster_dead", true)]);

        let fight = list.get("fight").unwrap();
        assert_eq!(fight.preconditions.len(), 2);
        assert_eq!(fight.effects.len(), 1);
        assert_eq!(fight.weight, DEFAULT_WEIGHT);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_set_weight_rejects_non_positive() {
        let mut list = ActionList::new();
        assert!(list.set_weight("rest", 0.0).is_err());
        assert!(list.get("rest").is_none());
        list.set_weight("rest", 4.0).unwrap();
        assert_eq!(list.get("rest").unwrap().weight, 4.0);
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut list = ActionList::new();
        list.set_weight("zeta", 1.0).unwrap();
        list.set_weight("alpha", 1.0).unwrap();
        list.set_weight("mid", 1.0).unwrap();
        assert_eq!(list.names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_referenced_keys() {
        let mut list = ActionList::new();
        list.add_condition("a", [("x", true)]);
        list.add_reaction("a", [("y", true)]);
        list.add_reaction("b", [("x", false)]);
        let keys: Vec<_> = list.referenced_keys().into_iter().collect();
        assert_eq!(keys, vec!["x", "y"]);
    }

    #[test]
    fn test_reload_replaces_and_is_idempotent() {
        let yaml = r#"
move: { reactions: { at_workshop: true } }
craft:
  conditions: { at_workshop: true }
  reactions: { item_crafted: true }
  weight: 3
"#;
        let config: ActionsConfig = serde_yaml::from_str(yaml).unwrap();
        let mut list = ActionList::new();
        list.set_weight("stale", 9.0).unwrap();

        list.reload(&config).unwrap();
        let first = list.clone();
        list.reload(&config).unwrap();

        assert_eq!(first, list);
        assert!(list.get("stale").is_none());
        assert_eq!(list.get("craft").unwrap().weight, 3.0);
        assert_eq!(list.get("move").unwrap().weight, DEFAULT_WEIGHT);
    }

    #[test]
    fn test_reload_rejects_zero_weight_and_keeps_old_list() {
        let config: ActionsConfig = serde_yaml::from_str("free: { weight: 0 }").unwrap();
        let mut list = ActionList::new();
        list.set_weight("kept", 2.0).unwrap();
        assert!(list.reload(&config).is_err());
        assert!(list.get("kept").is_some());
    }
}
