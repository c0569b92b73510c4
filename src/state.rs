//! # State Module
//!
//! This module provides the fundamental [`State`] structure, which represents
//! world states, goals, preconditions and effects.
//!
//! ## What is State in GOAP?
//!
//! A state is a flat snapshot of named facts. The same type is used for:
//!
//! - **World State**: the full set of facts the planner starts from
//! - **Goal State**: a partial state; keys that are absent are "don't care"
//! - **Preconditions**: facts that must hold before an action can run
//! - **Effects**: facts an action overwrites when it runs
//!
//! Fact keys are namespaced strings such as `character_status.healthy`.
//! Values are typed through [`FactValue`]: booleans, integers or string tags.
//!
//! ## Basic Usage
//!
//! ```
//! use goap_agent::State;
//!
//! let mut current = State::new();
//! current.set("at_workshop", false);
//! current.set("gold", 120);
//! current.set("location", "forest");
//!
//! let mut goal = State::new();
//! goal.set("at_workshop", true);
//! assert!(!current.satisfies(&goal));
//!
//! let mut effects = State::new();
//! effects.set("at_workshop", true);
//! effects.set("location", "workshop");
//! current.apply_effects(&effects);
//!
//! assert!(current.satisfies(&goal));
//! assert_eq!(current.get("gold"), Some(&120.into()));
//! ```

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single typed fact value.
///
/// Serialized untagged, so a YAML document can write `true`, `3` or `forest`
/// directly and get the matching variant back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl FactValue {
    /// Returns the boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FactValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FactValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FactValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            FactValue::Bool(_) => "bool",
            FactValue::Int(_) => "int",
            FactValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Bool(b) => write!(f, "{}", b),
            FactValue::Int(i) => write!(f, "{}", i),
            FactValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        FactValue::Bool(value)
    }
}

impl From<i64> for FactValue {
    fn from(value: i64) -> Self {
        FactValue::Int(value)
    }
}

impl From<i32> for FactValue {
    fn from(value: i32) -> Self {
        FactValue::Int(i64::from(value))
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        FactValue::Str(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        FactValue::Str(value)
    }
}

/// Represents a (possibly partial) world state.
///
/// Facts are kept in a `BTreeMap` so two states with the same facts hash and
/// compare equal regardless of insertion order, which the search relies on
/// for duplicate detection.
///
/// # Examples
///
/// ```
/// use goap_agent::State;
///
/// let mut state = State::new();
/// state.set("player_has_key", true);
/// state.set("door", "locked");
///
/// assert_eq!(state.get("player_has_key"), Some(&true.into()));
/// assert_eq!(state.get("window"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    values: BTreeMap<String, FactValue>,
}

impl State {
    /// Creates a new empty state.
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Sets a fact, inserting it or overwriting the previous value.
    ///
    /// # Examples
    ///
    /// ```
    /// use goap_agent::State;
    ///
    /// let mut state = State::new();
    /// state.set("ammo", 30);
    /// state.set("ammo", 25);
    /// assert_eq!(state.get("ammo"), Some(&25.into()));
    /// ```
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FactValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Gets the value of a fact, or `None` if the key is not defined.
    pub fn get(&self, key: &str) -> Option<&FactValue> {
        self.values.get(key)
    }

    /// Removes a fact, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<FactValue> {
        self.values.remove(key)
    }

    /// Returns `true` if the key is defined in this state.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Checks if this state satisfies another state's requirements.
    ///
    /// Every key of `other` must be present here with an identical value.
    /// Keys only present in `self` are ignored, so this is the goal test and
    /// the precondition test at the same time.
    ///
    /// # Examples
    ///
    /// ```
    /// use goap_agent::State;
    ///
    /// let mut world = State::new();
    /// world.set("has_key", true);
    /// world.set("door_open", false);
    ///
    /// let mut goal = State::new();
    /// goal.set("door_open", true);
    /// assert!(!world.satisfies(&goal));
    ///
    /// let mut unlock = State::new();
    /// unlock.set("has_key", true);
    /// assert!(world.satisfies(&unlock));
    /// ```
    pub fn satisfies(&self, other: &State) -> bool {
        other
            .values
            .iter()
            .all(|(key, value)| self.values.get(key) == Some(value))
    }

    /// Counts the keys of `other` whose value differs here (missing keys count).
    pub fn mismatch_count(&self, other: &State) -> usize {
        other
            .values
            .iter()
            .filter(|(key, value)| self.values.get(*key) != Some(*value))
            .count()
    }

    /// Overwrites every key present in `effects`; other keys stay unchanged.
    pub fn apply_effects(&mut self, effects: &State) {
        for (key, value) in effects.values.iter() {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Returns a new state with `effects` applied, leaving `self` untouched.
    pub fn with_effects(&self, effects: &State) -> State {
        let mut next = self.clone();
        next.apply_effects(effects);
        next
    }

    /// Returns the entries of `other` that are missing or different here.
    ///
    /// ```
    /// use goap_agent::State;
    ///
    /// let mut current = State::new();
    /// current.set("hp", 100);
    /// current.set("location", "base");
    ///
    /// let mut target = State::new();
    /// target.set("hp", 100);
    /// target.set("location", "mine");
    /// target.set("has_pickaxe", true);
    ///
    /// let diff = current.diff(&target);
    /// assert_eq!(diff.len(), 2);
    /// assert!(diff.get("hp").is_none());
    /// ```
    pub fn diff(&self, other: &State) -> State {
        let values = other
            .values
            .iter()
            .filter(|(key, value)| self.values.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        State { values }
    }

    /// Iterates over the facts in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, FactValue> {
        self.values.iter()
    }

    /// Iterates over the fact keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, String, FactValue> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read-only access to the underlying mapping.
    pub fn values(&self) -> &BTreeMap<String, FactValue> {
        &self.values
    }
}

impl From<BTreeMap<String, FactValue>> for State {
    fn from(values: BTreeMap<String, FactValue>) -> Self {
        Self { values }
    }
}

impl From<State> for BTreeMap<String, FactValue> {
    fn from(state: State) -> Self {
        state.values
    }
}

impl<K, V> FromIterator<(K, V)> for State
where
    K: Into<String>,
    V: Into<FactValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let values = iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self { values }
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = (&'a String, &'a FactValue);
    type IntoIter = btree_map::Iter<'a, String, FactValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for State {
    /// Formats the state as `{key1: value1, key2: value2}` in key order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (key, value) in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
            first = false;
        }
        write!(f, "}}")
    }
}
