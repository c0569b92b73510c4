//! # Planner Module
//!
//! The planner owns one `(start_state, goal_state, action list)` triple and
//! runs a search algorithm over it. Each call to [`Planner::calculate`]
//! produces zero or one [`Plan`]; the previous plan is replaced wholesale.
//!
//! ```
//! use goap_agent::{ActionList, Planner, State};
//!
//! let mut actions = ActionList::new();
//! actions.add_reaction("move", [("at_workshop", true)]);
//! actions.add_reaction("gather", [("has_materials", true)]);
//! actions.add_condition("craft", [("at_workshop", true), ("has_materials", true)]);
//! actions.add_reaction("craft", [("item_crafted", true)]);
//! actions.set_weight("gather", 2.0).unwrap();
//! actions.set_weight("craft", 3.0).unwrap();
//!
//! let mut start = State::new();
//! start.set("at_workshop", false);
//! start.set("has_materials", false);
//! start.set("item_crafted", false);
//!
//! let mut goal = State::new();
//! goal.set("item_crafted", true);
//!
//! let mut planner = Planner::new();
//! planner.set_action_list(actions);
//! planner.set_start_state(start);
//! planner.set_goal_state(goal);
//!
//! let plan = planner.calculate().unwrap().expect("plan exists");
//! assert_eq!(plan.len(), 3);
//! assert_eq!(plan.action_names().last(), Some(&"craft"));
//! assert_eq!(plan.cost(), 6.0);
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionList};
use crate::plan::Plan;
use crate::search::{AStarSearch, SearchAlgorithm};
use crate::state::{FactValue, State};
use crate::{GoapError, Result};

/// Goal value accepted as "don't care" for backwards compatibility.
///
/// Key absence is the canonical way to leave a fact unconstrained.
pub const DONT_CARE_SENTINEL: i64 = -1;

/// True iff every explicit goal key has the same value in `state`.
pub fn conditions_are_met(state: &State, goal: &State) -> bool {
    state.satisfies(goal)
}

/// Removes goal keys set to [`DONT_CARE_SENTINEL`].
pub fn strip_dont_care(mut goal: State) -> State {
    let sentinel = FactValue::Int(DONT_CARE_SENTINEL);
    let dont_care: Vec<String> = goal
        .iter()
        .filter(|(_, value)| **value == sentinel)
        .map(|(key, _)| key.clone())
        .collect();
    for key in dont_care {
        log::debug!("Goal key '{}' uses the -1 sentinel; treating it as absent", key);
        goal.remove(&key);
    }
    goal
}

/// An action that references a fact the start state does not define.
///
/// Such an action is never selected; the diagnostic exists so the caller
/// can tell a misconfigured registry apart from a genuinely unreachable goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndefinedKey {
    pub action: String,
    pub key: String,
}

impl fmt::Display for UndefinedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action '{}' references '{}', which the start state does not define",
            self.action, self.key
        )
    }
}

/// The GOAP planner.
pub struct Planner {
    start_state: State,
    goal_state: State,
    action_list: Option<ActionList>,
    search_algorithm: Box<dyn SearchAlgorithm>,
    plan: Option<Plan>,
    diagnostics: Vec<UndefinedKey>,
}

impl Planner {
    /// Creates a planner with empty states, no action list and A* search.
    pub fn new() -> Self {
        Self {
            start_state: State::new(),
            goal_state: State::new(),
            action_list: None,
            search_algorithm: Box::new(AStarSearch::default()),
            plan: None,
            diagnostics: Vec::new(),
        }
    }

    /// Creates a planner with the given action list already attached.
    pub fn with_actions(actions: ActionList) -> Self {
        let mut planner = Self::new();
        planner.set_action_list(actions);
        planner
    }

    /// Swaps the search algorithm, e.g. for [`crate::DijkstraSearch`].
    pub fn with_search_algorithm(mut self, search_algorithm: Box<dyn SearchAlgorithm>) -> Self {
        self.search_algorithm = search_algorithm;
        self
    }

    /// Replaces the start state. Keys from the previous state are dropped.
    pub fn set_start_state(&mut self, state: State) {
        self.start_state = state;
    }

    /// Replaces the goal state. Keys from the previous goal are dropped.
    ///
    /// Keys whose value is the integer sentinel `-1` are removed, as if they
    /// had never been given.
    pub fn set_goal_state(&mut self, goal: State) {
        self.goal_state = strip_dont_care(goal);
    }

    pub fn set_action_list(&mut self, actions: ActionList) {
        self.action_list = Some(actions);
    }

    pub fn start_state(&self) -> &State {
        &self.start_state
    }

    pub fn goal_state(&self) -> &State {
        &self.goal_state
    }

    pub fn action_list(&self) -> Option<&ActionList> {
        self.action_list.as_ref()
    }

    /// Mutable access, used when reloading actions from configuration.
    pub fn action_list_mut(&mut self) -> Option<&mut ActionList> {
        self.action_list.as_mut()
    }

    /// The plan produced by the last [`calculate`](Self::calculate), if any.
    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// Undefined-key references found by the last calculation.
    pub fn diagnostics(&self) -> &[UndefinedKey] {
        &self.diagnostics
    }

    /// Runs the search from the start state to the goal state.
    ///
    /// Returns `Ok(None)` when no sequence of actions reaches the goal.
    ///
    /// # Errors
    ///
    /// [`GoapError::ActionListMissing`] if no action list was attached.
    pub fn calculate(&mut self) -> Result<Option<Plan>> {
        let actions = self.action_list.as_ref().ok_or(GoapError::ActionListMissing)?;

        let diagnostics = undefined_keys(actions, &self.start_state);
        for diagnostic in &diagnostics {
            log::warn!("{}", diagnostic);
        }
        let excluded: BTreeSet<&str> = diagnostics.iter().map(|d| d.action.as_str()).collect();
        let usable: Vec<Action> = actions
            .iter()
            .filter(|a| !excluded.contains(a.name.as_str()))
            .cloned()
            .collect();

        let plan = self
            .search_algorithm
            .search(&usable, &self.start_state, &self.goal_state);

        match &plan {
            Some(plan) => log::info!(
                "Plan found ({} steps, cost {}): {}",
                plan.len(),
                plan.cost(),
                plan.action_names().join(" -> ")
            ),
            None => log::warn!(
                "No plan from {} to {} ({} of {} actions usable)",
                self.start_state,
                self.goal_state,
                usable.len(),
                actions.len()
            ),
        }

        self.diagnostics = diagnostics;
        self.plan = plan.clone();
        Ok(plan)
    }
}

fn undefined_keys(actions: &ActionList, start: &State) -> Vec<UndefinedKey> {
    actions
        .iter()
        .flat_map(|action| {
            let keys: BTreeSet<&String> = action.referenced_keys().collect();
            keys.into_iter()
                .filter(|key| !start.contains_key(key))
                .map(|key| UndefinedKey {
                    action: action.name.clone(),
                    key: key.clone(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloning keeps states, actions and the last plan, but resets the search
/// algorithm to the default A*, since trait objects cannot be cloned.
impl Clone for Planner {
    fn clone(&self) -> Self {
        Self {
            start_state: self.start_state.clone(),
            goal_state: self.goal_state.clone(),
            action_list: self.action_list.clone(),
            search_algorithm: Box::new(AStarSearch::default()),
            plan: self.plan.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("start_state", &self.start_state)
            .field("goal_state", &self.goal_state)
            .field("action_list", &self.action_list)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Planner {
    fn eq(&self, other: &Self) -> bool {
        self.start_state == other.start_state
            && self.goal_state == other.goal_state
            && self.action_list == other.action_list
            && self.plan == other.plan
    }
}

#[derive(Serialize)]
struct PlannerRecordRef<'a> {
    start_state: &'a State,
    goal_state: &'a State,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_list: Option<&'a ActionList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<&'a Plan>,
}

#[derive(Deserialize)]
struct PlannerRecord {
    #[serde(default)]
    start_state: State,
    #[serde(default)]
    goal_state: State,
    #[serde(default)]
    action_list: Option<ActionList>,
    #[serde(default)]
    plan: Option<Plan>,
}

/// Persists states, actions and the last plan. The search algorithm is not
/// data and comes back as the default A*.
impl Serialize for Planner {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        PlannerRecordRef {
            start_state: &self.start_state,
            goal_state: &self.goal_state,
            action_list: self.action_list.as_ref(),
            plan: self.plan.as_ref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Planner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let record = PlannerRecord::deserialize(deserializer)?;
        Ok(Self {
            start_state: record.start_state,
            goal_state: record.goal_state,
            action_list: record.action_list,
            search_algorithm: Box::new(AStarSearch::default()),
            plan: record.plan,
            diagnostics: Vec::new(),
        })
    }
}
