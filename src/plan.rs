use serde::{Deserialize, Serialize};

use crate::state::State;

/// One step of a plan: the action to run and the state predicted after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: String,
    pub resulting_state: State,
}

/// An ordered, immutable sequence of steps from the start state to a state
/// satisfying the goal.
///
/// A plan is never edited after it is produced; replanning replaces it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plan {
    steps: Vec<PlanStep>,
    cost: f64,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>, cost: f64) -> Self {
        Self { steps, cost }
    }

    /// The plan for a goal that already holds.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanStep> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of the weights of every step.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.action.as_str()).collect()
    }

    /// The state predicted after the last step, if there is one.
    pub fn final_state(&self) -> Option<&State> {
        self.steps.last().map(|s| &s.resulting_state)
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a PlanStep;
    type IntoIter = std::slice::Iter<'a, PlanStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
