//! An ordered collection of independent planners.
//!
//! [`World::calculate`] asks every planner for a plan, in insertion order.
//! Planners never see each other; if two of them constrain the same facts,
//! picking between their plans is up to the caller.

use serde::{Deserialize, Serialize};

use crate::plan::Plan;
use crate::planner::Planner;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct World {
    planners: Vec<Planner>,
}

impl World {
    pub fn new() -> Self {
        Self {
            planners: Vec::new(),
        }
    }

    /// Appends a planner and returns its index.
    pub fn add_planner(&mut self, planner: Planner) -> usize {
        self.planners.push(planner);
        self.planners.len() - 1
    }

    pub fn planners(&self) -> &[Planner] {
        &self.planners
    }

    pub fn planner(&self, idx: usize) -> Option<&Planner> {
        self.planners.get(idx)
    }

    pub fn planner_mut(&mut self, idx: usize) -> Option<&mut Planner> {
        self.planners.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.planners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planners.is_empty()
    }

    /// Runs every planner in order.
    ///
    /// Stops at the first planner that returns an error (for example one
    /// without an action list); earlier planners keep their new plans.
    pub fn calculate(&mut self) -> Result<()> {
        for (idx, planner) in self.planners.iter_mut().enumerate() {
            log::debug!("Calculating planner {}", idx);
            planner.calculate()?;
        }
        Ok(())
    }

    /// The plan of each planner, in planner order.
    pub fn plans(&self) -> Vec<Option<&Plan>> {
        self.planners.iter().map(Planner::plan).collect()
    }

    /// The cheapest plan found across all planners, with its planner index.
    pub fn cheapest_plan(&self) -> Option<(usize, &Plan)> {
        self.planners
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| p.plan().map(|plan| (idx, plan)))
            .min_by(|a, b| a.1.cost().total_cmp(&b.1.cost()))
    }
}
