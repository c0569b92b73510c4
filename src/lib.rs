//! Goal-Oriented Action Planning with a replanning execution loop.
//!
//! The planning core ([`State`], [`ActionList`], [`Planner`], [`World`]) is
//! a pure computation: given a start state, a goal and a set of actions it
//! returns the cheapest [`Plan`] found by A* search, or `None`.
//!
//! The execution side ([`automaton::Automaton`]) runs plans against a live
//! world through user-supplied action handlers and sensors, validating each
//! step, waiting out cooldowns, throttling outbound calls and replanning
//! when the world does not behave as predicted.
//!
//! ```
//! use goap_agent::{ActionList, Planner, State};
//!
//! let mut actions = ActionList::new();
//! actions.add_condition("move_to_workshop", [("at_workshop", false)]);
//! actions.add_reaction("move_to_workshop", [("at_workshop", true)]);
//! actions.add_condition("gather_materials", [("has_materials", false)]);
//! actions.add_reaction("gather_materials", [("has_materials", true)]);
//! actions.set_weight("gather_materials", 2.0).unwrap();
//! actions.add_condition("craft", [("at_workshop", true), ("has_materials", true)]);
//! actions.add_reaction("craft", [("has_item", true)]);
//! actions.set_weight("craft", 3.0).unwrap();
//!
//! let mut planner = Planner::with_actions(actions);
//! planner.set_start_state(
//!     [("at_workshop", false), ("has_materials", false), ("has_item", false)]
//!         .into_iter()
//!         .collect(),
//! );
//! let goal: State = [("has_item", true)].into_iter().collect();
//! planner.set_goal_state(goal);
//!
//! let plan = planner.calculate().unwrap().unwrap();
//! assert_eq!(plan.len(), 3);
//! assert_eq!(plan.action_names().last(), Some(&"craft"));
//! assert_eq!(plan.cost(), 6.0);
//! ```

mod action;
mod condition;
mod error;
mod plan;
mod planner;
mod search;
mod state;
mod visualizer;
mod world;

pub mod automaton;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod executor;
pub mod sensor;
pub mod snapshot;
pub mod state_calc;
pub mod throttle;
pub mod validation;

pub use action::{Action, ActionList, DEFAULT_WEIGHT};
pub use condition::{CompareOp, Expr, Operand};
pub use error::{GoapError, Result};
pub use plan::{Plan, PlanStep};
pub use planner::{conditions_are_met, strip_dont_care, Planner, UndefinedKey, DONT_CARE_SENTINEL};
pub use search::{
    AStarSearch, DijkstraSearch, HeuristicStrategy, MismatchHeuristic, SearchAlgorithm,
    ZeroHeuristic,
};
pub use state::{FactValue, State};
pub use visualizer::GoapVisualizer;
pub use world::World;

pub use automaton::{Automaton, AutomatonBuilder, ExecutionReport, GoalFrame, Phase};
pub use config::GoapConfig;
