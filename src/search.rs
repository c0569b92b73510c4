use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::action::Action;
use crate::plan::{Plan, PlanStep};
use crate::state::State;

/// Trait defining the interface for search algorithms used by the planner.
///
/// A search either finds a plan or reports that none exists by returning
/// `None`. Exhaustion is an ordinary outcome, not an error.
///
/// # Examples
///
/// ```
/// use goap_agent::{Action, Plan, PlanStep, SearchAlgorithm, State};
///
/// /// Tries single actions only.
/// struct OneStepSearch;
///
/// impl SearchAlgorithm for OneStepSearch {
///     fn search(&self, actions: &[Action], start: &State, goal: &State) -> Option<Plan> {
///         if start.satisfies(goal) {
///             return Some(Plan::empty());
///         }
///         actions.iter().filter(|a| a.can_perform(start)).find_map(|a| {
///             let next = start.with_effects(&a.effects);
///             next.satisfies(goal).then(|| {
///                 Plan::new(
///                     vec![PlanStep { action: a.name.clone(), resulting_state: next }],
///                     a.weight,
///                 )
///             })
///         })
///     }
/// }
/// ```
pub trait SearchAlgorithm: Send + Sync {
    fn search(&self, actions: &[Action], start: &State, goal: &State) -> Option<Plan>;
}

/// Estimates the remaining cost from a state to the goal.
pub trait HeuristicStrategy: Send + Sync {
    fn calculate(&self, state: &State, goal: &State) -> f64;
}

/// Counts goal keys whose value differs from the state, times a unit cost.
///
/// With a unit cost of `min_weight / k`, where `k` is the largest number of
/// goal keys a single action writes, the estimate never exceeds the true
/// remaining cost and drops by at most one edge weight per step, so A*
/// stays optimal without reopening closed nodes.
pub struct MismatchHeuristic {
    unit_cost: f64,
}

impl MismatchHeuristic {
    pub fn new(unit_cost: f64) -> Self {
        Self { unit_cost }
    }

    /// Derives the largest admissible unit cost for this action set.
    pub fn for_actions(actions: &[Action], goal: &State) -> Self {
        let min_weight = actions
            .iter()
            .map(|a| a.weight)
            .fold(f64::INFINITY, f64::min);
        let min_weight = if min_weight.is_finite() { min_weight } else { 1.0 };
        let max_goal_writes = actions
            .iter()
            .map(|a| a.effects.keys().filter(|k| goal.contains_key(k)).count())
            .max()
            .unwrap_or(1)
            .max(1);
        Self::new(min_weight / max_goal_writes as f64)
    }

    pub fn unit_cost(&self) -> f64 {
        self.unit_cost
    }
}

impl HeuristicStrategy for MismatchHeuristic {
    fn calculate(&self, state: &State, goal: &State) -> f64 {
        state.mismatch_count(goal) as f64 * self.unit_cost
    }
}

/// Zero heuristic, turning A* into Dijkstra's algorithm.
pub struct ZeroHeuristic;

impl HeuristicStrategy for ZeroHeuristic {
    fn calculate(&self, _state: &State, _goal: &State) -> f64 {
        0.0
    }
}

/// A node in the search arena.
#[derive(Debug)]
struct Node {
    state: State,
    parent: Option<usize>,
    /// Index into the action slice of the edge that produced this node.
    action: Option<usize>,
    g_cost: f64,
}

/// Frontier entry ordered by `f`, then by insertion sequence.
#[derive(Debug)]
struct OpenEntry {
    f_cost: f64,
    seq: u64,
    idx: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // equal f: the earlier insertion wins (FIFO)
        self.f_cost
            .total_cmp(&other.f_cost)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Manages the state of a single graph search.
struct SearchContext<'a> {
    actions: &'a [Action],
    goal: &'a State,
    heuristic: &'a dyn HeuristicStrategy,
    nodes: Vec<Node>,
    open_set: BinaryHeap<Reverse<OpenEntry>>,
    closed_set: HashSet<State>,
    best_g: HashMap<State, f64>,
    next_seq: u64,
}

impl<'a> SearchContext<'a> {
    fn new(
        actions: &'a [Action],
        start: &State,
        goal: &'a State,
        heuristic: &'a dyn HeuristicStrategy,
    ) -> Self {
        let mut context = Self {
            actions,
            goal,
            heuristic,
            nodes: Vec::new(),
            open_set: BinaryHeap::new(),
            closed_set: HashSet::new(),
            best_g: HashMap::new(),
            next_seq: 0,
        };
        context.push(start.clone(), None, None, 0.0);
        context
    }

    fn push(&mut self, state: State, parent: Option<usize>, action: Option<usize>, g_cost: f64) {
        let f_cost = g_cost + self.heuristic.calculate(&state, self.goal);
        let idx = self.nodes.len();
        self.best_g.insert(state.clone(), g_cost);
        self.nodes.push(Node {
            state,
            parent,
            action,
            g_cost,
        });
        self.open_set.push(Reverse(OpenEntry {
            f_cost,
            seq: self.next_seq,
            idx,
        }));
        self.next_seq += 1;
    }

    /// Pops the best open node that has not been expanded yet.
    fn next_node(&mut self) -> Option<usize> {
        while let Some(Reverse(entry)) = self.open_set.pop() {
            let node = &self.nodes[entry.idx];
            if self.closed_set.contains(&node.state) {
                continue;
            }
            // superseded by a cheaper path to the same state
            if self.best_g.get(&node.state).is_some_and(|g| *g < node.g_cost) {
                continue;
            }
            return Some(entry.idx);
        }
        None
    }

    fn expand(&mut self, idx: usize) {
        let state = self.nodes[idx].state.clone();
        let g_cost = self.nodes[idx].g_cost;
        self.closed_set.insert(state.clone());

        for (action_idx, action) in self.actions.iter().enumerate() {
            if !action.can_perform(&state) {
                continue;
            }
            let child = state.with_effects(&action.effects);
            if self.closed_set.contains(&child) {
                continue;
            }
            let child_g = g_cost + action.weight;
            if self.best_g.get(&child).is_some_and(|g| *g <= child_g) {
                continue;
            }
            self.push(child, Some(idx), Some(action_idx), child_g);
        }
    }

    /// Walks parent links from `idx` back to the root.
    fn reconstruct_path(&self, idx: usize) -> Plan {
        let mut steps = Vec::new();
        let mut current = Some(idx);

        while let Some(node_idx) = current {
            let node = &self.nodes[node_idx];
            if let Some(action_idx) = node.action {
                steps.push(PlanStep {
                    action: self.actions[action_idx].name.clone(),
                    resulting_state: node.state.clone(),
                });
            }
            current = node.parent;
        }

        steps.reverse();
        Plan::new(steps, self.nodes[idx].g_cost)
    }
}

/// A* search over world states.
///
/// Without an explicit heuristic, a [`MismatchHeuristic`] tuned to the
/// action set is built for every search.
#[derive(Default)]
pub struct AStarSearch {
    heuristic: Option<Box<dyn HeuristicStrategy>>,
    max_expansions: Option<usize>,
}

impl AStarSearch {
    /// Creates a new A* search with the given heuristic.
    pub fn new(heuristic: Box<dyn HeuristicStrategy>) -> Self {
        Self {
            heuristic: Some(heuristic),
            max_expansions: None,
        }
    }

    /// Gives up (returns no plan) after expanding this many nodes.
    pub fn with_max_expansions(mut self, limit: usize) -> Self {
        self.max_expansions = Some(limit);
        self
    }
}

impl SearchAlgorithm for AStarSearch {
    fn search(&self, actions: &[Action], start: &State, goal: &State) -> Option<Plan> {
        if start.satisfies(goal) {
            return Some(Plan::empty());
        }

        let tuned;
        let heuristic: &dyn HeuristicStrategy = match &self.heuristic {
            Some(h) => h.as_ref(),
            None => {
                tuned = MismatchHeuristic::for_actions(actions, goal);
                &tuned
            }
        };

        let mut context = SearchContext::new(actions, start, goal, heuristic);
        let mut expansions = 0usize;

        while let Some(idx) = context.next_node() {
            if context.nodes[idx].state.satisfies(goal) {
                let plan = context.reconstruct_path(idx);
                log::debug!(
                    "A* found a {}-step plan of cost {} after {} expansions",
                    plan.len(),
                    plan.cost(),
                    expansions
                );
                return Some(plan);
            }

            if let Some(limit) = self.max_expansions {
                if expansions >= limit {
                    log::warn!("A* stopped after {} expansions without a plan", limit);
                    return None;
                }
            }

            context.expand(idx);
            expansions += 1;
        }

        log::debug!("A* exhausted the frontier after {} expansions", expansions);
        None
    }
}

/// Dijkstra's algorithm: A* with a zero heuristic.
#[derive(Default)]
pub struct DijkstraSearch;

impl SearchAlgorithm for DijkstraSearch {
    fn search(&self, actions: &[Action], start: &State, goal: &State) -> Option<Plan> {
        AStarSearch::new(Box::new(ZeroHeuristic)).search(actions, start, goal)
    }
}
