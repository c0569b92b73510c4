use std::collections::HashMap;

use goap_agent::{Action, ActionList, Plan, Planner, State};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

const WEIGHTS: [f64; 5] = [1.0, 1.5, 2.0, 3.0, 5.0];

#[derive(Debug, Clone)]
struct Problem {
    actions: ActionList,
    start: State,
    goal: State,
}

fn fact(i: usize) -> String {
    format!("f{}", i)
}

fn partial(values: &[Option<bool>]) -> State {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|b| (fact(i), b)))
        .collect()
}

fn arb_problem() -> impl Strategy<Value = Problem> {
    (1usize..=6, 1usize..=6)
        .prop_flat_map(|(facts, actions)| {
            let assignment = move || prop::collection::vec(prop::option::of(any::<bool>()), facts);
            (
                prop::collection::vec(any::<bool>(), facts),
                assignment(),
                prop::collection::vec(
                    (assignment(), assignment(), prop::sample::select(WEIGHTS.to_vec())),
                    actions,
                ),
            )
        })
        .prop_map(|(start, goal, specs)| {
            let mut actions = ActionList::new();
            for (i, (pre, eff, weight)) in specs.into_iter().enumerate() {
                let mut action = Action::new(format!("a{}", i), weight).unwrap();
                action.preconditions = partial(&pre);
                action.effects = partial(&eff);
                actions.insert(action);
            }
            let start = start
                .into_iter()
                .enumerate()
                .map(|(i, b)| (fact(i), b))
                .collect();
            Problem {
                actions,
                start,
                goal: partial(&goal),
            }
        })
}

/// Relaxes every edge of the reachable state graph until nothing improves.
fn cheapest_cost(problem: &Problem) -> Option<f64> {
    let mut best: HashMap<State, f64> = HashMap::new();
    best.insert(problem.start.clone(), 0.0);
    loop {
        let mut changed = false;
        let frontier: Vec<(State, f64)> = best.iter().map(|(s, c)| (s.clone(), *c)).collect();
        for (state, cost) in frontier {
            for action in &problem.actions {
                if !action.can_perform(&state) {
                    continue;
                }
                let child = state.with_effects(&action.effects);
                let child_cost = cost + action.weight;
                let improved = best.get(&child).map_or(true, |c| child_cost < *c - 1e-9);
                if improved {
                    best.insert(child, child_cost);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    best.iter()
        .filter(|(state, _)| state.satisfies(&problem.goal))
        .map(|(_, cost)| *cost)
        .min_by(f64::total_cmp)
}

fn plan(problem: &Problem) -> Option<Plan> {
    let mut planner = Planner::with_actions(problem.actions.clone());
    planner.set_start_state(problem.start.clone());
    planner.set_goal_state(problem.goal.clone());
    planner.calculate().unwrap()
}

/// Replays the plan from the start, checking each step is applicable and
/// lands on the predicted state. Returns the reached state and summed cost.
fn replay(problem: &Problem, plan: &Plan) -> (State, f64) {
    let mut state = problem.start.clone();
    let mut cost = 0.0;
    for step in plan {
        let action = problem.actions.get(&step.action).unwrap();
        assert!(action.can_perform(&state), "{} not applicable in {}", step.action, state);
        action.apply_effects(&mut state);
        assert_eq!(state, step.resulting_state);
        cost += action.weight;
    }
    (state, cost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brute_force_agrees_on_hand_built_graph() {
        let mut actions = ActionList::new();
        actions.add_reaction("shortcut", [("f2", true)]);
        actions.set_weight("shortcut", 5.0).unwrap();
        actions.add_reaction("step_one", [("f0", true)]);
        actions.add_condition("step_two", [("f0", true)]);
        actions.add_reaction("step_two", [("f1", true)]);
        actions.add_condition("step_three", [("f1", true)]);
        actions.add_reaction("step_three", [("f2", true)]);
        actions.set_weight("step_three", 1.5).unwrap();

        let problem = Problem {
            actions,
            start: [("f0", false), ("f1", false), ("f2", false)].into_iter().collect(),
            goal: [("f2", true)].into_iter().collect(),
        };
        let found = plan(&problem).unwrap();
        assert_eq!(cheapest_cost(&problem), Some(3.5));
        assert_eq!(found.cost(), 3.5);
        assert_eq!(found.action_names(), vec!["step_one", "step_two", "step_three"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            // Do not write `.proptest-regressions` files into the repo.
            failure_persistence: None,
            .. ProptestConfig::default()
        })]

        #[test]
        fn test_returned_plans_reach_the_goal(problem in arb_problem()) {
            if let Some(found) = plan(&problem) {
                let (reached, cost) = replay(&problem, &found);
                prop_assert!(reached.satisfies(&problem.goal));
                prop_assert!((cost - found.cost()).abs() < 1e-9);
            }
        }

        #[test]
        fn test_plan_cost_matches_brute_force(problem in arb_problem()) {
            let found = plan(&problem);
            let expected = cheapest_cost(&problem);
            prop_assert_eq!(found.is_some(), expected.is_some());
            if let (Some(found), Some(expected)) = (found, expected) {
                prop_assert!(
                    (found.cost() - expected).abs() < 1e-9,
                    "planner cost {} but cheapest is {}",
                    found.cost(),
                    expected
                );
            }
        }

        #[test]
        fn test_satisfied_goal_gives_empty_plan(
            problem in arb_problem(),
            mask in prop::collection::vec(any::<bool>(), 6),
        ) {
            let goal: State = problem
                .start
                .iter()
                .zip(mask)
                .filter(|(_, keep)| *keep)
                .map(|((k, v), _)| (k.clone(), v.clone()))
                .collect();
            let problem = Problem { goal, ..problem };
            let found = plan(&problem).unwrap();
            prop_assert!(found.is_empty());
            prop_assert_eq!(found.cost(), 0.0);
        }
    }
}
