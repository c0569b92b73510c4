use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::{ActionList, Plan, Result, State};

/// Renders an action registry and a chosen plan as a Graphviz DOT graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoapVisualizer;

impl GoapVisualizer {
    pub fn new() -> Self {
        Self
    }

    /// Builds the DOT source.
    ///
    /// Actions applicable in `start` get an edge from the start node, and
    /// actions that reach `goal` in one step get an edge to the goal node.
    /// The steps of `plan`, if given, are chained and drawn in red.
    pub fn render(&self, actions: &ActionList, start: &State, goal: &State, plan: Option<&Plan>) -> String {
        let mut dot = String::new();
        self.write_dot(&mut dot, actions, start, goal, plan)
            .map(|()| dot)
            .unwrap_or_default()
    }

    /// Writes the DOT source to `path`.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        actions: &ActionList,
        start: &State,
        goal: &State,
        plan: Option<&Plan>,
    ) -> Result<()> {
        fs::write(path, self.render(actions, start, goal, plan))?;
        Ok(())
    }

    fn write_dot(
        &self,
        dot: &mut String,
        actions: &ActionList,
        start: &State,
        goal: &State,
        plan: Option<&Plan>,
    ) -> std::fmt::Result {
        writeln!(dot, "digraph GOAP {{")?;
        writeln!(dot, "    rankdir=LR;")?;
        writeln!(dot, "    node [shape=box, style=filled, fillcolor=lightblue];")?;
        writeln!(dot, "    edge [fontsize=10];")?;
        writeln!(
            dot,
            "    initial [label=\"Initial State\\n{}\", fillcolor=lightgreen];",
            state_label(start)
        )?;
        writeln!(
            dot,
            "    goal [label=\"Goal State\\n{}\", fillcolor=lightpink];",
            state_label(goal)
        )?;

        let planned: Vec<&str> = plan.map(Plan::action_names).unwrap_or_default();
        for (i, action) in actions.iter().enumerate() {
            let fill = if planned.contains(&action.name.as_str()) {
                ", fillcolor=lightcoral"
            } else {
                ""
            };
            writeln!(
                dot,
                "    action_{} [label=\"{}\\nWeight: {}\\nPre: {}\\nEff: {}\"{}];",
                i,
                escape(&action.name),
                action.weight,
                state_label(&action.preconditions),
                state_label(&action.effects),
                fill
            )?;
        }

        for (i, action) in actions.iter().enumerate() {
            if action.can_perform(start) {
                writeln!(dot, "    initial -> action_{} [label=\"possible\"];", i)?;
            }
            if start.with_effects(&action.effects).satisfies(goal) {
                writeln!(dot, "    action_{} -> goal [label=\"achieves\"];", i)?;
            }
        }

        if let Some(plan) = plan {
            let index_of = |name: &str| actions.iter().position(|a| a.name == name);
            let mut previous = "initial".to_string();
            for (n, step) in plan.iter().enumerate() {
                let Some(idx) = index_of(&step.action) else {
                    continue;
                };
                let node = format!("action_{}", idx);
                writeln!(
                    dot,
                    "    {} -> {} [color=red, penwidth=2.0, label=\"step {}\"];",
                    previous,
                    node,
                    n + 1
                )?;
                previous = node;
            }
            writeln!(dot, "    {} -> goal [color=red, penwidth=2.0];", previous)?;
        }

        writeln!(dot, "}}")
    }
}

fn state_label(state: &State) -> String {
    state
        .iter()
        .map(|(key, value)| format!("{}: {}", escape(key), escape(&value.to_string())))
        .collect::<Vec<_>>()
        .join("\\n")
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
