use std::error::Error;
use std::sync::{Arc, Mutex};

use goap_agent::executor::{ActionHandlers, ActionResponse, ExecutionContext, FnAction};
use goap_agent::sensor::{FnSensor, Observation, Sensors};
use goap_agent::{Automaton, GoapConfig, GoapVisualizer, State};

const CONFIG: &str = r#"
actions:
  turn_lamp_on:
    conditions: { lamp_on: false, has_power: true }
    reactions: { lamp_on: true }
  restore_power:
    conditions: { has_power: false }
    reactions: { has_power: true }
    weight: 3
  turn_lamp_off:
    conditions: { lamp_on: true }
    reactions: { lamp_on: false }
thresholds:
  character_refresh_cache_duration: 0
"#;

/// A simple environment to store the lamp and the fuse box.
#[derive(Default)]
struct Room {
    lamp_on: bool,
    has_power: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let room = Arc::new(Mutex::new(Room::default()));

    // Sensors report the room as raw facts
    let mut sensors = Sensors::new();
    {
        let room = room.clone();
        sensors.add(
            "room",
            FnSensor::new(move || {
                let room = room.lock().map_err(|e| goap_agent::GoapError::Transient(e.to_string()))?;
                let mut data = State::new();
                data.set("lamp_on", room.lamp_on);
                data.set("has_power", room.has_power);
                Ok(Observation::new(data))
            }),
        )?;
    }

    // Each action flips one switch in the room
    let mut handlers = ActionHandlers::new();
    let switches: [(&str, fn(&mut Room)); 3] = [
        ("turn_lamp_on", |r| r.lamp_on = true),
        ("restore_power", |r| r.has_power = true),
        ("turn_lamp_off", |r| r.lamp_on = false),
    ];
    for (name, apply) in switches {
        let room = room.clone();
        handlers.register(
            name,
            FnAction::new(move |ctx: &ExecutionContext| {
                println!("  running {} (attempt {})", ctx.action, ctx.attempt);
                let mut room = room
                    .lock()
                    .map_err(|e| goap_agent::GoapError::Transient(e.to_string()))?;
                apply(&mut *room);
                Ok(ActionResponse::ok())
            }),
        );
    }

    let config: GoapConfig = CONFIG.parse()?;
    let mut automaton = Automaton::builder("lamp", config)
        .handlers(handlers)
        .sensor(sensors)
        .build()?;

    let goal: State = [("lamp_on", true)].into_iter().collect();
    println!("Pursuing {}", goal);
    let report = automaton.run(goal.clone())?;
    println!("Executed: {}", report.executed_actions().join(" -> "));
    println!("Final state: {}", report.final_state);

    // Render the plan the automaton last settled on
    if let Some(actions) = automaton.planner().action_list() {
        let dot = GoapVisualizer::new().render(
            actions,
            automaton.planner().start_state(),
            &goal,
            automaton.planner().plan(),
        );
        println!("\n{}", dot);
    }

    Ok(())
}
