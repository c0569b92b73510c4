use std::sync::{Arc, Mutex};

use goap_agent::clock::{Clock, ManualClock};
use goap_agent::executor::{ActionHandlers, ActionResponse, ExecutionContext, FnAction};
use goap_agent::sensor::{FnSensor, Observation, Sensors};
use goap_agent::{ActionList, Automaton, FactValue, GoapConfig, GoapError, Phase, State};

const HOUSE: &str = r#"
actions:
  buy_axe:
    conditions: { has_axe: false }
    reactions: { has_axe: true }
    weight: 2
  chop:
    conditions: { has_axe: true }
    reactions: { has_wood: true }
  build:
    conditions: { has_wood: true }
    reactions: { has_house: true }
thresholds:
  character_refresh_cache_duration: 0
"#;

type World = Arc<Mutex<State>>;
type Journal = Arc<Mutex<Vec<(String, State)>>>;

fn world(facts: &[(&str, FactValue)]) -> World {
    Arc::new(Mutex::new(facts.iter().cloned().collect()))
}

/// Wraps `apply` so every dispatch is journaled with the live world it saw.
fn journaled<F>(
    name: &str,
    world: &World,
    journal: &Journal,
    apply: F,
) -> FnAction<impl Fn(&ExecutionContext) -> goap_agent::Result<ActionResponse> + Send + Sync>
where
    F: Fn(&mut State) + Send + Sync,
{
    let name = name.to_string();
    let world = world.clone();
    let journal = journal.clone();
    FnAction::new(move |_: &ExecutionContext| {
        let mut state = world.lock().unwrap();
        journal.lock().unwrap().push((name.clone(), state.clone()));
        apply(&mut *state);
        Ok(ActionResponse::ok())
    })
}

fn world_sensor(world: &World) -> FnSensor<impl Fn() -> goap_agent::Result<Observation> + Send + Sync> {
    let world = world.clone();
    FnSensor::new(move || Ok(Observation::new(world.lock().unwrap().clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_after_divergence_starts_from_live_state() {
        let world = world(&[
            ("has_axe", true.into()),
            ("has_wood", false.into()),
            ("has_house", false.into()),
        ]);
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let chops = Arc::new(Mutex::new(0));

        let mut handlers = ActionHandlers::new();
        handlers.register(
            "buy_axe",
            journaled("buy_axe", &world, &journal, |s| s.set("has_axe", true)),
        );
        {
            let chops = chops.clone();
            // the first swing breaks the axe without producing wood
            handlers.register(
                "chop",
                journaled("chop", &world, &journal, move |s| {
                    let mut n = chops.lock().unwrap();
                    *n += 1;
                    if *n == 1 {
                        s.set("has_axe", false);
                    } else {
                        s.set("has_wood", true);
                    }
                }),
            );
        }
        handlers.register(
            "build",
            journaled("build", &world, &journal, |s| s.set("has_house", true)),
        );

        let config: GoapConfig = HOUSE.parse().unwrap();
        let actions = ActionList::from_config(&config.actions).unwrap();
        let mut automaton = Automaton::builder("builder", config)
            .handlers(handlers)
            .sensor(world_sensor(&world))
            .clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap();

        let report = automaton
            .run([("has_house", true)].into_iter().collect())
            .unwrap();

        assert_eq!(report.replans, 1);
        assert!(report.steps[0].diverged);
        assert_eq!(
            report.executed_actions(),
            vec!["chop", "buy_axe", "chop", "build"]
        );

        // every dispatched action was applicable in the world it ran against
        let journal = journal.lock().unwrap();
        for (name, live) in journal.iter() {
            assert!(
                actions.get(name).unwrap().can_perform(live),
                "{} dispatched against {}",
                name,
                live
            );
        }
        assert_eq!(journal[1].0, "buy_axe");
        assert_eq!(journal[1].1.get("has_axe"), Some(&FactValue::Bool(false)));
    }

    #[test]
    fn test_derived_facts_and_validation_drive_the_run() {
        let config: GoapConfig = r#"
actions:
  rest:
    conditions: { healthy: false }
    reactions: { healthy: true }
  fight:
    conditions: { healthy: true }
    reactions: { xp_gained: true }
    weight: 2
validation_rules:
  actions:
    fight:
      - type: condition
        condition: "hp_percent >= 50"
        severity: warning
        message: fighting while wounded
thresholds:
  character_refresh_cache_duration: 0
  min_hp: 60
state_rules:
  - fact: healthy
    condition: "hp >= $min_hp"
  - fact: hp_percent
    percent: [hp, max_hp]
  - fact: xp_gained
    source: xp_gained
    default: false
"#
        .parse()
        .unwrap();

        let raw = world(&[("hp", 20.into()), ("max_hp", 100.into())]);
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = ActionHandlers::new();
        handlers.register("rest", journaled("rest", &raw, &journal, |s| s.set("hp", 60)));
        handlers.register(
            "fight",
            journaled("fight", &raw, &journal, |s| {
                s.set("xp_gained", true);
                s.set("hp", 30);
            }),
        );

        let mut automaton = Automaton::builder("fighter", config)
            .handlers(handlers)
            .sensor(world_sensor(&raw))
            .clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap();

        let state = automaton.current_state().unwrap();
        assert_eq!(state.get("healthy"), Some(&FactValue::Bool(false)));
        assert_eq!(state.get("hp_percent"), Some(&FactValue::Int(20)));
        assert!(!state.contains_key("hp"));

        let report = automaton
            .run([("xp_gained", true)].into_iter().collect())
            .unwrap();
        assert_eq!(automaton.phase(), Phase::Done);
        assert_eq!(report.executed_actions(), vec!["rest", "fight"]);
        // 60% is enough, so the warning rule passes
        assert!(report.warnings.is_empty());
        assert_eq!(report.final_state.get("xp_gained"), Some(&FactValue::Bool(true)));
        assert_eq!(report.final_state.get("healthy"), Some(&FactValue::Bool(false)));
    }

    #[test]
    fn test_cooldown_from_sensors_is_waited_out() {
        let clock = Arc::new(ManualClock::default());
        let expires = Arc::new(Mutex::new(Some(clock.now() + chrono::Duration::seconds(10))));
        let raw = world(&[("has_axe", false.into()), ("has_wood", false.into()), ("has_house", false.into())]);

        let mut sensors = Sensors::new();
        sensors.add("world", world_sensor(&raw)).unwrap();
        {
            let expires = expires.clone();
            sensors
                .add(
                    "cooldown",
                    FnSensor::new(move || {
                        let mut observation = Observation::default();
                        observation.cooldown_expires = *expires.lock().unwrap();
                        Ok(observation)
                    }),
                )
                .unwrap();
        }

        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = ActionHandlers::new();
        {
            let expires = expires.clone();
            handlers.register(
                "buy_axe",
                journaled("buy_axe", &raw, &journal, move |s| {
                    s.set("has_axe", true);
                    *expires.lock().unwrap() = None;
                }),
            );
        }

        let mut automaton = Automaton::builder("waiter", HOUSE.parse().unwrap())
            .handlers(handlers)
            .sensor(sensors)
            .clock(clock.clone())
            .build()
            .unwrap();

        let report = automaton
            .run([("has_axe", true)].into_iter().collect())
            .unwrap();
        assert_eq!(report.executed_actions(), vec!["buy_axe"]);
        assert!((report.steps[0].cooldown_wait - 10.0).abs() < 1e-6);
        assert!(clock.total_slept() >= std::time::Duration::from_secs(10));
    }

    #[test]
    fn test_unhandled_action_fails_the_run() {
        let raw = world(&[("has_axe", false.into()), ("has_wood", false.into()), ("has_house", false.into())]);
        let mut automaton = Automaton::builder("empty-handed", HOUSE.parse().unwrap())
            .sensor(world_sensor(&raw))
            .clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap();

        let err = automaton
            .run([("has_axe", true)].into_iter().collect())
            .unwrap_err();
        assert!(matches!(err, GoapError::UnknownAction(name) if name == "buy_axe"));
        assert_eq!(automaton.phase(), Phase::Failed);
    }

    #[test]
    fn test_unreachable_goal_reports_no_plan() {
        let raw = world(&[("has_axe", false.into()), ("has_wood", false.into()), ("has_house", false.into())]);
        let mut automaton = Automaton::builder("dreamer", HOUSE.parse().unwrap())
            .sensor(world_sensor(&raw))
            .clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap();

        let err = automaton
            .run([("has_castle", true)].into_iter().collect())
            .unwrap_err();
        assert!(matches!(err, GoapError::NoPlanFound { .. }));
    }
}
