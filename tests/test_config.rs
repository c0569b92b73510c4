use goap_agent::config::GoapConfig;
use goap_agent::validation::{Severity, ValidatorKind};
use goap_agent::{snapshot, ActionList, FactValue, GoapError, Planner, State, World};

const AGENT: &str = r#"
actions:
  fight:
    conditions: { healthy: true, monster_nearby: true }
    reactions: { xp_gained: true }
    weight: 3
  rest:
    conditions: { healthy: false }
    reactions: { healthy: true }
  find_monster:
    reactions: { monster_nearby: true }
    weight: 2
validation_rules:
  global:
    - type: min_fact
      key: hp
      min: 1
  actions:
    fight:
      - type: condition
        condition: "hp >= $min_hp and not fleeing"
        severity: warning
thresholds:
  max_cooldown_wait: 30
  min_hp: 40
state_rules:
  - fact: healthy
    condition: "hp >= $min_hp"
  - fact: hp_percent
    percent: [hp, max_hp]
  - fact: monster_nearby
    source: monster_nearby
    default: false
execution:
  max_replans: 5
  retry:
    max_attempts: 2
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_document_loads() {
        let config: GoapConfig = AGENT.parse().unwrap();

        let names: Vec<&str> = config.actions.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["fight", "rest", "find_monster"]);
        assert_eq!(config.actions["rest"].weight, None);
        assert_eq!(config.validation_rules.global[0].kind, ValidatorKind::MinFact);
        assert_eq!(config.validation_rules.actions["fight"][0].severity, Severity::Warning);
        assert_eq!(config.thresholds.max_cooldown_wait, 30.0);
        assert_eq!(config.thresholds.named().get("min_hp"), Some(&FactValue::Int(40)));
        assert_eq!(config.state_rules.len(), 3);
        assert_eq!(config.execution.max_replans, 5);
        assert_eq!(config.execution.retry.max_attempts, 2);
        // untouched sections keep their defaults
        assert_eq!(config.execution.max_depth, 3);
        assert_eq!(config.execution.rate_limit.max_calls, 16);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let config: GoapConfig = AGENT.parse().unwrap();

        let mut actions = ActionList::from_config(&config.actions).unwrap();
        let first = actions.clone();
        actions.reload(&config.actions).unwrap();
        assert_eq!(actions, first);
        actions.reload(&config.actions).unwrap();
        assert_eq!(actions, first);
        assert_eq!(actions.names(), vec!["fight", "rest", "find_monster"]);
        assert_eq!(actions.get("rest").unwrap().weight, 1.0);
    }

    #[test]
    fn test_failed_reload_keeps_previous_actions() {
        let config: GoapConfig = AGENT.parse().unwrap();
        let mut actions = ActionList::from_config(&config.actions).unwrap();
        let before = actions.clone();

        let mut broken = config.actions.clone();
        broken["rest"].weight = Some(-2.0);
        assert!(matches!(
            actions.reload(&broken),
            Err(GoapError::InvalidActionCost { .. })
        ));
        assert_eq!(actions, before);
    }

    #[test]
    fn test_config_file_round_trip() {
        let config: GoapConfig = AGENT.parse().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, config.to_yaml().unwrap()).unwrap();

        let reloaded = GoapConfig::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_action_list_round_trips_through_config_shape() {
        let config: GoapConfig = AGENT.parse().unwrap();
        let actions = ActionList::from_config(&config.actions).unwrap();

        let restored = ActionList::from_config(&actions.to_config()).unwrap();
        assert_eq!(restored, actions);

        let mapping = snapshot::to_mapping(&actions).unwrap();
        let from_mapping: ActionList = snapshot::from_mapping(mapping).unwrap();
        assert_eq!(from_mapping, actions);
    }

    #[test]
    fn test_invalid_documents_are_rejected() {
        let zero_weight = "actions:\n  idle:\n    weight: 0\n";
        assert!(matches!(
            zero_weight.parse::<GoapConfig>(),
            Err(GoapError::InvalidActionCost { .. })
        ));

        let two_derivations = "state_rules:\n  - fact: x\n    source: y\n    condition: z\n";
        assert!(matches!(
            two_derivations.parse::<GoapConfig>(),
            Err(GoapError::Config(_))
        ));

        let bad_bounds = "thresholds:\n  min_cooldown_wait: 10\n  max_cooldown_wait: 5\n";
        assert!(bad_bounds.parse::<GoapConfig>().is_err());

        let unknown_validator = "validation_rules:\n  global:\n    - type: telepathy\n";
        assert!(matches!(
            unknown_validator.parse::<GoapConfig>(),
            Err(GoapError::Yaml(_))
        ));

        assert!(matches!(
            GoapConfig::load("/nonexistent/agent.yaml"),
            Err(GoapError::Io(_))
        ));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: GoapConfig = "{}".parse().unwrap();
        assert!(config.actions.is_empty());
        assert_eq!(config, GoapConfig::default());
    }

    #[test]
    fn test_world_snapshot_round_trip() {
        let config: GoapConfig = AGENT.parse().unwrap();
        let actions = ActionList::from_config(&config.actions).unwrap();

        let mut planner = Planner::with_actions(actions);
        let start: State = [
            ("healthy", false),
            ("monster_nearby", false),
            ("xp_gained", false),
        ]
        .into_iter()
        .collect();
        planner.set_start_state(start);
        planner.set_goal_state([("xp_gained", true)].into_iter().collect());
        let plan = planner.calculate().unwrap().unwrap();
        assert_eq!(plan.action_names().last(), Some(&"fight"));
        assert_eq!(plan.cost(), 6.0);

        let mut world = World::new();
        world.add_planner(planner);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.yaml");
        snapshot::save(&world, &path).unwrap();
        let restored: World = snapshot::load(&path).unwrap();
        assert_eq!(restored, world);
        assert_eq!(restored.planner(0).unwrap().plan(), Some(&plan));
    }
}
