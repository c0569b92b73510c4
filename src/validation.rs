//! Pre-execution validation of actions.
//!
//! Rules come from the `validation_rules:` section: `global` rules run
//! before every action, per-action rules only before the named one. Each
//! rule has a [`ValidatorKind`]; the [`ValidatorRegistry`] maps every kind to
//! a plain function, so the set of validators is closed and checked when
//! the configuration is loaded.
//!
//! A failing rule with `severity: error` makes the action invalid. A
//! failing rule with `severity: warning` is reported but never blocks.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::Expr;
use crate::config::{RuleConfig, Thresholds, ValidationRulesConfig};
use crate::state::{FactValue, State};
use crate::{GoapError, Result};

/// Parameters passed along with an action invocation.
pub type ActionParams = BTreeMap<String, FactValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    /// `params: [name, ...]` must all be present in the action parameters.
    RequiredParams,
    /// Fact `key` must equal `value`.
    FactEquals,
    /// Integer fact `key` must be at least `min`.
    MinFact,
    /// Integer fact `key` must be at most `max`.
    MaxFact,
    /// Formula `condition` must hold against the live state.
    Condition,
    /// No cooldown may be pending.
    NotOnCooldown,
}

impl ValidatorKind {
    pub const ALL: [ValidatorKind; 6] = [
        ValidatorKind::RequiredParams,
        ValidatorKind::FactEquals,
        ValidatorKind::MinFact,
        ValidatorKind::MaxFact,
        ValidatorKind::Condition,
        ValidatorKind::NotOnCooldown,
    ];

    /// Parameter names a rule of this kind cannot do without.
    fn required_params(self) -> &'static [&'static str] {
        match self {
            ValidatorKind::RequiredParams => &["params"],
            ValidatorKind::FactEquals => &["key", "value"],
            ValidatorKind::MinFact => &["key", "min"],
            ValidatorKind::MaxFact => &["key", "max"],
            ValidatorKind::Condition => &["condition"],
            ValidatorKind::NotOnCooldown => &[],
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorKind::RequiredParams => "required_params",
            ValidatorKind::FactEquals => "fact_equals",
            ValidatorKind::MinFact => "min_fact",
            ValidatorKind::MaxFact => "max_fact",
            ValidatorKind::Condition => "condition",
            ValidatorKind::NotOnCooldown => "not_on_cooldown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Pass,
    Error(String),
    Warning(String),
}

/// A rule compiled from its configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRule {
    pub kind: ValidatorKind,
    pub severity: Severity,
    pub params: BTreeMap<String, serde_yaml::Value>,
    /// Parsed form of the `condition` parameter, for `condition` rules.
    pub condition: Option<Expr>,
}

impl ValidationRule {
    pub fn compile(config: &RuleConfig, thresholds: &BTreeMap<String, FactValue>) -> Result<Self> {
        for name in config.kind.required_params() {
            if !config.params.contains_key(*name) {
                return Err(GoapError::Config(format!(
                    "{} rule is missing parameter '{}'",
                    config.kind, name
                )));
            }
        }
        let condition = match config.kind {
            ValidatorKind::Condition => {
                let text = config
                    .params
                    .get("condition")
                    .and_then(serde_yaml::Value::as_str)
                    .ok_or_else(|| {
                        GoapError::Config("condition rule needs a string 'condition'".into())
                    })?;
                Some(Expr::parse_with_thresholds(text, thresholds)?)
            }
            _ => None,
        };
        Ok(Self {
            kind: config.kind,
            severity: config.severity,
            params: config.params.clone(),
            condition,
        })
    }

    /// Turns a failure message into the outcome matching this rule's severity.
    /// A `message` parameter replaces the generated text.
    pub fn fail(&self, message: String) -> RuleOutcome {
        let message = self
            .params
            .get("message")
            .and_then(serde_yaml::Value::as_str)
            .map(str::to_string)
            .unwrap_or(message);
        match self.severity {
            Severity::Error => RuleOutcome::Error(message),
            Severity::Warning => RuleOutcome::Warning(message),
        }
    }

    fn str_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(serde_yaml::Value::as_str)
    }

    fn int_param(&self, name: &str) -> Option<i64> {
        self.params.get(name).and_then(serde_yaml::Value::as_i64)
    }
}

/// Everything a validator may look at besides the action parameters.
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    pub state: &'a State,
    pub now: DateTime<Utc>,
    pub cooldown_expires: Option<DateTime<Utc>>,
}

pub type ValidatorFn = fn(&ActionParams, &ValidationRule, &ValidationContext<'_>) -> RuleOutcome;

/// Maps each [`ValidatorKind`] to its implementation.
#[derive(Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<ValidatorKind, ValidatorFn>,
}

impl ValidatorRegistry {
    /// A registry with every built-in validator.
    pub fn builtin() -> Self {
        let mut validators: HashMap<ValidatorKind, ValidatorFn> = HashMap::new();
        validators.insert(ValidatorKind::RequiredParams, required_params);
        validators.insert(ValidatorKind::FactEquals, fact_equals);
        validators.insert(ValidatorKind::MinFact, min_fact);
        validators.insert(ValidatorKind::MaxFact, max_fact);
        validators.insert(ValidatorKind::Condition, condition);
        validators.insert(ValidatorKind::NotOnCooldown, not_on_cooldown);
        Self { validators }
    }

    /// Replaces the implementation of one kind.
    pub fn register(&mut self, kind: ValidatorKind, validator: ValidatorFn) {
        self.validators.insert(kind, validator);
    }

    pub fn get(&self, kind: ValidatorKind) -> Option<ValidatorFn> {
        self.validators.get(&kind).copied()
    }

    pub fn run(
        &self,
        params: &ActionParams,
        rule: &ValidationRule,
        ctx: &ValidationContext<'_>,
    ) -> RuleOutcome {
        match self.get(rule.kind) {
            Some(validator) => validator(params, rule, ctx),
            None => RuleOutcome::Error(format!("no validator registered for '{}'", rule.kind)),
        }
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.validators.keys().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("ValidatorRegistry").field("kinds", &kinds).finish()
    }
}

fn required_params(params: &ActionParams, rule: &ValidationRule, _: &ValidationContext<'_>) -> RuleOutcome {
    let names = rule
        .params
        .get("params")
        .and_then(serde_yaml::Value::as_sequence)
        .map(|seq| seq.iter().filter_map(serde_yaml::Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();
    let missing: Vec<&str> = names
        .into_iter()
        .filter(|name| !params.contains_key(*name))
        .collect();
    if missing.is_empty() {
        RuleOutcome::Pass
    } else {
        rule.fail(format!("missing required parameters: {}", missing.join(", ")))
    }
}

fn fact_equals(_: &ActionParams, rule: &ValidationRule, ctx: &ValidationContext<'_>) -> RuleOutcome {
    let key = rule.str_param("key").unwrap_or_default();
    let expected = rule
        .params
        .get("value")
        .cloned()
        .and_then(|v| serde_yaml::from_value::<FactValue>(v).ok());
    let Some(expected) = expected else {
        return RuleOutcome::Error(format!("fact_equals rule for '{}' has an unusable value", key));
    };
    match ctx.state.get(key) {
        Some(actual) if *actual == expected => RuleOutcome::Pass,
        Some(actual) => rule.fail(format!("{} is {}, expected {}", key, actual, expected)),
        None => rule.fail(format!("{} is not known, expected {}", key, expected)),
    }
}

fn bounded_fact(
    rule: &ValidationRule,
    ctx: &ValidationContext<'_>,
    bound_name: &str,
    check: fn(i64, i64) -> bool,
) -> RuleOutcome {
    let key = rule.str_param("key").unwrap_or_default();
    let Some(bound) = rule.int_param(bound_name) else {
        return RuleOutcome::Error(format!("{} rule for '{}' needs an integer '{}'", rule.kind, key, bound_name));
    };
    match ctx.state.get(key).and_then(FactValue::as_int) {
        Some(value) if check(value, bound) => RuleOutcome::Pass,
        Some(value) => rule.fail(format!("{} is {}, {} is {}", key, value, bound_name, bound)),
        None => rule.fail(format!("{} is not a known integer fact", key)),
    }
}

fn min_fact(_: &ActionParams, rule: &ValidationRule, ctx: &ValidationContext<'_>) -> RuleOutcome {
    bounded_fact(rule, ctx, "min", |value, min| value >= min)
}

fn max_fact(_: &ActionParams, rule: &ValidationRule, ctx: &ValidationContext<'_>) -> RuleOutcome {
    bounded_fact(rule, ctx, "max", |value, max| value <= max)
}

fn condition(_: &ActionParams, rule: &ValidationRule, ctx: &ValidationContext<'_>) -> RuleOutcome {
    match &rule.condition {
        Some(expr) if expr.evaluate(ctx.state) => RuleOutcome::Pass,
        Some(expr) => rule.fail(format!("condition not met: {}", expr)),
        None => RuleOutcome::Error("condition rule was not compiled".into()),
    }
}

fn not_on_cooldown(_: &ActionParams, rule: &ValidationRule, ctx: &ValidationContext<'_>) -> RuleOutcome {
    match ctx.cooldown_expires {
        Some(expires) if expires > ctx.now => {
            let remaining = (expires - ctx.now).num_milliseconds() as f64 / 1000.0;
            rule.fail(format!("on cooldown for another {:.1}s", remaining))
        }
        _ => RuleOutcome::Pass,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Converts hard errors into [`GoapError::ValidationFailed`], handing
    /// the warnings back on success.
    pub fn into_result(self, action: &str) -> Result<Vec<String>> {
        if self.is_valid {
            Ok(self.warnings)
        } else {
            Err(GoapError::ValidationFailed {
                action: action.to_string(),
                errors: self.errors,
            })
        }
    }
}

/// Global and per-action rules plus the registry that runs them.
#[derive(Debug, Clone, Default)]
pub struct ActionValidator {
    registry: ValidatorRegistry,
    global: Vec<ValidationRule>,
    per_action: BTreeMap<String, Vec<ValidationRule>>,
}

impl ActionValidator {
    pub fn new(registry: ValidatorRegistry) -> Self {
        Self {
            registry,
            global: Vec::new(),
            per_action: BTreeMap::new(),
        }
    }

    /// Compiles every configured rule with the built-in registry.
    pub fn from_config(config: &ValidationRulesConfig, thresholds: &Thresholds) -> Result<Self> {
        let named = thresholds.named();
        let global = config
            .global
            .iter()
            .map(|rule| ValidationRule::compile(rule, &named))
            .collect::<Result<Vec<_>>>()?;
        let mut per_action = BTreeMap::new();
        for (action, rules) in &config.actions {
            let compiled = rules
                .iter()
                .map(|rule| ValidationRule::compile(rule, &named))
                .collect::<Result<Vec<_>>>()?;
            per_action.insert(action.clone(), compiled);
        }
        log::debug!(
            "Compiled {} global and {} per-action validation rules",
            global.len(),
            per_action.values().map(Vec::len).sum::<usize>()
        );
        Ok(Self {
            registry: ValidatorRegistry::builtin(),
            global,
            per_action,
        })
    }

    pub fn registry_mut(&mut self) -> &mut ValidatorRegistry {
        &mut self.registry
    }

    pub fn add_global_rule(&mut self, rule: ValidationRule) {
        self.global.push(rule);
    }

    pub fn add_action_rule(&mut self, action: &str, rule: ValidationRule) {
        self.per_action.entry(action.to_string()).or_default().push(rule);
    }

    /// Runs global rules, then the rules of `action`.
    pub fn validate_action(
        &self,
        action: &str,
        params: &ActionParams,
        ctx: &ValidationContext<'_>,
    ) -> ValidationResult {
        let mut result = ValidationResult {
            is_valid: true,
            ..ValidationResult::default()
        };
        let action_rules = self.per_action.get(action).map(Vec::as_slice).unwrap_or_default();
        for rule in self.global.iter().chain(action_rules) {
            match self.registry.run(params, rule, ctx) {
                RuleOutcome::Pass => {}
                RuleOutcome::Error(message) => {
                    log::debug!("Validation error for '{}': {}", action, message);
                    result.errors.push(message);
                }
                RuleOutcome::Warning(message) => {
                    log::warn!("Validation warning for '{}': {}", action, message);
                    result.warnings.push(message);
                }
            }
        }
        result.is_valid = result.errors.is_empty();
        result
    }
}
