//! YAML configuration model.
//!
//! One document drives the whole agent: the action registry, validation
//! rules, thresholds, the rules deriving planning facts from raw data, and
//! the execution settings. Every section is optional and defaults sensibly.
//!
//! ```
//! use goap_agent::config::GoapConfig;
//!
//! let config: GoapConfig = r#"
//! actions:
//!   rest:
//!     conditions: { healthy: false }
//!     reactions: { healthy: true }
//!     weight: 2
//! execution:
//!   max_replans: 4
//! "#
//! .parse()
//! .unwrap();
//!
//! assert_eq!(config.actions["rest"].weight, Some(2.0));
//! assert_eq!(config.execution.max_replans, 4);
//! assert_eq!(config.execution.max_depth, 3);
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::state::{FactValue, State};
use crate::validation::{Severity, ValidatorKind};
use crate::{GoapError, Result};

/// The `actions:` section, keyed by action name in document order.
pub type ActionsConfig = IndexMap<String, ActionConfig>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub conditions: State,
    #[serde(default)]
    pub reactions: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoapConfig {
    pub actions: ActionsConfig,
    pub validation_rules: ValidationRulesConfig,
    pub thresholds: Thresholds,
    pub state_rules: Vec<StateRuleConfig>,
    pub execution: ExecutionSettings,
}

impl GoapConfig {
    /// Reads and checks a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        log::debug!("Loading configuration from {}", path.display());
        text.parse()
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Structural checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for (name, action) in &self.actions {
            if let Some(weight) = action.weight {
                if !weight.is_finite() || weight <= 0.0 {
                    return Err(GoapError::InvalidActionCost {
                        action: name.clone(),
                        weight,
                    });
                }
            }
        }
        for rule in &self.state_rules {
            rule.derivation()?;
        }
        let t = &self.thresholds;
        for (name, seconds) in [
            ("cooldown_detection_threshold", t.cooldown_detection_threshold),
            ("max_cooldown_wait", t.max_cooldown_wait),
            ("min_cooldown_wait", t.min_cooldown_wait),
            ("character_refresh_cache_duration", t.character_refresh_cache_duration),
        ] {
            if Duration::try_from_secs_f64(seconds).is_err() {
                return Err(GoapError::Config(format!(
                    "thresholds.{} must be a non-negative number of seconds, got {}",
                    name, seconds
                )));
            }
        }
        if t.min_cooldown_wait < 0.0 || t.max_cooldown_wait < t.min_cooldown_wait {
            return Err(GoapError::Config(format!(
                "cooldown wait bounds [{}, {}] are not a valid range",
                t.min_cooldown_wait, t.max_cooldown_wait
            )));
        }
        if self.execution.retry.max_attempts == 0 {
            return Err(GoapError::Config(
                "execution.retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.execution.rate_limit.max_calls == 0 {
            return Err(GoapError::Config(
                "execution.rate_limit.max_calls must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl FromStr for GoapConfig {
    type Err = GoapError;

    fn from_str(yaml: &str) -> Result<Self> {
        let config: GoapConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRulesConfig {
    /// Rules checked before every action.
    pub global: Vec<RuleConfig>,
    /// Rules checked before the named action only.
    pub actions: BTreeMap<String, Vec<RuleConfig>>,
}

/// One validation rule: its kind, severity and kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(rename = "type")]
    pub kind: ValidatorKind,
    #[serde(default)]
    pub severity: Severity,
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

impl RuleConfig {
    pub fn new(kind: ValidatorKind) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            params: BTreeMap::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Cooldowns shorter than this many seconds are ignored.
    pub cooldown_detection_threshold: f64,
    pub max_cooldown_wait: f64,
    pub min_cooldown_wait: f64,
    /// How long a sensor observation may be reused, in seconds.
    pub character_refresh_cache_duration: f64,
    /// Named integers usable as `$name` in condition formulas.
    #[serde(flatten)]
    pub values: BTreeMap<String, i64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cooldown_detection_threshold: 0.5,
            max_cooldown_wait: 65.0,
            min_cooldown_wait: 0.0,
            character_refresh_cache_duration: 5.0,
            values: BTreeMap::new(),
        }
    }
}

impl Thresholds {
    /// The named thresholds in the shape the expression parser expects.
    pub fn named(&self) -> BTreeMap<String, FactValue> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), FactValue::Int(*v)))
            .collect()
    }

    pub fn refresh_cache_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.character_refresh_cache_duration).unwrap_or_default()
    }
}

/// How one planning fact is derived from raw observed data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRuleConfig {
    pub fact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<[String; 2]>,
    /// Used by `source` rules when the raw key is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FactValue>,
}

/// The single derivation a [`StateRuleConfig`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation<'a> {
    Condition(&'a str),
    Source(&'a str),
    Percent(&'a str, &'a str),
}

impl StateRuleConfig {
    pub fn derivation(&self) -> Result<Derivation<'_>> {
        match (&self.condition, &self.source, &self.percent) {
            (Some(expr), None, None) => Ok(Derivation::Condition(expr)),
            (None, Some(source), None) => Ok(Derivation::Source(source)),
            (None, None, Some([part, whole])) => Ok(Derivation::Percent(part, whole)),
            _ => Err(GoapError::Config(format!(
                "state rule for '{}' must set exactly one of condition, source or percent",
                self.fact
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub max_replans: usize,
    /// Maximum sub-goal nesting; the top-level goal is depth 0.
    pub max_depth: usize,
    pub step_timeout_secs: u64,
    /// Allowed absolute difference between predicted and observed integers.
    pub effect_tolerance: i64,
    pub retry: RetrySettings,
    pub rate_limit: RateLimitSettings,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_replans: 10,
            max_depth: 3,
            step_timeout_secs: 120,
            effect_tolerance: 0,
            retry: RetrySettings::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl ExecutionSettings {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_calls: usize,
    pub window_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_calls: 16,
            window_ms: 1000,
        }
    }
}
