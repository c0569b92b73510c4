//! Derivation of planning facts from raw observed data.
//!
//! The sensor reports whatever the remote side exposes (`hp`, `max_hp`,
//! `map_name`, ...). Planning works on a smaller vocabulary of facts
//! (`healthy`, `hp_percent`, `location`). Each configured state rule
//! produces one fact, in order, and later rules can read facts produced by
//! earlier ones.

use crate::condition::Expr;
use crate::config::{Derivation, StateRuleConfig, Thresholds};
use crate::state::{FactValue, State};
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    Condition(Expr),
    Source {
        key: String,
        default: Option<FactValue>,
    },
    Percent {
        part: String,
        whole: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledRule {
    fact: String,
    rule: Rule,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateCalculator {
    rules: Vec<CompiledRule>,
}

impl StateCalculator {
    /// Parses every formula up front; a bad rule fails the whole load.
    pub fn compile(rules: &[StateRuleConfig], thresholds: &Thresholds) -> Result<Self> {
        let named = thresholds.named();
        let mut compiled = Vec::with_capacity(rules.len());
        for config in rules {
            let rule = match config.derivation()? {
                Derivation::Condition(text) => {
                    Rule::Condition(Expr::parse_with_thresholds(text, &named)?)
                }
                Derivation::Source(key) => Rule::Source {
                    key: key.to_string(),
                    default: config.default.clone(),
                },
                Derivation::Percent(part, whole) => Rule::Percent {
                    part: part.to_string(),
                    whole: whole.to_string(),
                },
            };
            compiled.push(CompiledRule {
                fact: config.fact.clone(),
                rule,
            });
        }
        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Produces the planning state for `raw`.
    ///
    /// With no rules configured, the raw data is used as the state as is.
    /// Otherwise only derived facts are returned. A `source` rule whose key
    /// is absent and has no default, or a `percent` rule missing either
    /// side, leaves its fact undefined.
    pub fn calculate(&self, raw: &State) -> State {
        if self.rules.is_empty() {
            return raw.clone();
        }
        // rules see raw data overlaid with what they derived so far
        let mut scope = raw.clone();
        let mut derived = State::new();
        for CompiledRule { fact, rule } in &self.rules {
            let value = match rule {
                Rule::Condition(expr) => Some(FactValue::Bool(expr.evaluate(&scope))),
                Rule::Source { key, default } => scope.get(key).cloned().or_else(|| default.clone()),
                Rule::Percent { part, whole } => {
                    match (
                        scope.get(part).and_then(FactValue::as_int),
                        scope.get(whole).and_then(FactValue::as_int),
                    ) {
                        (Some(_), Some(0)) => Some(FactValue::Int(0)),
                        (Some(part), Some(whole)) => {
                            let percent = i128::from(part) * 100 / i128::from(whole);
                            i64::try_from(percent).ok().map(FactValue::Int)
                        }
                        _ => None,
                    }
                }
            };
            match value {
                Some(value) => {
                    scope.set(fact.clone(), value.clone());
                    derived.set(fact.clone(), value);
                }
                None => log::debug!("State rule for '{}' produced no value", fact),
            }
        }
        derived
    }
}
