//! The contract between the execution loop and concrete actions.
//!
//! Planning only knows action names. Running an action means looking its
//! name up in [`ActionHandlers`] and calling the registered [`ActionFn`]
//! with an [`ExecutionContext`]. The implementor owns whatever client it
//! needs to reach the remote service.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{FactValue, State};
use crate::validation::ActionParams;
use crate::{GoapError, Result};

/// What an action reported after running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw facts observed as a side effect of the call.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, FactValue>,
    /// The failure cannot be fixed by replanning.
    pub fatal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_expires: Option<DateTime<Utc>>,
    /// A goal that must be reached before this step can be retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subgoal: Option<State>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A failure the loop recovers from by replanning.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::failure(message)
        }
    }

    /// Asks the loop to reach `goal` first, then come back to this step.
    pub fn needs(goal: State) -> Self {
        Self {
            subgoal: Some(goal),
            ..Self::failure("sub-goal required")
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_cooldown(mut self, expires: DateTime<Utc>) -> Self {
        self.cooldown_expires = Some(expires);
        self
    }

    /// Parses a JSON payload such as a remote API would return.
    ///
    /// ```
    /// use goap_agent::executor::ActionResponse;
    ///
    /// let response = ActionResponse::from_json(
    ///     r#"{"success": true, "data": {"gold": 40, "location": "bank"}}"#,
    /// )
    /// .unwrap();
    /// assert!(response.success);
    /// assert_eq!(response.data["gold"], 40.into());
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unspecified failure")
    }
}

/// Everything an action gets to see when it runs.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub action: String,
    pub params: ActionParams,
    /// Live planning state right before dispatch.
    pub state: State,
    /// 1-based attempt number when retried.
    pub attempt: u32,
}

impl ExecutionContext {
    pub fn new(action: impl Into<String>, state: State) -> Self {
        Self {
            action: action.into(),
            params: ActionParams::new(),
            state,
            attempt: 1,
        }
    }

    pub fn with_params(mut self, params: ActionParams) -> Self {
        self.params = params;
        self
    }
}

pub trait ActionFn: Send + Sync {
    fn exec(&self, ctx: &ExecutionContext) -> Result<ActionResponse>;
}

/// An action built from a closure.
pub struct FnAction<F> {
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(&ExecutionContext) -> Result<ActionResponse> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> ActionFn for FnAction<F>
where
    F: Fn(&ExecutionContext) -> Result<ActionResponse> + Send + Sync,
{
    fn exec(&self, ctx: &ExecutionContext) -> Result<ActionResponse> {
        (self.func)(ctx)
    }
}

/// Implementations keyed by action name, plus per-action parameters.
#[derive(Clone, Default)]
pub struct ActionHandlers {
    handlers: BTreeMap<String, Arc<dyn ActionFn>>,
    params: BTreeMap<String, ActionParams>,
}

impl ActionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `func` under `name`, replacing any previous handler.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: ActionFn + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(func));
    }

    /// Parameters passed to the handler and checked by `required_params`.
    pub fn set_params(&mut self, name: impl Into<String>, params: ActionParams) {
        self.params.insert(name.into(), params);
    }

    pub fn params(&self, name: &str) -> ActionParams {
        self.params.get(name).cloned().unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ActionFn>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler registered for `ctx.action`.
    pub fn dispatch(&self, ctx: &ExecutionContext) -> Result<ActionResponse> {
        let handler = self
            .get(&ctx.action)
            .ok_or_else(|| GoapError::UnknownAction(ctx.action.clone()))?;
        handler.exec(ctx)
    }
}

impl fmt::Debug for ActionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandlers")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("params", &self.params)
            .finish()
    }
}
