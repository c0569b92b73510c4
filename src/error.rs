use thiserror::Error;

use crate::state::State;

/// Error types for the planning core and the execution loop.
///
/// Recoverable conditions (a failed validation, a diverging step, a
/// transient remote error) are normally handled inside the loop; the
/// variants that escape to callers carry enough context to diagnose the
/// failure without re-running it.
///
/// # Examples
///
/// ```
/// use goap_agent::{GoapError, State};
///
/// let err = GoapError::NoPlanFound { start: State::new(), goal: State::new() };
/// assert_eq!(err.to_string(), "No valid plan found from {} to {}");
/// ```
#[derive(Error, Debug)]
pub enum GoapError {
    /// Search exhausted without reaching a goal-satisfying state.
    #[error("No valid plan found from {start} to {goal}")]
    NoPlanFound { start: State, goal: State },

    /// Sub-goal nesting went past the configured ceiling.
    #[error("Maximum goal depth {max_depth} exceeded at depth {depth} for goal {goal}")]
    MaxDepthExceeded {
        depth: usize,
        max_depth: usize,
        goal: State,
    },

    #[error("Validation failed for action '{action}': {}", .errors.join("; "))]
    ValidationFailed { action: String, errors: Vec<String> },

    #[error("Action '{action}' took {elapsed_ms}ms, budget was {budget_ms}ms")]
    ExecutionTimeout {
        action: String,
        elapsed_ms: u64,
        budget_ms: u64,
    },

    /// A network or server-side failure worth retrying.
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The collaborator rejected the action in a way that must not be retried.
    #[error("Action '{action}' failed: {message}")]
    ActionFailed { action: String, message: String },

    #[error("Replanning limit reached after {attempts} attempts")]
    ReplanLimitExceeded { attempts: usize },

    #[error("Action '{action}' has invalid weight {weight}; weights must be positive")]
    InvalidActionCost { action: String, weight: f64 },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("No action list attached to the planner")]
    ActionListMissing,

    #[error("Invalid expression '{expr}': {message}")]
    Expression { expr: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GoapError {
    /// Whether the retry policy should try the failed call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, GoapError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, GoapError>;
