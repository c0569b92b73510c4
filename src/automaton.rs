//! The execution and replanning loop.
//!
//! An [`Automaton`] drives one agent toward a goal:
//!
//! 1. `Planning`: plan from the observed state to the active goal
//! 2. `Validating`: re-check the next step against the live state and the
//!    configured validation rules
//! 3. `ExecutingStep`: wait out any cooldown, then dispatch the action
//!    through the rate limiter, retrying transient failures
//! 4. `Observing`: fold the result back into the observed state and compare
//!    it with what the plan predicted
//!
//! A failed validation, an unsuccessful response or a prediction mismatch
//! throws the rest of the plan away and goes back to planning, up to
//! `max_replans` times per run. An action may also answer that another goal
//! has to be reached first; that goal is pushed as a [`GoalFrame`] and
//! planned for on its own, up to `max_depth` levels deep. A frame may push
//! at most `max_replans` sub-goals over its lifetime.
//!
//! The run is done as soon as the observed state satisfies the goal given
//! to `run`, whatever sub-goals are still open.
//!
//! Execution is synchronous. Every wait goes through the injected
//! [`Clock`], and every outbound call (sensing included) goes through the
//! shared [`RateLimiter`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::action::{Action, ActionList};
use crate::clock::{to_chrono, Clock, SystemClock};
use crate::config::{ExecutionSettings, GoapConfig};
use crate::cooldown::CooldownManager;
use crate::executor::{ActionHandlers, ActionResponse, ExecutionContext};
use crate::plan::{Plan, PlanStep};
use crate::planner::{strip_dont_care, Planner};
use crate::search::SearchAlgorithm;
use crate::sensor::{Observation, SensorFn};
use crate::state::{FactValue, State};
use crate::state_calc::StateCalculator;
use crate::throttle::{RateLimiter, RetryPolicy};
use crate::validation::{ActionValidator, ValidationContext};
use crate::{GoapError, Result};

/// Where the automaton currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No run started yet.
    Idle,
    Planning,
    Validating,
    ExecutingStep,
    Observing,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One goal on the goal stack, with the plan currently pursuing it.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalFrame {
    pub goal: State,
    /// 0 for the goal given to `run`, +1 for every nested sub-goal.
    pub depth: usize,
    plan: Option<Plan>,
    next_step: usize,
    subgoals_pushed: usize,
}

impl GoalFrame {
    pub fn new(goal: State, depth: usize) -> Self {
        Self {
            goal,
            depth,
            plan: None,
            next_step: 0,
            subgoals_pushed: 0,
        }
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    fn current_step(&self) -> Option<&PlanStep> {
        self.plan.as_ref()?.steps().get(self.next_step)
    }

    fn set_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.next_step = 0;
    }

    fn discard_plan(&mut self) {
        self.plan = None;
        self.next_step = 0;
    }
}

/// What happened to one dispatched step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub action: String,
    pub depth: usize,
    pub attempts: u32,
    pub success: bool,
    /// Seconds spent waiting for a cooldown before dispatch.
    pub cooldown_wait: f64,
    /// The observed state did not match the plan's prediction.
    pub diverged: bool,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// The goal that was reached, which is the fallback goal if one was used.
    pub goal: State,
    pub final_state: State,
    pub steps: Vec<StepRecord>,
    pub replans: usize,
    pub used_fallback: bool,
    /// Deepest sub-goal level entered.
    pub max_depth: usize,
    pub warnings: Vec<String>,
}

impl ExecutionReport {
    fn new(goal: State) -> Self {
        Self {
            goal,
            final_state: State::new(),
            steps: Vec::new(),
            replans: 0,
            used_fallback: false,
            max_depth: 0,
            warnings: Vec::new(),
        }
    }

    /// Names of the dispatched actions, in order.
    pub fn executed_actions(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.action.as_str()).collect()
    }
}

enum StepOutcome {
    Advanced,
    Replan(String),
    SubGoal(State),
}

#[derive(Debug, Clone)]
struct CachedObservation {
    observation: Observation,
    taken_at: DateTime<Utc>,
}

/// Assembles an [`Automaton`] from a configuration document and its
/// collaborators.
pub struct AutomatonBuilder {
    name: String,
    config: GoapConfig,
    handlers: ActionHandlers,
    sensor: Option<Arc<dyn SensorFn>>,
    clock: Option<Arc<dyn Clock>>,
    limiter: Option<Arc<RateLimiter>>,
    search: Option<Box<dyn SearchAlgorithm>>,
}

impl AutomatonBuilder {
    pub fn new(name: impl Into<String>, config: GoapConfig) -> Self {
        Self {
            name: name.into(),
            config,
            handlers: ActionHandlers::new(),
            sensor: None,
            clock: None,
            limiter: None,
            search: None,
        }
    }

    pub fn handlers(mut self, handlers: ActionHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn sensor<S: SensorFn + 'static>(mut self, sensor: S) -> Self {
        self.sensor = Some(Arc::new(sensor));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Shares an existing limiter instead of creating one from the
    /// `execution.rate_limit` settings.
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn search_algorithm(mut self, search: Box<dyn SearchAlgorithm>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn build(self) -> Result<Automaton> {
        self.config.validate()?;
        let sensor = self
            .sensor
            .ok_or_else(|| GoapError::Config(format!("automaton '{}' has no sensor", self.name)))?;
        let actions = ActionList::from_config(&self.config.actions)?;
        for name in actions.names() {
            if !self.handlers.contains(name) {
                log::warn!("Action '{}' has no handler and will fail if planned", name);
            }
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(RateLimiter::from_settings(
                &self.config.execution.rate_limit,
                clock.clone(),
            ))
        });
        let mut planner = Planner::with_actions(actions);
        if let Some(search) = self.search {
            planner = planner.with_search_algorithm(search);
        }

        Ok(Automaton {
            name: self.name,
            planner,
            handlers: self.handlers,
            sensor,
            validator: ActionValidator::from_config(
                &self.config.validation_rules,
                &self.config.thresholds,
            )?,
            calculator: StateCalculator::compile(
                &self.config.state_rules,
                &self.config.thresholds,
            )?,
            cooldowns: CooldownManager::new(&self.config.thresholds, clock.clone()),
            retry: RetryPolicy::from_settings(&self.config.execution.retry),
            refresh: to_chrono(self.config.thresholds.refresh_cache_duration()),
            settings: self.config.execution,
            limiter,
            clock,
            phase: Phase::Idle,
            cache: None,
            pending_cooldown: None,
        })
    }
}

pub struct Automaton {
    name: String,
    planner: Planner,
    handlers: ActionHandlers,
    sensor: Arc<dyn SensorFn>,
    validator: ActionValidator,
    calculator: StateCalculator,
    cooldowns: CooldownManager,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    settings: ExecutionSettings,
    refresh: chrono::Duration,
    phase: Phase,
    cache: Option<CachedObservation>,
    /// Cooldown reported by the last response, kept across cache drops.
    pending_cooldown: Option<DateTime<Utc>>,
}

impl Automaton {
    pub fn builder(name: impl Into<String>, config: GoapConfig) -> AutomatonBuilder {
        AutomatonBuilder::new(name, config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Forgets the cached observation so the next read hits the sensor.
    pub fn invalidate_cache(&mut self) {
        self.cache = None;
    }

    /// Reads the world (through the cache) and derives the planning state.
    pub fn current_state(&mut self) -> Result<State> {
        let observation = self.observe()?;
        Ok(self.calculator.calculate(&observation.data))
    }

    /// Pursues `goal` until the live state satisfies it or the run fails.
    pub fn run(&mut self, goal: State) -> Result<ExecutionReport> {
        self.execute(goal, None)
    }

    /// Like [`run`](Self::run), but plans for `fallback` instead when no
    /// plan reaches `goal`.
    pub fn run_with_fallback(&mut self, goal: State, fallback: State) -> Result<ExecutionReport> {
        self.execute(goal, Some(fallback))
    }

    fn execute(&mut self, goal: State, fallback: Option<State>) -> Result<ExecutionReport> {
        log::info!("[{}] Pursuing goal {}", self.name, goal);
        let result = self.drive(goal, fallback);
        match &result {
            Ok(report) => {
                self.phase = Phase::Done;
                log::info!(
                    "[{}] Goal {} reached after {} steps and {} replans",
                    self.name,
                    report.goal,
                    report.steps.len(),
                    report.replans
                );
            }
            Err(err) => {
                self.phase = Phase::Failed;
                log::error!("[{}] Run failed: {}", self.name, err);
            }
        }
        result
    }

    fn drive(&mut self, goal: State, fallback: Option<State>) -> Result<ExecutionReport> {
        let goal = strip_dont_care(goal);
        let mut fallback = fallback.map(strip_dont_care);
        let mut report = ExecutionReport::new(goal.clone());
        let mut frames = vec![GoalFrame::new(goal, 0)];

        loop {
            let state = self.current_state()?;
            if frames.first().is_some_and(|root| state.satisfies(&root.goal)) {
                if frames.len() > 1 {
                    log::info!(
                        "[{}] Goal reached with {} sub-goals still open",
                        self.name,
                        frames.len() - 1
                    );
                }
                report.final_state = state;
                return Ok(report);
            }
            let Some(frame) = frames.last_mut() else {
                return Err(GoapError::Config("goal stack is empty".into()));
            };

            if frame.depth > 0 && state.satisfies(&frame.goal) {
                log::info!("[{}] Sub-goal at depth {} reached", self.name, frame.depth);
                frames.pop();
                continue;
            }

            if frame.current_step().is_none() {
                self.phase = Phase::Planning;
                match self.plan_for(&state, &frame.goal)? {
                    Some(plan) => frame.set_plan(plan),
                    None => match fallback.take() {
                        Some(alternative) if frame.depth == 0 => {
                            log::warn!(
                                "[{}] No plan for {}, falling back to {}",
                                self.name,
                                frame.goal,
                                alternative
                            );
                            frame.goal = alternative.clone();
                            report.goal = alternative;
                            report.used_fallback = true;
                            continue;
                        }
                        _ => {
                            return Err(GoapError::NoPlanFound {
                                start: state,
                                goal: frame.goal.clone(),
                            })
                        }
                    },
                }
            }

            // an empty plan for a goal the live state does not satisfy
            let Some(step) = frame.current_step().cloned() else {
                return Err(GoapError::NoPlanFound {
                    start: state,
                    goal: frame.goal.clone(),
                });
            };
            let depth = frame.depth;
            match self.run_step(&step, &state, depth, &mut report)? {
                StepOutcome::Advanced => frame.next_step += 1,
                StepOutcome::Replan(reason) => {
                    frame.discard_plan();
                    self.invalidate_cache();
                    report.replans += 1;
                    log::warn!(
                        "[{}] Replanning ({}/{}): {}",
                        self.name,
                        report.replans,
                        self.settings.max_replans,
                        reason
                    );
                    if report.replans > self.settings.max_replans {
                        return Err(GoapError::ReplanLimitExceeded {
                            attempts: report.replans,
                        });
                    }
                }
                StepOutcome::SubGoal(subgoal) => {
                    frame.discard_plan();
                    frame.subgoals_pushed += 1;
                    if frame.subgoals_pushed > self.settings.max_replans {
                        log::warn!(
                            "[{}] Goal {} keeps requiring sub-goals, giving up",
                            self.name,
                            frame.goal
                        );
                        return Err(GoapError::ReplanLimitExceeded {
                            attempts: frame.subgoals_pushed,
                        });
                    }
                    let depth = depth + 1;
                    if depth > self.settings.max_depth {
                        return Err(GoapError::MaxDepthExceeded {
                            depth,
                            max_depth: self.settings.max_depth,
                            goal: subgoal,
                        });
                    }
                    let subgoal = strip_dont_care(subgoal);
                    log::info!("[{}] Pushing sub-goal {} at depth {}", self.name, subgoal, depth);
                    report.max_depth = report.max_depth.max(depth);
                    frames.push(GoalFrame::new(subgoal, depth));
                }
            }
        }
    }

    fn plan_for(&mut self, state: &State, goal: &State) -> Result<Option<Plan>> {
        self.planner.set_start_state(state.clone());
        self.planner.set_goal_state(goal.clone());
        self.planner.calculate()
    }

    fn run_step(
        &mut self,
        step: &PlanStep,
        state: &State,
        depth: usize,
        report: &mut ExecutionReport,
    ) -> Result<StepOutcome> {
        let action = self
            .planner
            .action_list()
            .and_then(|list| list.get(&step.action))
            .cloned()
            .ok_or_else(|| GoapError::UnknownAction(step.action.clone()))?;

        self.phase = Phase::Validating;
        if !action.can_perform(state) {
            return Ok(StepOutcome::Replan(format!(
                "preconditions of '{}' no longer hold",
                action.name
            )));
        }
        let params = self.handlers.params(&action.name);
        let sensed = self.cache.as_ref().and_then(|c| c.observation.cooldown_expires);
        let cooldown = sensed.max(self.pending_cooldown);
        let validation = self.validator.validate_action(
            &action.name,
            &params,
            &ValidationContext {
                state,
                now: self.clock.now(),
                cooldown_expires: cooldown,
            },
        );
        report.warnings.extend(validation.warnings.iter().cloned());
        if let Err(err) = validation.into_result(&action.name) {
            return Ok(StepOutcome::Replan(err.to_string()));
        }

        let cooldown_wait = self.cooldowns.wait(cooldown);
        self.pending_cooldown = None;

        self.phase = Phase::ExecutingStep;
        log::debug!("[{}] Executing '{}' at depth {}", self.name, action.name, depth);
        let mut ctx = ExecutionContext::new(action.name.clone(), state.clone()).with_params(params);
        let mut attempts = 0;
        let response = self.dispatch(&mut ctx, &mut attempts)?;

        let mut record = StepRecord {
            action: action.name.clone(),
            depth,
            attempts,
            success: response.success,
            cooldown_wait,
            diverged: false,
        };

        if response.fatal {
            report.steps.push(record);
            return Err(GoapError::ActionFailed {
                action: action.name,
                message: response.error_message().to_string(),
            });
        }

        self.phase = Phase::Observing;
        self.absorb(&response);

        if let Some(subgoal) = response.subgoal {
            report.steps.push(record);
            return Ok(StepOutcome::SubGoal(subgoal));
        }
        if !response.success {
            report.steps.push(record);
            return Ok(StepOutcome::Replan(format!(
                "'{}' failed: {}",
                action.name,
                response.error.as_deref().unwrap_or("unspecified failure")
            )));
        }

        let observed = self.current_state()?;
        let outcome = match self.divergence(&action, step, &observed) {
            Some(reason) => {
                record.diverged = true;
                StepOutcome::Replan(reason)
            }
            None => StepOutcome::Advanced,
        };
        report.steps.push(record);
        Ok(outcome)
    }

    /// Dispatches through the limiter with retries. A call that returns
    /// after the step budget has elapsed is a timeout.
    fn dispatch(&self, ctx: &mut ExecutionContext, attempts: &mut u32) -> Result<ActionResponse> {
        let budget = self.settings.step_timeout();
        let clock = self.clock.as_ref();
        self.retry.retry(clock, |attempt| {
            *attempts = attempt;
            ctx.attempt = attempt;
            self.limiter.acquire();
            let started = clock.now();
            let response = self.handlers.dispatch(ctx)?;
            let elapsed = (clock.now() - started).to_std().unwrap_or_default();
            if elapsed > budget {
                return Err(GoapError::ExecutionTimeout {
                    action: ctx.action.clone(),
                    elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                });
            }
            Ok(response)
        })
    }

    /// Folds response data into the cached observation, or drops the cache
    /// when the response carried none. A reported cooldown is kept either
    /// way and waited for before the next dispatch.
    fn absorb(&mut self, response: &ActionResponse) {
        if response.cooldown_expires.is_some() {
            self.pending_cooldown = response.cooldown_expires;
        }
        if response.data.is_empty() {
            self.cache = None;
            return;
        }
        let now = self.clock.now();
        if let Some(cached) = self.cache.as_mut() {
            for (key, value) in &response.data {
                cached.observation.data.set(key.clone(), value.clone());
            }
            if response.cooldown_expires.is_some() {
                cached.observation.cooldown_expires = response.cooldown_expires;
            }
            cached.taken_at = now;
        }
    }

    /// Returns why the observed effects differ from the prediction, if
    /// they do.
    fn divergence(&self, action: &Action, step: &PlanStep, observed: &State) -> Option<String> {
        let tolerance = u64::try_from(self.settings.effect_tolerance).unwrap_or(0);
        for key in action.effects.keys() {
            let predicted = step.resulting_state.get(key)?;
            let matches = match (observed.get(key), predicted) {
                (Some(FactValue::Int(actual)), FactValue::Int(expected)) => {
                    actual.abs_diff(*expected) <= tolerance
                }
                (Some(actual), expected) => actual == expected,
                (None, _) => false,
            };
            if !matches {
                let actual = observed
                    .get(key)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "nothing".to_string());
                return Some(format!(
                    "'{}' predicted {} = {}, observed {}",
                    action.name, key, predicted, actual
                ));
            }
        }
        None
    }

    fn observe(&mut self) -> Result<Observation> {
        let now = self.clock.now();
        if let Some(cached) = &self.cache {
            if now - cached.taken_at < self.refresh {
                return Ok(cached.observation.clone());
            }
        }
        let observation = self.retry.retry(self.clock.as_ref(), |_| {
            self.limiter.acquire();
            self.sensor.sense()
        })?;
        self.cache = Some(CachedObservation {
            observation: observation.clone(),
            taken_at: self.clock.now(),
        });
        Ok(observation)
    }
}

impl fmt::Debug for Automaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Automaton")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
