//! Execution engine.
//!
//! A [`Machine`] walks one model for one session. It runs the initial state's
//! hook, then repeatedly selects an allowed outbound transition according to
//! the configured [`Strategy`], runs its action hook, commits the state change
//! and runs the new state's hook, until a stop condition is met.
//!
//! Guard evaluation, selection and the action hook run under the shared
//! transition lock; the state hook runs after it is released.

use crate::error::{HookError, RuntimeError};
use crate::hooks::{invoke, HookContext, HookTable, SessionContext, StateHook};
use crate::session::Actor;
use crate::strategy::Strategy;
use crate::sync::Shared;
use crate::transition_log::{EntryKind, TransitionLog};
use magpie_core::{
    hook_key, AuditTrail, Model, NavigationPolicy, Outcome, PlannedPath, SessionSummary,
    StopReason, Transition,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::convert::Infallible;
use std::iter::Peekable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Run configuration for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub max_run_time: Option<Duration>,
    /// Stop once this many transitions have been taken.
    pub max_transitions: Option<u64>,
    pub stop_on_fail: bool,
    pub stop_at_state: Option<String>,
    pub strategy: Strategy,
}

impl RunOptions {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_max_run_time(mut self, max: Duration) -> Self {
        self.max_run_time = Some(max);
        self
    }

    pub fn with_max_transitions(mut self, max: u64) -> Self {
        self.max_transitions = Some(max);
        self
    }

    pub fn with_stop_on_fail(mut self, stop_on_fail: bool) -> Self {
        self.stop_on_fail = stop_on_fail;
        self
    }

    pub fn with_stop_at_state(mut self, state: impl Into<String>) -> Self {
        self.stop_at_state = Some(state.into());
        self
    }
}

/// Cancels a running session from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the loop ended.
enum Halt {
    Stop(StopReason),
    Fatal(RuntimeError),
}

impl From<RuntimeError> for Halt {
    fn from(err: RuntimeError) -> Self {
        Halt::Fatal(err)
    }
}

/// The execution engine for one session.
pub struct Machine<C> {
    name: String,
    model: Arc<Model>,
    hooks: Arc<HookTable<C>>,
    handle: C,
    shared: Arc<Shared>,
    options: RunOptions,
    plan: Option<Peekable<PlannedPath>>,
    plan_policy: Option<NavigationPolicy>,
    rng: StdRng,
    summary: SessionSummary,
    audit_trail: AuditTrail,
    current_state: String,
    log: Option<TransitionLog>,
    cancel: CancelHandle,
}

impl<C: SessionContext> Machine<C> {
    /// Creates an engine positioned at the model's initial state.
    ///
    /// Fails for the unimplemented full coverage strategy, and for shortest
    /// path when no stop state is set or no path to it exists.
    pub fn new(
        actor: &Actor<C>,
        handle: C,
        options: RunOptions,
        shared: Arc<Shared>,
    ) -> Result<Self, RuntimeError> {
        let model = Arc::clone(&actor.model);
        let initial = model
            .initial_state_name()
            .ok_or_else(|| {
                RuntimeError::SessionConfig(format!("model '{}' has no transitions", model.name))
            })?
            .to_string();

        let mut plan = None;
        let mut plan_policy = None;
        match options.strategy {
            Strategy::FullCoverage => {
                return Err(RuntimeError::StrategyNotImplemented {
                    strategy: options.strategy,
                });
            }
            Strategy::ShortestPath => {
                let stop_at = options.stop_at_state.as_deref().ok_or_else(|| {
                    RuntimeError::SessionConfig(format!(
                        "session {}: the shortest_path strategy requires stop_at_state \
                         to be set to the name of the expected end state",
                        actor.name
                    ))
                })?;
                let path = model.shortest_path(&initial, stop_at)?;
                info!(
                    "\"{}\": planned {} step(s) to \"{}\" ({})",
                    initial,
                    path.len(),
                    stop_at,
                    path.policy()
                );
                plan_policy = Some(path.policy());
                plan = Some(path.peekable());
            }
            Strategy::PureRandom | Strategy::SmartRandom | Strategy::Random => {}
        }

        Ok(Self {
            name: actor.name.clone(),
            summary: SessionSummary::new(Arc::clone(&model)),
            model,
            hooks: Arc::clone(&actor.hooks),
            handle,
            shared,
            options,
            plan,
            plan_policy,
            rng: StdRng::from_entropy(),
            audit_trail: AuditTrail::new(),
            current_state: initial,
            log: None,
            cancel: CancelHandle::default(),
        })
    }

    /// Name passed to hooks and used in log lines. Defaults to the actor's.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Makes random choices reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_transition_log(mut self, log: TransitionLog) -> Self {
        self.log = Some(log);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit_trail
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Policy of the planned path, for the shortest path strategy.
    pub fn plan_policy(&self) -> Option<NavigationPolicy> {
        self.plan_policy
    }

    pub fn handle(&self) -> &C {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut C {
        &mut self.handle
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn into_parts(self) -> (SessionSummary, AuditTrail, C) {
        (self.summary, self.audit_trail, self.handle)
    }

    // =========================================================================
    // Lifecycle hooks
    // =========================================================================

    /// Runs the actor's setup hook, if any.
    pub fn setup(&mut self) -> Result<(), HookError> {
        let hooks = Arc::clone(&self.hooks);
        match hooks.setup() {
            Some(hook) => {
                info!("Initiating setup");
                self.call(hook)
            }
            None => Ok(()),
        }
    }

    /// Runs the actor's teardown hook, if any.
    pub fn teardown(&mut self) -> Result<(), HookError> {
        let hooks = Arc::clone(&self.hooks);
        match hooks.teardown() {
            Some(hook) => {
                info!("Initiating teardown");
                self.call(hook)
            }
            None => Ok(()),
        }
    }

    fn call(&mut self, hook: &StateHook<C>) -> Result<(), HookError> {
        let mut ctx = HookContext {
            handle: &mut self.handle,
            actor: &self.name,
            shared: &*self.shared,
        };
        invoke(|| hook(&mut ctx))
    }

    // =========================================================================
    // Run loop
    // =========================================================================

    /// Runs until a stop condition is met and returns the reason.
    ///
    /// Hook faults are recorded as failures, not returned. Errors are
    /// configuration problems found while running, such as a missing action
    /// hook.
    pub fn run(&mut self) -> Result<StopReason, RuntimeError> {
        let started = Instant::now();
        info!(
            "\"{}\": starting session '{}' ({})",
            self.current_state, self.name, self.options.strategy
        );

        let halt = match self.drive(started) {
            Ok(never) => match never {},
            Err(halt) => halt,
        };
        self.summary.duration = started.elapsed();

        match halt {
            Halt::Stop(reason) => {
                self.summary.stop_reason = Some(reason);
                info!(
                    "\"{}\": 🏁 stopping, {} after {:?}",
                    self.current_state, reason, self.summary.duration
                );
                Ok(reason)
            }
            Halt::Fatal(err) => {
                error!("\"{}\": ❌ session '{}' aborted: {}", self.current_state, self.name, err);
                Err(err)
            }
        }
    }

    fn drive(&mut self, started: Instant) -> Result<Infallible, Halt> {
        let model = Arc::clone(&self.model);
        let hooks = Arc::clone(&self.hooks);
        let shared = Arc::clone(&self.shared);

        self.execute_state()?;

        loop {
            self.check_continue(started)?;

            let outbounds: Vec<&Transition> = model.outbounds(&self.current_state).collect();
            if outbounds.is_empty() {
                info!(
                    "\"{}\": Can't find any outbound transitions, seems like this is an end state.",
                    self.current_state
                );
                return Err(Halt::Stop(StopReason::TerminalState));
            }

            let guard = shared.lock_transition();

            let allowed = self.allowed_outbounds(&hooks, &outbounds)?;
            let Some(transition) = self.select(&allowed)? else {
                drop(guard);
                std::thread::sleep(shared.timing.selection_retry);
                continue;
            };

            let action_outcome = match &transition.action {
                Some(action) => Some(self.execute_action(&hooks, transition, action)?),
                None => {
                    info!(
                        "\"{}\": No action for transition to \"{}\". Changing state.",
                        transition.start, transition.end
                    );
                    None
                }
            };
            drop(guard);

            let name = transition.name();
            let transition_outcome = action_outcome.unwrap_or(Outcome::NotApplicable);
            self.summary
                .results
                .record_transition(&name, Some(transition_outcome));
            self.log_entry(EntryKind::Outbound, &name, transition_outcome);

            if self.options.stop_on_fail && action_outcome == Some(Outcome::Failed) {
                return Err(Halt::Stop(StopReason::StoppedOnFailure));
            }

            if action_outcome.map_or(true, |o| o == Outcome::Passed) {
                info!(
                    "\"{}\": {} \"{}\"",
                    self.current_state,
                    transition.arrow(),
                    transition.end
                );
                self.current_state = transition.end.clone();
                self.audit_trail.append(transition.clone());
                if let Some(plan) = self.plan.as_mut() {
                    plan.next();
                }
            }

            let state_outcome = self.execute_state()?;
            if self.options.stop_on_fail && state_outcome == Outcome::Failed {
                return Err(Halt::Stop(StopReason::StoppedOnFailure));
            }
        }
    }

    fn check_continue(&self, started: Instant) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            info!("\"{}\": ✋ Session cancelled", self.current_state);
            return Err(Halt::Stop(StopReason::Cancelled));
        }
        if let Some(max) = self.options.max_run_time {
            if started.elapsed() > max {
                info!("ℹ️  Max run time exceeded! Stopping...");
                return Err(Halt::Stop(StopReason::MaxRunTime));
            }
        }
        if let Some(max) = self.options.max_transitions {
            if self.summary.total_transition_visits() >= max {
                info!("ℹ️  Max transitions reached! Stopping...");
                return Err(Halt::Stop(StopReason::MaxTransitions));
            }
        }
        if self.options.stop_at_state.as_deref() == Some(self.current_state.as_str()) {
            info!("ℹ️  End state reached! Stopping...");
            return Err(Halt::Stop(StopReason::StopStateReached));
        }
        Ok(())
    }

    /// Outbound transitions whose condition, if any, currently holds.
    ///
    /// A missing condition hook allows the transition. A faulty one does not.
    fn allowed_outbounds<'m>(
        &mut self,
        hooks: &HookTable<C>,
        outbounds: &[&'m Transition],
    ) -> Result<Vec<&'m Transition>, Halt> {
        let mut allowed = Vec::with_capacity(outbounds.len());
        for transition in outbounds {
            let Some(condition) = &transition.condition else {
                allowed.push(*transition);
                continue;
            };
            let Some(hook) = hooks.condition(condition) else {
                allowed.push(*transition);
                continue;
            };

            let result = {
                let mut ctx = HookContext {
                    handle: &mut self.handle,
                    actor: &self.name,
                    shared: &*self.shared,
                };
                invoke(|| hook(&mut ctx))
            };
            match result {
                Ok(holds) => {
                    self.summary
                        .results
                        .record_condition(condition, Some(Outcome::Passed));
                    if holds {
                        allowed.push(*transition);
                    }
                }
                Err(HookError::Cancelled) => return Err(Halt::Stop(StopReason::Cancelled)),
                Err(e) => {
                    self.report_fault(
                        &format!("Condition [{}]", condition),
                        &hook_key(condition),
                        &e,
                    );
                    self.summary
                        .results
                        .record_condition(condition, Some(Outcome::Failed));
                    warn!(
                        "\"{}\": treating condition [{}] as false",
                        self.current_state, condition
                    );
                }
            }
        }
        Ok(allowed)
    }

    /// Picks one transition per the active strategy, or none to retry later.
    fn select<'m>(
        &mut self,
        allowed: &[&'m Transition],
    ) -> Result<Option<&'m Transition>, Halt> {
        match self.options.strategy {
            Strategy::ShortestPath => {
                let Some(target) = self.plan.as_mut().and_then(|p| p.peek()).cloned() else {
                    return Err(Halt::Stop(StopReason::PathExhausted));
                };
                let pessimistic = self.plan_policy == Some(NavigationPolicy::Pessimistic);
                let candidates: Vec<&'m Transition> = allowed
                    .iter()
                    .copied()
                    .filter(|t| t.end == target)
                    .filter(|t| !(pessimistic && t.is_guarded()))
                    .collect();
                Ok(self.prefer_unvisited(&candidates))
            }
            Strategy::PureRandom => Ok(allowed.choose(&mut self.rng).copied()),
            Strategy::SmartRandom | Strategy::Random => Ok(self.prefer_unvisited(allowed)),
            Strategy::FullCoverage => Err(Halt::Fatal(RuntimeError::StrategyNotImplemented {
                strategy: self.options.strategy,
            })),
        }
    }

    fn prefer_unvisited<'m>(&mut self, candidates: &[&'m Transition]) -> Option<&'m Transition> {
        let unvisited: Vec<&'m Transition> = candidates
            .iter()
            .copied()
            .filter(|t| !self.transition_visited(t))
            .collect();
        let pool = if unvisited.is_empty() {
            candidates
        } else {
            unvisited.as_slice()
        };
        pool.choose(&mut self.rng).copied()
    }

    fn transition_visited(&self, transition: &Transition) -> bool {
        self.summary
            .results
            .transitions
            .get(&transition.name())
            .map(|r| r.is_visited())
            .unwrap_or(false)
    }

    fn execute_action(
        &mut self,
        hooks: &HookTable<C>,
        transition: &Transition,
        action: &str,
    ) -> Result<Outcome, Halt> {
        let key = hook_key(action);
        let Some(hook) = hooks.action(action) else {
            return Err(Halt::Fatal(RuntimeError::MissingActionHook {
                action: action.to_string(),
                hook: key,
            }));
        };

        let condition_info = transition
            .condition
            .as_ref()
            .map(|c| format!(" - [{}] was True", c))
            .unwrap_or_default();
        info!("\"{}\": {}(){}", self.current_state, key, condition_info);

        self.wait_while_paused()?;

        let result = {
            let mut ctx = HookContext {
                handle: &mut self.handle,
                actor: &self.name,
                shared: &*self.shared,
            };
            invoke(|| hook(&mut ctx))
        };
        let outcome = match result {
            Ok(()) => Outcome::Passed,
            Err(HookError::Cancelled) => return Err(Halt::Stop(StopReason::Cancelled)),
            Err(e) => {
                self.report_fault(&format!("Action {}()", key), &key, &e);
                Outcome::Failed
            }
        };

        self.summary.results.record_action(action, Some(outcome));
        self.log_entry(EntryKind::Action, action, outcome);
        Ok(outcome)
    }

    /// Runs the current state's hook and records the outcome.
    fn execute_state(&mut self) -> Result<Outcome, Halt> {
        let hooks = Arc::clone(&self.hooks);
        let state = self.current_state.clone();

        let outcome = match hooks.state(&state) {
            Some(hook) => {
                self.wait_while_paused()?;
                match self.call(hook) {
                    Ok(()) => {
                        info!("\"{}\": ✅ State OK", state);
                        Outcome::Passed
                    }
                    Err(HookError::Cancelled) => return Err(Halt::Stop(StopReason::Cancelled)),
                    Err(e) => {
                        self.report_fault("State", &state.replace(' ', "_"), &e);
                        Outcome::Failed
                    }
                }
            }
            None => {
                info!("\"{}\": No function to run", state);
                Outcome::NotApplicable
            }
        };

        self.summary.results.record_state(&state, Some(outcome));
        self.log_entry(EntryKind::State, &state, outcome);
        Ok(outcome)
    }

    fn wait_while_paused(&self) -> Result<(), Halt> {
        let cancel = &self.cancel;
        let resumed = self
            .shared
            .pause
            .wait_while_paused(self.shared.timing.pause_poll, || cancel.is_cancelled());
        if resumed {
            Ok(())
        } else {
            Err(Halt::Stop(StopReason::Cancelled))
        }
    }

    fn report_fault(&mut self, what: &str, label: &str, err: &HookError) {
        match err.provenance() {
            Some(provenance) => error!(
                "\"{}\": ❌ ERROR: {} failed in {}:",
                self.current_state, what, provenance
            ),
            None => error!("\"{}\": ❌ ERROR: {} failed", self.current_state, what),
        }
        error!("\"{}\":    '-- Message: {}", self.current_state, err);

        let handle = &mut self.handle;
        match invoke(|| Ok(handle.capture_diagnostic(label))) {
            Ok(Some(path)) => info!(
                "\"{}\":    '-- Saving diagnostic capture '{}'",
                self.current_state,
                path.display()
            ),
            Ok(None) => {}
            Err(e) => warn!(
                "\"{}\":    '-- Diagnostic capture failed: {}",
                self.current_state, e
            ),
        }
    }

    fn log_entry(&mut self, kind: EntryKind, name: &str, outcome: Outcome) {
        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.record(kind, name, outcome) {
                warn!(
                    "failed to write transition log '{}': {}",
                    log.path().display(),
                    e
                );
            }
        }
    }
}
