//! Hook capability table.
//!
//! The collaborator registers one callable per state, action and condition
//! name. Names are normalized with [`hook_key`], so `"Log in"` and `"log_in"`
//! refer to the same hook.

use crate::error::HookError;
use crate::events::EventLog;
use crate::sync::Shared;
use magpie_core::hook_key;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

/// The session-owned handle hooks drive, e.g. a browser page.
pub trait SessionContext: Send + 'static {
    /// Captures a diagnostic artifact (such as a screenshot) after a hook
    /// fault. Returns where it was saved.
    fn capture_diagnostic(&mut self, label: &str) -> Option<PathBuf> {
        let _ = label;
        None
    }
}

impl SessionContext for () {}

/// What a hook receives when invoked.
pub struct HookContext<'a, C> {
    pub handle: &'a mut C,
    /// Name of the session running the hook.
    pub actor: &'a str,
    pub shared: &'a Shared,
}

impl<'a, C> HookContext<'a, C> {
    pub fn events(&self) -> &EventLog {
        &self.shared.events
    }

    /// Pauses every session before its next hook.
    pub fn pause_all(&self) {
        self.shared.pause.pause();
    }

    pub fn resume_all(&self) {
        self.shared.pause.resume();
    }
}

pub type StateHook<C> = Box<dyn Fn(&mut HookContext<'_, C>) -> Result<(), HookError> + Send + Sync>;
pub type ActionHook<C> = StateHook<C>;
pub type ConditionHook<C> =
    Box<dyn Fn(&mut HookContext<'_, C>) -> Result<bool, HookError> + Send + Sync>;

/// Name-to-callable table built once and injected into the engine.
pub struct HookTable<C> {
    states: HashMap<String, StateHook<C>>,
    actions: HashMap<String, ActionHook<C>>,
    conditions: HashMap<String, ConditionHook<C>>,
    setup: Option<StateHook<C>>,
    teardown: Option<StateHook<C>>,
}

impl<C> Default for HookTable<C> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
            actions: HashMap::new(),
            conditions: HashMap::new(),
            setup: None,
            teardown: None,
        }
    }
}

impl<C: SessionContext> HookTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&mut HookContext<'_, C>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.states.insert(hook_key(name), Box::new(hook));
        self
    }

    pub fn with_action<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&mut HookContext<'_, C>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.actions.insert(hook_key(name), Box::new(hook));
        self
    }

    pub fn with_condition<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&mut HookContext<'_, C>) -> Result<bool, HookError> + Send + Sync + 'static,
    {
        self.conditions.insert(hook_key(name), Box::new(hook));
        self
    }

    /// Runs once before the session starts.
    pub fn with_setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HookContext<'_, C>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.setup = Some(Box::new(hook));
        self
    }

    /// Runs once after the session finishes.
    pub fn with_teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HookContext<'_, C>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.teardown = Some(Box::new(hook));
        self
    }

    pub fn state(&self, name: &str) -> Option<&StateHook<C>> {
        self.states.get(&hook_key(name))
    }

    pub fn action(&self, name: &str) -> Option<&ActionHook<C>> {
        self.actions.get(&hook_key(name))
    }

    pub fn condition(&self, name: &str) -> Option<&ConditionHook<C>> {
        self.conditions.get(&hook_key(name))
    }

    pub fn setup(&self) -> Option<&StateHook<C>> {
        self.setup.as_ref()
    }

    pub fn teardown(&self) -> Option<&StateHook<C>> {
        self.teardown.as_ref()
    }
}

impl<C> fmt::Debug for HookTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<&String> = self.states.keys().collect();
        let mut actions: Vec<&String> = self.actions.keys().collect();
        let mut conditions: Vec<&String> = self.conditions.keys().collect();
        states.sort();
        actions.sort();
        conditions.sort();
        f.debug_struct("HookTable")
            .field("states", &states)
            .field("actions", &actions)
            .field("conditions", &conditions)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Runs a hook, turning a panic into a [`HookError`].
pub(crate) fn invoke<T>(hook: impl FnOnce() -> Result<T, HookError>) -> Result<T, HookError> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(HookError::message(format!(
            "hook panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
