//! Actors, sessions and the session runner.
//!
//! An [`Actor`] bundles a model with its hooks. A [`Session`] is one actor
//! instance plus run options; it owns its engine and its results. Several
//! sessions may run at once, one thread each, synchronizing only through
//! [`Shared`].

use crate::error::{HookError, RuntimeError};
use crate::hooks::{HookTable, SessionContext};
use crate::machine::{CancelHandle, Machine, RunOptions};
use crate::strategy::Strategy;
use crate::sync::Shared;
use crate::transition_log::TransitionLog;
use magpie_core::{AuditTrail, Model, Parser, SessionSummary, StopReason};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Characters a session name can't contain, since it is used in file names.
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', '|', '*', '%', '?'];

/// File name of the exported event log.
pub const EVENT_LOG_FILE: &str = "event_store.csv";

/// A model plus the hooks that drive it.
pub struct Actor<C> {
    pub name: String,
    pub model: Arc<Model>,
    pub hooks: Arc<HookTable<C>>,
}

impl<C> Clone for Actor<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            model: Arc::clone(&self.model),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<C: SessionContext> Actor<C> {
    pub fn new(name: impl Into<String>, model: Model, hooks: HookTable<C>) -> Self {
        Self {
            name: name.into(),
            model: Arc::new(model),
            hooks: Arc::new(hooks),
        }
    }

    /// Parses the model file and names the actor after it.
    pub fn from_file(path: impl AsRef<Path>, hooks: HookTable<C>) -> Result<Self, RuntimeError> {
        let model = Parser::new().parse_file(path)?;
        Ok(Self::new(model.name.clone(), model, hooks))
    }
}

/// One actor instance with its run options and results.
pub struct Session<C> {
    id: Uuid,
    name: String,
    machine: Machine<C>,
    stop_reason: Option<StopReason>,
    generic_failure: bool,
    error: Option<RuntimeError>,
}

impl<C: SessionContext> Session<C> {
    /// Creates a session. Fails on an invalid name or run options.
    pub fn new(
        name: impl Into<String>,
        actor: &Actor<C>,
        handle: C,
        options: RunOptions,
        shared: Arc<Shared>,
    ) -> Result<Self, RuntimeError> {
        let name = name.into();
        validate_name(&name)?;

        if options.strategy == Strategy::ShortestPath && options.stop_at_state.is_none() {
            return Err(RuntimeError::SessionConfig(format!(
                "Session {}: In order to be able to use the strategy {}, you must set \
                 `stop_at_state` to the name of the expected end state",
                name,
                Strategy::ShortestPath
            )));
        }

        let machine = Machine::new(actor, handle, options, shared)?.with_name(name.clone());
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            machine,
            stop_reason: None,
            generic_failure: false,
            error: None,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.machine = self.machine.with_seed(seed);
        self
    }

    /// Writes the transition log to `<dir>/<name>.log.csv`.
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = self.transition_log_path(dir.as_ref());
        let log = TransitionLog::create(&path).map_err(|e| RuntimeError::io(&path, e))?;
        info!("session {} logging transitions to {}", self.name, path.display());
        self.machine = self.machine.with_transition_log(log);
        Ok(self)
    }

    pub fn transition_log_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.log.csv", self.name.to_lowercase()))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn machine(&self) -> &Machine<C> {
        &self.machine
    }

    pub fn summary(&self) -> &SessionSummary {
        self.machine.summary()
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        self.machine.audit_trail()
    }

    pub fn handle(&self) -> &C {
        self.machine.handle()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// The error that aborted the run, if any.
    pub fn error(&self) -> Option<&RuntimeError> {
        self.error.as_ref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.machine.cancel_handle()
    }

    /// Marks a failure that is not tied to a state, action or transition.
    pub fn record_generic_failure(&mut self) {
        self.generic_failure = true;
    }

    pub fn has_failures(&self) -> bool {
        self.generic_failure || self.machine.summary().has_failures()
    }

    /// Runs setup, the engine and teardown.
    ///
    /// A setup fault skips the engine. Any error is kept on the session and
    /// counts as a generic failure; teardown always runs.
    pub fn run(&mut self) -> Option<StopReason> {
        info!("STARTING SESSION: {} ({})", self.name, self.id);

        let result = match self.machine.setup() {
            Ok(()) => self.machine.run(),
            Err(HookError::Cancelled) => Ok(StopReason::Cancelled),
            Err(source) => Err(RuntimeError::Hook {
                stage: "setup",
                source,
            }),
        };

        match result {
            Ok(reason) => self.stop_reason = Some(reason),
            Err(e) => {
                error!("❌ OOPS! {} has failed 🤔! Error message: {}", self.name, e);
                self.record_generic_failure();
                self.error = Some(e);
            }
        }

        match self.machine.teardown() {
            Ok(()) | Err(HookError::Cancelled) => {}
            Err(source) => {
                error!("❌ teardown of {} failed: {}", self.name, source);
                self.record_generic_failure();
                if self.error.is_none() {
                    self.error = Some(RuntimeError::Hook {
                        stage: "teardown",
                        source,
                    });
                }
            }
        }

        info!("\"{}\": 🏁 Stopping session", self.machine.current_state());
        self.stop_reason
    }

    /// Runs the session, turning a panic that escapes it into a generic
    /// failure so the session is still returned.
    fn run_contained(&mut self) {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.run()));
        if outcome.is_err() {
            error!("❌ session {} panicked", self.name);
            self.record_generic_failure();
            self.error = Some(RuntimeError::SessionPanicked(self.name.clone()));
        }
    }
}

fn validate_name(name: &str) -> Result<(), RuntimeError> {
    if name.is_empty() {
        return Err(RuntimeError::SessionConfig(
            "session name can't be empty".to_string(),
        ));
    }
    if name.contains(FORBIDDEN_NAME_CHARS) {
        return Err(RuntimeError::SessionConfig(format!(
            "session name '{}' can't contain any of these characters: / \\ | * % ?",
            name
        )));
    }
    Ok(())
}

/// Runs every session to completion and returns them in the same order.
///
/// A single session runs on the calling thread; otherwise each gets its own
/// thread named after it. With an output directory the event log is written
/// there once all sessions are done.
pub fn run_sessions<C: SessionContext>(
    mut sessions: Vec<Session<C>>,
    shared: &Shared,
    output_dir: Option<&Path>,
) -> Result<Vec<Session<C>>, RuntimeError> {
    if sessions.len() == 1 {
        sessions[0].run_contained();
    } else if sessions.len() > 1 {
        let mut handles = Vec::with_capacity(sessions.len());
        let mut spawn_error = None;
        for mut session in sessions.drain(..) {
            let name = session.name.clone();
            let spawned = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    session.run_contained();
                    session
                });
            match spawned {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => {
                    spawn_error = Some(RuntimeError::SessionConfig(format!(
                        "failed to spawn a thread for session {}: {}",
                        name, e
                    )));
                    break;
                }
            }
        }

        for (name, handle) in handles {
            match handle.join() {
                Ok(session) => sessions.push(session),
                Err(_) => error!("session thread {} panicked", name),
            }
        }
        if let Some(e) = spawn_error {
            return Err(e);
        }
    }

    if let Some(dir) = output_dir {
        let path = dir.join(EVENT_LOG_FILE);
        shared
            .events
            .write_csv(&path)
            .map_err(|e| RuntimeError::io(&path, e))?;
        info!("event log written to {}", path.display());
    }

    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Page {
        teardowns: u32,
    }

    impl SessionContext for Page {}

    fn actor(hooks: HookTable<Page>) -> Actor<Page> {
        let model = Parser::new()
            .parse_str("Login  =>  Home\nHome  ->  Logout\n", "webshop.model")
            .unwrap();
        Actor::new("webshop", model, hooks)
    }

    fn session(name: &str, actor: &Actor<Page>) -> Result<Session<Page>, RuntimeError> {
        Session::new(name, actor, Page::default(), RunOptions::default(), Shared::new())
    }

    #[test]
    fn test_name_validation() {
        let actor = actor(HookTable::new());
        assert!(session("buyer 1", &actor).is_ok());
        for bad in ["a/b", "a\\b", "a|b", "a*b", "50%", "who?", ""] {
            let err = session(bad, &actor).err().unwrap();
            assert_eq!(err.error_code(), "CONFIGURATION_ERROR", "{bad}");
        }
    }

    #[test]
    fn test_shortest_path_requires_stop_state() {
        let actor = actor(HookTable::new());
        let err = Session::new(
            "buyer",
            &actor,
            Page::default(),
            RunOptions::new(Strategy::ShortestPath),
            Shared::new(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("stop_at_state"));
        assert!(err.to_string().contains("Session buyer"));
    }

    #[test]
    fn test_run_with_setup_and_teardown() {
        let hooks = HookTable::<Page>::new()
            .with_setup(|ctx| {
                ctx.events().append("SETUP", serde_json::json!(ctx.actor));
                Ok(())
            })
            .with_teardown(|ctx| {
                ctx.handle.teardowns += 1;
                Ok(())
            });
        let actor = actor(hooks);
        let mut session = session("buyer", &actor).unwrap();

        assert_eq!(session.run(), Some(StopReason::TerminalState));
        assert!(!session.has_failures());
        assert_eq!(session.handle().teardowns, 1);
        assert_eq!(
            session.audit_trail().state_history(),
            vec!["Login", "Home", "Logout"]
        );
    }

    #[test]
    fn test_setup_failure_is_generic_failure() {
        let hooks = HookTable::<Page>::new()
            .with_setup(|_| Err(HookError::new("browser did not start")))
            .with_teardown(|ctx| {
                ctx.handle.teardowns += 1;
                Ok(())
            });
        let actor = actor(hooks);
        let mut session = session("buyer", &actor).unwrap();

        assert_eq!(session.run(), None);
        assert!(session.has_failures());
        assert_eq!(session.error().unwrap().error_code(), "HOOK_ERROR");
        assert!(session.audit_trail().is_empty());
        assert_eq!(session.handle().teardowns, 1);
    }

    #[test]
    fn test_output_dir_creates_transition_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let actor = actor(HookTable::new());
        let mut session = session("Buyer", &actor)
            .unwrap()
            .with_output_dir(dir.path())
            .unwrap();
        session.run();

        let path = dir.path().join("buyer.log.csv");
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("Timestamp,Type,Name,Result"));
        assert_eq!(content.lines().count(), 1 + 5);
    }

    #[test]
    fn test_run_sessions_on_named_threads() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let hooks = HookTable::<Page>::new().with_state("Home", move |_| {
            let name = std::thread::current().name().map(str::to_string);
            recorder.lock().push(name.unwrap_or_default());
            Ok(())
        });
        let actor = actor(hooks);
        let shared = Shared::new();
        let sessions: Vec<Session<Page>> = ["alice", "bob", "carol"]
            .iter()
            .map(|name| {
                Session::new(*name, &actor, Page::default(), RunOptions::default(), shared.clone())
                    .unwrap()
            })
            .collect();

        let dir = tempfile::TempDir::new().unwrap();
        let done = run_sessions(sessions, &shared, Some(dir.path())).unwrap();

        let names: Vec<&str> = done.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["alice", "bob", "carol"]);
        assert!(dir.path().join(EVENT_LOG_FILE).exists());
    }

    #[test]
    fn test_single_session_runs_inline() {
        let caller = std::thread::current().id();
        let hooks = HookTable::<Page>::new().with_state("Login", move |_| {
            assert_eq!(std::thread::current().id(), caller);
            Ok(())
        });
        let actor = actor(hooks);
        let shared = Shared::new();
        let one = vec![session("solo", &actor).unwrap()];

        let done = run_sessions(one, &shared, None).unwrap();
        assert_eq!(done[0].summary().failed_states(), Vec::<&str>::new());
    }

    struct Fragile {
        broken: bool,
    }

    impl SessionContext for Fragile {
        fn capture_diagnostic(&mut self, label: &str) -> Option<PathBuf> {
            panic!("camera unplugged while capturing {}", label);
        }
    }

    #[test]
    fn test_run_sessions_keeps_sessions_after_capture_panic() {
        let model = Parser::new()
            .parse_str("Login  =>  Home\nHome  ->  Logout\n", "webshop.model")
            .unwrap();
        let hooks = HookTable::<Fragile>::new().with_state("Home", |ctx| {
            if ctx.handle.broken {
                return Err(HookError::new("home page did not load"));
            }
            Ok(())
        });
        let actor = Actor::new("webshop", model, hooks);
        let shared = Shared::new();
        let sessions = vec![
            Session::new("bad", &actor, Fragile { broken: true }, RunOptions::default(), shared.clone())
                .unwrap(),
            Session::new("good", &actor, Fragile { broken: false }, RunOptions::default(), shared.clone())
                .unwrap(),
        ];

        let done = run_sessions(sessions, &shared, None).unwrap();

        assert_eq!(done.len(), 2);
        assert_eq!(done[0].name(), "bad");
        assert!(done[0].has_failures());
        assert_eq!(done[0].summary().failed_states(), vec!["Home"]);
        assert_eq!(done[0].stop_reason(), Some(StopReason::TerminalState));
        assert!(!done[1].has_failures());
        assert_eq!(
            done[1].audit_trail().state_history(),
            vec!["Login", "Home", "Logout"]
        );
    }
}
