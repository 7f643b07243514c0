//! # magpie-runtime
//!
//! Execution engine for magpie.
//!
//! This crate provides:
//! - The strategy-driven execution engine
//! - Hook tables for states, actions and conditions
//! - Sessions and a concurrent session runner
//! - The shared transition lock, event log and pause flag
//! - Per-session CSV transition logs
//! - Runtime configuration

pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod machine;
pub mod session;
pub mod strategy;
pub mod sync;
pub mod transition_log;

pub use config::{Config, ConfigError, OutputConfig, RunConfig, TimingConfig};
pub use error::{HookError, Provenance, RuntimeError};
pub use events::{Event, EventLog};
pub use hooks::{
    ActionHook, ConditionHook, HookContext, HookTable, SessionContext, StateHook,
};
pub use machine::{CancelHandle, Machine, RunOptions};
pub use session::{run_sessions, Actor, Session, EVENT_LOG_FILE};
pub use strategy::Strategy;
pub use sync::{PauseFlag, Shared, Timing};
pub use transition_log::{EntryKind, TransitionLog};
