//! # magpie-core
//!
//! Model layer for magpie.
//!
//! This crate provides:
//! - Model DSL parsing and validation
//! - The graph model with state adjacency
//! - Shortest path planning around runtime guards
//! - Result and coverage bookkeeping
//! - An audit trail of executed transitions
//! - DOT export annotated with results

pub mod error;
pub mod history;
pub mod model;
pub mod parser;
pub mod planner;
pub mod render;
pub mod results;

pub use error::{CoreError, Diagnostic, DiagnosticKind, Diagnostics};
pub use history::AuditTrail;
pub use model::{
    hook_key, Action, Arrow, Condition, Model, SourceLocation, State, Transition, TransitionId,
    TransitionKey,
};
pub use parser::{parse_row, Parser, RowParts};
pub use planner::{NavigationPolicy, PathPlanner, PlannedPath};
pub use render::{result_color, result_text_summary, Color};
pub use results::{
    coverage_percentage, Outcome, ResultClass, Results, SessionSummary, StopReason,
    VisitsAndResults,
};
