//! Visit and outcome bookkeeping for one session.

use crate::model::Model;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of running one hook, or of a visit with nothing to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Passed,
    Failed,
    NotApplicable,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Passed => "PASSED",
            Outcome::Failed => "FAILED",
            Outcome::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall classification of an entity's outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultClass {
    /// Passed or not applicable, never failed.
    Passed,
    /// Failed at least once and never passed.
    Failed,
    /// Both passed and failed.
    Flaky,
    /// No outcome recorded.
    NoResult,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxRunTime,
    MaxTransitions,
    StopStateReached,
    TerminalState,
    PathExhausted,
    StoppedOnFailure,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::MaxRunTime => "max run time exceeded",
            StopReason::MaxTransitions => "max transitions reached",
            StopReason::StopStateReached => "stop state reached",
            StopReason::TerminalState => "terminal state reached",
            StopReason::PathExhausted => "planned path exhausted",
            StopReason::StoppedOnFailure => "stopped on failure",
            StopReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visit counter plus ordered outcomes for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisitsAndResults {
    visits: u64,
    outcomes: Vec<Outcome>,
}

impl VisitsAndResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a visit and records the outcome, if any.
    pub fn record_visit(&mut self, outcome: Option<Outcome>) {
        self.visits += 1;
        if let Some(outcome) = outcome {
            self.outcomes.push(outcome);
        }
    }

    pub fn visits(&self) -> u64 {
        self.visits
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn is_visited(&self) -> bool {
        self.visits > 0
    }

    /// Only failures, no passes.
    pub fn is_failed(&self) -> bool {
        self.pass_count() == 0 && self.fail_count() > 0
    }

    /// At least one pass and one failure.
    pub fn is_flaky(&self) -> bool {
        self.pass_count() > 0 && self.fail_count() > 0
    }

    pub fn pass_count(&self) -> usize {
        self.count(Outcome::Passed)
    }

    pub fn fail_count(&self) -> usize {
        self.count(Outcome::Failed)
    }

    pub fn has_result(&self, outcome: Outcome) -> bool {
        self.outcomes.contains(&outcome)
    }

    pub fn classification(&self) -> ResultClass {
        if self.is_flaky() {
            ResultClass::Flaky
        } else if self.is_failed() {
            ResultClass::Failed
        } else if self.has_result(Outcome::Passed) || self.has_result(Outcome::NotApplicable) {
            ResultClass::Passed
        } else {
            ResultClass::NoResult
        }
    }

    /// `✅: 2 ❌: 1 --: 3`, omitting absent outcomes.
    pub fn short_summary(&self) -> String {
        let mut parts = Vec::new();
        for (outcome, label) in [
            (Outcome::Passed, "✅"),
            (Outcome::Failed, "❌"),
            (Outcome::NotApplicable, "--"),
        ] {
            let count = self.count(outcome);
            if count > 0 {
                parts.push(format!("{}: {}", label, count));
            }
        }
        parts.join(" ")
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|o| **o == outcome).count()
    }
}

/// Per-kind collections of [`VisitsAndResults`], keyed by name.
///
/// Transitions are keyed by their `start:condition:action:end` name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Results {
    pub actions: BTreeMap<String, VisitsAndResults>,
    pub states: BTreeMap<String, VisitsAndResults>,
    pub transitions: BTreeMap<String, VisitsAndResults>,
    /// Guard evaluations: passed when the hook answered, failed on a fault.
    pub conditions: BTreeMap<String, VisitsAndResults>,
}

impl Results {
    pub fn record_action(&mut self, name: &str, outcome: Option<Outcome>) {
        Self::record(&mut self.actions, name, outcome);
    }

    pub fn record_state(&mut self, name: &str, outcome: Option<Outcome>) {
        Self::record(&mut self.states, name, outcome);
    }

    pub fn record_transition(&mut self, name: &str, outcome: Option<Outcome>) {
        Self::record(&mut self.transitions, name, outcome);
    }

    pub fn record_condition(&mut self, name: &str, outcome: Option<Outcome>) {
        Self::record(&mut self.conditions, name, outcome);
    }

    fn record(
        collection: &mut BTreeMap<String, VisitsAndResults>,
        name: &str,
        outcome: Option<Outcome>,
    ) {
        collection
            .entry(name.to_string())
            .or_default()
            .record_visit(outcome);
    }
}

/// `100 * visited / total` rounded half to even, or `None` for an empty set.
pub fn coverage_percentage(visited: usize, total: usize) -> Option<u32> {
    if total == 0 {
        return None;
    }
    Some((100.0 * visited as f64 / total as f64).round_ties_even() as u32)
}

/// Results of one session together with its model and timing.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub model: Arc<Model>,
    pub results: Results,
    pub duration: Duration,
    pub stop_reason: Option<StopReason>,
}

impl SessionSummary {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            results: Results::default(),
            duration: Duration::ZERO,
            stop_reason: None,
        }
    }

    pub fn total_transition_visits(&self) -> u64 {
        self.results.transitions.values().map(|r| r.visits()).sum()
    }

    // =========================================================================
    // Actions
    // =========================================================================

    pub fn visited_actions(&self) -> Vec<&str> {
        visited(self.model.actions().keys(), &self.results.actions)
    }

    pub fn unvisited_actions(&self) -> Vec<&str> {
        unvisited(self.model.actions().keys(), &self.results.actions)
    }

    pub fn failed_actions(&self) -> Vec<&str> {
        filtered(&self.results.actions, VisitsAndResults::is_failed)
    }

    pub fn flaky_actions(&self) -> Vec<&str> {
        filtered(&self.results.actions, VisitsAndResults::is_flaky)
    }

    pub fn actions_coverage(&self) -> Option<u32> {
        coverage_percentage(self.visited_actions().len(), self.model.actions().len())
    }

    // =========================================================================
    // States
    // =========================================================================

    pub fn visited_states(&self) -> Vec<&str> {
        visited(self.model.states().keys(), &self.results.states)
    }

    pub fn unvisited_states(&self) -> Vec<&str> {
        unvisited(self.model.states().keys(), &self.results.states)
    }

    pub fn failed_states(&self) -> Vec<&str> {
        filtered(&self.results.states, VisitsAndResults::is_failed)
    }

    pub fn flaky_states(&self) -> Vec<&str> {
        filtered(&self.results.states, VisitsAndResults::is_flaky)
    }

    pub fn states_coverage(&self) -> Option<u32> {
        coverage_percentage(self.visited_states().len(), self.model.states().len())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    pub fn visited_transitions(&self) -> Vec<String> {
        self.model
            .transitions()
            .iter()
            .map(|t| t.name())
            .filter(|name| is_visited(&self.results.transitions, name))
            .collect()
    }

    pub fn unvisited_transitions(&self) -> Vec<String> {
        self.model
            .transitions()
            .iter()
            .map(|t| t.name())
            .filter(|name| !is_visited(&self.results.transitions, name))
            .collect()
    }

    pub fn failed_transitions(&self) -> Vec<&str> {
        filtered(&self.results.transitions, VisitsAndResults::is_failed)
    }

    pub fn flaky_transitions(&self) -> Vec<&str> {
        filtered(&self.results.transitions, VisitsAndResults::is_flaky)
    }

    pub fn transitions_coverage(&self) -> Option<u32> {
        coverage_percentage(
            self.visited_transitions().len(),
            self.model.transitions().len(),
        )
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    pub fn failed_conditions(&self) -> Vec<&str> {
        filtered(&self.results.conditions, VisitsAndResults::is_failed)
    }

    pub fn flaky_conditions(&self) -> Vec<&str> {
        filtered(&self.results.conditions, VisitsAndResults::is_flaky)
    }

    /// True if any entity is failed or flaky.
    pub fn has_failures(&self) -> bool {
        !self.failed_actions().is_empty()
            || !self.flaky_actions().is_empty()
            || !self.failed_states().is_empty()
            || !self.flaky_states().is_empty()
            || !self.failed_transitions().is_empty()
            || !self.flaky_transitions().is_empty()
            || !self.failed_conditions().is_empty()
            || !self.flaky_conditions().is_empty()
    }
}

fn is_visited(collection: &BTreeMap<String, VisitsAndResults>, name: &str) -> bool {
    collection
        .get(name)
        .map(VisitsAndResults::is_visited)
        .unwrap_or(false)
}

fn visited<'a>(
    names: impl Iterator<Item = &'a String>,
    collection: &BTreeMap<String, VisitsAndResults>,
) -> Vec<&'a str> {
    names
        .filter(|name| is_visited(collection, name))
        .map(String::as_str)
        .collect()
}

fn unvisited<'a>(
    names: impl Iterator<Item = &'a String>,
    collection: &BTreeMap<String, VisitsAndResults>,
) -> Vec<&'a str> {
    names
        .filter(|name| !is_visited(collection, name))
        .map(String::as_str)
        .collect()
}

fn filtered(
    collection: &BTreeMap<String, VisitsAndResults>,
    predicate: fn(&VisitsAndResults) -> bool,
) -> Vec<&str> {
    collection
        .iter()
        .filter(|(_, r)| predicate(r))
        .map(|(name, _)| name.as_str())
        .collect()
}
