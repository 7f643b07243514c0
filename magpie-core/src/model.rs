//! Graph model types.
//!
//! A model is built once by the parser and is read-only afterwards. States
//! keep derived inbound/outbound adjacency lists that refer to transitions by
//! [`TransitionId`]; the transition list itself is authoritative.

use crate::error::CoreError;
use crate::planner::{PathPlanner, PlannedPath};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Converts an entity name into the key used to look up its hook.
///
/// `"First Action"` becomes `"first_action"`.
pub fn hook_key(name: &str) -> String {
    name.trim_matches('\'').to_lowercase().replace(' ', "_")
}

/// Arrow literal of a transition line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arrow {
    /// `=>`
    HappyPath,
    /// `->`
    AlternatePath,
}

impl Arrow {
    pub const ALL: [Arrow; 2] = [Arrow::HappyPath, Arrow::AlternatePath];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arrow::HappyPath => "=>",
            Arrow::AlternatePath => "->",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Arrow::ALL.into_iter().find(|arrow| arrow.as_str() == token)
    }
}

impl fmt::Display for Arrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a transition within its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionId(pub usize);

/// A state in the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub name: String,
    inbounds: Vec<TransitionId>,
    outbounds: Vec<TransitionId>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inbounds: Vec::new(),
            outbounds: Vec::new(),
        }
    }

    /// Transitions ending in this state, in model order.
    pub fn inbounds(&self) -> &[TransitionId] {
        &self.inbounds
    }

    /// Transitions starting in this state, in model order.
    pub fn outbounds(&self) -> &[TransitionId] {
        &self.outbounds
    }

    pub fn hook_key(&self) -> String {
        hook_key(&self.name)
    }
}

/// An action performed while taking a transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Action {
    pub name: String,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn hook_key(&self) -> String {
        hook_key(&self.name)
    }
}

/// A guard gating a transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Condition {
    pub name: String,
}

impl Condition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn hook_key(&self) -> String {
        hook_key(&self.name)
    }
}

/// Identity of a transition: `(start, condition?, action?, end)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionKey {
    pub start: String,
    pub condition: Option<String>,
    pub action: Option<String>,
    pub end: String,
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.start,
            self.condition.as_deref().unwrap_or("None"),
            self.action.as_deref().unwrap_or("None"),
            self.end
        )
    }
}

/// Where a transition was declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\", line {}", self.file, self.line)
    }
}

/// A directed edge between two states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub start: String,
    pub end: String,
    pub action: Option<String>,
    pub condition: Option<String>,
    pub happy_path: bool,
    /// Parsed but not used by any strategy yet.
    pub probability: u8,
    pub source: SourceLocation,
}

impl Transition {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            action: None,
            condition: None,
            happy_path: false,
            probability: 100,
            source: SourceLocation::default(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_happy_path(mut self, happy_path: bool) -> Self {
        self.happy_path = happy_path;
        self
    }

    pub fn with_source(mut self, file: impl Into<String>, line: usize) -> Self {
        self.source = SourceLocation {
            file: file.into(),
            line,
        };
        self
    }

    pub fn key(&self) -> TransitionKey {
        TransitionKey {
            start: self.start.clone(),
            condition: self.condition.clone(),
            action: self.action.clone(),
            end: self.end.clone(),
        }
    }

    /// Key rendered as `start:condition:action:end`.
    pub fn name(&self) -> String {
        self.key().to_string()
    }

    pub fn arrow(&self) -> Arrow {
        if self.happy_path {
            Arrow::HappyPath
        } else {
            Arrow::AlternatePath
        }
    }

    pub fn is_guarded(&self) -> bool {
        self.condition.is_some()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.start)?;
        if let Some(condition) = &self.condition {
            write!(f, " [{}]", condition)?;
        }
        if let Some(action) = &self.action {
            write!(f, " '{}'", action)?;
        }
        write!(f, " {}% {} \"{}\"", self.probability, self.arrow(), self.end)
    }
}

/// A validated, indexed model.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,
    states: BTreeMap<String, State>,
    actions: BTreeMap<String, Action>,
    conditions: BTreeMap<String, Condition>,
    transitions: Vec<Transition>,
    index: HashMap<TransitionKey, TransitionId>,
    initial_state: Option<String>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Adds a state if it does not already exist.
    pub fn add_state(&mut self, name: &str) {
        self.states
            .entry(name.to_string())
            .or_insert_with(|| State::new(name));
    }

    /// Adds an action if it does not already exist.
    pub fn add_action(&mut self, name: &str) {
        self.actions
            .entry(name.to_string())
            .or_insert_with(|| Action::new(name));
    }

    /// Adds a condition if it does not already exist.
    pub fn add_condition(&mut self, name: &str) {
        self.conditions
            .entry(name.to_string())
            .or_insert_with(|| Condition::new(name));
    }

    /// Inserts a transition. Fails on a duplicate key.
    ///
    /// The first inserted transition's start state becomes the initial state.
    pub fn add_transition(&mut self, transition: Transition) -> Result<TransitionId, CoreError> {
        let key = transition.key();
        if self.index.contains_key(&key) {
            return Err(CoreError::DuplicateTransition {
                key: key.to_string(),
            });
        }

        self.add_state(&transition.start);
        self.add_state(&transition.end);
        if let Some(action) = &transition.action {
            self.add_action(action);
        }
        if let Some(condition) = &transition.condition {
            self.add_condition(condition);
        }
        if self.initial_state.is_none() {
            self.initial_state = Some(transition.start.clone());
        }

        let id = TransitionId(self.transitions.len());
        self.index.insert(key, id);
        self.transitions.push(transition);
        Ok(id)
    }

    /// Recomputes inbound/outbound lists for every state in one scan.
    pub fn link(&mut self) {
        for state in self.states.values_mut() {
            state.inbounds.clear();
            state.outbounds.clear();
        }
        for (idx, transition) in self.transitions.iter().enumerate() {
            let id = TransitionId(idx);
            if let Some(start) = self.states.get_mut(&transition.start) {
                start.outbounds.push(id);
            }
            if let Some(end) = self.states.get_mut(&transition.end) {
                end.inbounds.push(id);
            }
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn initial_state(&self) -> Option<&State> {
        self.initial_state
            .as_ref()
            .and_then(|name| self.states.get(name))
    }

    pub fn initial_state_name(&self) -> Option<&str> {
        self.initial_state.as_deref()
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn states(&self) -> &BTreeMap<String, State> {
        &self.states
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn actions(&self) -> &BTreeMap<String, Action> {
        &self.actions
    }

    pub fn condition(&self, name: &str) -> Option<&Condition> {
        self.conditions.get(name)
    }

    pub fn conditions(&self) -> &BTreeMap<String, Condition> {
        &self.conditions
    }

    /// All transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0]
    }

    pub fn transition_by_key(&self, key: &TransitionKey) -> Option<&Transition> {
        self.index.get(key).map(|id| self.transition(*id))
    }

    pub fn transition_by_name(&self, name: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.name() == name)
    }

    /// Transitions starting in the named state.
    pub fn outbounds(&self, state: &str) -> impl Iterator<Item = &Transition> {
        self.states
            .get(state)
            .map(|s| s.outbounds.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |id| self.transition(*id))
    }

    /// Transitions ending in the named state.
    pub fn inbounds(&self, state: &str) -> impl Iterator<Item = &Transition> {
        self.states
            .get(state)
            .map(|s| s.inbounds.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |id| self.transition(*id))
    }

    /// True if a state has no inbound transitions and is not the initial state.
    pub fn state_is_unreachable(&self, name: &str) -> bool {
        let has_inbounds = self
            .states
            .get(name)
            .map(|s| !s.inbounds.is_empty())
            .unwrap_or(false);
        !has_inbounds && self.initial_state.as_deref() != Some(name)
    }

    /// A checksum over the sorted transition keys, for comparing models.
    pub fn checksum(&self) -> String {
        let mut keys: Vec<String> = self.transitions.iter().map(|t| t.name()).collect();
        keys.sort();
        let joined = keys.join("\n");
        format!("{:08x}", crc32c::crc32c(joined.as_bytes()))
    }

    // =========================================================================
    // Planning
    // =========================================================================

    /// Plans the shortest path between two states. See [`PathPlanner`].
    pub fn shortest_path(&self, start: &str, end: &str) -> Result<PlannedPath, CoreError> {
        PathPlanner::new(self).shortest_path(start, end)
    }
}
