//! Ordered record of executed transitions.

use crate::model::Transition;

/// Transitions in the order they were taken. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditTrail {
    transitions: Vec<Transition>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// First start state followed by every end state.
    pub fn state_history(&self) -> Vec<String> {
        let Some(first) = self.transitions.first() else {
            return Vec::new();
        };
        std::iter::once(first.start.clone())
            .chain(self.transitions.iter().map(|t| t.end.clone()))
            .collect()
    }

    /// Action name per transition, empty when it had none.
    pub fn action_history(&self) -> Vec<String> {
        self.transitions
            .iter()
            .map(|t| t.action.clone().unwrap_or_default())
            .collect()
    }

    pub fn current_state(&self) -> Option<&str> {
        self.transitions.last().map(|t| t.end.as_str())
    }

    pub fn previous_state(&self) -> Option<&str> {
        self.transitions.last().map(|t| t.start.as_str())
    }
}
