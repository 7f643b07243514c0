//! Shortest path planning over a model.
//!
//! Guards are only known at runtime, so planning first assumes every guard
//! fails and, when that finds nothing, assumes every guard passes.

use crate::error::CoreError;
use crate::model::{Model, Transition};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which transitions a plan was allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationPolicy {
    /// Guarded transitions excluded.
    Pessimistic,
    /// Every transition included.
    Optimistic,
}

impl NavigationPolicy {
    fn admits(&self, transition: &Transition) -> bool {
        match self {
            NavigationPolicy::Pessimistic => !transition.is_guarded(),
            NavigationPolicy::Optimistic => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationPolicy::Pessimistic => "pessimistic",
            NavigationPolicy::Optimistic => "optimistic",
        }
    }
}

impl fmt::Display for NavigationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A planned sequence of state names, excluding the start state.
///
/// Consumed once, like any iterator.
#[derive(Debug, Clone)]
pub struct PlannedPath {
    policy: NavigationPolicy,
    steps: std::vec::IntoIter<String>,
}

impl PlannedPath {
    fn new(policy: NavigationPolicy, steps: Vec<String>) -> Self {
        Self {
            policy,
            steps: steps.into_iter(),
        }
    }

    /// The policy the path was found under.
    pub fn policy(&self) -> NavigationPolicy {
        self.policy
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl Iterator for PlannedPath {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.steps.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.steps.size_hint()
    }
}

impl ExactSizeIterator for PlannedPath {}

/// Dijkstra over a model's states with unit edge weights.
pub struct PathPlanner<'a> {
    model: &'a Model,
}

impl<'a> PathPlanner<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    /// Plans from `start` to `end`, trying the pessimistic policy first.
    pub fn shortest_path(&self, start: &str, end: &str) -> Result<PlannedPath, CoreError> {
        if !self.model.has_state(start) {
            return Err(CoreError::StateNotFound {
                role: "start",
                name: start.to_string(),
            });
        }
        if !self.model.has_state(end) {
            return Err(CoreError::StateNotFound {
                role: "end",
                name: end.to_string(),
            });
        }

        if start == end {
            return Ok(PlannedPath::new(NavigationPolicy::Pessimistic, Vec::new()));
        }

        for policy in [NavigationPolicy::Pessimistic, NavigationPolicy::Optimistic] {
            if let Some(steps) = self.search(start, end, policy) {
                tracing::debug!(
                    "planned {} step(s) from '{}' to '{}' ({})",
                    steps.len(),
                    start,
                    end,
                    policy
                );
                return Ok(PlannedPath::new(policy, steps));
            }
            tracing::debug!("no {} path from '{}' to '{}'", policy, start, end);
        }

        Err(CoreError::NoPath {
            from: start.to_string(),
            to: end.to_string(),
        })
    }

    /// Runs one search under `policy`. Returns the steps after `start`.
    fn search(&self, start: &str, end: &str, policy: NavigationPolicy) -> Option<Vec<String>> {
        let mut distance: BTreeMap<&str, usize> = BTreeMap::new();
        let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
        let mut unvisited: BTreeSet<&str> =
            self.model.states().keys().map(String::as_str).collect();

        distance.insert(start, 0);

        loop {
            // Lowest distance first; name order breaks ties
            let current = unvisited
                .iter()
                .filter_map(|name| distance.get(name).map(|d| (*d, *name)))
                .min()?;
            let (current_distance, current) = current;

            if current == end {
                break;
            }
            unvisited.remove(current);

            for transition in self.model.outbounds(current) {
                if !policy.admits(transition) {
                    continue;
                }
                let neighbor = transition.end.as_str();
                if !unvisited.contains(neighbor) {
                    continue;
                }
                let candidate = current_distance + 1;
                let better = distance
                    .get(neighbor)
                    .map(|known| candidate < *known)
                    .unwrap_or(true);
                if better {
                    distance.insert(neighbor, candidate);
                    parent.insert(neighbor, current);
                }
            }
        }

        let mut steps = Vec::new();
        let mut node = end;
        while node != start {
            steps.push(node.to_string());
            node = *parent.get(node)?;
        }
        steps.reverse();
        Some(steps)
    }
}
