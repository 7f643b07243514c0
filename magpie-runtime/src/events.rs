//! Append-only event log shared between sessions.
//!
//! Hooks publish events for other actors to react to. Events are never
//! removed or changed once appended.

use crate::sync::Timing;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One published event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub timestamp: DateTime<Local>,
    pub name: String,
    pub payload: Value,
    #[serde(skip)]
    created: Instant,
}

impl Event {
    fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            timestamp: Local::now(),
            name: name.into(),
            payload,
            created: Instant::now(),
        }
    }

    /// Time since the event was appended.
    pub fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    /// `timestamp,"name","payload"` with CSV quoting.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{}",
            self.timestamp.to_rfc3339(),
            csv_quote(&self.name),
            csv_quote(&self.payload.to_string())
        )
    }
}

pub(crate) fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Case-insensitive pattern matched at the start of the event name.
fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{})", pattern))
        .case_insensitive(true)
        .build()
}

/// Thread-safe append-only event log.
#[derive(Debug)]
pub struct EventLog {
    events: Mutex<Vec<Arc<Event>>>,
    poll_interval: Duration,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_poll_interval(Timing::DEFAULT_EVENT_POLL)
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            poll_interval,
        }
    }

    /// Publishes an event and returns it.
    pub fn append(&self, name: impl Into<String>, payload: Value) -> Arc<Event> {
        let event = Arc::new(Event::new(name, payload));
        tracing::debug!("event appended: {}", event.name);
        self.events.lock().push(event.clone());
        event
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<Event>> {
        self.events.lock().get(index).cloned()
    }

    pub fn last(&self) -> Option<Arc<Event>> {
        self.events.lock().last().cloned()
    }

    /// Copy of all events in append order.
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        self.events.lock().clone()
    }

    /// Events whose name matches `pattern`.
    ///
    /// `"MESSAGE_.*"` matches every name starting with `MESSAGE_`, ignoring
    /// case.
    pub fn matching(&self, pattern: &str) -> Result<Vec<Arc<Event>>, regex::Error> {
        self.matching_where(pattern, |_| true)
    }

    /// Events whose name matches `pattern` and for which `filter` holds.
    pub fn matching_where(
        &self,
        pattern: &str,
        filter: impl Fn(&Event) -> bool,
    ) -> Result<Vec<Arc<Event>>, regex::Error> {
        let regex = compile(pattern)?;
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| regex.is_match(&e.name) && filter(e))
            .cloned()
            .collect())
    }

    /// Blocks until an event matching `pattern` is appended, or `timeout`
    /// passes.
    ///
    /// Only events appended after the call began are considered. Returns
    /// `Ok(None)` on timeout.
    pub fn wait_for_event(
        &self,
        pattern: &str,
        timeout: Duration,
    ) -> Result<Option<Arc<Event>>, regex::Error> {
        let regex = compile(pattern)?;
        let start_index = self.len();
        let started = Instant::now();

        loop {
            let found = self
                .events
                .lock()
                .iter()
                .skip(start_index)
                .find(|e| regex.is_match(&e.name))
                .cloned();
            if found.is_some() {
                return Ok(found);
            }
            if started.elapsed() >= timeout {
                tracing::debug!("timed out waiting for event '{}'", pattern);
                return Ok(None);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Writes all events as CSV with a `Timestamp,Name,Data` header.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        writeln!(out, "Timestamp,Name,Data")?;
        for event in self.snapshot() {
            writeln!(out, "{}", event.to_csv_row())?;
        }
        out.flush()
    }
}
