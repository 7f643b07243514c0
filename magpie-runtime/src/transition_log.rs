//! Per-session CSV log of visited states, actions and transitions.

use crate::events::csv_quote;
use chrono::Local;
use magpie_core::Outcome;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Kind of a log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    State,
    Action,
    Outbound,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::State => "state",
            EntryKind::Action => "action",
            EntryKind::Outbound => "outbound",
        }
    }
}

/// CSV file with `Timestamp,Type,Name,Result` columns.
#[derive(Debug)]
pub struct TransitionLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TransitionLog {
    /// Creates the file, and its directory if needed, and writes the header.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "Timestamp,Type,Name,Result")?;
        writer.flush()?;
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, kind: EntryKind, name: &str, outcome: Outcome) -> std::io::Result<()> {
        writeln!(
            self.writer,
            "{},{},{},{}",
            Local::now().to_rfc3339(),
            csv_quote(kind.as_str()),
            csv_quote(name),
            csv_quote(outcome.as_str())
        )?;
        self.writer.flush()
    }
}
