//! Command execution.

use colored::Colorize;
use magpie_core::{CoreError, Model, Parser};
use std::path::{Path, PathBuf};

/// Output of `check`, plus how many files failed.
pub struct CheckReport {
    pub output: String,
    pub failures: usize,
}

/// Parses every file and collects either a summary line or the diagnostics.
pub fn check(files: &[PathBuf]) -> CheckReport {
    let parser = Parser::new();
    let mut lines = Vec::new();
    let mut failures = 0;

    for file in files {
        match parser.parse_file(file) {
            Ok(model) => lines.push(format!(
                "{} {} ({} states, {} transitions, checksum {})",
                "OK".green(),
                file.display().to_string().cyan(),
                model.states().len(),
                model.transitions().len(),
                model.checksum()
            )),
            Err(e) => {
                failures += 1;
                lines.push(format!(
                    "{} {} [{}]",
                    "FAILED".red(),
                    file.display().to_string().cyan(),
                    e.error_code()
                ));
                lines.push(e.to_string());
            }
        }
    }

    CheckReport {
        output: lines.join("\n"),
        failures,
    }
}

/// Renders the model as DOT, to `output` when given.
pub fn dot(file: &Path, output: Option<&Path>) -> Result<String, Box<dyn std::error::Error>> {
    let model = load(file)?;
    let dot = model.to_dot(None);

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &dot)?;
            tracing::info!("wrote {}", path.display());
            Ok(format!(
                "{} {}",
                "Wrote".green(),
                path.display().to_string().cyan()
            ))
        }
        None => Ok(dot),
    }
}

/// Plans the shortest path and prints one state per line.
pub fn path(file: &Path, from: Option<&str>, to: &str) -> Result<String, Box<dyn std::error::Error>> {
    let model = load(file)?;
    let start = match from {
        Some(start) => start.to_string(),
        None => model
            .initial_state_name()
            .ok_or("the model has no initial state")?
            .to_string(),
    };

    let planned = model.shortest_path(&start, to)?;
    let policy = planned.policy();
    let mut lines = vec![format!(
        "{} \"{}\" to \"{}\" ({} steps, {})",
        "Path".bold(),
        start,
        to,
        planned.len(),
        policy
    )];
    lines.push(format!("  {}", start));
    lines.extend(planned.map(|step| format!("  {}", step)));
    Ok(lines.join("\n"))
}

/// Shows states, actions, conditions and the checksum.
pub fn info(file: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let model = load(file)?;
    let mut lines = vec![format!("Model {}", model.name.cyan()).bold().to_string()];
    lines.push(format!(
        "  initial state: {}",
        model.initial_state_name().unwrap_or("-")
    ));
    lines.push(format!("  checksum:      {}", model.checksum()));

    lines.push(format!("  states ({}):", model.states().len()));
    lines.extend(model.states().keys().map(|name| format!("    {}", name)));
    lines.push(format!("  actions ({}):", model.actions().len()));
    lines.extend(model.actions().keys().map(|name| format!("    {}", name)));
    lines.push(format!("  conditions ({}):", model.conditions().len()));
    lines.extend(model.conditions().keys().map(|name| format!("    {}", name)));
    lines.push(format!("  transitions ({}):", model.transitions().len()));
    lines.extend(model.transitions().iter().map(|t| format!("    {}", t)));

    Ok(lines.join("\n"))
}

fn load(file: &Path) -> Result<Model, CoreError> {
    Parser::new().parse_file(file)
}
