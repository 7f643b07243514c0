//! magpie - Model checker for model-based tests
//!
//! Validates model files, exports them as Graphviz DOT and plans paths
//! through them.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use magpie_runtime::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "magpie")]
#[command(about = "Model checker for magpie model-based tests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse model files and report every error found
    Check {
        /// Model files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Export a model as Graphviz DOT
    Dot {
        /// Model file
        file: PathBuf,

        /// Output file (defaults to <output dir>/<model>.dot, or stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the shortest path between two states
    Path {
        /// Model file
        file: PathBuf,

        /// Start state (defaults to the initial state)
        #[arg(short, long)]
        from: Option<String>,

        /// End state
        #[arg(short, long)]
        to: String,
    },

    /// Show the states, actions, conditions and transitions of a model
    Info {
        /// Model file
        file: PathBuf,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration (from file if MAGPIE_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            if std::env::var("MAGPIE_CONFIG").is_ok() {
                eprintln!("{}: failed to load config: {}", "Error".red(), e);
                std::process::exit(1);
            }
            tracing::info!("Using default configuration ({})", e);
            Config::default()
        }
    };

    let result = match cli.command {
        Commands::Check { files } => {
            let report = commands::check(&files);
            println!("{}", report.output);
            if report.failures > 0 {
                eprintln!(
                    "{}: {} of {} model(s) failed",
                    "Error".red(),
                    report.failures,
                    files.len()
                );
                std::process::exit(1);
            }
            Ok(String::new())
        }
        Commands::Dot { file, output } => {
            let output = output.or_else(|| {
                let stem = file.file_stem()?.to_string_lossy().to_string();
                config
                    .output
                    .dir
                    .as_ref()
                    .map(|dir| dir.join(format!("{}.dot", stem)))
            });
            commands::dot(&file, output.as_deref())
        }
        Commands::Path { file, from, to } => commands::path(&file, from.as_deref(), &to),
        Commands::Info { file } => commands::info(&file),
    };

    match result {
        Ok(output) if output.is_empty() => {}
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
