// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! QubitOS Sequencer CLI
//!
//! Builds parametrized pulse sequences and prints the scheduled program.
//!
//! # Usage
//!
//! ```bash
//! # Build and schedule a sequence with variable values
//! qubit-os-seq build sequence.yaml --vars vars.json --pretty
//!
//! # Schedule one program per binding set
//! qubit-os-seq sweep sequence.yaml --sweep points.json
//!
//! # Summarize a document without building it
//! qubit-os-seq inspect sequence.yaml
//!
//! # Show effective configuration
//! qubit-os-seq config
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use qubit_os_sequencer::{
    build_and_schedule, config::Config, sweep, validation::validate_document, Bindings, Error,
    Result, SequenceDocument, SequenceTemplate, VERSION,
};

/// QubitOS pulse-sequence builder and scheduler
#[derive(Parser)]
#[command(name = "qubit-os-seq")]
#[command(author = "QubitOS Contributors")]
#[command(version = VERSION)]
#[command(about = "Parametrized pulse-sequence builder and channel scheduler")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "QUBITOS_SEQ_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and schedule a sequence document
    Build {
        /// Sequence document (.json, .yaml)
        document: PathBuf,

        /// Variable values, a JSON or YAML map of name to value
        #[arg(long)]
        vars: Option<PathBuf>,

        /// Write the program here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Schedule a document once per binding set
    Sweep {
        /// Sequence document (.json, .yaml)
        document: PathBuf,

        /// List of binding sets, JSON or YAML
        #[arg(long)]
        sweep: PathBuf,

        /// Write the programs here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize a sequence document
    Inspect {
        /// Sequence document (.json, .yaml)
        document: PathBuf,
    },

    /// Show effective configuration
    Config,

    /// Validate configuration file
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    init_logging(&config.logging.level, &config.logging.format);

    match cli.command {
        Commands::Build {
            document,
            vars,
            output,
            pretty,
        } => {
            config.validate()?;
            let doc = SequenceDocument::from_file(&document)?;
            let values = match vars {
                Some(path) => load_data::<Bindings>(&path)?,
                None => Bindings::new(),
            };

            let program = match build_and_schedule(&doc, &values, &config) {
                Ok(program) => program,
                Err(e) => {
                    error!(error = %e, document = %document.display(), "Build failed");
                    return Err(e);
                }
            };
            write_output(output.as_deref(), &program.to_json(pretty)?)?;
        }

        Commands::Sweep {
            document,
            sweep: points,
            output,
        } => {
            config.validate()?;
            let doc = SequenceDocument::from_file(&document)?;
            validate_document(&doc, &config.validation.limits)?;
            let template =
                SequenceTemplate::from_document_with(&doc, config.scheduler.default_max_targets)?;
            let points = load_data::<Vec<Bindings>>(&points)?;

            let results = sweep::schedule_all(&template, &points, &config)?;
            let mut failed = 0;
            let entries: Vec<serde_json::Value> = results
                .into_iter()
                .map(|result| match result {
                    Ok(program) => serde_json::to_value(program).map_err(Error::from),
                    Err(e) => {
                        failed += 1;
                        Ok(serde_json::json!({ "error": e.to_string() }))
                    }
                })
                .collect::<Result<_>>()?;

            info!(points = entries.len(), failed, "Sweep complete");
            write_output(output.as_deref(), &serde_json::to_string(&entries)?)?;
            if failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::Inspect { document } => {
            let doc = SequenceDocument::from_file(&document)?;
            let template =
                SequenceTemplate::from_document_with(&doc, config.scheduler.default_max_targets)?;

            println!("Device: {}", doc.device.as_deref().unwrap_or("(none)"));
            println!(
                "Register: {} atoms{}",
                template.register().len(),
                if template.register().is_mappable() {
                    " (mappable)"
                } else {
                    ""
                }
            );
            println!("Channels:");
            for (name, spec) in template.channels() {
                println!("  {} [{}]", name, spec.id);
            }
            println!("Variables:");
            for (name, var) in template.variables() {
                let default = if var.default.is_some() { " (default)" } else { "" };
                println!("  {}: {:?}[{}]{}", name, var.kind, var.len, default);
            }
            if template.variables().is_empty() {
                println!("  (none)");
            }
            println!("Operations: {}", template.operations().len());
        }

        Commands::Config => {
            // Show effective configuration
            println!("{}", serde_yaml::to_string(&config)?);
        }

        Commands::Validate => {
            // Validate configuration
            match config.validate() {
                Ok(()) => {
                    println!("Configuration is valid");
                }
                Err(e) => {
                    eprintln!("Configuration error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Initialize logging with tracing. Logs go to stderr so program output on
/// stdout stays machine-readable.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

/// Read a JSON or YAML file, by extension.
fn load_data<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_yaml::from_str(&content)?)
    }
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)?;
            info!(path = %path.display(), "Output written");
        }
        None => println!("{}", content),
    }
    Ok(())
}
