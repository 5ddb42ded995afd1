//! Flowplan command line front end
//!
//! Loads workflow documents into a headless editor and runs layout,
//! validation and metrics over them.
//!
//! Usage:
//!   flowplan new --name "Order Flow" -o order.json
//!   flowplan layout order.json --mode horizontal -o laid_out.json
//!   flowplan validate order.json
//!   flowplan metrics order.json

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use diagram_engine::exchange::parse_document;
use diagram_engine::{Editor, EditorConfig, LayoutMode, WorkflowMetrics};

#[derive(Parser)]
#[command(name = "flowplan", author, version, about, long_about = None)]
struct Cli {
    /// Directory holding flowplan.json
    #[arg(long, global = true, value_name = "DIR")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new, empty workflow
    New {
        #[arg(long, default_value = "Untitled Workflow")]
        name: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Auto-layout a workflow
    Layout {
        file: PathBuf,
        /// vertical, horizontal or grid
        #[arg(long, default_value = "vertical")]
        mode: LayoutMode,
        /// Output file (defaults to rewriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a workflow file and report every problem found
    Validate { file: PathBuf },

    /// Print workflow statistics as JSON
    Metrics { file: PathBuf },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(dir) => EditorConfig::load(dir)
            .with_context(|| format!("Failed to load configuration from {:?}", dir))?,
        None => EditorConfig::default(),
    };

    match cli.command {
        Commands::New { name, output } => {
            let editor = headless(config);
            let workflow = editor.new_workflow(&name);
            write_output(&output, &editor.export_json()?)?;
            log::info!("Created workflow '{}' at {:?}", workflow.name, output);
        }
        Commands::Layout { file, mode, output } => {
            let editor = headless(config);
            editor
                .open_file(&file)
                .with_context(|| format!("Failed to open {:?}", file))?;
            let outcome = editor.layout().auto_layout(mode);
            let target = output.unwrap_or(file);
            write_output(&target, &editor.export_json()?)?;
            log::info!(
                "{} layout: moved {} nodes, {} locked, written to {:?}",
                mode,
                outcome.moved,
                outcome.skipped_locked,
                target
            );
        }
        Commands::Validate { file } => {
            let text = read_input(&file)?;
            match parse_document(&text) {
                Ok(workflow) => println!(
                    "{}: valid ({} nodes, {} connections)",
                    file.display(),
                    workflow.nodes.len(),
                    workflow.connections.len()
                ),
                Err(e) => {
                    let findings = e.validation_errors();
                    if findings.is_empty() {
                        bail!("{}: {}", file.display(), e);
                    }
                    for finding in findings {
                        println!("{}: {}", file.display(), finding);
                    }
                    bail!("{} problem(s) found", findings.len());
                }
            }
        }
        Commands::Metrics { file } => {
            let text = read_input(&file)?;
            let workflow =
                parse_document(&text).with_context(|| format!("Invalid workflow {:?}", file))?;
            let metrics = WorkflowMetrics::compute(&workflow);
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }
    Ok(())
}

/// An editor without autosave; the CLI writes its results explicitly
fn headless(mut config: EditorConfig) -> Editor {
    config.autosave.enabled = false;
    Editor::new(config)
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))
}
