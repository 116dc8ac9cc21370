//! Multi-party conformance test harness.
//!
//! Expands the document release standard into scenarios, runs them against
//! the engine's orchestrator, and prints per-role conformance reports.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use engine::state::PersistenceProvider;
use harness::config::{HarnessConfig, load_config, write_config};
use harness::orchestrator::Orchestrator;
use harness::standard::document_release;
use harness::{logging, simulate};

const CONFIG_PATH: &str = ".harness/config.toml";

#[derive(Parser)]
#[command(
    name = "harness",
    version,
    about = "Multi-party conformance test harness"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.harness/config.toml` with default settings.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// List the scenarios the standard expands to.
    Scenarios,
    /// Run a scripted conformant session and print per-role reports.
    Simulate,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Scenarios => cmd_scenarios(),
        Command::Simulate => cmd_simulate(),
    }
}

fn cmd_init(force: bool) -> Result<()> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() && !force {
        bail!("{CONFIG_PATH} already exists (use --force to overwrite)");
    }
    write_config(path, &HarnessConfig::default())
}

fn cmd_scenarios() -> Result<()> {
    let cfg = load_config(Path::new(CONFIG_PATH))?;
    for scenario in document_release::build_scenarios(&cfg.requester_party, &cfg.custodian_party) {
        println!(
            "{}.{} {}",
            scenario.module_index,
            scenario.scenario_index,
            scenario.title()
        );
    }
    Ok(())
}

fn cmd_simulate() -> Result<()> {
    let cfg = load_config(Path::new(CONFIG_PATH))?;
    let session_id = format!("session-{}", Uuid::new_v4().simple());
    let mut orchestrator = Orchestrator::new(
        &session_id,
        document_release::build_scenarios(&cfg.requester_party, &cfg.custodian_party),
        document_release::build_check_tree(),
        PersistenceProvider::in_memory(cfg.chunk_threshold_bytes),
        cfg.max_active_instances,
    )?;
    simulate::run_conformant_session(&mut orchestrator)?;

    for role in ["Requester", "Custodian"] {
        let report = orchestrator.report(role);
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    }
    Ok(())
}
