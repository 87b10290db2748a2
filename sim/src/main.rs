//! Persona simulation CLI.
//!
//! Runs a simulation described by a request file and inspects persisted runs
//! under the configured store directory (`.persona-sim/runs` by default).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use persona_sim::error::SimError;
use persona_sim::exit_codes;
use persona_sim::io::config::{DEFAULT_CONFIG_FILE, SimConfig, load_config};
use persona_sim::io::model::CommandModelClient;
use persona_sim::io::request::load_request;
use persona_sim::io::responder::{ModelEvaluationResponder, ModelPersonaResponder};
use persona_sim::io::store::FileRunStore;
use persona_sim::logging;
use persona_sim::service::{RunSettings, SimulationService};
use serde::Serialize;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "persona-sim",
    version,
    about = "Simulate how synthetic personas react to product stimuli"
)]
struct Cli {
    /// Config file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a simulation from a request file (TOML or JSON) and print its run id.
    Run {
        /// Path to the run request.
        request: PathBuf,
    },
    /// Print a stored run as JSON.
    Show {
        run_id: Uuid,
        /// Include trust states replayed from the transcript.
        #[arg(long)]
        trust: bool,
    },
}

type CliService = SimulationService<
    ModelPersonaResponder<CommandModelClient>,
    ModelEvaluationResponder<CommandModelClient>,
    FileRunStore,
>;

fn main() {
    logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<SimError>()
        .map_or(exit_codes::INVALID, SimError::exit_code)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Run { request } => cmd_run(&config, &request),
        Command::Show { run_id, trust } => cmd_show(&config, run_id, trust),
    }
}

fn build_service(config: &SimConfig) -> Result<CliService> {
    let persona_responder =
        ModelPersonaResponder::new(CommandModelClient::new(config.responder.clone()));
    let evaluation_responder = ModelEvaluationResponder::new(
        CommandModelClient::new(config.responder.clone()),
        config.model_name.clone(),
    )
    .with_max_attempts(config.structured_attempts);
    SimulationService::new(
        persona_responder,
        evaluation_responder,
        FileRunStore::new(&config.store_dir),
        RunSettings::from_config(config),
    )
}

fn cmd_run(config: &SimConfig, request_path: &Path) -> Result<()> {
    let request = load_request(request_path)?;
    let service = build_service(config)?;
    let run_id = service.start_run(request)?;
    println!("{run_id}");
    Ok(())
}

#[derive(Serialize)]
struct ShowOutput<T, R> {
    #[serde(flatten)]
    run: R,
    #[serde(skip_serializing_if = "Option::is_none")]
    trust: Option<T>,
}

fn cmd_show(config: &SimConfig, run_id: Uuid, with_trust: bool) -> Result<()> {
    let service = build_service(config)?;
    let run = service.get_run(run_id)?;
    let trust = if with_trust {
        Some(service.replay_trust(run_id)?)
    } else {
        None
    };
    let output = ShowOutput { run, trust };
    let rendered = serde_json::to_string_pretty(&output).context("serialize run")?;
    println!("{rendered}");
    Ok(())
}
