//! ---
//! fdy_section: "05-networking-external-interfaces"
//! fdy_subsection: "binary"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Control CLI for administrators managing archetypes and projects."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use foundry_common::{AppConfig, Mode};
use foundry_core::{CommandWorker, Components, Runtime, WorkerReport};
use serde::Serialize;

mod archetype;
mod project;

#[derive(Debug, Parser)]
#[command(author, version, about = "Foundry administrative control utility", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalOptions {
    /// Path to the configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override application mode.
    #[arg(long, global = true, value_enum)]
    mode: Option<CliMode>,
    /// Print machine readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(subcommand, about = "Manage project templates")]
    Archetype(archetype::ArchetypeCommand),
    #[command(subcommand, about = "Manage provisioned projects")]
    Project(project::ProjectCommand),
    #[command(about = "List regions new projects can be created in")]
    Regions,
    #[command(about = "Show the account behind the configured API token")]
    Whoami,
}

/// An assembled runtime plus the worker that drains its queue in-process.
pub struct Session {
    pub runtime: Runtime,
    worker: CommandWorker,
    json: bool,
}

impl Session {
    async fn open(options: &GlobalOptions) -> Result<Self> {
        let mut candidates = Vec::new();
        if let Some(path) = &options.config {
            candidates.push(path.clone());
        }
        candidates.extend(AppConfig::default_candidates());
        let mut config = AppConfig::load(&candidates)?;
        if let Some(mode) = options.mode {
            config.mode = match mode {
                CliMode::Production => Mode::Production,
                CliMode::Simulation => Mode::Simulation,
            };
            config.validate()?;
        }
        let components = Components::from_config(&config).await?;
        let (runtime, worker) = Runtime::assemble(components);
        Ok(Self {
            runtime,
            worker,
            json: options.json,
        })
    }

    /// Handle every queued command before the process exits.
    pub async fn drain(&mut self) -> WorkerReport {
        let report = self.worker.run_until_idle().await;
        if report.total() > 0 && !self.json {
            println!(
                "commands: {} applied, {} skipped, {} failed, {} panicked",
                report.applied, report.skipped, report.failed, report.panicked
            );
        }
        report
    }

    pub fn json(&self) -> bool {
        self.json
    }

    /// Print `value` as JSON, or fall back to `text`.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct RegionChoice {
    label: String,
    id: String,
}

async fn run(cli: Cli) -> Result<()> {
    let mut session = Session::open(&cli.global).await?;
    match cli.command {
        Commands::Archetype(cmd) => archetype::run(&mut session, cmd).await?,
        Commands::Project(cmd) => project::run(&mut session, cmd).await?,
        Commands::Regions => {
            let regions: Vec<RegionChoice> = session
                .runtime
                .insights
                .available_regions()
                .await?
                .into_iter()
                .map(|(label, id)| RegionChoice { label, id })
                .collect();
            session.emit(&regions, |regions| {
                for region in regions {
                    println!("{:<24} {}", region.id, region.label);
                }
            })?;
        }
        Commands::Whoami => {
            let account = session.runtime.platform.account_info().await?;
            session.emit(&account, |account| {
                println!(
                    "{} ({}){}",
                    account.username,
                    account.id,
                    account
                        .email
                        .as_deref()
                        .map(|email| format!(" <{email}>"))
                        .unwrap_or_default()
                );
            })?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    foundry_common::init();
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli))
}
