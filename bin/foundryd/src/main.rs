//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "binary"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Binary entrypoint for the Foundry daemon."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use foundry_common::logging::init_tracing;
use foundry_common::{AppConfig, Mode};
use foundry_core::{
    new_registry, spawn_http_server, CommandMetrics, CommandWorker, Components, MetricsServer,
    ProjectService, Runtime,
};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Foundry daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the command worker until interrupted")]
    Run,
    #[command(about = "Queue an update for every project, handle it, then exit")]
    UpdateAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.extend(AppConfig::default_candidates());

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
        config.validate()?;
    }
    init_tracing("foundryd", &config.logging)?;
    info!(config_path = %loaded.source.display(), mode = ?config.mode, "configuration loaded");

    let components = Components::from_config(&config).await?;
    let (runtime, mut worker) = Runtime::assemble(components);

    let registry = new_registry();
    let metrics_server = if config.metrics.enabled {
        let metrics = CommandMetrics::new(&registry)?;
        worker = worker.with_metrics(metrics);
        Some(spawn_http_server(registry.clone(), config.metrics.listen).await?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(&config, runtime, worker).await?,
        Commands::UpdateAll => {
            let queued = runtime.service.schedule_updates().await?;
            let report = worker.run_until_idle().await;
            info!(queued, ?report, "update pass finished");
            if report.failed + report.panicked > 0 {
                warn!(
                    failed = report.failed,
                    panicked = report.panicked,
                    "some updates did not complete"
                );
            }
        }
    }

    if let Some(server) = metrics_server {
        shutdown_metrics(server).await;
    }
    Ok(())
}

async fn run_daemon(config: &AppConfig, runtime: Runtime, worker: CommandWorker) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel(4);
    let worker_task = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    let scheduler_task = if config.scheduler.enabled {
        info!(interval = ?config.scheduler.interval, "update scheduler enabled");
        Some(spawn_scheduler(
            runtime.service.clone(),
            config.scheduler.interval,
            shutdown_tx.subscribe(),
        ))
    } else {
        info!("update scheduler disabled by configuration");
        None
    };

    info!(mode = ?config.mode, "daemon running; waiting for termination signal");
    signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("ctrl-c received; shutting down");
    // Receivers may already be gone if their tasks ended early.
    let _ = shutdown_tx.send(());

    if let Some(task) = scheduler_task {
        if let Err(err) = task.await {
            error!(error = %err, "scheduler task did not complete");
        }
    }
    let report = worker_task.await.context("command worker task panicked")?;
    info!(?report, "daemon stopped");
    Ok(())
}

fn spawn_scheduler(
    service: ProjectService,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = time::interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticks.tick() => match service.schedule_updates().await {
                    Ok(queued) => info!(queued, "scheduled update pass queued"),
                    Err(err) => error!(error = %err, "scheduled update pass failed"),
                },
            }
        }
    })
}

async fn shutdown_metrics(server: MetricsServer) {
    if let Err(err) = server.shutdown().await {
        warn!(error = %err, "metrics server did not shut down cleanly");
    }
}
