//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Consumes the command bus and runs handlers with bounded concurrency.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bus::CommandReceiver;
use crate::command::Envelope;
use crate::handlers::{Disposition, Handlers, Outcome};
use crate::metrics::CommandMetrics;

/// Final status of one handled envelope, also the metric `outcome` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CommandStatus {
    Applied,
    Skipped,
    Failed,
    Panicked,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub panicked: usize,
}

impl WorkerReport {
    fn record(&mut self, status: CommandStatus) {
        match status {
            CommandStatus::Applied => self.applied += 1,
            CommandStatus::Skipped => self.skipped += 1,
            CommandStatus::Failed => self.failed += 1,
            CommandStatus::Panicked => self.panicked += 1,
        }
    }

    fn record_join(&mut self, joined: Result<CommandStatus, JoinError>) {
        match joined {
            Ok(status) => self.record(status),
            Err(err) => {
                error!(error = %err, "command task did not complete");
                self.record(CommandStatus::Panicked);
            }
        }
    }

    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.failed + self.panicked
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

async fn execute(
    handlers: &Handlers,
    envelope: Envelope,
    metrics: Option<&CommandMetrics>,
) -> CommandStatus {
    let command = envelope.command.name();
    let id = envelope.id;
    let started = Instant::now();
    debug!(command, envelope = %id, issued_at = %envelope.issued_at, "handling command");

    let result = AssertUnwindSafe(handlers.handle(&envelope.command))
        .catch_unwind()
        .await;
    let status = match result {
        Ok(Ok(Outcome::Applied)) => {
            info!(command, envelope = %id, "command applied");
            CommandStatus::Applied
        }
        Ok(Ok(Outcome::Skipped { reason })) => {
            info!(command, envelope = %id, %reason, "command skipped");
            CommandStatus::Skipped
        }
        Ok(Err(err)) => match err.disposition() {
            Disposition::Skipped => {
                info!(command, envelope = %id, reason = %err, "command skipped");
                CommandStatus::Skipped
            }
            Disposition::Failed => {
                error!(command, envelope = %id, error = %err, "command failed");
                CommandStatus::Failed
            }
        },
        Err(panic) => {
            error!(command, envelope = %id, panic = panic_message(panic.as_ref()), "command handler panicked");
            CommandStatus::Panicked
        }
    };
    if let Some(metrics) = metrics {
        metrics.record(command, status.into(), started.elapsed().as_secs_f64());
    }
    status
}

pub struct CommandWorker {
    handlers: Arc<Handlers>,
    receiver: CommandReceiver,
    limit: Arc<Semaphore>,
    metrics: Option<CommandMetrics>,
}

impl CommandWorker {
    pub fn new(handlers: Arc<Handlers>, receiver: CommandReceiver, concurrency: usize) -> Self {
        Self {
            handlers,
            receiver,
            limit: Arc::new(Semaphore::new(concurrency.max(1))),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: CommandMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn spawn(&self, tasks: &mut JoinSet<CommandStatus>, envelope: Envelope) {
        let handlers = self.handlers.clone();
        let limit = self.limit.clone();
        let metrics = self.metrics.clone();
        tasks.spawn(async move {
            // The semaphore is never closed.
            let _permit = limit.acquire_owned().await.ok();
            execute(&handlers, envelope, metrics.as_ref()).await
        });
    }

    /// Consume commands until shutdown is signalled or every bus handle is
    /// dropped, then wait for in-flight commands.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> WorkerReport {
        let mut tasks = JoinSet::new();
        let mut report = WorkerReport::default();
        info!(concurrency = self.limit.available_permits(), "command worker started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("command worker shutdown requested");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => report.record_join(joined),
                next = self.receiver.recv() => match next {
                    Some(envelope) => self.spawn(&mut tasks, envelope),
                    None => {
                        warn!("command bus closed");
                        break;
                    }
                },
            }
        }
        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "draining in-flight commands");
        }
        while let Some(joined) = tasks.join_next().await {
            report.record_join(joined);
        }
        info!(?report, "command worker stopped");
        report
    }

    /// Handle everything queued, including commands queued meanwhile, and
    /// return once nothing is queued or running.
    pub async fn run_until_idle(&mut self) -> WorkerReport {
        let mut tasks = JoinSet::new();
        let mut report = WorkerReport::default();
        loop {
            while let Some(envelope) = self.receiver.try_recv() {
                self.spawn(&mut tasks, envelope);
            }
            match tasks.join_next().await {
                Some(joined) => report.record_join(joined),
                None => break,
            }
        }
        report
    }
}
