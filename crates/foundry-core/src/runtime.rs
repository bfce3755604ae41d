//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Primary orchestration and lifecycle management."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Wiring of store, platform, bus, handlers and worker.

use std::sync::Arc;

use anyhow::{Context, Result};
use foundry_common::{AppConfig, CodeInitStrategy, Mode};
use foundry_git::{GitMirror, SystemProcessRunner};
use foundry_platform::http::HttpSettings;
use foundry_platform::{HttpPlatformClient, PlatformClient, SimulatedPlatform};
use tracing::{info, warn};

use crate::bus::{self, CommandBus};
use crate::handlers::{HandlerSettings, Handlers};
use crate::insights::ProjectInsights;
use crate::provisioning::Provisioner;
use crate::readiness::ReadinessSettings;
use crate::service::ProjectService;
use crate::store::{JsonFileStore, MemoryStore, ProjectStore};
use crate::worker::CommandWorker;

/// Collaborators a [`Runtime`] is assembled from.
pub struct Components {
    pub store: Arc<dyn ProjectStore>,
    pub platform: Arc<dyn PlatformClient>,
    pub mirror: Arc<GitMirror>,
    pub readiness: ReadinessSettings,
    pub handlers: HandlerSettings,
    pub concurrency: usize,
}

impl Components {
    /// Build collaborators for the configured mode.
    ///
    /// Simulation mode uses an in-memory platform and store, and seeds code
    /// through the platform since simulated git remotes are not reachable.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let mut handlers = HandlerSettings::from_config(config);
        let (store, platform): (Arc<dyn ProjectStore>, Arc<dyn PlatformClient>) =
            match config.mode {
                Mode::Simulation => {
                    if handlers.code_init == CodeInitStrategy::GitMirror {
                        warn!("simulation mode: initializing code through the platform instead of git");
                        handlers.code_init = CodeInitStrategy::Platform;
                    }
                    let platform =
                        SimulatedPlatform::with_production_branch(&config.platform.production_branch);
                    (Arc::new(MemoryStore::new()), Arc::new(platform))
                }
                Mode::Production => {
                    let token = config.platform.resolve_token()?;
                    let settings = HttpSettings {
                        request_timeout: config.platform.request_timeout,
                        provision_timeout: config.platform.provision_timeout,
                        provision_poll_interval: config.platform.provision_poll_interval,
                    };
                    let client = HttpPlatformClient::new(&config.platform.api_url, &token, settings)
                        .context("failed to build platform client")?;
                    let store = JsonFileStore::open(&config.store.path)
                        .await
                        .with_context(|| {
                            format!("failed to open store {}", config.store.path.display())
                        })?;
                    (Arc::new(store), Arc::new(client))
                }
            };
        let mirror = GitMirror::from_config(&config.git, Arc::new(SystemProcessRunner));
        info!(mode = ?config.mode, code_init = ?handlers.code_init, "runtime components ready");
        Ok(Self {
            store,
            platform,
            mirror: Arc::new(mirror),
            readiness: ReadinessSettings::from_config(&config.platform, &config.readiness),
            handlers,
            concurrency: config.worker.concurrency,
        })
    }
}

/// The assembled application, minus the worker that drives it.
#[derive(Clone)]
pub struct Runtime {
    pub service: ProjectService,
    pub insights: ProjectInsights,
    pub platform: Arc<dyn PlatformClient>,
    pub handlers: Arc<Handlers>,
    pub bus: Arc<dyn CommandBus>,
}

impl Runtime {
    pub fn assemble(components: Components) -> (Runtime, CommandWorker) {
        let (bus, receiver) = bus::channel();
        let bus: Arc<dyn CommandBus> = Arc::new(bus);
        let provisioner = Provisioner::new(
            components.store.clone(),
            components.platform.clone(),
            bus.clone(),
        );
        let service = ProjectService::new(components.store.clone(), bus.clone(), provisioner);
        let insights = ProjectInsights::new(
            components.platform.clone(),
            components.readiness.production_branch.clone(),
        );
        let handlers = Arc::new(Handlers::new(
            components.store,
            components.platform.clone(),
            components.mirror,
            components.readiness,
            components.handlers,
        ));
        let worker = CommandWorker::new(handlers.clone(), receiver, components.concurrency);
        let runtime = Runtime {
            service,
            insights,
            platform: components.platform,
            handlers,
            bus,
        };
        (runtime, worker)
    }
}
