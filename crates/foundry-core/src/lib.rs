//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Primary orchestration and lifecycle management."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Message-driven lifecycle orchestration for archetype-based projects.
//!
//! Local changes become [`Command`]s on a [`CommandBus`]; the
//! [`CommandWorker`] runs them through [`Handlers`], which drive the remote
//! platform and, for updates, the [`EnvironmentReadiness`] state machine.

pub mod bus;
pub mod command;
pub mod handlers;
pub mod insights;
pub mod metrics;
pub mod model;
pub mod provisioning;
pub mod readiness;
pub mod retry;
pub mod runtime;
pub mod service;
pub mod store;
pub mod worker;

pub use bus::{BusError, ChannelBus, CommandBus, CommandReceiver};
pub use command::{Command, Envelope, ProjectRef, RemoteBinding, RemoteRef};
pub use handlers::{
    Disposition, HandlerError, HandlerSettings, Handlers, Outcome, VAR_UPDATE_BRANCH,
    VAR_UPDATE_OPERATION, VAR_UPDATE_REMOTE,
};
pub use insights::ProjectInsights;
pub use metrics::{new_registry, spawn_http_server, CommandMetrics, MetricsServer, SharedRegistry};
pub use model::{
    Archetype, ArchetypeId, NewArchetype, NewProject, Project, ProjectId, ProvisionedProject,
    RemoteProjectId,
};
pub use provisioning::{ProvisionError, Provisioner};
pub use readiness::{EnvironmentReadiness, Guard, Readiness, ReadinessSettings, Transition};
pub use retry::{await_condition, poll_until, PollOutcome, Probe};
pub use runtime::{Components, Runtime};
pub use service::{ProjectService, ServiceError};
pub use store::{JsonFileStore, MemoryStore, ProjectStore, StoreError};
pub use worker::{CommandStatus, CommandWorker, WorkerReport};
