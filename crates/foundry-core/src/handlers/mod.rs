//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Command handlers.
//!
//! Each handler loads the minimal local state it needs, talks to the
//! platform and returns an [`Outcome`]. Missing state and unmet
//! preconditions are expected under late delivery and surface as
//! [`HandlerError`] variants whose [`Disposition`] is `Skipped`.

use std::sync::Arc;

use foundry_common::{AppConfig, CodeInitStrategy};
use foundry_git::{GitError, GitMirror};
use foundry_platform::{PlatformClient, PlatformError, RemoteProject, RemoteProjectId};

use crate::command::Command;
use crate::model::{Archetype, ArchetypeId, Project, ProjectId};
use crate::readiness::{EnvironmentReadiness, Guard, ReadinessSettings};
use crate::store::{ProjectStore, StoreError};

mod backup;
mod code_init;
mod delete;
mod merge;
mod synchronize;
mod update;
mod variables;

pub use variables::{VAR_UPDATE_BRANCH, VAR_UPDATE_OPERATION, VAR_UPDATE_REMOTE};

/// What a handler did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Nothing to do; preconditions were not met.
    Skipped { reason: String },
}

impl Outcome {
    pub(crate) fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped {
            reason: reason.into(),
        }
    }
}

/// How the worker treats a handler error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Disposition {
    Skipped,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{kind} {id} not found in the local store")]
    LocalNotFound { kind: &'static str, id: String },
    #[error("remote {kind} {id} not found")]
    RemoteNotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Guard(Guard),
    #[error("timed out: {0}")]
    Timeout(Guard),
    #[error(transparent)]
    Process(#[from] GitError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HandlerError {
    pub fn disposition(&self) -> Disposition {
        match self {
            HandlerError::LocalNotFound { .. }
            | HandlerError::RemoteNotFound { .. }
            | HandlerError::Guard(_)
            | HandlerError::Timeout(_) => Disposition::Skipped,
            HandlerError::Process(_) | HandlerError::Platform(_) | HandlerError::Store(_) => {
                Disposition::Failed
            }
        }
    }

    fn remote_project(id: &RemoteProjectId) -> Self {
        HandlerError::RemoteNotFound {
            kind: "project",
            id: id.to_string(),
        }
    }
}

impl From<Guard> for HandlerError {
    fn from(guard: Guard) -> Self {
        match guard {
            Guard::BranchUnavailable { .. } => HandlerError::Timeout(guard),
            other => HandlerError::Guard(other),
        }
    }
}

pub type HandlerResult = Result<Outcome, HandlerError>;

/// Behaviour switches that come from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    pub production_branch: String,
    pub code_init: CodeInitStrategy,
    pub backup_before_merge: bool,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            production_branch: "master".into(),
            code_init: CodeInitStrategy::default(),
            backup_before_merge: true,
        }
    }
}

impl HandlerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            production_branch: config.platform.production_branch.clone(),
            code_init: config.code_init.strategy,
            backup_before_merge: config.merge.backup_before_merge,
        }
    }
}

/// Dispatches commands to their handler.
pub struct Handlers {
    store: Arc<dyn ProjectStore>,
    platform: Arc<dyn PlatformClient>,
    mirror: Arc<GitMirror>,
    readiness: EnvironmentReadiness,
    settings: HandlerSettings,
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Handlers {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        platform: Arc<dyn PlatformClient>,
        mirror: Arc<GitMirror>,
        readiness: ReadinessSettings,
        settings: HandlerSettings,
    ) -> Self {
        let readiness = EnvironmentReadiness::new(platform.clone(), readiness);
        Self {
            store,
            platform,
            mirror,
            readiness,
            settings,
        }
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    pub async fn handle(&self, command: &Command) -> HandlerResult {
        match command {
            Command::SetProjectVariables(binding) => variables::handle(self, binding).await,
            Command::InitializeProjectCode(binding) => code_init::handle(self, binding).await,
            Command::SynchronizeProject(target) => synchronize::handle(self, target).await,
            Command::UpdateProject(target) => update::handle(self, target).await,
            Command::MergeUpdateProject(target) => merge::handle(self, target).await,
            Command::BackupProduction(target) => backup::handle(self, target).await,
            Command::DeleteProject(target) => delete::handle(self, target).await,
        }
    }

    async fn load_project(&self, id: ProjectId) -> Result<Project, HandlerError> {
        self.store
            .find_project(id)
            .await?
            .ok_or_else(|| HandlerError::LocalNotFound {
                kind: "project",
                id: id.0.to_string(),
            })
    }

    async fn load_archetype(&self, id: ArchetypeId) -> Result<Archetype, HandlerError> {
        self.store
            .find_archetype(id)
            .await?
            .ok_or_else(|| HandlerError::LocalNotFound {
                kind: "archetype",
                id: id.0.to_string(),
            })
    }

    async fn load_remote(&self, id: &RemoteProjectId) -> Result<RemoteProject, HandlerError> {
        self.platform
            .get_project(id)
            .await?
            .ok_or_else(|| HandlerError::remote_project(id))
    }
}
