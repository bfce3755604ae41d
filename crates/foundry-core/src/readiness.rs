//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Brings a project's update branch into a usable state.
//!
//! | branch state | action                       | transition   |
//! |--------------|------------------------------|--------------|
//! | missing      | guard checks, wait, branch   | Branched     |
//! | not active   | activate                     | Activated    |
//! | active       | synchronize code and data    | Synchronized |

use std::sync::Arc;
use std::time::Duration;

use foundry_common::{PlatformConfig, ReadinessConfig};
use foundry_platform::{
    PlatformClient, PlatformError, RemoteEnvironment, RemoteProjectId, SyncOptions,
    OPERATION_BRANCH,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::retry::{poll_until, PollOutcome, Probe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Missing,
    Inactive,
    ActiveStale,
}

impl BranchState {
    pub fn classify(environment: Option<&RemoteEnvironment>) -> Self {
        match environment {
            None => BranchState::Missing,
            Some(env) if !env.is_active() => BranchState::Inactive,
            Some(_) => BranchState::ActiveStale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
    Branched,
    Activated,
    Synchronized,
}

/// Why a branch could not be made ready.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Guard {
    #[error("production environment {branch} does not exist")]
    ProductionMissing { branch: String },
    #[error("production deployment target '{target}' does not support branching")]
    UnsupportedDeploymentTarget { target: String },
    #[error("production environment has no code yet")]
    ProductionUninitialized,
    #[error("branch operation not offered within {waited:?}")]
    BranchUnavailable { waited: Duration },
    #[error("branch {branch} was created but is not visible")]
    BranchNotVisible { branch: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready {
        environment: RemoteEnvironment,
        transition: Transition,
    },
    Unavailable(Guard),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub production_branch: String,
    pub branch_poll_interval: Duration,
    pub branch_wait_timeout: Duration,
}

impl ReadinessSettings {
    pub fn from_config(platform: &PlatformConfig, readiness: &ReadinessConfig) -> Self {
        Self {
            production_branch: platform.production_branch.clone(),
            branch_poll_interval: readiness.branch_poll_interval,
            branch_wait_timeout: readiness.branch_wait_timeout,
        }
    }
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            production_branch: "master".into(),
            branch_poll_interval: Duration::from_secs(1),
            branch_wait_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct EnvironmentReadiness {
    platform: Arc<dyn PlatformClient>,
    settings: ReadinessSettings,
}

impl EnvironmentReadiness {
    pub fn new(platform: Arc<dyn PlatformClient>, settings: ReadinessSettings) -> Self {
        Self { platform, settings }
    }

    pub fn settings(&self) -> &ReadinessSettings {
        &self.settings
    }

    /// Make `branch` of `project` exist, run and carry production's latest
    /// code and data. Transport failures propagate; unmet preconditions are
    /// reported as [`Readiness::Unavailable`].
    pub async fn ensure(
        &self,
        project: &RemoteProjectId,
        branch: &str,
    ) -> Result<Readiness, PlatformError> {
        let current = self.platform.get_environment(project, branch).await?;
        let state = BranchState::classify(current.as_ref());
        debug!(project = %project, branch, ?state, "classified update branch");
        match (state, current) {
            (BranchState::Inactive, Some(env)) => {
                self.platform.activate_environment(project, branch).await?;
                info!(project = %project, branch, "activated update branch");
                self.ready(project, branch, env, Transition::Activated).await
            }
            (BranchState::ActiveStale, Some(env)) => {
                self.platform
                    .synchronize_environment(project, branch, SyncOptions::ALL)
                    .await?;
                info!(project = %project, branch, "synchronized update branch");
                self.ready(project, branch, env, Transition::Synchronized)
                    .await
            }
            _ => self.branch(project, branch).await,
        }
    }

    async fn branch(
        &self,
        project: &RemoteProjectId,
        branch: &str,
    ) -> Result<Readiness, PlatformError> {
        let production_branch = self.settings.production_branch.as_str();
        let Some(production) = self
            .platform
            .get_environment(project, production_branch)
            .await?
        else {
            return Ok(Readiness::Unavailable(Guard::ProductionMissing {
                branch: production_branch.to_owned(),
            }));
        };
        if !production.is_local_target() {
            return Ok(Readiness::Unavailable(Guard::UnsupportedDeploymentTarget {
                target: production.deployment_target,
            }));
        }
        if !production.has_code {
            return Ok(Readiness::Unavailable(Guard::ProductionUninitialized));
        }

        if !self.await_branch_operation(project).await? {
            return Ok(Readiness::Unavailable(Guard::BranchUnavailable {
                waited: self.settings.branch_wait_timeout,
            }));
        }

        self.platform
            .branch_environment(project, production_branch, branch)
            .await?;
        match self.platform.get_environment(project, branch).await? {
            Some(environment) => {
                info!(project = %project, branch, "created update branch");
                Ok(Readiness::Ready {
                    environment,
                    transition: Transition::Branched,
                })
            }
            None => Ok(Readiness::Unavailable(Guard::BranchNotVisible {
                branch: branch.to_owned(),
            })),
        }
    }

    /// Poll production until it offers the branch operation. Each probe
    /// fetches production again.
    async fn await_branch_operation(&self, project: &RemoteProjectId) -> Result<bool, PlatformError> {
        let failure: Mutex<Option<PlatformError>> = Mutex::new(None);
        let platform = &self.platform;
        let production_branch = self.settings.production_branch.as_str();
        let failure_slot = &failure;
        let outcome = poll_until(
            move || async move {
                match platform.get_environment(project, production_branch).await {
                    Ok(Some(env)) if env.operation_available(OPERATION_BRANCH) => Probe::Ready,
                    Ok(_) => Probe::Pending,
                    Err(err) => {
                        *failure_slot.lock() = Some(err);
                        Probe::Abandon
                    }
                }
            },
            self.settings.branch_poll_interval,
            self.settings.branch_wait_timeout,
        )
        .await;
        match outcome {
            PollOutcome::Ready => Ok(true),
            PollOutcome::TimedOut => Ok(false),
            PollOutcome::Abandoned => match failure.into_inner() {
                Some(err) => Err(err),
                None => Ok(false),
            },
        }
    }

    async fn ready(
        &self,
        project: &RemoteProjectId,
        branch: &str,
        previous: RemoteEnvironment,
        transition: Transition,
    ) -> Result<Readiness, PlatformError> {
        let environment = self
            .platform
            .get_environment(project, branch)
            .await?
            .unwrap_or(previous);
        Ok(Readiness::Ready {
            environment,
            transition,
        })
    }
}
