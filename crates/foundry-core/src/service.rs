//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Administrative actions and the commands they trigger.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bus::{BusError, CommandBus};
use crate::command::Command;
use crate::model::{Archetype, ArchetypeId, NewArchetype, NewProject, Project, ProjectId};
use crate::provisioning::{ProvisionError, Provisioner};
use crate::store::{ProjectStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: u64 },
    #[error("invalid {field}: must not be empty")]
    Empty { field: &'static str },
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

fn require(field: &'static str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        Err(ServiceError::Empty { field })
    } else {
        Ok(())
    }
}

#[derive(Clone)]
pub struct ProjectService {
    store: Arc<dyn ProjectStore>,
    bus: Arc<dyn CommandBus>,
    provisioner: Provisioner,
}

impl ProjectService {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        bus: Arc<dyn CommandBus>,
        provisioner: Provisioner,
    ) -> Self {
        Self {
            store,
            bus,
            provisioner,
        }
    }

    pub async fn add_archetype(&self, archetype: NewArchetype) -> Result<Archetype, ServiceError> {
        require("name", &archetype.name)?;
        require("source_repository_uri", &archetype.source_repository_uri)?;
        require("update_branch", &archetype.update_branch)?;
        require("update_operation", &archetype.update_operation)?;
        let archetype = self.store.insert_archetype(archetype).await?;
        info!(archetype = %archetype.id, name = %archetype.name, "archetype added");
        Ok(archetype)
    }

    /// Persist archetype changes and propagate them to every project built
    /// from it. Returns the number of affected projects.
    pub async fn update_archetype(&self, archetype: Archetype) -> Result<usize, ServiceError> {
        require("name", &archetype.name)?;
        require("source_repository_uri", &archetype.source_repository_uri)?;
        require("update_branch", &archetype.update_branch)?;
        require("update_operation", &archetype.update_operation)?;
        self.store
            .update_archetype(&archetype)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { kind, id } => ServiceError::NotFound { kind, id },
                other => other.into(),
            })?;
        let projects = self.store.projects_for_archetype(archetype.id).await?;
        for project in &projects {
            self.bus.dispatch(Command::synchronize(project.id)).await?;
            self.bus
                .dispatch(Command::set_variables(
                    archetype.id,
                    project.remote_project_id.clone(),
                ))
                .await?;
        }
        info!(archetype = %archetype.id, projects = projects.len(), "archetype updated");
        Ok(projects.len())
    }

    pub async fn create_project(&self, project: NewProject) -> Result<Project, ServiceError> {
        require("title", &project.title)?;
        require("region", &project.region)?;
        Ok(self.provisioner.provision(project).await?)
    }

    pub async fn rename_project(
        &self,
        id: ProjectId,
        title: impl Into<String>,
    ) -> Result<Project, ServiceError> {
        let title = title.into();
        require("title", &title)?;
        let mut project = self.project(id).await?;
        project.title = title;
        self.store.update_project(&project).await?;
        self.bus.dispatch(Command::synchronize(project.id)).await?;
        info!(project = %project.id, title = %project.title, "project renamed");
        Ok(project)
    }

    /// Remove the local project and queue deletion of its remote project.
    pub async fn delete_project(&self, id: ProjectId) -> Result<Project, ServiceError> {
        let project = self
            .store
            .remove_project(id)
            .await?
            .ok_or(ServiceError::NotFound {
                kind: "project",
                id: id.0,
            })?;
        self.bus
            .dispatch(Command::delete(project.remote_project_id.clone()))
            .await?;
        info!(project = %project.id, remote = %project.remote_project_id, "project deleted locally");
        Ok(project)
    }

    pub async fn request_update(&self, ids: &[ProjectId]) -> Result<usize, ServiceError> {
        self.dispatch_each(ids, Command::update).await
    }

    pub async fn request_merge(&self, ids: &[ProjectId]) -> Result<usize, ServiceError> {
        self.dispatch_each(ids, Command::merge_update).await
    }

    pub async fn request_backup(&self, ids: &[ProjectId]) -> Result<usize, ServiceError> {
        self.dispatch_each(ids, Command::backup).await
    }

    /// Queue an update for every project.
    pub async fn schedule_updates(&self) -> Result<usize, ServiceError> {
        let projects = self.store.list_projects().await?;
        for project in &projects {
            self.bus.dispatch(Command::update(project.id)).await?;
        }
        info!(projects = projects.len(), "scheduled updates queued");
        Ok(projects.len())
    }

    pub async fn project(&self, id: ProjectId) -> Result<Project, ServiceError> {
        self.store
            .find_project(id)
            .await?
            .ok_or(ServiceError::NotFound {
                kind: "project",
                id: id.0,
            })
    }

    pub async fn projects(&self) -> Result<Vec<Project>, ServiceError> {
        Ok(self.store.list_projects().await?)
    }

    pub async fn archetype(&self, id: ArchetypeId) -> Result<Archetype, ServiceError> {
        self.store
            .find_archetype(id)
            .await?
            .ok_or(ServiceError::NotFound {
                kind: "archetype",
                id: id.0,
            })
    }

    pub async fn archetypes(&self) -> Result<Vec<Archetype>, ServiceError> {
        Ok(self.store.list_archetypes().await?)
    }

    async fn dispatch_each(
        &self,
        ids: &[ProjectId],
        command: fn(ProjectId) -> Command,
    ) -> Result<usize, ServiceError> {
        let mut queued = 0;
        for &id in ids {
            if self.store.find_project(id).await?.is_none() {
                warn!(project = %id, "unknown project skipped");
                continue;
            }
            self.bus.dispatch(command(id)).await?;
            queued += 1;
        }
        Ok(queued)
    }
}
