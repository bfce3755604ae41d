//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Asynchronous lifecycle commands and their transport envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ArchetypeId, ProjectId, RemoteProjectId};

/// Addresses a locally stored project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub project_id: ProjectId,
}

/// Addresses a remote project together with the archetype it was made from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBinding {
    pub archetype_id: ArchetypeId,
    pub remote_project_id: RemoteProjectId,
}

/// Addresses a remote project only; used once the local row may be gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    pub remote_project_id: RemoteProjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    SetProjectVariables(RemoteBinding),
    InitializeProjectCode(RemoteBinding),
    SynchronizeProject(ProjectRef),
    UpdateProject(ProjectRef),
    MergeUpdateProject(ProjectRef),
    BackupProduction(ProjectRef),
    DeleteProject(RemoteRef),
}

impl Command {
    /// Stable snake_case name, used for logs and metric labels.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn set_variables(archetype_id: ArchetypeId, remote_project_id: RemoteProjectId) -> Self {
        Command::SetProjectVariables(RemoteBinding {
            archetype_id,
            remote_project_id,
        })
    }

    pub fn initialize_code(archetype_id: ArchetypeId, remote_project_id: RemoteProjectId) -> Self {
        Command::InitializeProjectCode(RemoteBinding {
            archetype_id,
            remote_project_id,
        })
    }

    pub fn synchronize(project_id: ProjectId) -> Self {
        Command::SynchronizeProject(ProjectRef { project_id })
    }

    pub fn update(project_id: ProjectId) -> Self {
        Command::UpdateProject(ProjectRef { project_id })
    }

    pub fn merge_update(project_id: ProjectId) -> Self {
        Command::MergeUpdateProject(ProjectRef { project_id })
    }

    pub fn backup(project_id: ProjectId) -> Self {
        Command::BackupProduction(ProjectRef { project_id })
    }

    pub fn delete(remote_project_id: RemoteProjectId) -> Self {
        Command::DeleteProject(RemoteRef { remote_project_id })
    }
}

/// A command in transit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub command: Command,
}

impl Envelope {
    pub fn new(command: Command) -> Self {
        Self {
            id: Uuid::new_v4(),
            issued_at: Utc::now(),
            command,
        }
    }
}
