//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Locally persisted entities.

use std::fmt;

use serde::{Deserialize, Serialize};

pub use foundry_platform::RemoteProjectId;

macro_rules! local_id {
    ($name:ident, $label:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

local_id!(ArchetypeId, "archetype");
local_id!(ProjectId, "project");

/// A reusable project template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archetype {
    pub id: ArchetypeId,
    pub name: String,
    /// Upstream repository projects are seeded and updated from.
    pub source_repository_uri: String,
    /// Branch created in each project to stage updates.
    pub update_branch: String,
    /// Source operation that pulls upstream changes into the update branch.
    pub update_operation: String,
}

/// Fields of an archetype before it has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArchetype {
    pub name: String,
    pub source_repository_uri: String,
    pub update_branch: String,
    pub update_operation: String,
}

impl NewArchetype {
    pub fn with_id(self, id: ArchetypeId) -> Archetype {
        Archetype {
            id,
            name: self.name,
            source_repository_uri: self.source_repository_uri,
            update_branch: self.update_branch,
            update_operation: self.update_operation,
        }
    }
}

/// A project that has not been provisioned yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    pub archetype_id: ArchetypeId,
    pub region: String,
}

/// A [`NewProject`] together with the remote project provisioned for it.
///
/// The store only accepts this form, so a committed project always carries
/// its remote id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedProject {
    pub project: NewProject,
    pub remote_project_id: RemoteProjectId,
}

/// A committed project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub archetype_id: ArchetypeId,
    pub remote_project_id: RemoteProjectId,
    pub region: String,
}

impl ProvisionedProject {
    pub fn with_id(self, id: ProjectId) -> Project {
        Project {
            id,
            title: self.project.title,
            archetype_id: self.project.archetype_id,
            remote_project_id: self.remote_project_id,
            region: self.project.region,
        }
    }
}
