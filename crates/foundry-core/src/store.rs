//! ---
//! fdy_section: "03-persistence-logging"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Persisted archetypes and projects.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::{
    Archetype, ArchetypeId, NewArchetype, Project, ProjectId, ProvisionedProject,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: u64 },
    #[error("store file {path} could not be accessed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find_project(&self, id: ProjectId) -> Result<Option<Project>>;
    async fn find_archetype(&self, id: ArchetypeId) -> Result<Option<Archetype>>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn list_archetypes(&self) -> Result<Vec<Archetype>>;
    async fn projects_for_archetype(&self, id: ArchetypeId) -> Result<Vec<Project>>;
    /// Commit a provisioned project. Fails if its archetype does not exist.
    async fn insert_project(&self, project: ProvisionedProject) -> Result<Project>;
    async fn update_project(&self, project: &Project) -> Result<()>;
    /// Remove a project, returning it if it existed.
    async fn remove_project(&self, id: ProjectId) -> Result<Option<Project>>;
    async fn insert_archetype(&self, archetype: NewArchetype) -> Result<Archetype>;
    async fn update_archetype(&self, archetype: &Archetype) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    next_archetype_id: u64,
    next_project_id: u64,
    archetypes: IndexMap<u64, Archetype>,
    projects: IndexMap<u64, Project>,
}

impl Snapshot {
    fn project(&self, id: ProjectId) -> Option<Project> {
        self.projects.get(&id.0).cloned()
    }

    fn archetype(&self, id: ArchetypeId) -> Option<Archetype> {
        self.archetypes.get(&id.0).cloned()
    }

    fn projects_for(&self, id: ArchetypeId) -> Vec<Project> {
        self.projects
            .values()
            .filter(|project| project.archetype_id == id)
            .cloned()
            .collect()
    }

    fn insert_project(&mut self, project: ProvisionedProject) -> Result<Project> {
        let archetype = project.project.archetype_id;
        if !self.archetypes.contains_key(&archetype.0) {
            return Err(StoreError::NotFound {
                kind: "archetype",
                id: archetype.0,
            });
        }
        self.next_project_id += 1;
        let project = project.with_id(ProjectId(self.next_project_id));
        self.projects.insert(project.id.0, project.clone());
        Ok(project)
    }

    fn update_project(&mut self, project: &Project) -> Result<()> {
        match self.projects.get_mut(&project.id.0) {
            Some(slot) => {
                *slot = project.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "project",
                id: project.id.0,
            }),
        }
    }

    fn remove_project(&mut self, id: ProjectId) -> Option<Project> {
        self.projects.shift_remove(&id.0)
    }

    fn insert_archetype(&mut self, archetype: NewArchetype) -> Archetype {
        self.next_archetype_id += 1;
        let archetype = archetype.with_id(ArchetypeId(self.next_archetype_id));
        self.archetypes.insert(archetype.id.0, archetype.clone());
        archetype
    }

    fn update_archetype(&mut self, archetype: &Archetype) -> Result<()> {
        match self.archetypes.get_mut(&archetype.id.0) {
            Some(slot) => {
                *slot = archetype.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "archetype",
                id: archetype.id.0,
            }),
        }
    }
}

/// Volatile store for tests and simulation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn find_project(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.state.read().project(id))
    }

    async fn find_archetype(&self, id: ArchetypeId) -> Result<Option<Archetype>> {
        Ok(self.state.read().archetype(id))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.state.read().projects.values().cloned().collect())
    }

    async fn list_archetypes(&self) -> Result<Vec<Archetype>> {
        Ok(self.state.read().archetypes.values().cloned().collect())
    }

    async fn projects_for_archetype(&self, id: ArchetypeId) -> Result<Vec<Project>> {
        Ok(self.state.read().projects_for(id))
    }

    async fn insert_project(&self, project: ProvisionedProject) -> Result<Project> {
        self.state.write().insert_project(project)
    }

    async fn update_project(&self, project: &Project) -> Result<()> {
        self.state.write().update_project(project)
    }

    async fn remove_project(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.state.write().remove_project(id))
    }

    async fn insert_archetype(&self, archetype: NewArchetype) -> Result<Archetype> {
        Ok(self.state.write().insert_archetype(archetype))
    }

    async fn update_archetype(&self, archetype: &Archetype) -> Result<()> {
        self.state.write().update_archetype(archetype)
    }
}

/// Store persisted as one JSON document, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<Snapshot>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Snapshot::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self {
            path,
            state: Mutex::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| io_err(io::Error::new(io::ErrorKind::InvalidData, err)))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        debug!(path = %self.path.display(), projects = snapshot.projects.len(), "store persisted");
        Ok(())
    }

    /// Apply `change` to a copy of the state and keep it only if it persisted.
    async fn mutate<T>(&self, change: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let value = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(value)
    }
}

#[async_trait]
impl ProjectStore for JsonFileStore {
    async fn find_project(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.state.lock().await.project(id))
    }

    async fn find_archetype(&self, id: ArchetypeId) -> Result<Option<Archetype>> {
        Ok(self.state.lock().await.archetype(id))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.state.lock().await.projects.values().cloned().collect())
    }

    async fn list_archetypes(&self) -> Result<Vec<Archetype>> {
        Ok(self.state.lock().await.archetypes.values().cloned().collect())
    }

    async fn projects_for_archetype(&self, id: ArchetypeId) -> Result<Vec<Project>> {
        Ok(self.state.lock().await.projects_for(id))
    }

    async fn insert_project(&self, project: ProvisionedProject) -> Result<Project> {
        self.mutate(|s| s.insert_project(project)).await
    }

    async fn update_project(&self, project: &Project) -> Result<()> {
        self.mutate(|s| s.update_project(project)).await
    }

    async fn remove_project(&self, id: ProjectId) -> Result<Option<Project>> {
        self.mutate(|s| Ok(s.remove_project(id))).await
    }

    async fn insert_archetype(&self, archetype: NewArchetype) -> Result<Archetype> {
        self.mutate(|s| Ok(s.insert_archetype(archetype))).await
    }

    async fn update_archetype(&self, archetype: &Archetype) -> Result<()> {
        self.mutate(|s| s.update_archetype(archetype)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewProject, RemoteProjectId};

    fn archetype() -> NewArchetype {
        NewArchetype {
            name: "shop".into(),
            source_repository_uri: "https://github.com/acme/shop.git".into(),
            update_branch: "update".into(),
            update_operation: "run-update".into(),
        }
    }

    fn provisioned(archetype_id: ArchetypeId, remote: &str) -> ProvisionedProject {
        ProvisionedProject {
            project: NewProject {
                title: format!("Project {remote}"),
                archetype_id,
                region: "eu-3.platform.sh".into(),
            },
            remote_project_id: RemoteProjectId::new(remote),
        }
    }

    async fn exercise(store: &dyn ProjectStore) {
        let shop = store.insert_archetype(archetype()).await.unwrap();
        let blog = store
            .insert_archetype(NewArchetype {
                name: "blog".into(),
                ..archetype()
            })
            .await
            .unwrap();
        assert_ne!(shop.id, blog.id);

        let a = store.insert_project(provisioned(shop.id, "a")).await.unwrap();
        let b = store.insert_project(provisioned(blog.id, "b")).await.unwrap();
        let c = store.insert_project(provisioned(shop.id, "c")).await.unwrap();
        assert_eq!(
            store.projects_for_archetype(shop.id).await.unwrap(),
            vec![a.clone(), c.clone()]
        );

        let renamed = Project {
            title: "Renamed".into(),
            ..b.clone()
        };
        store.update_project(&renamed).await.unwrap();
        assert_eq!(store.find_project(b.id).await.unwrap(), Some(renamed));

        assert_eq!(store.remove_project(a.id).await.unwrap(), Some(a.clone()));
        assert_eq!(store.remove_project(a.id).await.unwrap(), None);
        assert_eq!(store.list_projects().await.unwrap().len(), 2);

        let orphan = store
            .insert_project(provisioned(ArchetypeId(999), "z"))
            .await
            .unwrap_err();
        assert!(matches!(orphan, StoreError::NotFound { kind: "archetype", .. }));
        let missing = store.update_project(&a).await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { kind: "project", .. }));
    }

    #[tokio::test]
    async fn memory_store_semantics() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn json_store_semantics_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        exercise(&store).await;
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_projects().await.unwrap().len(), 2);
        assert_eq!(reopened.list_archetypes().await.unwrap().len(), 2);
        // Ids keep counting after a reload.
        let next = reopened.insert_archetype(archetype()).await.unwrap();
        assert_eq!(next.id, ArchetypeId(3));
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let err = JsonFileStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
