//! ---
//! fdy_section: "15-testing-qa-runbook"
//! fdy_subsection: "test"
//! fdy_type: "source"
//! fdy_scope: "test"
//! fdy_description: "Shared fixture for lifecycle integration tests."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use foundry_core::{
    ArchetypeId, CommandWorker, Components, HandlerSettings, MemoryStore, NewArchetype,
    NewProject, Project, ProjectStore, ProvisionedProject, ReadinessSettings, RemoteProjectId,
    Runtime,
};
use foundry_git::{CommandCapture, GitInvocation, GitMirror, ProcessRunner};
use foundry_platform::{PlatformCall, SimulatedPlatform};
use parking_lot::Mutex;
use tempfile::TempDir;

pub const UPDATE_BRANCH: &str = "update";
pub const UPDATE_OPERATION: &str = "run-update";
pub const SOURCE_URI: &str = "https://github.com/acme/shop-template.git";

/// Git runner that succeeds without touching the filesystem.
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<GitInvocation>>,
}

impl RecordingRunner {
    pub fn args(&self) -> Vec<Vec<String>> {
        self.invocations
            .lock()
            .iter()
            .map(|inv| inv.args.clone())
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, invocation: &GitInvocation) -> foundry_git::Result<CommandCapture> {
        self.invocations.lock().push(invocation.clone());
        Ok(CommandCapture {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

pub struct Fixture {
    pub sim: Arc<SimulatedPlatform>,
    pub store: Arc<dyn ProjectStore>,
    pub runtime: Runtime,
    pub worker: CommandWorker,
    pub git: Arc<RecordingRunner>,
    pub mirror_root: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(Arc::new(MemoryStore::new()), HandlerSettings::default())
    }

    pub fn with_settings(settings: HandlerSettings) -> Self {
        Self::build(Arc::new(MemoryStore::new()), settings)
    }

    pub fn with_store(store: Arc<dyn ProjectStore>) -> Self {
        Self::build(store, HandlerSettings::default())
    }

    fn build(store: Arc<dyn ProjectStore>, settings: HandlerSettings) -> Self {
        let sim = Arc::new(SimulatedPlatform::new());
        let git = Arc::new(RecordingRunner::default());
        let mirror_root = tempfile::tempdir().expect("mirror root");
        let mirror = GitMirror::new(mirror_root.path(), "git", None, git.clone());
        let (runtime, worker) = Runtime::assemble(Components {
            store: store.clone(),
            platform: sim.clone(),
            mirror: Arc::new(mirror),
            readiness: ReadinessSettings::default(),
            handlers: settings,
            concurrency: 4,
        });
        Self {
            sim,
            store,
            runtime,
            worker,
            git,
            mirror_root,
        }
    }

    pub async fn archetype(&self) -> ArchetypeId {
        self.runtime
            .service
            .add_archetype(NewArchetype {
                name: "shop".into(),
                source_repository_uri: SOURCE_URI.into(),
                update_branch: UPDATE_BRANCH.into(),
                update_operation: UPDATE_OPERATION.into(),
            })
            .await
            .expect("archetype stored")
            .id
    }

    /// A committed project backed by an initialized remote project.
    pub async fn project(&self, archetype_id: ArchetypeId) -> Project {
        let remote = self.sim.seed_project("Demo");
        self.commit(archetype_id, remote).await
    }

    /// A committed project whose remote id is arbitrary.
    pub async fn commit(&self, archetype_id: ArchetypeId, remote: RemoteProjectId) -> Project {
        self.store
            .insert_project(ProvisionedProject {
                project: NewProject {
                    title: "Demo".into(),
                    archetype_id,
                    region: "eu-3.platform.sh".into(),
                },
                remote_project_id: remote,
            })
            .await
            .expect("project stored")
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.sim.calls()
    }
}
