//! ---
//! fdy_section: "05-networking-external-interfaces"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Remote platform adapter and resource model."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! In-memory platform used by simulation mode and the test suites.
//!
//! Mutations are applied immediately and recorded as [`PlatformCall`]s so
//! callers can assert on the exact sequence of remote side effects.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    AccountInfo, Activity, EnvironmentStatus, InitializeRequest, PlatformClient, PlatformError,
    ProjectUpdate, Region, RemoteEnvironment, RemoteProject, RemoteProjectId, Result,
    Subscription, SubscriptionRequest, SubscriptionStatus, SyncOptions, LOCAL_DEPLOYMENT_TARGET,
    OPERATION_BRANCH, OPERATION_MERGE,
};

const PRODUCTION_OPERATIONS: &[&str] = &["backup", OPERATION_BRANCH, "initialize"];
const CHILD_OPERATIONS: &[&str] = &["backup", OPERATION_BRANCH, OPERATION_MERGE, "synchronize"];

/// A mutation received by [`SimulatedPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PlatformCall {
    CreateSubscription {
        region: String,
        plan: String,
        title: String,
    },
    DeleteSubscription {
        id: String,
    },
    UpdateProject {
        project: RemoteProjectId,
        title: Option<String>,
    },
    SetVariable {
        project: RemoteProjectId,
        name: String,
        value: String,
    },
    Activate {
        project: RemoteProjectId,
        branch: String,
    },
    Synchronize {
        project: RemoteProjectId,
        branch: String,
        options: SyncOptions,
    },
    Branch {
        project: RemoteProjectId,
        parent: String,
        branch: String,
    },
    Merge {
        project: RemoteProjectId,
        branch: String,
    },
    Backup {
        project: RemoteProjectId,
        branch: String,
    },
    SourceOperation {
        project: RemoteProjectId,
        branch: String,
        operation: String,
    },
    Initialize {
        project: RemoteProjectId,
        branch: String,
        profile: String,
        repository: String,
    },
}

#[derive(Debug)]
struct SimProject {
    remote: RemoteProject,
    environments: BTreeMap<String, RemoteEnvironment>,
    variables: BTreeMap<String, String>,
    activities: Vec<(String, Activity)>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    subscriptions: HashMap<String, Subscription>,
    pending_titles: HashMap<String, SubscriptionRequest>,
    projects: BTreeMap<RemoteProjectId, SimProject>,
    calls: Vec<PlatformCall>,
    fail_next_subscription: Option<SubscriptionStatus>,
    held_operations: HashMap<(RemoteProjectId, String), usize>,
    rejected_operations: HashSet<String>,
    regions: Vec<Region>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn project_mut(&mut self, id: &RemoteProjectId) -> Result<&mut SimProject> {
        self.projects.get_mut(id).ok_or_else(|| PlatformError::NotFound {
            resource: "project",
            id: id.to_string(),
        })
    }

    fn check_rejection(&self, operation: &str) -> Result<()> {
        if self.rejected_operations.contains(operation) {
            return Err(PlatformError::Rejected {
                operation: operation.to_owned(),
                reason: "rejected by simulation".into(),
            });
        }
        Ok(())
    }

    fn log_activity(&mut self, id: &RemoteProjectId, branch: &str, kind: &str) {
        let seq = self.next_id();
        if let Some(project) = self.projects.get_mut(id) {
            project.activities.push((
                branch.to_owned(),
                Activity {
                    id: format!("act-{seq}"),
                    kind: format!("environment.{kind}"),
                    state: "complete".into(),
                    result: Some("success".into()),
                    created_at: Utc::now(),
                    description: Some(format!("{kind} on {branch}")),
                },
            ));
        }
    }
}

fn environment_mut<'a>(
    project: &'a mut SimProject,
    branch: &str,
) -> Result<&'a mut RemoteEnvironment> {
    let id = project.remote.id.to_string();
    project
        .environments
        .get_mut(branch)
        .ok_or_else(|| PlatformError::NotFound {
            resource: "environment",
            id: format!("{id}/{branch}"),
        })
}

fn require_operation(env: &RemoteEnvironment, operation: &str) -> Result<()> {
    if env.operation_available(operation) {
        Ok(())
    } else {
        Err(PlatformError::Rejected {
            operation: operation.to_owned(),
            reason: format!("not available on {} ({})", env.id, env.status),
        })
    }
}

fn production_environment(branch: &str, has_code: bool) -> RemoteEnvironment {
    let operations = PRODUCTION_OPERATIONS
        .iter()
        .filter(|op| !(has_code && **op == "initialize"))
        .map(|op| op.to_string())
        .collect();
    RemoteEnvironment {
        id: branch.to_owned(),
        name: branch.to_owned(),
        status: EnvironmentStatus::Active,
        deployment_target: LOCAL_DEPLOYMENT_TARGET.to_owned(),
        has_code,
        operations,
    }
}

fn child_environment(branch: &str) -> RemoteEnvironment {
    RemoteEnvironment {
        id: branch.to_owned(),
        name: branch.to_owned(),
        status: EnvironmentStatus::Active,
        deployment_target: LOCAL_DEPLOYMENT_TARGET.to_owned(),
        has_code: true,
        operations: CHILD_OPERATIONS.iter().map(|op| op.to_string()).collect(),
    }
}

fn default_regions() -> Vec<Region> {
    let region = |id: &str, label: &str, available, private| Region {
        id: id.to_owned(),
        label: label.to_owned(),
        available,
        private,
    };
    vec![
        region("eu-3.platform.sh", "Europe (Ireland)", true, false),
        region("us-2.platform.sh", "United States (Oregon)", true, false),
        region("ca-1.platform.sh", "Canada (dedicated)", true, true),
        region("au.platform.sh", "Australia (retired)", false, false),
    ]
}

/// In-memory [`PlatformClient`].
#[derive(Debug)]
pub struct SimulatedPlatform {
    production_branch: String,
    state: Mutex<State>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    /// Simulator whose projects use `master` as production branch.
    pub fn new() -> Self {
        Self::with_production_branch("master")
    }

    /// Simulator whose new projects start with the given production branch.
    pub fn with_production_branch(branch: impl Into<String>) -> Self {
        let state = State {
            regions: default_regions(),
            ..State::default()
        };
        Self {
            production_branch: branch.into(),
            state: Mutex::new(state),
        }
    }

    /// Register an already provisioned project whose production branch holds code.
    pub fn seed_project(&self, title: &str) -> RemoteProjectId {
        let mut state = self.state.lock();
        let n = state.next_id();
        let id = RemoteProjectId::new(format!("proj{n:04}"));
        let subscription_id = format!("sub-{n}");
        state.subscriptions.insert(
            subscription_id.clone(),
            Subscription {
                id: subscription_id.clone(),
                status: SubscriptionStatus::Active,
                plan: crate::PLAN_DEVELOPMENT.to_owned(),
                project_id: Some(id.clone()),
            },
        );
        let project = self.build_project(&id, title, "eu-3.platform.sh", &subscription_id, true);
        state.projects.insert(id.clone(), project);
        id
    }

    fn build_project(
        &self,
        id: &RemoteProjectId,
        title: &str,
        region: &str,
        subscription_id: &str,
        has_code: bool,
    ) -> SimProject {
        let mut environments = BTreeMap::new();
        environments.insert(
            self.production_branch.clone(),
            production_environment(&self.production_branch, has_code),
        );
        SimProject {
            remote: RemoteProject {
                id: id.clone(),
                title: title.to_owned(),
                region: region.to_owned(),
                subscription_id: subscription_id.to_owned(),
                git_url: format!("{id}@git.{region}:{id}.git"),
                ui_url: Some(format!("https://console.sim.invalid/projects/{id}")),
            },
            environments,
            variables: BTreeMap::new(),
            activities: Vec::new(),
        }
    }

    /// Replace (or add) an environment of a project.
    pub fn set_environment(&self, id: &RemoteProjectId, environment: RemoteEnvironment) {
        let mut state = self.state.lock();
        if let Some(project) = state.projects.get_mut(id) {
            project
                .environments
                .insert(environment.id.clone(), environment);
        }
    }

    /// Drop an environment of a project.
    pub fn remove_environment(&self, id: &RemoteProjectId, branch: &str) {
        let mut state = self.state.lock();
        if let Some(project) = state.projects.get_mut(id) {
            project.environments.remove(branch);
        }
    }

    /// Forget a project as if it had been deleted out of band.
    pub fn remove_project(&self, id: &RemoteProjectId) {
        self.state.lock().projects.remove(id);
    }

    /// Drop a subscription without touching the project it provisioned.
    pub fn remove_subscription(&self, id: &str) {
        self.state.lock().subscriptions.remove(id);
    }

    /// Make the next [`PlatformClient::wait_for_subscription`] end in `status`.
    pub fn fail_next_subscription(&self, status: SubscriptionStatus) {
        self.state.lock().fail_next_subscription = Some(status);
    }

    /// Hide `operation` from the next `probes` environment lookups of `id`.
    pub fn hold_operation(&self, id: &RemoteProjectId, operation: &str, probes: usize) {
        self.state
            .lock()
            .held_operations
            .insert((id.clone(), operation.to_owned()), probes);
    }

    /// Reject every future invocation of `operation`.
    pub fn reject_operation(&self, operation: &str) {
        self.state
            .lock()
            .rejected_operations
            .insert(operation.to_owned());
    }

    /// Mutations received so far, oldest first.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    /// Forget the recorded mutations.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Project-level variables of `id`.
    pub fn variables(&self, id: &RemoteProjectId) -> BTreeMap<String, String> {
        self.state
            .lock()
            .projects
            .get(id)
            .map(|project| project.variables.clone())
            .unwrap_or_default()
    }

    /// Current state of an environment, without consuming held operations.
    pub fn environment(&self, id: &RemoteProjectId, branch: &str) -> Option<RemoteEnvironment> {
        self.state
            .lock()
            .projects
            .get(id)
            .and_then(|project| project.environments.get(branch).cloned())
    }

    /// Identifiers of every live project.
    pub fn project_ids(&self) -> Vec<RemoteProjectId> {
        self.state.lock().projects.keys().cloned().collect()
    }
}

#[async_trait]
impl PlatformClient for SimulatedPlatform {
    async fn create_subscription(&self, request: &SubscriptionRequest) -> Result<Subscription> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::CreateSubscription {
            region: request.region.clone(),
            plan: request.plan.clone(),
            title: request.title.clone(),
        });
        let n = state.next_id();
        let subscription = Subscription {
            id: format!("sub-{n}"),
            status: SubscriptionStatus::Requested,
            plan: request.plan.clone(),
            project_id: None,
        };
        state
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        state
            .pending_titles
            .insert(subscription.id.clone(), request.clone());
        Ok(subscription)
    }

    async fn wait_for_subscription(&self, subscription: Subscription) -> Result<Subscription> {
        let mut state = self.state.lock();
        if let Some(status) = state.fail_next_subscription.take() {
            if let Some(stored) = state.subscriptions.get_mut(&subscription.id) {
                stored.status = status;
            }
            return Err(PlatformError::SubscriptionFailed {
                id: subscription.id,
                status,
            });
        }
        let request = state
            .pending_titles
            .remove(&subscription.id)
            .ok_or_else(|| PlatformError::NotFound {
                resource: "subscription",
                id: subscription.id.clone(),
            })?;
        let n = state.next_id();
        let id = RemoteProjectId::new(format!("proj{n:04}"));
        let project = self.build_project(&id, &request.title, &request.region, &subscription.id, false);
        state.projects.insert(id.clone(), project);
        let stored = state
            .subscriptions
            .get_mut(&subscription.id)
            .ok_or_else(|| PlatformError::NotFound {
                resource: "subscription",
                id: subscription.id.clone(),
            })?;
        stored.status = SubscriptionStatus::Active;
        stored.project_id = Some(id.clone());
        debug!(subscription = %subscription.id, project = %id, "simulated subscription active");
        Ok(stored.clone())
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(self.state.lock().subscriptions.get(id).cloned())
    }

    async fn delete_subscription(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::DeleteSubscription { id: id.to_owned() });
        let Some(subscription) = state.subscriptions.remove(id) else {
            return Ok(false);
        };
        if let Some(project) = subscription.project_id {
            state.projects.remove(&project);
        }
        Ok(true)
    }

    async fn get_project(&self, id: &RemoteProjectId) -> Result<Option<RemoteProject>> {
        Ok(self
            .state
            .lock()
            .projects
            .get(id)
            .map(|project| project.remote.clone()))
    }

    async fn update_project(&self, id: &RemoteProjectId, update: &ProjectUpdate) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::UpdateProject {
            project: id.clone(),
            title: update.title.clone(),
        });
        let project = state.project_mut(id)?;
        if let Some(title) = &update.title {
            project.remote.title = title.clone();
        }
        Ok(())
    }

    async fn set_variable(&self, id: &RemoteProjectId, name: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::SetVariable {
            project: id.clone(),
            name: name.to_owned(),
            value: value.to_owned(),
        });
        state
            .project_mut(id)?
            .variables
            .insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    async fn get_environment(
        &self,
        id: &RemoteProjectId,
        branch: &str,
    ) -> Result<Option<RemoteEnvironment>> {
        let mut state = self.state.lock();
        let Some(mut env) = state
            .projects
            .get(id)
            .and_then(|project| project.environments.get(branch).cloned())
        else {
            return Ok(None);
        };
        for ((project, operation), remaining) in state.held_operations.iter_mut() {
            if project == id && *remaining > 0 {
                *remaining -= 1;
                env.operations.retain(|op| op != operation);
            }
        }
        Ok(Some(env))
    }

    async fn activate_environment(&self, id: &RemoteProjectId, branch: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::Activate {
            project: id.clone(),
            branch: branch.to_owned(),
        });
        state.check_rejection("activate")?;
        environment_mut(state.project_mut(id)?, branch)?.status = EnvironmentStatus::Active;
        state.log_activity(id, branch, "activate");
        Ok(())
    }

    async fn synchronize_environment(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        options: SyncOptions,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::Synchronize {
            project: id.clone(),
            branch: branch.to_owned(),
            options,
        });
        state.check_rejection("synchronize")?;
        let env = environment_mut(state.project_mut(id)?, branch)?;
        require_operation(env, "synchronize")?;
        state.log_activity(id, branch, "synchronize");
        Ok(())
    }

    async fn branch_environment(
        &self,
        id: &RemoteProjectId,
        parent: &str,
        new_branch: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::Branch {
            project: id.clone(),
            parent: parent.to_owned(),
            branch: new_branch.to_owned(),
        });
        state.check_rejection(OPERATION_BRANCH)?;
        let project = state.project_mut(id)?;
        require_operation(environment_mut(project, parent)?, OPERATION_BRANCH)?;
        if project.environments.contains_key(new_branch) {
            return Err(PlatformError::Rejected {
                operation: OPERATION_BRANCH.into(),
                reason: format!("environment {new_branch} already exists"),
            });
        }
        project
            .environments
            .insert(new_branch.to_owned(), child_environment(new_branch));
        state.log_activity(id, parent, "branch");
        Ok(())
    }

    async fn merge_environment(&self, id: &RemoteProjectId, branch: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::Merge {
            project: id.clone(),
            branch: branch.to_owned(),
        });
        state.check_rejection(OPERATION_MERGE)?;
        let env = environment_mut(state.project_mut(id)?, branch)?;
        if !env.is_active() {
            return Err(PlatformError::Rejected {
                operation: OPERATION_MERGE.into(),
                reason: format!("environment {branch} is {}", env.status),
            });
        }
        require_operation(env, OPERATION_MERGE)?;
        state.log_activity(id, branch, "merge");
        Ok(())
    }

    async fn backup_environment(&self, id: &RemoteProjectId, branch: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::Backup {
            project: id.clone(),
            branch: branch.to_owned(),
        });
        state.check_rejection("backup")?;
        environment_mut(state.project_mut(id)?, branch)?;
        state.log_activity(id, branch, "backup");
        Ok(())
    }

    async fn run_source_operation(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        operation: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::SourceOperation {
            project: id.clone(),
            branch: branch.to_owned(),
            operation: operation.to_owned(),
        });
        state.check_rejection("source-operation")?;
        environment_mut(state.project_mut(id)?, branch)?;
        state.log_activity(id, branch, "source_operation");
        Ok(())
    }

    async fn initialize_environment(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        request: &InitializeRequest,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::Initialize {
            project: id.clone(),
            branch: branch.to_owned(),
            profile: request.profile.clone(),
            repository: request.repository.clone(),
        });
        state.check_rejection("initialize")?;
        let env = environment_mut(state.project_mut(id)?, branch)?;
        if env.has_code {
            return Err(PlatformError::Rejected {
                operation: "initialize".into(),
                reason: format!("environment {branch} already has code"),
            });
        }
        env.has_code = true;
        env.operations.retain(|op| op != "initialize");
        state.log_activity(id, branch, "initialize");
        Ok(())
    }

    async fn environment_routes(
        &self,
        id: &RemoteProjectId,
        branch: &str,
    ) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        environment_mut(state.project_mut(id)?, branch)?;
        let host = if branch == self.production_branch {
            format!("{id}.sim.invalid")
        } else {
            format!("{branch}-{id}.sim.invalid")
        };
        Ok(vec![
            format!("https://{host}/"),
            format!("http://{host}/"),
        ])
    }

    async fn environment_activities(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        count: usize,
    ) -> Result<Vec<Activity>> {
        let mut state = self.state.lock();
        let project = state.project_mut(id)?;
        environment_mut(project, branch)?;
        Ok(project
            .activities
            .iter()
            .rev()
            .filter(|(on, _)| on == branch)
            .take(count)
            .map(|(_, activity)| activity.clone())
            .collect())
    }

    async fn regions(&self) -> Result<Vec<Region>> {
        Ok(self.state.lock().regions.clone())
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        Ok(AccountInfo {
            id: "sim-account".into(),
            username: "simulation".into(),
            email: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_provisions_uninitialized_project() {
        let sim = SimulatedPlatform::new();
        let pending = sim
            .create_subscription(&SubscriptionRequest::development("eu-3.platform.sh", "Shop"))
            .await
            .unwrap();
        assert!(pending.project_id.is_none());
        let active = sim.wait_for_subscription(pending).await.unwrap();
        let id = active.completed_project().cloned().expect("project id");
        let production = sim.get_environment(&id, "master").await.unwrap().unwrap();
        assert!(!production.has_code);
        assert!(production.is_local_target());
        let project = sim.get_project(&id).await.unwrap().unwrap();
        assert_eq!(project.title, "Shop");
        assert_eq!(project.subscription_id, active.id);
    }

    #[tokio::test]
    async fn failed_subscription_is_reported_once() {
        let sim = SimulatedPlatform::new();
        sim.fail_next_subscription(SubscriptionStatus::Failed);
        let pending = sim
            .create_subscription(&SubscriptionRequest::development("eu", "A"))
            .await
            .unwrap();
        let err = sim.wait_for_subscription(pending).await.unwrap_err();
        assert!(matches!(err, PlatformError::SubscriptionFailed { .. }));

        let pending = sim
            .create_subscription(&SubscriptionRequest::development("eu", "B"))
            .await
            .unwrap();
        assert!(sim.wait_for_subscription(pending).await.is_ok());
    }

    #[tokio::test]
    async fn branch_creates_active_child_with_merge() {
        let sim = SimulatedPlatform::new();
        let id = sim.seed_project("Demo");
        sim.branch_environment(&id, "master", "update").await.unwrap();
        let child = sim.environment(&id, "update").unwrap();
        assert!(child.is_active());
        assert!(child.operation_available(OPERATION_MERGE));
        let again = sim.branch_environment(&id, "master", "update").await;
        assert!(matches!(again, Err(PlatformError::Rejected { .. })));
    }

    #[tokio::test]
    async fn held_operations_expire_after_probes() {
        let sim = SimulatedPlatform::new();
        let id = sim.seed_project("Demo");
        sim.hold_operation(&id, OPERATION_BRANCH, 2);
        for _ in 0..2 {
            let env = sim.get_environment(&id, "master").await.unwrap().unwrap();
            assert!(!env.operation_available(OPERATION_BRANCH));
        }
        let env = sim.get_environment(&id, "master").await.unwrap().unwrap();
        assert!(env.operation_available(OPERATION_BRANCH));
    }

    #[tokio::test]
    async fn delete_subscription_removes_project_and_is_idempotent() {
        let sim = SimulatedPlatform::new();
        let id = sim.seed_project("Demo");
        let project = sim.get_project(&id).await.unwrap().unwrap();
        assert!(sim.delete_subscription(&project.subscription_id).await.unwrap());
        assert!(sim.get_project(&id).await.unwrap().is_none());
        assert!(!sim.delete_subscription(&project.subscription_id).await.unwrap());
    }

    #[tokio::test]
    async fn activities_are_newest_first_and_limited() {
        let sim = SimulatedPlatform::new();
        let id = sim.seed_project("Demo");
        for _ in 0..3 {
            sim.backup_environment(&id, "master").await.unwrap();
        }
        sim.run_source_operation(&id, "master", "run-update")
            .await
            .unwrap();
        let activities = sim.environment_activities(&id, "master", 2).await.unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].kind, "environment.source_operation");
        assert_eq!(activities[1].kind, "environment.backup");
    }

    #[tokio::test]
    async fn rejected_operations_are_still_recorded() {
        let sim = SimulatedPlatform::new();
        let id = sim.seed_project("Demo");
        sim.reject_operation("backup");
        assert!(sim.backup_environment(&id, "master").await.is_err());
        assert_eq!(
            sim.calls(),
            vec![PlatformCall::Backup {
                project: id,
                branch: "master".into()
            }]
        );
    }
}
