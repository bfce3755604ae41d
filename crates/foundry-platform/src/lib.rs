//! ---
//! fdy_section: "05-networking-external-interfaces"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Remote platform adapter and resource model."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Typed view of the remote platform-as-a-service.
//!
//! The platform owns projects, environments and subscriptions; Foundry only
//! holds their identifiers. Everything the orchestration layer needs goes
//! through [`PlatformClient`], implemented over HTTP by [`HttpPlatformClient`]
//! and in memory by [`SimulatedPlatform`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod http;
pub mod sim;

pub use http::HttpPlatformClient;
pub use sim::{PlatformCall, SimulatedPlatform};

/// Plan tier requested for every newly provisioned subscription.
pub const PLAN_DEVELOPMENT: &str = "development";

/// Deployment target of environments that support branching.
pub const LOCAL_DEPLOYMENT_TARGET: &str = "local";

/// Name of the environment operation that creates a child branch.
pub const OPERATION_BRANCH: &str = "branch";

/// Name of the environment operation that merges into the parent.
pub const OPERATION_MERGE: &str = "merge";

/// Shared result type for platform calls.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Errors raised by platform adapters.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Transport-level failure (connect, TLS, timeout, decoding).
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The platform answered with a non-success status.
    #[error("platform returned {status} for {method} {url}: {body}")]
    Status {
        /// HTTP method of the failed request.
        method: String,
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// A mutation targeted a resource the platform does not know.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Resource kind.
        resource: &'static str,
        /// Resource identifier.
        id: String,
    },
    /// A subscription ended in a terminal non-active state.
    #[error("subscription {id} ended in state {status}")]
    SubscriptionFailed {
        /// Subscription identifier.
        id: String,
        /// Terminal status reported by the platform.
        status: SubscriptionStatus,
    },
    /// A subscription did not become active within the provisioning window.
    #[error("subscription {id} still pending after {waited:?}")]
    SubscriptionTimeout {
        /// Subscription identifier.
        id: String,
        /// Time spent waiting.
        waited: Duration,
    },
    /// The platform refused an operation, for example because it is unavailable.
    #[error("operation {operation} rejected: {reason}")]
    Rejected {
        /// Operation name.
        operation: String,
        /// Reason given by the platform.
        reason: String,
    },
    /// The API base URL could not be combined with a resource path.
    #[error("invalid platform url: {0}")]
    Url(#[from] url::ParseError),
    /// The API token cannot be sent as an HTTP header.
    #[error("api token contains characters not allowed in an HTTP header")]
    InvalidToken,
}

impl PlatformError {
    /// True when the error means the target resource is gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            PlatformError::NotFound { .. } => true,
            PlatformError::Status { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Opaque identifier of a project on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteProjectId(String);

impl RemoteProjectId {
    /// Wrap a platform-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteProjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle state of a subscription.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Accepted, not yet provisioning.
    Requested,
    /// Provisioning in progress.
    Provisioning,
    /// Provisioned; the project id is available.
    Active,
    /// Provisioning failed.
    Failed,
    /// Suspended by the platform.
    Suspended,
    /// Deleted.
    Deleted,
    /// Any state this client does not know about.
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// True for states that will not change without outside intervention.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Failed | SubscriptionStatus::Suspended | SubscriptionStatus::Deleted
        )
    }
}

/// Parameters for a new subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// Region identifier.
    pub region: String,
    /// Plan tier.
    pub plan: String,
    /// Project title.
    pub title: String,
}

impl SubscriptionRequest {
    /// Request a development-tier subscription.
    pub fn development(region: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            plan: PLAN_DEVELOPMENT.to_owned(),
            title: title.into(),
        }
    }
}

/// Billing container wrapping a remote project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription identifier.
    pub id: String,
    /// Current lifecycle state.
    pub status: SubscriptionStatus,
    /// Plan tier, possibly padded by the platform.
    #[serde(default)]
    pub plan: String,
    /// Project created by the subscription, once provisioned.
    #[serde(default)]
    pub project_id: Option<RemoteProjectId>,
}

impl Subscription {
    /// The provisioned project id, when the subscription has completed.
    pub fn completed_project(&self) -> Option<&RemoteProjectId> {
        match self.status {
            SubscriptionStatus::Active => self.project_id.as_ref(),
            _ => None,
        }
    }
}

/// Read-only mirror of a remote project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProject {
    /// Project identifier.
    pub id: RemoteProjectId,
    /// Title shown by the platform.
    pub title: String,
    /// Region the project lives in.
    #[serde(default)]
    pub region: String,
    /// Owning subscription.
    pub subscription_id: String,
    /// Git remote URL of the project's repository.
    pub git_url: String,
    /// Link to the platform console, when exposed.
    #[serde(default)]
    pub ui_url: Option<String>,
}

/// Runtime state of an environment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnvironmentStatus {
    /// Running.
    Active,
    /// Branch exists, nothing running.
    Inactive,
    /// An activity is in flight.
    Dirty,
    /// Paused for inactivity.
    Paused,
    /// Being removed.
    Deleting,
    /// Any state this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Read-only mirror of a remote environment (one per branch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEnvironment {
    /// Environment identifier, equal to the branch name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Runtime state.
    pub status: EnvironmentStatus,
    /// Where the environment is deployed (`local` for the shared grid).
    pub deployment_target: String,
    /// Whether the branch holds any commits.
    pub has_code: bool,
    /// Operations the platform currently allows on this environment.
    #[serde(default)]
    pub operations: Vec<String>,
}

impl RemoteEnvironment {
    /// True when the environment is running.
    pub fn is_active(&self) -> bool {
        self.status == EnvironmentStatus::Active
    }

    /// True when the named operation is currently offered.
    pub fn operation_available(&self, operation: &str) -> bool {
        self.operations.iter().any(|op| op == operation)
    }

    /// True when the environment is deployed on the shared grid.
    pub fn is_local_target(&self) -> bool {
        self.deployment_target == LOCAL_DEPLOYMENT_TARGET
    }
}

/// Which parts of the parent an environment synchronize copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncOptions {
    /// Copy code.
    pub code: bool,
    /// Copy data.
    pub data: bool,
}

impl SyncOptions {
    /// Synchronize both code and data.
    pub const ALL: SyncOptions = SyncOptions {
        code: true,
        data: true,
    };
}

/// Parameters for initializing an empty environment from a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializeRequest {
    /// Profile name shown by the platform.
    pub profile: String,
    /// Repository to seed from.
    pub repository: String,
}

/// Mutable project fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectUpdate {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// An entry in an environment's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity identifier.
    pub id: String,
    /// Activity type, e.g. `environment.backup`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Progress state, e.g. `complete`.
    pub state: String,
    /// Result once complete.
    #[serde(default)]
    pub result: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Human readable description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A region offered by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Region identifier.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Whether new projects may be placed there.
    pub available: bool,
    /// Whether the region is restricted to specific customers.
    pub private: bool,
}

impl Region {
    /// True for public regions accepting new projects.
    pub fn is_selectable(&self) -> bool {
        self.available && !self.private
    }
}

/// Identity behind the configured API token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account identifier.
    pub id: String,
    /// Login name.
    pub username: String,
    /// Contact address.
    #[serde(default)]
    pub email: Option<String>,
}

/// Operations the orchestration layer needs from the remote platform.
///
/// Lookups return `Ok(None)` for resources that do not exist; mutations on
/// missing resources fail with [`PlatformError::NotFound`] or a 404 status.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Request a new subscription. Returns immediately with a pending subscription.
    async fn create_subscription(&self, request: &SubscriptionRequest) -> Result<Subscription>;
    /// Block until the subscription is active and carries a project id.
    async fn wait_for_subscription(&self, subscription: Subscription) -> Result<Subscription>;
    /// Look up a subscription.
    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>>;
    /// Delete a subscription and its project. Returns `false` if it was already gone.
    async fn delete_subscription(&self, id: &str) -> Result<bool>;
    /// Look up a project.
    async fn get_project(&self, id: &RemoteProjectId) -> Result<Option<RemoteProject>>;
    /// Update mutable project fields.
    async fn update_project(&self, id: &RemoteProjectId, update: &ProjectUpdate) -> Result<()>;
    /// Create or overwrite a project-level variable.
    async fn set_variable(&self, id: &RemoteProjectId, name: &str, value: &str) -> Result<()>;
    /// Look up the environment of a branch.
    async fn get_environment(
        &self,
        id: &RemoteProjectId,
        branch: &str,
    ) -> Result<Option<RemoteEnvironment>>;
    /// Start an inactive environment.
    async fn activate_environment(&self, id: &RemoteProjectId, branch: &str) -> Result<()>;
    /// Copy code and/or data from the parent environment.
    async fn synchronize_environment(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        options: SyncOptions,
    ) -> Result<()>;
    /// Create `new_branch` as a child of `parent`.
    async fn branch_environment(
        &self,
        id: &RemoteProjectId,
        parent: &str,
        new_branch: &str,
    ) -> Result<()>;
    /// Merge the environment into its parent.
    async fn merge_environment(&self, id: &RemoteProjectId, branch: &str) -> Result<()>;
    /// Snapshot the environment.
    async fn backup_environment(&self, id: &RemoteProjectId, branch: &str) -> Result<()>;
    /// Run a named source operation defined by the project's code.
    async fn run_source_operation(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        operation: &str,
    ) -> Result<()>;
    /// Seed an empty environment from an external repository.
    async fn initialize_environment(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        request: &InitializeRequest,
    ) -> Result<()>;
    /// Public URLs routed to the environment.
    async fn environment_routes(&self, id: &RemoteProjectId, branch: &str)
        -> Result<Vec<String>>;
    /// Most recent activities of the environment, newest first.
    async fn environment_activities(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        count: usize,
    ) -> Result<Vec<Activity>>;
    /// Regions known to the platform.
    async fn regions(&self) -> Result<Vec<Region>>;
    /// Identity of the configured token.
    async fn account_info(&self) -> Result<AccountInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(status: EnvironmentStatus, operations: &[&str]) -> RemoteEnvironment {
        RemoteEnvironment {
            id: "update".into(),
            name: "update".into(),
            status,
            deployment_target: LOCAL_DEPLOYMENT_TARGET.into(),
            has_code: true,
            operations: operations.iter().map(|op| op.to_string()).collect(),
        }
    }

    #[test]
    fn environment_predicates() {
        let env = environment(EnvironmentStatus::Active, &[OPERATION_MERGE]);
        assert!(env.is_active());
        assert!(env.is_local_target());
        assert!(env.operation_available(OPERATION_MERGE));
        assert!(!env.operation_available(OPERATION_BRANCH));
        assert!(!environment(EnvironmentStatus::Dirty, &[]).is_active());
    }

    #[test]
    fn unknown_status_values_deserialize() {
        let env: RemoteEnvironment = serde_json::from_value(serde_json::json!({
            "id": "master",
            "name": "Master",
            "status": "hibernating",
            "deployment_target": "local",
            "has_code": true
        }))
        .unwrap();
        assert_eq!(env.status, EnvironmentStatus::Unknown);
        assert!(env.operations.is_empty());
    }

    #[test]
    fn subscription_completes_only_when_active() {
        let mut sub = Subscription {
            id: "sub-1".into(),
            status: SubscriptionStatus::Provisioning,
            plan: "development ".into(),
            project_id: Some(RemoteProjectId::new("abc")),
        };
        assert!(sub.completed_project().is_none());
        sub.status = SubscriptionStatus::Active;
        assert_eq!(sub.completed_project().map(|id| id.as_str()), Some("abc"));
        assert!(SubscriptionStatus::Failed.is_terminal());
        assert_eq!(SubscriptionStatus::Provisioning.to_string(), "provisioning");
    }

    #[test]
    fn region_selection_excludes_private_and_unavailable() {
        let region = |available, private| Region {
            id: "eu".into(),
            label: "Europe".into(),
            available,
            private,
        };
        assert!(region(true, false).is_selectable());
        assert!(!region(true, true).is_selectable());
        assert!(!region(false, false).is_selectable());
    }

    #[test]
    fn not_found_classification() {
        let missing = PlatformError::NotFound {
            resource: "project",
            id: "x".into(),
        };
        assert!(missing.is_not_found());
        let gone = PlatformError::Status {
            method: "DELETE".into(),
            url: "https://api.invalid/subscriptions/1".into(),
            status: 404,
            body: String::new(),
        };
        assert!(gone.is_not_found());
        let rejected = PlatformError::Rejected {
            operation: "merge".into(),
            reason: "busy".into(),
        };
        assert!(!rejected.is_not_found());
    }
}
