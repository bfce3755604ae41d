//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Synchronous creation of a remote project for a new local one.

use std::sync::Arc;

use foundry_platform::{PlatformClient, PlatformError, SubscriptionRequest};
use tracing::{error, info, warn};

use crate::bus::CommandBus;
use crate::command::Command;
use crate::model::{ArchetypeId, NewProject, Project, ProvisionedProject};
use crate::store::{ProjectStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("archetype {0} does not exist")]
    ArchetypeNotFound(ArchetypeId),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("subscription {subscription} is active but carries no project id")]
    MissingProjectId { subscription: String },
    #[error("project could not be stored: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Provisioner {
    store: Arc<dyn ProjectStore>,
    platform: Arc<dyn PlatformClient>,
    bus: Arc<dyn CommandBus>,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        platform: Arc<dyn PlatformClient>,
        bus: Arc<dyn CommandBus>,
    ) -> Self {
        Self {
            store,
            platform,
            bus,
        }
    }

    /// Create the remote project, commit the local one and queue its
    /// follow-up commands.
    ///
    /// Nothing is committed unless the remote project exists. If the commit
    /// itself fails, deletion of the remote project is queued before the
    /// error is returned.
    pub async fn provision(&self, new: NewProject) -> Result<Project, ProvisionError> {
        if self.store.find_archetype(new.archetype_id).await?.is_none() {
            return Err(ProvisionError::ArchetypeNotFound(new.archetype_id));
        }

        let request = SubscriptionRequest::development(new.region.clone(), new.title.clone());
        let pending = self.platform.create_subscription(&request).await?;
        info!(subscription = %pending.id, title = %new.title, region = %new.region, "subscription created");
        let subscription = self.platform.wait_for_subscription(pending).await?;
        let remote_project_id = subscription.completed_project().cloned().ok_or_else(|| {
            ProvisionError::MissingProjectId {
                subscription: subscription.id.clone(),
            }
        })?;

        let archetype_id = new.archetype_id;
        let provisioned = ProvisionedProject {
            project: new,
            remote_project_id: remote_project_id.clone(),
        };
        let project = match self.store.insert_project(provisioned).await {
            Ok(project) => project,
            Err(err) => {
                error!(remote = %remote_project_id, error = %err, "commit failed; queueing remote deletion");
                if let Err(dispatch) = self.bus.dispatch(Command::delete(remote_project_id.clone())).await {
                    error!(remote = %remote_project_id, error = %dispatch, "remote project left orphaned");
                }
                return Err(err.into());
            }
        };
        info!(project = %project.id, remote = %remote_project_id, "project provisioned");

        for command in [
            Command::set_variables(archetype_id, remote_project_id.clone()),
            Command::initialize_code(archetype_id, remote_project_id.clone()),
        ] {
            let name = command.name();
            if let Err(err) = self.bus.dispatch(command).await {
                warn!(project = %project.id, command = name, error = %err, "follow-up command not queued");
            }
        }
        Ok(project)
    }
}
