//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use foundry_platform::ProjectUpdate;
use tracing::info;

use super::{HandlerResult, Handlers, Outcome};
use crate::command::ProjectRef;

/// Push the local title to the remote project.
pub(super) async fn handle(handlers: &Handlers, target: &ProjectRef) -> HandlerResult {
    let project = handlers.load_project(target.project_id).await?;
    let remote = handlers.load_remote(&project.remote_project_id).await?;
    let update = ProjectUpdate {
        title: Some(project.title.clone()),
    };
    handlers.platform.update_project(&remote.id, &update).await?;
    info!(project = %project.id, remote = %remote.id, title = %project.title, "project synchronized");
    Ok(Outcome::Applied)
}
