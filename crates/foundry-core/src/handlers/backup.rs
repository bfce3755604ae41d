//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use tracing::info;

use super::{HandlerError, HandlerResult, Handlers, Outcome};
use crate::command::ProjectRef;

pub(super) async fn handle(handlers: &Handlers, target: &ProjectRef) -> HandlerResult {
    let project = handlers.load_project(target.project_id).await?;
    let remote = handlers.load_remote(&project.remote_project_id).await?;
    let production = handlers.settings.production_branch.as_str();

    if handlers
        .platform
        .get_environment(&remote.id, production)
        .await?
        .is_none()
    {
        return Err(HandlerError::RemoteNotFound {
            kind: "environment",
            id: format!("{}/{production}", remote.id),
        });
    }
    handlers
        .platform
        .backup_environment(&remote.id, production)
        .await?;
    info!(project = %project.id, branch = production, "production backup requested");
    Ok(Outcome::Applied)
}
