//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use foundry_platform::OPERATION_MERGE;
use tracing::info;

use super::{HandlerResult, Handlers, Outcome};
use crate::command::ProjectRef;

/// Merge a staged update into production, backing production up first.
pub(super) async fn handle(handlers: &Handlers, target: &ProjectRef) -> HandlerResult {
    let project = handlers.load_project(target.project_id).await?;
    let archetype = handlers.load_archetype(project.archetype_id).await?;
    let remote = handlers.load_remote(&project.remote_project_id).await?;
    let branch = archetype.update_branch.as_str();

    let Some(environment) = handlers.platform.get_environment(&remote.id, branch).await? else {
        return Ok(Outcome::skipped(format!("update branch {branch} does not exist")));
    };
    if !environment.is_active() {
        return Ok(Outcome::skipped(format!(
            "update branch {branch} is {}",
            environment.status
        )));
    }
    if !environment.operation_available(OPERATION_MERGE) {
        return Ok(Outcome::skipped(format!(
            "merge is not available on {branch}"
        )));
    }

    if handlers.settings.backup_before_merge {
        let production = handlers.settings.production_branch.as_str();
        handlers
            .platform
            .backup_environment(&remote.id, production)
            .await?;
        info!(project = %project.id, branch = production, "production backed up before merge");
    }
    handlers.platform.merge_environment(&remote.id, branch).await?;
    info!(project = %project.id, branch, "update merged");
    Ok(Outcome::Applied)
}
