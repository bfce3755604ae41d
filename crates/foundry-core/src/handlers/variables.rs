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

use super::{HandlerResult, Handlers, Outcome};
use crate::command::RemoteBinding;

pub const VAR_UPDATE_REMOTE: &str = "env:UPDATE_REMOTE";
pub const VAR_UPDATE_BRANCH: &str = "env:UPDATE_BRANCH";
pub const VAR_UPDATE_OPERATION: &str = "env:UPDATE_OPERATION";

/// Mirror the archetype's update settings into project variables.
pub(super) async fn handle(handlers: &Handlers, binding: &RemoteBinding) -> HandlerResult {
    let archetype = handlers.load_archetype(binding.archetype_id).await?;
    let remote = handlers.load_remote(&binding.remote_project_id).await?;

    let variables = [
        (VAR_UPDATE_REMOTE, archetype.source_repository_uri.as_str()),
        (VAR_UPDATE_BRANCH, archetype.update_branch.as_str()),
        (VAR_UPDATE_OPERATION, archetype.update_operation.as_str()),
    ];
    for (name, value) in variables {
        handlers.platform.set_variable(&remote.id, name, value).await?;
    }
    info!(project = %remote.id, archetype = %archetype.id, "project variables set");
    Ok(Outcome::Applied)
}
