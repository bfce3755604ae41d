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
use crate::command::ProjectRef;
use crate::readiness::Readiness;

/// Stage upstream changes on the archetype's update branch.
pub(super) async fn handle(handlers: &Handlers, target: &ProjectRef) -> HandlerResult {
    let project = handlers.load_project(target.project_id).await?;
    let archetype = handlers.load_archetype(project.archetype_id).await?;
    let remote = handlers.load_remote(&project.remote_project_id).await?;

    let readiness = handlers
        .readiness
        .ensure(&remote.id, &archetype.update_branch)
        .await?;
    let (environment, transition) = match readiness {
        Readiness::Ready {
            environment,
            transition,
        } => (environment, transition),
        Readiness::Unavailable(guard) => {
            info!(project = %project.id, branch = %archetype.update_branch, reason = %guard, "update branch not ready");
            return Err(guard.into());
        }
    };

    handlers
        .platform
        .run_source_operation(&remote.id, &environment.id, &archetype.update_operation)
        .await?;
    info!(
        project = %project.id,
        branch = %environment.id,
        operation = %archetype.update_operation,
        %transition,
        "update operation started"
    );
    Ok(Outcome::Applied)
}
