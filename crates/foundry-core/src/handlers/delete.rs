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
use crate::command::RemoteRef;

/// Delete the subscription behind a remote project. Succeeds when either is
/// already gone.
pub(super) async fn handle(handlers: &Handlers, target: &RemoteRef) -> HandlerResult {
    let id = &target.remote_project_id;
    let Some(remote) = handlers.platform.get_project(id).await? else {
        info!(remote = %id, "remote project already gone");
        return Ok(Outcome::Applied);
    };
    let subscription = remote.subscription_id.as_str();
    if handlers
        .platform
        .get_subscription(subscription)
        .await?
        .is_none()
    {
        info!(remote = %id, subscription, "subscription already gone");
        return Ok(Outcome::Applied);
    }
    let deleted = handlers.platform.delete_subscription(subscription).await?;
    info!(remote = %id, subscription, deleted, "subscription deleted");
    Ok(Outcome::Applied)
}
