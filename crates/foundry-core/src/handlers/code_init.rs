//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use foundry_common::CodeInitStrategy;
use foundry_platform::InitializeRequest;
use tracing::info;

use super::{HandlerResult, Handlers, Outcome};
use crate::command::RemoteBinding;

/// Seed the production branch of a fresh project with archetype code.
pub(super) async fn handle(handlers: &Handlers, binding: &RemoteBinding) -> HandlerResult {
    let archetype = handlers.load_archetype(binding.archetype_id).await?;
    let remote = handlers.load_remote(&binding.remote_project_id).await?;
    let settings = &handlers.settings;

    match settings.code_init {
        CodeInitStrategy::Platform => {
            let request = InitializeRequest {
                profile: archetype.name.clone(),
                repository: archetype.source_repository_uri.clone(),
            };
            handlers
                .platform
                .initialize_environment(&remote.id, &settings.production_branch, &request)
                .await?;
        }
        CodeInitStrategy::GitMirror => {
            // One remote per project in the mirror, named by its remote id.
            handlers
                .mirror
                .push_archetype(
                    archetype.id.0,
                    &archetype.source_repository_uri,
                    remote.id.as_str(),
                    &remote.git_url,
                    &settings.production_branch,
                )
                .await?;
        }
    }
    info!(
        project = %remote.id,
        archetype = %archetype.id,
        strategy = ?settings.code_init,
        "project code initialized"
    );
    Ok(Outcome::Applied)
}
