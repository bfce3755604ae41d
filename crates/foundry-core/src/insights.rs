//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Read-only views that combine a local project with remote state.
//!
//! Every view treats a missing remote resource as "nothing to show".

use std::sync::Arc;

use foundry_platform::{Activity, PlatformClient, PlatformError};

use crate::model::{Archetype, Project};

pub const RECENT_ACTIVITY_COUNT: usize = 10;

type Result<T> = std::result::Result<T, PlatformError>;

fn absent_if_missing<T: Default>(result: Result<T>) -> Result<T> {
    match result {
        Err(err) if err.is_not_found() => Ok(T::default()),
        other => other,
    }
}

#[derive(Clone)]
pub struct ProjectInsights {
    platform: Arc<dyn PlatformClient>,
    production_branch: String,
}

impl ProjectInsights {
    pub fn new(platform: Arc<dyn PlatformClient>, production_branch: impl Into<String>) -> Self {
        Self {
            platform,
            production_branch: production_branch.into(),
        }
    }

    /// Console link of the remote project.
    pub async fn project_url(&self, project: &Project) -> Result<Option<String>> {
        Ok(self
            .platform
            .get_project(&project.remote_project_id)
            .await?
            .and_then(|remote| remote.ui_url))
    }

    /// First public route of `branch`.
    pub async fn environment_url(&self, project: &Project, branch: &str) -> Result<Option<String>> {
        let id = &project.remote_project_id;
        if self.platform.get_environment(id, branch).await?.is_none() {
            return Ok(None);
        }
        let routes = absent_if_missing(self.platform.environment_routes(id, branch).await)?;
        Ok(routes.into_iter().next())
    }

    pub async fn update_environment_url(
        &self,
        project: &Project,
        archetype: &Archetype,
    ) -> Result<Option<String>> {
        self.environment_url(project, &archetype.update_branch).await
    }

    /// Plan tier of the project's subscription, whitespace trimmed.
    pub async fn plan_size(&self, project: &Project) -> Result<Option<String>> {
        let Some(remote) = self.platform.get_project(&project.remote_project_id).await? else {
            return Ok(None);
        };
        Ok(self
            .platform
            .get_subscription(&remote.subscription_id)
            .await?
            .map(|subscription| subscription.plan.trim().to_owned()))
    }

    /// Newest activities of the production environment.
    pub async fn recent_activities(&self, project: &Project) -> Result<Vec<Activity>> {
        absent_if_missing(
            self.platform
                .environment_activities(
                    &project.remote_project_id,
                    &self.production_branch,
                    RECENT_ACTIVITY_COUNT,
                )
                .await,
        )
    }

    /// Regions a new project may be placed in, as `(label, id)` pairs.
    pub async fn available_regions(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .platform
            .regions()
            .await?
            .into_iter()
            .filter(|region| region.is_selectable())
            .map(|region| (region.label, region.id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArchetypeId, ProjectId};
    use foundry_platform::SimulatedPlatform;

    fn project(remote: foundry_platform::RemoteProjectId) -> Project {
        Project {
            id: ProjectId(1),
            title: "Demo".into(),
            archetype_id: ArchetypeId(1),
            remote_project_id: remote,
            region: "eu-3.platform.sh".into(),
        }
    }

    #[tokio::test]
    async fn views_of_a_live_project() {
        let sim = Arc::new(SimulatedPlatform::new());
        let remote = sim.seed_project("Demo");
        let insights = ProjectInsights::new(sim.clone(), "master");
        let project = project(remote.clone());

        let url = insights.project_url(&project).await.unwrap().unwrap();
        assert!(url.contains(remote.as_str()));
        assert_eq!(
            insights.plan_size(&project).await.unwrap().as_deref(),
            Some("development")
        );
        let route = insights
            .environment_url(&project, "master")
            .await
            .unwrap()
            .unwrap();
        assert!(route.starts_with("https://"));
        assert_eq!(insights.environment_url(&project, "update").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_remote_yields_empty_views() {
        let sim = Arc::new(SimulatedPlatform::new());
        let insights = ProjectInsights::new(sim, "master");
        let project = project("gone".into());
        assert_eq!(insights.project_url(&project).await.unwrap(), None);
        assert_eq!(insights.plan_size(&project).await.unwrap(), None);
        assert!(insights.recent_activities(&project).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn regions_exclude_private_and_unavailable() {
        let insights = ProjectInsights::new(Arc::new(SimulatedPlatform::new()), "master");
        let regions = insights.available_regions().await.unwrap();
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|(label, _)| !label.contains("dedicated")));
    }

    #[tokio::test]
    async fn recent_activities_are_capped() {
        let sim = Arc::new(SimulatedPlatform::new());
        let remote = sim.seed_project("Demo");
        for _ in 0..12 {
            sim.backup_environment(&remote, "master").await.unwrap();
        }
        let insights = ProjectInsights::new(sim, "master");
        let activities = insights.recent_activities(&project(remote)).await.unwrap();
        assert_eq!(activities.len(), RECENT_ACTIVITY_COUNT);
    }
}
