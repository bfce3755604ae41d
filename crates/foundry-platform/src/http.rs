//! ---
//! fdy_section: "05-networking-external-interfaces"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Remote platform adapter and resource model."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    AccountInfo, Activity, EnvironmentStatus, InitializeRequest, PlatformClient, PlatformError,
    ProjectUpdate, Region, RemoteEnvironment, RemoteProject, RemoteProjectId, Result,
    Subscription, SubscriptionRequest, SyncOptions,
};

const MAX_ERROR_BODY: usize = 512;

/// Timing knobs for [`HttpPlatformClient`].
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Upper bound for [`PlatformClient::wait_for_subscription`].
    pub provision_timeout: Duration,
    /// Delay between subscription status polls.
    pub provision_poll_interval: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            provision_timeout: Duration::from_secs(900),
            provision_poll_interval: Duration::from_secs(10),
        }
    }
}

/// [`PlatformClient`] speaking the platform's REST API.
#[derive(Debug, Clone)]
pub struct HttpPlatformClient {
    client: reqwest::Client,
    base: Url,
    settings: HttpSettings,
}

#[derive(Debug, Deserialize)]
struct LinkPayload {
    href: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ProjectPayload {
    id: RemoteProjectId,
    title: String,
    #[serde(default)]
    region: String,
    subscription_id: String,
    repository: RepositoryPayload,
    #[serde(default, rename = "_links")]
    links: HashMap<String, LinkPayload>,
}

impl From<ProjectPayload> for RemoteProject {
    fn from(payload: ProjectPayload) -> Self {
        let ui_url = payload.links.get("#ui").map(|link| link.href.clone());
        RemoteProject {
            id: payload.id,
            title: payload.title,
            region: payload.region,
            subscription_id: payload.subscription_id,
            git_url: payload.repository.url,
            ui_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnvironmentPayload {
    id: String,
    name: String,
    status: EnvironmentStatus,
    deployment_target: String,
    #[serde(default)]
    has_code: bool,
    #[serde(default, rename = "_links")]
    links: HashMap<String, Value>,
}

impl From<EnvironmentPayload> for RemoteEnvironment {
    fn from(payload: EnvironmentPayload) -> Self {
        // Operations are advertised as `#<name>` links.
        let mut operations: Vec<String> = payload
            .links
            .keys()
            .filter_map(|key| key.strip_prefix('#'))
            .map(str::to_owned)
            .collect();
        operations.sort();
        RemoteEnvironment {
            id: payload.id,
            name: payload.name,
            status: payload.status,
            deployment_target: payload.deployment_target,
            has_code: payload.has_code,
            operations,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegionsPayload {
    regions: Vec<Region>,
}

impl HttpPlatformClient {
    /// Build a client for `base_url` authenticating with `token`.
    pub fn new(base_url: &str, token: &str, settings: HttpSettings) -> Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(PlatformError::Url(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| PlatformError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .user_agent(concat!("foundry/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base,
            settings,
        })
    }

    /// Base URL every resource path is appended to.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so the segments are always writable.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn environment_endpoint(&self, id: &RemoteProjectId, branch: &str, tail: &[&str]) -> Url {
        let mut segments = vec!["projects", id.as_str(), "environments", branch];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<Response> {
        debug!(method = %method, url = %url, "platform request");
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let mut text = response.text().await.unwrap_or_default();
        if text.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Err(PlatformError::Status {
            method: method.to_string(),
            url: url.to_string(),
            status,
            body: text,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        Ok(self.send(Method::GET, url, None).await?.json::<T>().await?)
    }

    async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        match self.send(Method::GET, url, None).await {
            Ok(response) => Ok(Some(response.json::<T>().await?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn post(&self, url: Url, body: Value) -> Result<()> {
        self.send(Method::POST, url, Some(body)).await?;
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn create_subscription(&self, request: &SubscriptionRequest) -> Result<Subscription> {
        let body = json!({
            "project_region": request.region,
            "plan": request.plan,
            "project_title": request.title,
        });
        let response = self
            .send(Method::POST, self.endpoint(&["subscriptions"]), Some(body))
            .await?;
        let subscription = response.json::<Subscription>().await?;
        info!(subscription = %subscription.id, region = %request.region, "subscription requested");
        Ok(subscription)
    }

    async fn wait_for_subscription(&self, subscription: Subscription) -> Result<Subscription> {
        let started = Instant::now();
        let mut current = subscription;
        loop {
            if current.completed_project().is_some() {
                return Ok(current);
            }
            if current.status.is_terminal() {
                return Err(PlatformError::SubscriptionFailed {
                    id: current.id,
                    status: current.status,
                });
            }
            let waited = started.elapsed();
            if waited >= self.settings.provision_timeout {
                return Err(PlatformError::SubscriptionTimeout {
                    id: current.id,
                    waited,
                });
            }
            debug!(subscription = %current.id, status = %current.status, "waiting for subscription");
            tokio::time::sleep(self.settings.provision_poll_interval).await;
            let id = current.id.clone();
            current = self
                .get_subscription(&id)
                .await?
                .ok_or(PlatformError::NotFound {
                    resource: "subscription",
                    id,
                })?;
        }
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        self.get_optional(self.endpoint(&["subscriptions", id]))
            .await
    }

    async fn delete_subscription(&self, id: &str) -> Result<bool> {
        match self
            .send(Method::DELETE, self.endpoint(&["subscriptions", id]), None)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn get_project(&self, id: &RemoteProjectId) -> Result<Option<RemoteProject>> {
        let payload: Option<ProjectPayload> = self
            .get_optional(self.endpoint(&["projects", id.as_str()]))
            .await?;
        Ok(payload.map(RemoteProject::from))
    }

    async fn update_project(&self, id: &RemoteProjectId, update: &ProjectUpdate) -> Result<()> {
        let body = serde_json::to_value(update).map_err(|err| PlatformError::Rejected {
            operation: "update_project".into(),
            reason: err.to_string(),
        })?;
        self.send(
            Method::PATCH,
            self.endpoint(&["projects", id.as_str()]),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn set_variable(&self, id: &RemoteProjectId, name: &str, value: &str) -> Result<()> {
        let create = json!({ "name": name, "value": value, "is_json": false });
        match self
            .send(
                Method::POST,
                self.endpoint(&["projects", id.as_str(), "variables"]),
                Some(create),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(PlatformError::Status { status, .. })
                if status == StatusCode::CONFLICT.as_u16() =>
            {
                debug!(project = %id, variable = name, "variable exists; overwriting");
                self.send(
                    Method::PATCH,
                    self.endpoint(&["projects", id.as_str(), "variables", name]),
                    Some(json!({ "value": value })),
                )
                .await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn get_environment(
        &self,
        id: &RemoteProjectId,
        branch: &str,
    ) -> Result<Option<RemoteEnvironment>> {
        let payload: Option<EnvironmentPayload> = self
            .get_optional(self.environment_endpoint(id, branch, &[]))
            .await?;
        Ok(payload.map(RemoteEnvironment::from))
    }

    async fn activate_environment(&self, id: &RemoteProjectId, branch: &str) -> Result<()> {
        self.post(self.environment_endpoint(id, branch, &["activate"]), json!({}))
            .await
    }

    async fn synchronize_environment(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        options: SyncOptions,
    ) -> Result<()> {
        self.post(
            self.environment_endpoint(id, branch, &["synchronize"]),
            json!({
                "synchronize_code": options.code,
                "synchronize_data": options.data,
            }),
        )
        .await
    }

    async fn branch_environment(
        &self,
        id: &RemoteProjectId,
        parent: &str,
        new_branch: &str,
    ) -> Result<()> {
        self.post(
            self.environment_endpoint(id, parent, &["branch"]),
            json!({ "name": new_branch, "title": new_branch }),
        )
        .await
    }

    async fn merge_environment(&self, id: &RemoteProjectId, branch: &str) -> Result<()> {
        self.post(self.environment_endpoint(id, branch, &["merge"]), json!({}))
            .await
    }

    async fn backup_environment(&self, id: &RemoteProjectId, branch: &str) -> Result<()> {
        self.post(self.environment_endpoint(id, branch, &["backup"]), json!({}))
            .await
    }

    async fn run_source_operation(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        operation: &str,
    ) -> Result<()> {
        self.post(
            self.environment_endpoint(id, branch, &["source-operation"]),
            json!({ "operation": operation }),
        )
        .await
    }

    async fn initialize_environment(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        request: &InitializeRequest,
    ) -> Result<()> {
        self.post(
            self.environment_endpoint(id, branch, &["initialize"]),
            json!({ "profile": request.profile, "repository": request.repository }),
        )
        .await
    }

    async fn environment_routes(
        &self,
        id: &RemoteProjectId,
        branch: &str,
    ) -> Result<Vec<String>> {
        let routes: HashMap<String, Value> = self
            .get_json(self.environment_endpoint(id, branch, &["routes"]))
            .await?;
        let mut urls: Vec<String> = routes.into_keys().collect();
        urls.sort();
        Ok(urls)
    }

    async fn environment_activities(
        &self,
        id: &RemoteProjectId,
        branch: &str,
        count: usize,
    ) -> Result<Vec<Activity>> {
        let mut url = self.environment_endpoint(id, branch, &["activities"]);
        url.query_pairs_mut()
            .append_pair("count", &count.to_string());
        let mut activities: Vec<Activity> = self.get_json(url).await?;
        if activities.len() > count {
            warn!(project = %id, branch, returned = activities.len(), count, "platform ignored activity count");
            activities.truncate(count);
        }
        Ok(activities)
    }

    async fn regions(&self) -> Result<Vec<Region>> {
        let payload: RegionsPayload = self.get_json(self.endpoint(&["regions"])).await?;
        Ok(payload.regions)
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        self.get_json(self.endpoint(&["me"])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpPlatformClient {
        HttpPlatformClient::new(base, "secret", HttpSettings::default()).expect("client builds")
    }

    #[test]
    fn endpoints_append_to_base_path() {
        let client = client("https://api.example.invalid/api/");
        let url = client.endpoint(&["subscriptions", "42"]);
        assert_eq!(url.as_str(), "https://api.example.invalid/api/subscriptions/42");
    }

    #[test]
    fn branch_names_are_percent_encoded() {
        let client = client("https://api.example.invalid/api");
        let url = client.environment_endpoint(
            &RemoteProjectId::new("abc123"),
            "feature/update",
            &["merge"],
        );
        assert_eq!(
            url.as_str(),
            "https://api.example.invalid/api/projects/abc123/environments/feature%2Fupdate/merge"
        );
    }

    #[test]
    fn rejects_non_base_urls_and_bad_tokens() {
        assert!(HttpPlatformClient::new("mailto:ops@example.invalid", "t", HttpSettings::default())
            .is_err());
        assert!(matches!(
            HttpPlatformClient::new("https://api.example.invalid", "bad\ntoken", HttpSettings::default()),
            Err(PlatformError::InvalidToken)
        ));
    }

    #[test]
    fn environment_operations_come_from_links() {
        let payload: EnvironmentPayload = serde_json::from_value(json!({
            "id": "update",
            "name": "update",
            "status": "active",
            "deployment_target": "local",
            "has_code": true,
            "_links": {
                "self": { "href": "https://api.example.invalid/..." },
                "#merge": { "href": "https://api.example.invalid/.../merge" },
                "#backup": { "href": "https://api.example.invalid/.../backup" }
            }
        }))
        .unwrap();
        let env = RemoteEnvironment::from(payload);
        assert_eq!(env.operations, vec!["backup".to_owned(), "merge".to_owned()]);
        assert!(env.is_active());
    }

    #[test]
    fn project_payload_maps_repository_and_console_link() {
        let payload: ProjectPayload = serde_json::from_value(json!({
            "id": "abc123",
            "title": "Demo",
            "region": "eu",
            "subscription_id": "987",
            "repository": { "url": "abc123@git.eu.example.invalid:abc123.git" },
            "_links": { "#ui": { "href": "https://console.example.invalid/abc123" } }
        }))
        .unwrap();
        let project = RemoteProject::from(payload);
        assert_eq!(project.git_url, "abc123@git.eu.example.invalid:abc123.git");
        assert_eq!(
            project.ui_url.as_deref(),
            Some("https://console.example.invalid/abc123")
        );
    }
}
