//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Shared primitives and utilities for the orchestration runtime."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_api_url() -> String {
    "https://api.platform.sh/api".to_owned()
}

fn default_token_env() -> String {
    "FOUNDRY_API_TOKEN".to_owned()
}

fn default_production_branch() -> String {
    "master".to_owned()
}

fn default_provision_timeout() -> Duration {
    Duration::from_secs(900)
}

fn default_provision_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_branch_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_branch_wait_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_archetype_root() -> PathBuf {
    PathBuf::from("var/archetypes")
}

fn default_git_executable() -> String {
    "git".to_owned()
}

fn default_backup_before_merge() -> bool {
    true
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_scheduler_interval() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_store_path() -> PathBuf {
    PathBuf::from("var/foundry-store.json")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("var/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9899))
}

/// Primary configuration object for the Foundry runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub code_init: CodeInitConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "FOUNDRY_CONFIG";

    /// Default candidate locations inspected when no explicit path is supplied.
    pub fn default_candidates() -> Vec<PathBuf> {
        vec![
            PathBuf::from("configs/foundry.toml"),
            PathBuf::from("configs/foundry.example.toml"),
        ]
    }

    /// Load configuration from disk, respecting the `FOUNDRY_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.mode == Mode::Production {
            self.platform.validate()?;
        }
        self.readiness.validate()?;
        if self.git.archetype_root.as_os_str().is_empty() {
            return Err(anyhow!("git.archetype_root must not be empty"));
        }
        if self.git.executable.trim().is_empty() {
            return Err(anyhow!("git.executable must not be empty"));
        }
        if self.worker.concurrency == 0 {
            return Err(anyhow!("worker.concurrency must be at least 1"));
        }
        if self.scheduler.enabled && self.scheduler.interval.is_zero() {
            return Err(anyhow!("scheduler.interval must be positive when enabled"));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            platform: PlatformConfig::default(),
            readiness: ReadinessConfig::default(),
            code_init: CodeInitConfig::default(),
            git: GitConfig::default(),
            merge: MergeConfig::default(),
            worker: WorkerConfig::default(),
            scheduler: SchedulerConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Which platform backend the runtime talks to.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Real remote platform over HTTP.
    #[default]
    Production,
    /// In-process simulated platform; nothing leaves the host.
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Inline API token. Prefer `token_env` outside of local development.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_production_branch")]
    pub production_branch: String,
    #[serde(default = "default_provision_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub provision_timeout: Duration,
    #[serde(default = "default_provision_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub provision_poll_interval: Duration,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl PlatformConfig {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_url)
            .with_context(|| format!("platform.api_url '{}' is not a valid URL", self.api_url))?;
        if self.production_branch.trim().is_empty() {
            return Err(anyhow!("platform.production_branch must not be empty"));
        }
        if self.provision_poll_interval.is_zero() {
            return Err(anyhow!("platform.provision_poll_interval must be positive"));
        }
        Ok(())
    }

    /// Resolve the API token once, preferring the inline value over the environment.
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(token) = self.api_token.as_deref() {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_owned());
            }
        }
        match std::env::var(&self.token_env) {
            Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_owned()),
            _ => Err(anyhow!(
                "no platform API token configured; set platform.api_token or {}",
                self.token_env
            )),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: None,
            token_env: default_token_env(),
            production_branch: default_production_branch(),
            provision_timeout: default_provision_timeout(),
            provision_poll_interval: default_provision_poll_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_branch_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub branch_poll_interval: Duration,
    #[serde(default = "default_branch_wait_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub branch_wait_timeout: Duration,
}

impl ReadinessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.branch_poll_interval.is_zero() {
            return Err(anyhow!("readiness.branch_poll_interval must be positive"));
        }
        if self.branch_wait_timeout < self.branch_poll_interval {
            return Err(anyhow!(
                "readiness.branch_wait_timeout must be at least one poll interval"
            ));
        }
        Ok(())
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            branch_poll_interval: default_branch_poll_interval(),
            branch_wait_timeout: default_branch_wait_timeout(),
        }
    }
}

/// How a freshly provisioned project receives its archetype's code.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CodeInitStrategy {
    /// Ask the platform to initialise production from the archetype repository.
    Platform,
    /// Push a local mirror of the archetype repository, keeping shared history.
    #[default]
    GitMirror,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeInitConfig {
    #[serde(default)]
    pub strategy: CodeInitStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_archetype_root")]
    pub archetype_root: PathBuf,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    #[serde(default = "default_git_executable")]
    pub executable: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            archetype_root: default_archetype_root(),
            private_key: None,
            executable: default_git_executable(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_backup_before_merge")]
    pub backup_before_merge: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            backup_before_merge: default_backup_before_merge(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_worker_concurrency(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scheduler_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_scheduler_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.platform.production_branch, "master");
        assert_eq!(config.readiness.branch_poll_interval, Duration::from_secs(1));
        assert_eq!(config.readiness.branch_wait_timeout, Duration::from_secs(30));
        assert_eq!(config.code_init.strategy, CodeInitStrategy::GitMirror);
        assert!(config.merge.backup_before_merge);
        config.validate().expect("defaults validate");
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: AppConfig = r#"
            mode = "simulation"

            [code_init]
            strategy = "platform"

            [readiness]
            branch_poll_interval = 2
            branch_wait_timeout = 10

            [git]
            archetype_root = "/srv/archetypes"
            private_key = "/srv/keys/deploy"
        "#
        .parse()
        .expect("config parses");
        assert!(config.mode.is_simulation());
        assert_eq!(config.code_init.strategy, CodeInitStrategy::Platform);
        assert_eq!(config.readiness.branch_poll_interval, Duration::from_secs(2));
        assert_eq!(
            config.git.private_key.as_deref(),
            Some(Path::new("/srv/keys/deploy"))
        );
        assert_eq!(config.worker.concurrency, 4);
    }

    #[test]
    fn rejects_timeout_shorter_than_interval() {
        let err = r#"
            [readiness]
            branch_poll_interval = 5
            branch_wait_timeout = 1
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("branch_wait_timeout"));
    }

    #[test]
    fn rejects_invalid_api_url_in_production() {
        let err = r#"
            [platform]
            api_url = "not a url"
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("api_url"));
    }

    #[test]
    fn simulation_mode_skips_platform_validation() {
        let config = r#"
            mode = "simulation"
            [platform]
            api_url = "not a url"
        "#
        .parse::<AppConfig>();
        assert!(config.is_ok());
    }

    #[test]
    fn inline_token_wins_over_environment() {
        let platform = PlatformConfig {
            api_token: Some("  inline-token ".into()),
            token_env: "FOUNDRY_TEST_TOKEN_UNSET".into(),
            ..PlatformConfig::default()
        };
        assert_eq!(platform.resolve_token().unwrap(), "inline-token");
    }

    #[test]
    fn missing_token_is_an_error() {
        let platform = PlatformConfig {
            api_token: None,
            token_env: "FOUNDRY_TEST_TOKEN_DEFINITELY_UNSET".into(),
            ..PlatformConfig::default()
        };
        assert!(platform.resolve_token().is_err());
    }

    #[test]
    fn load_with_source_reports_inspected_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = AppConfig::load_with_source(&[missing.clone()]).unwrap_err();
        assert!(err.to_string().contains(&missing.display().to_string()));
    }

    #[test]
    fn load_with_source_reads_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foundry.toml");
        fs::write(&path, "mode = \"simulation\"\n[worker]\nconcurrency = 2\n").unwrap();
        let loaded = AppConfig::load_with_source(&[dir.path().join("nope.toml"), path.clone()])
            .expect("config loads");
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.worker.concurrency, 2);
    }
}
