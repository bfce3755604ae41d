//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Shared primitives and utilities for the orchestration runtime."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Shared primitives for the Foundry workspace.
//! This crate exposes configuration loading and logging initialisation
//! consumed by the daemon, the control CLI, and the core handlers.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, CodeInitConfig, CodeInitStrategy, GitConfig, LoggingConfig, MergeConfig,
    MetricsConfig, Mode, PlatformConfig, ReadinessConfig, SchedulerConfig, StoreConfig,
    WorkerConfig,
};
pub use logging::{init, init_tracing, LogFormat};
