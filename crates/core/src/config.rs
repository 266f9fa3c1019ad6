use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::types::{
    NetworkMode, ResourceOverrides, RiskLevel, DEFAULT_CONTAINER_USER, DEFAULT_TIMEOUT_SECS,
    DEFAULT_TMPFS_OPTIONS,
};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub sandbox: SandboxConfig,
    pub filter: FilterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    pub image: String,
    /// Repository path used when `create_sandbox` is called without one.
    pub mount_path: Option<String>,
    /// Where the repository is bind-mounted inside the container.
    pub mount_target: String,
    pub workdir: String,
    pub auto_create_mount_path: bool,
    pub writable_mounts: Vec<WritableMount>,
    pub create_writable_mounts: bool,
    #[serde(default)]
    pub resources: ResourceOverrides,
    pub default_timeout_secs: u64,
    pub network_mode: NetworkMode,
    pub user: String,
    pub tmpfs_options: String,
    pub container_name_prefix: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WritableMount {
    pub host_path: String,
    pub container_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// YAML rules for the policy assessor; without it every gated call that
    /// is not known-safe is rejected.
    pub policy_file: Option<String>,
    pub max_safe_risk: RiskLevel,
    /// JSON-lines file receiving rejected tool calls.
    pub audit_log: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub json_logs: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("AGENT_SANDBOX_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__SANDBOX__DEFAULT_TIMEOUT_SECS=60 to sandbox.default_timeout_secs
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "node:20".into(),
            mount_path: None,
            mount_target: "/workspace".into(),
            workdir: "/workspace".into(),
            auto_create_mount_path: false,
            writable_mounts: Vec::new(),
            create_writable_mounts: false,
            resources: ResourceOverrides::default(),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            network_mode: NetworkMode::None,
            user: DEFAULT_CONTAINER_USER.into(),
            tmpfs_options: DEFAULT_TMPFS_OPTIONS.into(),
            container_name_prefix: "agent-sandbox".into(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            policy_file: None,
            max_safe_risk: RiskLevel::Low,
            audit_log: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,agent_sandbox=debug".into(),
            json_logs: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            filter: FilterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
