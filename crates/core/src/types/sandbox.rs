use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::traits::SandboxProcess;

// =============================================================================
// Documented Defaults
// =============================================================================

/// Default CPU allocation (cores).
pub const DEFAULT_CPU_COUNT: f64 = 2.0;
/// Default memory allocation (2 GiB).
pub const DEFAULT_MEMORY_BYTES: i64 = 2 * 1024 * 1024 * 1024;
/// Default process-id limit.
pub const DEFAULT_PIDS_LIMIT: i64 = 512;
/// Default per-command timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 900;
/// Unprivileged uid:gid that commands run as.
pub const DEFAULT_CONTAINER_USER: &str = "1000:1000";
/// Mount options for the `/tmp` tmpfs.
pub const DEFAULT_TMPFS_OPTIONS: &str = "rw,nosuid,nodev,noexec,size=64m";

// =============================================================================
// Sandbox Types
// =============================================================================

/// Unique identifier for a sandbox instance.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SandboxId(pub String);

impl SandboxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SandboxId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SandboxId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Container network mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// No network access (default).
    #[default]
    None,
    /// Bridge network (standard Docker networking).
    Bridge,
    /// Full access to host network.
    Host,
    /// Custom network name.
    Custom(String),
}

impl NetworkMode {
    /// Name understood by the container runtime.
    pub fn as_runtime_mode(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Bridge => "bridge",
            Self::Host => "host",
            Self::Custom(name) => name,
        }
    }
}

/// CPU, memory and process limits of a sandbox container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SandboxResourceLimits {
    pub cpu_count: f64,
    pub memory_bytes: i64,
    pub pids_limit: i64,
}

impl Default for SandboxResourceLimits {
    fn default() -> Self {
        Self {
            cpu_count: DEFAULT_CPU_COUNT,
            memory_bytes: DEFAULT_MEMORY_BYTES,
            pids_limit: DEFAULT_PIDS_LIMIT,
        }
    }
}

impl SandboxResourceLimits {
    /// CPU allocation in the runtime's nano-CPU unit.
    pub fn nano_cpus(&self) -> i64 {
        (self.cpu_count * 1_000_000_000.0).round() as i64
    }
}

/// Caller-supplied resource overrides; unset fields fall back to defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceOverrides {
    pub cpu_count: Option<f64>,
    pub memory_bytes: Option<i64>,
    pub pids_limit: Option<i64>,
}

impl ResourceOverrides {
    /// Compute the effective limits, ignoring non-positive overrides.
    pub fn resolve(&self) -> SandboxResourceLimits {
        let defaults = SandboxResourceLimits::default();
        SandboxResourceLimits {
            cpu_count: self
                .cpu_count
                .filter(|c| *c > 0.0)
                .unwrap_or(defaults.cpu_count),
            memory_bytes: self
                .memory_bytes
                .filter(|m| *m > 0)
                .unwrap_or(defaults.memory_bytes),
            pids_limit: self
                .pids_limit
                .filter(|p| *p > 0)
                .unwrap_or(defaults.pids_limit),
        }
    }
}

/// Descriptive data recorded when a sandbox is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxMetadata {
    pub container_id: String,
    pub container_name: String,
    pub image: String,
    pub mount_path: PathBuf,
    /// What the caller asked for.
    pub requested_resources: SandboxResourceLimits,
    /// What the runtime reported after start. May differ from the request
    /// when the host clamps limits.
    pub applied_resources: SandboxResourceLimits,
}

impl SandboxMetadata {
    /// Whether the runtime granted something other than what was requested.
    pub fn resources_clamped(&self) -> bool {
        self.requested_resources != self.applied_resources
    }
}

/// Lifecycle state tracked by the provider for each sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxState {
    Running,
    /// Killed after a timeout and being brought back up.
    Restarting,
    Stopped,
}

/// Reference to a live sandbox.
///
/// Owned by the provider; callers receive clones and never mutate the
/// provider's copy.
#[derive(Clone)]
pub struct SandboxHandle {
    pub id: SandboxId,
    pub metadata: SandboxMetadata,
    pub process: Arc<dyn SandboxProcess>,
}

impl std::fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
