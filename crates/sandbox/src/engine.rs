//! Container runtime abstraction.
//!
//! This module provides the `ContainerRuntime` trait consumed by the sandbox
//! provider and a Docker-based implementation using the `bollard` crate. The
//! provider owns all orchestration (hardening, timeouts, restarts); runtimes
//! only translate calls to the container engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use agent_sandbox_core::{Error, NetworkMode, Result, SandboxResourceLimits};

// =============================================================================
// Runtime Types
// =============================================================================

/// A host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// Everything needed to create a sandbox container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub user: String,
    pub workdir: String,
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub resources: SandboxResourceLimits,
    pub network_mode: NetworkMode,
    pub mounts: Vec<MountSpec>,
    /// tmpfs mounts: container path -> mount options.
    pub tmpfs: BTreeMap<String, String>,
    pub readonly_rootfs: bool,
    pub cap_drop: Vec<String>,
    pub security_opt: Vec<String>,
}

/// A command to run inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    pub working_dir: String,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub user: String,
}

impl ExecRequest {
    /// Argument vector handed to the runtime.
    pub fn shell_argv(&self) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), self.command.clone()]
    }
}

/// Demultiplexed output of a finished exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    pub running: bool,
    pub nano_cpus: Option<i64>,
    pub memory_bytes: Option<i64>,
    pub pids_limit: Option<i64>,
}

impl ContainerStatus {
    /// Limits the runtime actually applied. Unreported limits read as 0,
    /// which the runtime treats as unlimited.
    pub fn applied_resources(&self) -> SandboxResourceLimits {
        SandboxResourceLimits {
            cpu_count: self.nano_cpus.unwrap_or(0) as f64 / 1_000_000_000.0,
            memory_bytes: self.memory_bytes.unwrap_or(0),
            pids_limit: self.pids_limit.unwrap_or(0),
        }
    }
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Trait for container runtime clients.
///
/// `stop_container`, `start_container` and `kill_container` succeed when the
/// container is already in the requested state. A missing container is
/// reported as `Error::ContainerNotFound`; every other failure is a transport
/// error.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container and return its runtime id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, container_id: &str) -> Result<()>;

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerStatus>;

    async fn stop_container(&self, container_id: &str) -> Result<()>;

    /// Send a signal to the container's init process.
    async fn kill_container(&self, container_id: &str, signal: &str) -> Result<()>;

    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Run a command and wait for its output stream to end.
    async fn exec(&self, container_id: &str, request: &ExecRequest) -> Result<RawExecOutput>;

    /// Check if the runtime is reachable (e.g., Docker daemon running).
    async fn is_available(&self) -> bool;
}

// =============================================================================
// Docker Runtime Implementation
// =============================================================================

/// Docker-based runtime using the `bollard` crate.
pub struct DockerRuntime {
    docker: bollard::Docker,
    stop_grace_secs: i64,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::runtime(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self::from_client(docker))
    }

    /// Create from an existing bollard Docker client.
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self {
            docker,
            stop_grace_secs: 5,
        }
    }
}

/// Map a bollard error, treating "not modified" as success.
fn map_docker_error(container_id: &str, action: &str, err: bollard::errors::Error) -> Result<()> {
    use bollard::errors::Error as DockerError;

    match err {
        DockerError::DockerResponseServerError { status_code: 304, .. } => Ok(()),
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => Err(Error::ContainerNotFound(container_id.to_string())),
        other => Err(Error::runtime(format!(
            "Failed to {} container {}: {}",
            action, container_id, other
        ))),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, Mount, MountTypeEnum};

        let mounts = spec
            .mounts
            .iter()
            .map(|m| Mount {
                source: Some(m.source.to_string_lossy().into_owned()),
                target: Some(m.target.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            nano_cpus: Some(spec.resources.nano_cpus()),
            memory: Some(spec.resources.memory_bytes),
            pids_limit: Some(spec.resources.pids_limit),
            network_mode: Some(spec.network_mode.as_runtime_mode().to_string()),
            mounts: Some(mounts),
            tmpfs: Some(spec.tmpfs.clone().into_iter().collect::<HashMap<_, _>>()),
            readonly_rootfs: Some(spec.readonly_rootfs),
            cap_drop: Some(spec.cap_drop.clone()),
            security_opt: Some(spec.security_opt.clone()),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            working_dir: Some(spec.workdir.clone()),
            user: Some(spec.user.clone()),
            cmd: Some(spec.command.clone()),
            host_config: Some(host_config),
            labels: Some(spec.labels.clone().into_iter().collect::<HashMap<_, _>>()),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::runtime(format!("Failed to create sandbox container: {}", e)))?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, warning = %warning, "Docker create warning");
        }

        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        match self
            .docker
            .start_container::<String>(container_id, None)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => map_docker_error(container_id, "start", e),
        }
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerStatus> {
        let inspect = match self.docker.inspect_container(container_id, None).await {
            Ok(inspect) => inspect,
            Err(e) => {
                map_docker_error(container_id, "inspect", e)?;
                return Err(Error::runtime(format!(
                    "Inspect of container {} returned no data",
                    container_id
                )));
            }
        };

        let running = inspect
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);
        let host = inspect.host_config.unwrap_or_default();

        Ok(ContainerStatus {
            running,
            nano_cpus: host.nano_cpus,
            memory_bytes: host.memory,
            pids_limit: host.pids_limit,
        })
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        use bollard::container::StopContainerOptions;

        match self
            .docker
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: self.stop_grace_secs,
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => map_docker_error(container_id, "stop", e),
        }
    }

    async fn kill_container(&self, container_id: &str, signal: &str) -> Result<()> {
        use bollard::container::KillContainerOptions;
        use bollard::errors::Error as DockerError;

        match self
            .docker
            .kill_container(container_id, Some(KillContainerOptions { signal }))
            .await
        {
            Ok(()) => Ok(()),
            // 409: container is not running
            Err(DockerError::DockerResponseServerError {
                status_code: 409, ..
            }) => Ok(()),
            Err(e) => map_docker_error(container_id, "kill", e),
        }
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        use bollard::container::RemoveContainerOptions;

        match self
            .docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => map_docker_error(container_id, "remove", e),
        }
    }

    async fn exec(&self, container_id: &str, request: &ExecRequest) -> Result<RawExecOutput> {
        use bollard::container::LogOutput;
        use bollard::exec::{CreateExecOptions, StartExecResults};
        use futures::StreamExt;

        let exec_options = CreateExecOptions {
            cmd: Some(request.shell_argv()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some(request.working_dir.clone()),
            env: Some(request.env.clone()),
            user: Some(request.user.clone()),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(container_id, exec_options)
            .await
            .map_err(|e| Error::runtime(format!("Failed to create exec in sandbox: {}", e)))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::runtime(format!("Failed to start exec in sandbox: {}", e)))?;

        let mut output = RawExecOutput::default();

        if let StartExecResults::Attached { output: mut stream, .. } = start_result {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) => {
                        output.stdout.extend_from_slice(&message);
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        output.stderr.extend_from_slice(&message);
                    }
                    Ok(_) => {} // ignore stdin/console frames
                    Err(e) => {
                        return Err(Error::runtime(format!("Exec stream failed: {}", e)));
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::runtime(format!("Failed to inspect exec result: {}", e)))?;

        output.exit_code = inspect.exit_code.unwrap_or(-1);
        Ok(output)
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}
