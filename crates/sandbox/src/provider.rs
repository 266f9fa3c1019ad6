//! Sandbox provider.
//!
//! Owns the lifecycle of hardened sandbox containers and runs commands in
//! them. Each sandbox is bound to one mounted repository path and lives until
//! the caller stops or deletes it.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use agent_sandbox_core::{
    config::SandboxConfig, Error, ExecOptions, ExecResult, ResourceOverrides, Result,
    SandboxHandle, SandboxId, SandboxMetadata, SandboxProcess, SandboxState,
};

use crate::classify::ExecOutcome;
use crate::engine::{ContainerRuntime, ContainerSpec, ExecRequest, MountSpec};

/// How often to poll a killed container while waiting for it to exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Maximum number of polls before giving up on a killed container.
const STOP_POLL_ATTEMPTS: usize = 100;

// =============================================================================
// Exec Target
// =============================================================================

/// A sandbox addressed either by handle or by id.
#[derive(Debug, Clone, Copy)]
pub enum ExecTarget<'a> {
    Handle(&'a SandboxHandle),
    Id(&'a str),
}

impl ExecTarget<'_> {
    fn id(&self) -> SandboxId {
        match self {
            Self::Handle(handle) => handle.id.clone(),
            Self::Id(id) => SandboxId::from(*id),
        }
    }
}

impl<'a> From<&'a SandboxHandle> for ExecTarget<'a> {
    fn from(handle: &'a SandboxHandle) -> Self {
        Self::Handle(handle)
    }
}

impl<'a> From<&'a str> for ExecTarget<'a> {
    fn from(id: &'a str) -> Self {
        Self::Id(id)
    }
}

impl<'a> From<&'a SandboxId> for ExecTarget<'a> {
    fn from(id: &'a SandboxId) -> Self {
        Self::Id(id.as_str())
    }
}

// =============================================================================
// Sandbox Provider
// =============================================================================

struct SandboxEntry {
    handle: SandboxHandle,
    state: SandboxState,
}

struct ProviderInner {
    runtime: Arc<dyn ContainerRuntime>,
    config: SandboxConfig,
    sandboxes: DashMap<SandboxId, SandboxEntry>,
}

/// Creates, tracks and tears down sandbox containers.
///
/// Cloning is cheap; clones share the same bookkeeping. Concurrent exec calls
/// on the same sandbox are allowed but not serialized.
#[derive(Clone)]
pub struct SandboxProvider {
    inner: Arc<ProviderInner>,
}

impl SandboxProvider {
    /// Create a new sandbox provider.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SandboxConfig) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                runtime,
                config,
                sandboxes: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    /// Check if the container runtime is available.
    pub async fn is_available(&self) -> bool {
        self.inner.runtime.is_available().await
    }

    /// Create a sandbox using the configured resource limits.
    pub async fn create_sandbox(
        &self,
        image: &str,
        mount_path: Option<&Path>,
    ) -> Result<SandboxHandle> {
        let overrides = self.inner.config.resources;
        self.create_sandbox_with_resources(image, mount_path, overrides)
            .await
    }

    /// Create a sandbox with explicit resource overrides.
    pub async fn create_sandbox_with_resources(
        &self,
        image: &str,
        mount_path: Option<&Path>,
        overrides: ResourceOverrides,
    ) -> Result<SandboxHandle> {
        let config = &self.inner.config;
        let mount_path = self.resolve_mount_path(mount_path).await?;
        let writable = self.prepare_writable_mounts().await?;
        let requested = overrides.resolve();

        let id = SandboxId(uuid::Uuid::new_v4().to_string());
        let container_name = format!(
            "{}-{}",
            config.container_name_prefix,
            uuid::Uuid::new_v4().simple()
        );

        let mut mounts = vec![MountSpec {
            source: mount_path.clone(),
            target: config.mount_target.clone(),
            read_only: true,
        }];
        mounts.extend(writable);

        let spec = ContainerSpec {
            name: container_name.clone(),
            image: image.to_string(),
            user: config.user.clone(),
            workdir: config.workdir.clone(),
            command: vec!["sleep".to_string(), "infinity".to_string()],
            labels: BTreeMap::from([
                ("managed-by".to_string(), "agent-sandbox".to_string()),
                ("agent-sandbox.id".to_string(), id.to_string()),
            ]),
            resources: requested,
            network_mode: config.network_mode.clone(),
            mounts,
            tmpfs: BTreeMap::from([("/tmp".to_string(), config.tmpfs_options.clone())]),
            readonly_rootfs: true,
            cap_drop: vec!["ALL".to_string()],
            security_opt: vec!["no-new-privileges:true".to_string()],
        };

        let runtime = &self.inner.runtime;
        let container_id = runtime.create_container(&spec).await?;
        let started = async {
            runtime.start_container(&container_id).await?;
            runtime.inspect_container(&container_id).await
        }
        .await;
        let applied = match started {
            Ok(status) => status.applied_resources(),
            Err(e) => {
                // The container is not tracked yet, so nothing else can remove it
                if let Err(cleanup) = runtime.remove_container(&container_id).await {
                    tracing::warn!(
                        container_id = %container_id,
                        error = %cleanup,
                        "Failed to remove container after failed sandbox creation"
                    );
                }
                return Err(e);
            }
        };

        let metadata = SandboxMetadata {
            container_id: container_id.clone(),
            container_name,
            image: image.to_string(),
            mount_path,
            requested_resources: requested,
            applied_resources: applied,
        };

        if metadata.resources_clamped() {
            tracing::warn!(
                sandbox_id = %id,
                requested = ?requested,
                applied = ?applied,
                "Container runtime applied different resource limits than requested"
            );
        }

        let handle = SandboxHandle {
            id: id.clone(),
            metadata,
            process: Arc::new(ProcessCapability {
                provider: Arc::downgrade(&self.inner),
                id: id.clone(),
            }),
        };

        self.inner.sandboxes.insert(
            id.clone(),
            SandboxEntry {
                handle: handle.clone(),
                state: SandboxState::Running,
            },
        );

        tracing::info!(
            sandbox_id = %id,
            container_id = %container_id,
            image = %image,
            network = %config.network_mode.as_runtime_mode(),
            "Sandbox container created and started"
        );

        Ok(handle)
    }

    /// Look up a sandbox by id.
    pub fn get_sandbox(&self, id: &str) -> Option<SandboxHandle> {
        self.inner
            .sandboxes
            .get(&SandboxId::from(id))
            .map(|entry| entry.handle.clone())
    }

    /// Current lifecycle state of a sandbox.
    pub fn state(&self, id: &str) -> Option<SandboxState> {
        self.inner
            .sandboxes
            .get(&SandboxId::from(id))
            .map(|entry| entry.state)
    }

    /// Ids of all known sandboxes.
    pub fn list_sandboxes(&self) -> Vec<SandboxId> {
        self.inner
            .sandboxes
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Stop a sandbox. Stopping an already-stopped or vanished container
    /// succeeds.
    pub async fn stop_sandbox(&self, id: &str) -> Result<SandboxId> {
        let id = SandboxId::from(id);
        let container_id = self.inner.container_id(&id)?;

        match self.inner.runtime.stop_container(&container_id).await {
            Ok(()) | Err(Error::ContainerNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        self.inner.set_state(&id, SandboxState::Stopped);
        tracing::info!(sandbox_id = %id, container_id = %container_id, "Sandbox stopped");
        Ok(id)
    }

    /// Delete a sandbox and its container. Returns `false` when the sandbox
    /// is unknown or was already deleted.
    pub async fn delete_sandbox(&self, id: &str) -> Result<bool> {
        let id = SandboxId::from(id);
        let Ok(container_id) = self.inner.container_id(&id) else {
            return Ok(false);
        };

        match self.inner.runtime.remove_container(&container_id).await {
            Ok(()) | Err(Error::ContainerNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let removed = self.inner.sandboxes.remove(&id).is_some();
        tracing::info!(sandbox_id = %id, container_id = %container_id, "Sandbox deleted");
        Ok(removed)
    }

    /// Run a shell command inside a sandbox.
    pub async fn exec<'a>(
        &self,
        target: impl Into<ExecTarget<'a>>,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecResult> {
        let id = target.into().id();
        self.inner.exec(&id, command, options).await
    }

    async fn resolve_mount_path(&self, mount_path: Option<&Path>) -> Result<PathBuf> {
        let config = &self.inner.config;
        let path = mount_path
            .map(Path::to_path_buf)
            .or_else(|| config.mount_path.as_ref().map(PathBuf::from))
            .ok_or_else(|| {
                Error::configuration("No mount path given and no default mount path configured")
            })?;

        if tokio::fs::metadata(&path).await.is_err() {
            if !config.auto_create_mount_path {
                return Err(Error::configuration(format!(
                    "Mount path {} does not exist",
                    path.display()
                )));
            }
            tokio::fs::create_dir_all(&path).await?;
            tracing::info!(path = %path.display(), "Created missing mount path");
        }

        Ok(tokio::fs::canonicalize(&path).await?)
    }

    async fn prepare_writable_mounts(&self) -> Result<Vec<MountSpec>> {
        let config = &self.inner.config;
        let mut mounts = Vec::with_capacity(config.writable_mounts.len());

        for mount in &config.writable_mounts {
            let host_path = PathBuf::from(&mount.host_path);
            if tokio::fs::metadata(&host_path).await.is_err() {
                if !config.create_writable_mounts {
                    return Err(Error::configuration(format!(
                        "Writable mount path {} does not exist",
                        host_path.display()
                    )));
                }
                tokio::fs::create_dir_all(&host_path).await?;
            }
            mounts.push(MountSpec {
                source: tokio::fs::canonicalize(&host_path).await?,
                target: mount.container_path.clone(),
                read_only: false,
            });
        }

        Ok(mounts)
    }
}

impl ProviderInner {
    fn container_id(&self, id: &SandboxId) -> Result<String> {
        self.sandboxes
            .get(id)
            .map(|entry| entry.handle.metadata.container_id.clone())
            .ok_or_else(|| Error::sandbox_not_found(id.as_str()))
    }

    fn set_state(&self, id: &SandboxId, state: SandboxState) {
        if let Some(mut entry) = self.sandboxes.get_mut(id) {
            tracing::debug!(sandbox_id = %id, from = ?entry.state, to = ?state, "Sandbox state transition");
            entry.state = state;
        }
    }

    async fn exec(&self, id: &SandboxId, command: &str, options: ExecOptions) -> Result<ExecResult> {
        let (container_id, state) = self
            .sandboxes
            .get(id)
            .map(|entry| (entry.handle.metadata.container_id.clone(), entry.state))
            .ok_or_else(|| Error::sandbox_not_found(id.as_str()))?;

        if state == SandboxState::Stopped {
            return Err(Error::runtime(format!("Sandbox {} is stopped", id)));
        }

        let request = ExecRequest {
            command: command.to_string(),
            working_dir: options
                .cwd
                .clone()
                .unwrap_or_else(|| self.config.workdir.clone()),
            env: options
                .env
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect(),
            user: self.config.user.clone(),
        };
        let timeout_secs = options
            .timeout_sec
            .unwrap_or(self.config.default_timeout_secs);

        let started = Instant::now();
        let outcome = match self.run(&container_id, &request, timeout_secs).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::counter!("sandbox_exec_total", "outcome" => "transport_error")
                    .increment(1);
                tracing::error!(sandbox_id = %id, error = %e, "Sandbox exec failed");
                return Err(e);
            }
        };

        if let ExecOutcome::TimedOut { timeout_secs } = outcome {
            tracing::warn!(
                sandbox_id = %id,
                command = %command,
                timeout_secs,
                "Sandbox exec timed out; killing and restarting container"
            );
            self.restart_after_timeout(id, &container_id).await?;
        } else if let ExecOutcome::SecurityViolation { message, .. } = &outcome {
            tracing::warn!(
                sandbox_id = %id,
                command = %command,
                message = %message.trim(),
                "Sandbox exec refused by security profile"
            );
        }

        metrics::counter!("sandbox_exec_total", "outcome" => outcome.label()).increment(1);
        metrics::histogram!("sandbox_exec_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let result = outcome.into_result(command);
        tracing::debug!(
            sandbox_id = %id,
            exit_code = result.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sandbox exec finished"
        );
        Ok(result)
    }

    /// Race the exec against the timeout.
    async fn run(
        &self,
        container_id: &str,
        request: &ExecRequest,
        timeout_secs: u64,
    ) -> Result<ExecOutcome> {
        let exec = self.runtime.exec(container_id, request);

        let finished = if timeout_secs == 0 {
            exec.await
        } else {
            match tokio::time::timeout(Duration::from_secs(timeout_secs), exec).await {
                Ok(finished) => finished,
                Err(_) => return Ok(ExecOutcome::TimedOut { timeout_secs }),
            }
        };

        match finished {
            Ok(output) => Ok(ExecOutcome::from_output(output)),
            Err(e) => ExecOutcome::from_error(e),
        }
    }

    /// `Running -> Restarting -> Running`: SIGKILL the container, wait for it
    /// to exit, then start it again so the handle stays usable.
    async fn restart_after_timeout(&self, id: &SandboxId, container_id: &str) -> Result<()> {
        self.set_state(id, SandboxState::Restarting);

        let restarted = async {
            self.runtime.kill_container(container_id, "SIGKILL").await?;
            self.wait_until_stopped(container_id).await?;
            self.runtime.start_container(container_id).await
        }
        .await;

        match restarted {
            Ok(()) => {
                self.set_state(id, SandboxState::Running);
                tracing::info!(sandbox_id = %id, container_id = %container_id, "Sandbox restarted after timeout");
                Ok(())
            }
            Err(e) => {
                self.set_state(id, SandboxState::Stopped);
                tracing::error!(sandbox_id = %id, error = %e, "Failed to restart sandbox after timeout");
                Err(e)
            }
        }
    }

    async fn wait_until_stopped(&self, container_id: &str) -> Result<()> {
        for _ in 0..STOP_POLL_ATTEMPTS {
            if !self.runtime.inspect_container(container_id).await?.running {
                return Ok(());
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
        Err(Error::runtime(format!(
            "Container {} still running after SIGKILL",
            container_id
        )))
    }
}

// =============================================================================
// Process Capability
// =============================================================================

/// `SandboxProcess` implementation handed out inside every `SandboxHandle`.
struct ProcessCapability {
    provider: Weak<ProviderInner>,
    id: SandboxId,
}

#[async_trait]
impl SandboxProcess for ProcessCapability {
    async fn execute_command(&self, command: &str, options: ExecOptions) -> Result<ExecResult> {
        let provider = self
            .provider
            .upgrade()
            .ok_or_else(|| Error::runtime("Sandbox provider has been dropped"))?;
        provider.exec(&self.id, command, options).await
    }
}
