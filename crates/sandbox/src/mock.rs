//! In-memory container runtime for testing without Docker.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use agent_sandbox_core::{Error, Result, SandboxResourceLimits};

use crate::engine::{ContainerRuntime, ContainerSpec, ContainerStatus, ExecRequest, RawExecOutput};

/// Scripted behavior of one exec call.
#[derive(Debug, Clone)]
pub enum MockExec {
    /// Finish after `delay` with the given streams.
    Output {
        exit_code: i64,
        stdout: String,
        stderr: String,
        delay: Duration,
    },
    /// Fail with a runtime error carrying this message.
    Error(String),
}

impl MockExec {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::Output {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn exit(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self::Output {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            delay: Duration::ZERO,
        }
    }

    /// A command that takes `delay` to finish.
    pub fn slow(delay: Duration) -> Self {
        Self::Output {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            delay,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

/// Runtime operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    Start,
    Inspect,
}

#[derive(Debug, Clone)]
struct MockContainer {
    spec: ContainerSpec,
    running: bool,
    starts: usize,
    kills: usize,
}

#[derive(Default)]
struct MockState {
    containers: HashMap<String, MockContainer>,
    removed: Vec<String>,
    exec_requests: Vec<(String, ExecRequest)>,
    faults: VecDeque<(MockFault, String)>,
}

/// In-memory mock runtime.
///
/// Exec responses are consumed in order; once the script runs out, `echo`
/// commands print their arguments and everything else succeeds silently.
/// Exec against a stopped or killed container fails like a real daemon.
#[derive(Default)]
pub struct MockRuntime {
    state: Arc<tokio::sync::Mutex<MockState>>,
    exec_responses: Arc<tokio::sync::Mutex<VecDeque<MockExec>>>,
    applied_override: Option<SandboxResourceLimits>,
    unreachable: bool,
}

impl MockRuntime {
    /// Create a mock runtime with predefined exec responses.
    pub fn new(responses: Vec<MockExec>) -> Self {
        Self {
            exec_responses: Arc::new(tokio::sync::Mutex::new(responses.into())),
            ..Default::default()
        }
    }

    /// A runtime whose daemon can never be reached.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    /// Report these limits on inspect instead of the requested ones.
    pub fn with_applied_resources(mut self, applied: SandboxResourceLimits) -> Self {
        self.applied_override = Some(applied);
        self
    }

    /// Queue another exec response.
    pub async fn push_exec(&self, response: MockExec) {
        self.exec_responses.lock().await.push_back(response);
    }

    /// Fail the next call of `op` with a runtime error carrying `message`.
    pub async fn fail_next(&self, op: MockFault, message: impl Into<String>) {
        self.state
            .lock()
            .await
            .faults
            .push_back((op, message.into()));
    }

    /// Ids of containers that exist and have not been removed.
    pub async fn live_containers(&self) -> Vec<String> {
        self.state.lock().await.containers.keys().cloned().collect()
    }

    /// Spec the container was created with.
    pub async fn spec(&self, container_id: &str) -> Option<ContainerSpec> {
        self.state
            .lock()
            .await
            .containers
            .get(container_id)
            .map(|c| c.spec.clone())
    }

    pub async fn is_running(&self, container_id: &str) -> bool {
        self.state
            .lock()
            .await
            .containers
            .get(container_id)
            .is_some_and(|c| c.running)
    }

    /// Number of times the container was started (including the first start).
    pub async fn start_count(&self, container_id: &str) -> usize {
        self.state
            .lock()
            .await
            .containers
            .get(container_id)
            .map_or(0, |c| c.starts)
    }

    pub async fn kill_count(&self, container_id: &str) -> usize {
        self.state
            .lock()
            .await
            .containers
            .get(container_id)
            .map_or(0, |c| c.kills)
    }

    pub async fn was_removed(&self, container_id: &str) -> bool {
        self.state
            .lock()
            .await
            .removed
            .iter()
            .any(|id| id == container_id)
    }

    /// Exec requests received so far, with their container ids.
    pub async fn exec_requests(&self) -> Vec<(String, ExecRequest)> {
        self.state.lock().await.exec_requests.clone()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            Err(Error::runtime(
                "Cannot connect to the Docker daemon at unix:///var/run/docker.sock",
            ))
        } else {
            Ok(())
        }
    }

    fn take_fault(state: &mut MockState, op: MockFault) -> Result<()> {
        let index = state.faults.iter().position(|(fault, _)| *fault == op);
        match index.and_then(|i| state.faults.remove(i)) {
            Some((_, message)) => Err(Error::runtime(message)),
            None => Ok(()),
        }
    }

    fn default_exec(request: &ExecRequest) -> MockExec {
        match request.command.strip_prefix("echo ") {
            Some(rest) => MockExec::ok(format!("{}\n", rest)),
            None => MockExec::ok(""),
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.check_reachable()?;
        let id = format!("mock-container-{}", uuid::Uuid::new_v4().simple());
        self.state.lock().await.containers.insert(
            id.clone(),
            MockContainer {
                spec: spec.clone(),
                running: false,
                starts: 0,
                kills: 0,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        Self::take_fault(&mut state, MockFault::Start)?;
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| Error::ContainerNotFound(container_id.to_string()))?;
        if !container.running {
            container.running = true;
            container.starts += 1;
        }
        Ok(())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerStatus> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        Self::take_fault(&mut state, MockFault::Inspect)?;
        let container = state
            .containers
            .get(container_id)
            .ok_or_else(|| Error::ContainerNotFound(container_id.to_string()))?;
        let applied = self.applied_override.unwrap_or(container.spec.resources);
        Ok(ContainerStatus {
            running: container.running,
            nano_cpus: Some(applied.nano_cpus()),
            memory_bytes: Some(applied.memory_bytes),
            pids_limit: Some(applied.pids_limit),
        })
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| Error::ContainerNotFound(container_id.to_string()))?;
        container.running = false;
        Ok(())
    }

    async fn kill_container(&self, container_id: &str, _signal: &str) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| Error::ContainerNotFound(container_id.to_string()))?;
        container.running = false;
        container.kills += 1;
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        if state.containers.remove(container_id).is_none() {
            return Err(Error::ContainerNotFound(container_id.to_string()));
        }
        state.removed.push(container_id.to_string());
        Ok(())
    }

    async fn exec(&self, container_id: &str, request: &ExecRequest) -> Result<RawExecOutput> {
        self.check_reachable()?;
        {
            let mut state = self.state.lock().await;
            let running = state
                .containers
                .get(container_id)
                .map(|c| c.running)
                .ok_or_else(|| Error::ContainerNotFound(container_id.to_string()))?;
            if !running {
                return Err(Error::runtime(format!(
                    "Container {} is not running",
                    container_id
                )));
            }
            state
                .exec_requests
                .push((container_id.to_string(), request.clone()));
        }

        let scripted = self.exec_responses.lock().await.pop_front();
        match scripted.unwrap_or_else(|| Self::default_exec(request)) {
            MockExec::Output {
                exit_code,
                stdout,
                stderr,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(RawExecOutput {
                    stdout: stdout.into_bytes(),
                    stderr: stderr.into_bytes(),
                    exit_code,
                })
            }
            MockExec::Error(message) => Err(Error::runtime(message)),
        }
    }

    async fn is_available(&self) -> bool {
        !self.unreachable
    }
}
