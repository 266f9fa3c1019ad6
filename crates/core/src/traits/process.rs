//! Sandbox process capability.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecOptions, ExecResult};

/// Command execution capability attached to a `SandboxHandle`.
///
/// Classified failures (timeout, security violation) are returned as
/// `Ok(ExecResult)` with reserved exit codes; only transport failures are
/// `Err`.
#[async_trait]
pub trait SandboxProcess: Send + Sync {
    /// Run a shell command inside the sandbox.
    async fn execute_command(&self, command: &str, options: ExecOptions) -> Result<ExecResult>;
}
