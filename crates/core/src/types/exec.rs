use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Reserved Exit Codes
// =============================================================================

/// Exit code reported when a command exceeded its timeout.
pub const TIMEOUT_EXIT_CODE: i64 = 124;
/// Exit code reported when the runtime refused a command on security grounds.
pub const SECURITY_VIOLATION_EXIT_CODE: i64 = 126;

// =============================================================================
// Exec Types
// =============================================================================

/// Raw output streams of an execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecArtifacts {
    pub stdout: String,
    pub stderr: String,
}

/// Normalized outcome of one command run inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Exit code of the command.
    pub exit_code: i64,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Trimmed standard output.
    pub result: String,
    pub artifacts: ExecArtifacts,
}

impl ExecResult {
    /// Build a result from captured streams.
    pub fn new(exit_code: i64, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        let stdout = stdout.into();
        let stderr = stderr.into();
        Self {
            exit_code,
            result: stdout.trim().to_string(),
            artifacts: ExecArtifacts {
                stdout: stdout.clone(),
                stderr: stderr.clone(),
            },
            stdout,
            stderr,
        }
    }

    /// Result for a command that was cut off by its timeout.
    pub fn timed_out(command: &str, timeout_secs: u64) -> Self {
        Self::new(
            TIMEOUT_EXIT_CODE,
            String::new(),
            format!(
                "Command timed out after {}s and was killed; the sandbox was restarted: {}",
                timeout_secs, command
            ),
        )
    }

    /// Result for a command rejected by the container's security profile.
    pub fn security_violation(message: impl Into<String>) -> Self {
        Self::new(SECURITY_VIOLATION_EXIT_CODE, String::new(), message)
    }

    /// Whether the execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn is_timeout(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }

    pub fn is_security_violation(&self) -> bool {
        self.exit_code == SECURITY_VIOLATION_EXIT_CODE
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Working directory; defaults to the container's configured workdir.
    pub cwd: Option<String>,
    /// Environment overlay.
    pub env: BTreeMap<String, String>,
    /// Timeout override; `Some(0)` disables the timeout.
    pub timeout_sec: Option<u64>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout_sec(mut self, secs: u64) -> Self {
        self.timeout_sec = Some(secs);
        self
    }
}
