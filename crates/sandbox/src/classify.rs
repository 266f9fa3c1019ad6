//! Exec outcome classification.
//!
//! Every exec call ends in exactly one `ExecOutcome`. Completed runs,
//! timeouts and security violations all become `ExecResult` values; only
//! transport failures leave this module as errors.

use agent_sandbox_core::{Error, ExecResult, Result, SECURITY_VIOLATION_EXIT_CODE};

use crate::engine::RawExecOutput;

/// Lower-case fragments of runtime messages that indicate the container's
/// security profile refused the operation.
pub const SECURITY_FINGERPRINTS: &[&str] = &[
    "operation not permitted",
    "permission denied",
    "read-only file system",
    "apparmor",
    "seccomp",
    "security profile",
    "no new privileges",
    "capability",
];

/// Kernel messages that mark a completed run as refused by the sandbox.
/// Narrower than `SECURITY_FINGERPRINTS`: program output routinely mentions
/// "permission denied" or "capability" on ordinary failures.
pub const KERNEL_ENFORCEMENT_FINGERPRINTS: &[&str] =
    &["read-only file system", "operation not permitted"];

/// Whether a message matches the security fingerprint set.
pub fn is_security_violation(message: &str) -> bool {
    matches_any(message, SECURITY_FINGERPRINTS)
}

fn matches_any(message: &str, fingerprints: &[&str]) -> bool {
    let lower = message.to_lowercase();
    fingerprints.iter().any(|f| lower.contains(f))
}

/// Terminal state of one exec call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The command ran to completion.
    Completed(RawExecOutput),
    /// The timer fired first; the container must be killed and restarted.
    TimedOut { timeout_secs: u64 },
    /// The runtime refused the command.
    SecurityViolation { message: String, stdout: String },
}

impl ExecOutcome {
    /// Classify a finished run. A nonzero exit whose stderr carries a kernel
    /// enforcement message is reported as a violation; the original exit
    /// code is appended to stderr.
    pub fn from_output(output: RawExecOutput) -> Self {
        if output.exit_code != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if matches_any(&stderr, KERNEL_ENFORCEMENT_FINGERPRINTS) {
                let mut message = stderr.into_owned();
                if !message.is_empty() && !message.ends_with('\n') {
                    message.push('\n');
                }
                message.push_str(&format!("(original exit code {})", output.exit_code));
                return Self::SecurityViolation {
                    message,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                };
            }
        }
        Self::Completed(output)
    }

    /// Classify a runtime error. Fingerprinted errors are downgraded to a
    /// violation; everything else is re-raised.
    pub fn from_error(err: Error) -> Result<Self> {
        let message = match &err {
            Error::Runtime(msg) | Error::Internal(msg) => msg.clone(),
            Error::Other(e) => e.to_string(),
            _ => return Err(err),
        };

        if is_security_violation(&message) {
            Ok(Self::SecurityViolation {
                message,
                stdout: String::new(),
            })
        } else {
            Err(err)
        }
    }

    /// Label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::TimedOut { .. } => "timed_out",
            Self::SecurityViolation { .. } => "security_violation",
        }
    }

    /// Normalize into the caller-facing result.
    pub fn into_result(self, command: &str) -> ExecResult {
        match self {
            Self::Completed(output) => ExecResult::new(
                output.exit_code,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            ),
            Self::TimedOut { timeout_secs } => ExecResult::timed_out(command, timeout_secs),
            Self::SecurityViolation { message, stdout } => {
                ExecResult::new(SECURITY_VIOLATION_EXIT_CODE, stdout, message)
            }
        }
    }
}
