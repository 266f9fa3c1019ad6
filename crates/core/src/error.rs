//! Error types for the agent sandbox.

use thiserror::Error;

/// Result type alias using the sandbox Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the agent sandbox.
///
/// Classified execution failures (timeouts, security violations) are never
/// represented here: they come back as ordinary `ExecResult` values.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Lifecycle / Configuration Errors
    // =========================================================================
    #[error("Sandbox not found: {0}")]
    SandboxNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Container Runtime (Transport) Errors
    // =========================================================================
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    // =========================================================================
    // Risk Assessment Errors
    // =========================================================================
    #[error("Risk assessor error: {0}")]
    Assessor(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a sandbox-not-found error.
    pub fn sandbox_not_found(id: impl Into<String>) -> Self {
        Self::SandboxNotFound(id.into())
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a container runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create a risk assessor error.
    pub fn assessor(msg: impl Into<String>) -> Self {
        Self::Assessor(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from the container runtime transport rather
    /// than from a caller mistake.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Runtime(_) | Self::ContainerNotFound(_) | Self::Io(_))
    }
}
