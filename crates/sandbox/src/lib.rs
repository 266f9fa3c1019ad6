#![deny(unused)]
//! Sandboxed command execution for the coding agent.
//!
//! This crate runs approved commands inside hardened Docker containers. The
//! host repository is bind-mounted read-only and nothing else on the host is
//! reachable from inside the sandbox.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Orchestration layer (agent loop)      │
//! │    ↓ approved tool calls only          │
//! ├────────────────────────────────────────┤
//! │  SandboxProvider                       │
//! │    lifecycle, timeout race, restart,   │
//! │    security-violation classification   │
//! │    ↓ ContainerRuntime trait            │
//! ├────────────────────────────────────────┤
//! │  DockerRuntime (bollard)               │
//! ├────────────────────────────────────────┤
//! │  Docker Container (isolated)           │
//! │    /workspace  (repo, read-only bind)  │
//! │    /tmp        (tmpfs, noexec, 64m)    │
//! │    read-only rootfs, no caps, uid 1000 │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use agent_sandbox_executor::{DockerRuntime, SandboxProvider};
//!
//! let runtime = Arc::new(DockerRuntime::new()?);
//! let provider = SandboxProvider::new(runtime, config.sandbox.clone());
//!
//! let sandbox = provider.create_sandbox("node:20", Some(Path::new("/repo"))).await?;
//! let result = provider.exec(&sandbox, "npm test", ExecOptions::new().timeout_sec(300)).await?;
//! provider.delete_sandbox(sandbox.id.as_str()).await?;
//! ```

pub mod classify;
pub mod engine;
pub mod mock;
pub mod provider;

pub use classify::{
    is_security_violation, ExecOutcome, KERNEL_ENFORCEMENT_FINGERPRINTS, SECURITY_FINGERPRINTS,
};
pub use engine::{
    ContainerRuntime, ContainerSpec, ContainerStatus, DockerRuntime, ExecRequest, MountSpec,
    RawExecOutput,
};
pub use mock::{MockExec, MockFault, MockRuntime};
pub use provider::{ExecTarget, SandboxProvider};
