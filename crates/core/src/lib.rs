#![deny(unused)]
//! Core types, traits, and error definitions for the agent sandbox.
//!
//! This crate provides the building blocks shared by the execution plane
//! (`agent_sandbox_executor`) and the command safety gate
//! (`agent_sandbox_governance`).

pub mod config;
pub mod error;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{
    ChatMessage, LlmClient, LlmResponse, LlmUsage, RiskAssessor, SandboxProcess,
};
pub use types::*;
