//! Core traits for the agent sandbox.
//!
//! Traits are organized by the seam they describe:
//! - `process`: the per-sandbox process capability (SandboxProcess)
//! - `assessor`: external command risk assessment (RiskAssessor)
//! - `llm`: language-model client consumed by LLM-backed assessors (LlmClient)

pub mod assessor;
pub mod llm;
pub mod process;

pub use assessor::*;
pub use llm::*;
pub use process::*;
