#![deny(unused)]
//! Command safety governance for the agent sandbox.
//!
//! This crate provides:
//! - Static known-safe command classification
//! - Per-tool command rendering for gated tools
//! - The command filter pipeline (fail-closed risk assessment)
//! - Risk assessors (LLM-backed, YAML policy, reject-all)
//! - Audit logging of rejected calls
//! - Tracing and metrics setup

pub mod assessors;
pub mod audit;
pub mod filter;
pub mod formatters;
pub mod metrics;
pub mod policy;
pub mod safe_commands;
pub mod tracing_layer;

pub use assessors::{LlmRiskAssessor, RejectAllAssessor};
pub use audit::{AuditEntry, AuditFilter, AuditOutcome, AuditStore, FileAuditStore, InMemoryAuditStore};
pub use filter::{fail_closed, filter_unsafe_commands, CommandFilter, FilterOutcome, FAIL_CLOSED_REASONING};
pub use formatters::{shell_tokens, FormattedCommand, GatedTool};
pub use metrics::{setup_metrics_recorder, track_filter_decision, FilterDecision};
pub use policy::{
    PolicyAssessor, PolicyDecision, PolicyEngine, PolicyFile, PolicyRule, PolicyThresholds,
    RuleAction, RuleMatch,
};
pub use safe_commands::{is_known_safe_command, SAFE_COMMAND_PREFIXES};
pub use tracing_layer::configure_tracing;
