//! Command filter pipeline.
//!
//! Decides which proposed tool calls may reach the executor:
//!
//! ```text
//! tool calls ─┬─ not gated ───────────────────────────────┐
//!             ├─ gated, known-safe ─────────────────────┐ │
//!             └─ gated, needs review ─→ assessor (∥) ─┐ │ │
//!                                                     ↓ ↓ ↓
//!                         known-safe ++ approved ++ pass-through
//! ```
//!
//! An assessor failure is always a rejection.

use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use agent_sandbox_core::{
    Assessment, AssessmentRequest, CommandEvaluation, Error, RiskAssessor, RiskLevel, ToolCall,
};

use crate::audit::{AuditEntry, AuditOutcome, AuditStore};
use crate::formatters::{shell_tokens, FormattedCommand, GatedTool};
use crate::metrics::{track_assessment_latency, track_filter_decision, FilterDecision};
use crate::safe_commands::is_known_safe_command;

/// Reasoning attached to calls whose assessment failed.
pub const FAIL_CLOSED_REASONING: &str =
    "Risk assessment failed; the command was rejected because its safety could not be verified";

const AUDIT_ACTOR: &str = "command_filter";
const AUDIT_ACTION: &str = "filter_tool_call";

/// The verdict for a call whose assessor errored. Never safe.
pub fn fail_closed(error: &Error) -> Assessment {
    tracing::warn!(error = %error, "Risk assessor failed, rejecting command");
    Assessment {
        is_safe: false,
        reasoning: FAIL_CLOSED_REASONING.to_string(),
        risk_level: RiskLevel::High,
    }
}

/// Result of one filter run.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Calls allowed to reach the executor.
    pub filtered_tool_calls: Vec<ToolCall>,
    /// True when at least one gated call was rejected.
    pub was_filtered: bool,
    /// Rejected calls with their verdicts.
    pub rejected: Vec<CommandEvaluation>,
}

/// Gates tool calls through static classification and a risk assessor.
#[derive(Clone)]
pub struct CommandFilter {
    assessor: Arc<dyn RiskAssessor>,
    audit: Option<Arc<dyn AuditStore>>,
}

impl CommandFilter {
    pub fn new(assessor: Arc<dyn RiskAssessor>) -> Self {
        Self {
            assessor,
            audit: None,
        }
    }

    /// Record every rejection in an audit store.
    pub fn with_audit_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.audit = Some(store);
        self
    }

    /// Filter a batch of tool calls.
    ///
    /// The assessor is consulted exactly once per gated call that is not
    /// known-safe, and all such calls are assessed concurrently.
    pub async fn filter_unsafe_commands(&self, tool_calls: Vec<ToolCall>) -> FilterOutcome {
        let mut passthrough = Vec::new();
        let mut known_safe = Vec::new();
        let mut needs_review = Vec::new();

        for call in tool_calls {
            match GatedTool::from_name(&call.name) {
                None => passthrough.push(call),
                Some(GatedTool::Shell) if is_known_safe_command(&shell_tokens(&call.args)) => {
                    known_safe.push(call)
                }
                Some(tool) => {
                    let formatted = tool.format(&call.args);
                    needs_review.push((call, formatted));
                }
            }
        }

        let gated_count = known_safe.len() + needs_review.len();
        let started = Instant::now();
        let evaluations = join_all(
            needs_review
                .into_iter()
                .map(|(call, formatted)| self.evaluate(call, formatted)),
        )
        .await;
        if !evaluations.is_empty() {
            track_assessment_latency(started.elapsed().as_secs_f64());
        }

        let (approved, rejected): (Vec<_>, Vec<_>) =
            evaluations.into_iter().partition(|e| e.is_safe);

        for evaluation in &rejected {
            self.record_rejection(evaluation).await;
        }

        track_filter_decision(FilterDecision::Passthrough, passthrough.len());
        track_filter_decision(FilterDecision::KnownSafe, known_safe.len());
        track_filter_decision(FilterDecision::Approved, approved.len());
        track_filter_decision(FilterDecision::Rejected, rejected.len());

        let mut filtered_tool_calls = known_safe;
        filtered_tool_calls.extend(approved.into_iter().map(|e| e.tool_call));
        let allowed_gated = filtered_tool_calls.len();
        filtered_tool_calls.extend(passthrough);

        tracing::debug!(
            gated = gated_count,
            allowed = allowed_gated,
            rejected = rejected.len(),
            "Filtered tool calls"
        );

        FilterOutcome {
            filtered_tool_calls,
            was_filtered: allowed_gated < gated_count,
            rejected,
        }
    }

    async fn evaluate(&self, tool_call: ToolCall, formatted: FormattedCommand) -> CommandEvaluation {
        let request = AssessmentRequest {
            command: formatted.command.clone(),
            tool_name: tool_call.name.clone(),
            args: tool_call.args.clone(),
        };

        let assessment = match self.assessor.assess(&request).await {
            Ok(assessment) => assessment,
            Err(e) => fail_closed(&e),
        };

        CommandEvaluation {
            tool_call,
            command_description: formatted.description,
            command_string: formatted.command,
            is_safe: assessment.is_safe,
            reasoning: assessment.reasoning,
            risk_level: assessment.risk_level,
        }
    }

    async fn record_rejection(&self, evaluation: &CommandEvaluation) {
        tracing::warn!(
            tool_call_id = %evaluation.tool_call.id,
            tool = %evaluation.tool_call.name,
            description = %evaluation.command_description,
            command = %evaluation.command_string,
            reasoning = %evaluation.reasoning,
            risk_level = %evaluation.risk_level,
            "Rejected unsafe tool call"
        );

        let Some(store) = &self.audit else {
            return;
        };
        let entry = AuditEntry::new(
            AUDIT_ACTOR,
            AUDIT_ACTION,
            evaluation.tool_call.name.clone(),
            AuditOutcome::Denied,
        )
        .with_metadata(json!({
            "tool_call_id": evaluation.tool_call.id,
            "description": evaluation.command_description,
            "command": evaluation.command_string,
            "reasoning": evaluation.reasoning,
            "risk_level": evaluation.risk_level,
        }));

        if let Err(e) = store.log(entry).await {
            tracing::error!(error = %e, "Failed to write audit entry");
        }
    }
}

/// Filter tool calls through the given assessor without an audit store.
pub async fn filter_unsafe_commands(
    tool_calls: Vec<ToolCall>,
    assessor: Arc<dyn RiskAssessor>,
) -> FilterOutcome {
    CommandFilter::new(assessor)
        .filter_unsafe_commands(tool_calls)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_sandbox_core::mocks::MockAssessor;

    fn shell(id: &str, command: &[&str]) -> ToolCall {
        ToolCall::new(id, "shell", json!({ "command": command }))
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcome = filter_unsafe_commands(Vec::new(), Arc::new(MockAssessor::approve_all())).await;
        assert!(outcome.filtered_tool_calls.is_empty());
        assert!(!outcome.was_filtered);
    }

    #[test]
    fn test_fail_closed_verdict() {
        let verdict = fail_closed(&Error::assessor("timeout"));
        assert!(!verdict.is_safe);
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert_eq!(verdict.reasoning, FAIL_CLOSED_REASONING);
    }

    #[tokio::test]
    async fn test_rejection_carries_rendered_command() {
        let assessor = Arc::new(MockAssessor::approve_all().reject("rm"));
        let outcome = filter_unsafe_commands(
            vec![shell("1", &["rm", "-rf", "build dir"])],
            assessor,
        )
        .await;

        assert!(outcome.was_filtered);
        let rejected = &outcome.rejected[0];
        assert_eq!(rejected.command_string, "rm -rf 'build dir'");
        assert_eq!(rejected.command_description, "Execute shell command in the repository root");
        assert_eq!(rejected.risk_level, RiskLevel::High);
    }
}
