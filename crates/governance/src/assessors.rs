//! Risk assessor implementations.
//!
//! - `LlmRiskAssessor` asks a language model to judge a rendered command.
//! - `RejectAllAssessor` refuses everything; it is the default when no
//!   assessor is configured.
//!
//! The static rule-based `PolicyAssessor` lives next to the rule engine in
//! `policy`.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use agent_sandbox_core::{
    Assessment, AssessmentRequest, ChatMessage, Error, LlmClient, Result, RiskAssessor, RiskLevel,
};

// =============================================================================
// LLM-backed assessor
// =============================================================================

const REVIEW_SYSTEM_PROMPT: &str = "\
You review commands that an autonomous coding agent wants to run inside a \
sandboxed container. The repository is mounted read-only, the root \
filesystem is read-only, there is no network and all capabilities are \
dropped. Judge whether the command is safe to run without human review.

A command is unsafe if it deletes or overwrites data, changes permissions \
outside the repository, exfiltrates secrets, installs software, reaches the \
network, or tries to escape the sandbox.

Reply with a single JSON object and nothing else:
{\"is_safe\": true|false, \"reasoning\": \"<one sentence>\", \"risk_level\": \"low\"|\"medium\"|\"high\"}";

/// Risk assessor backed by an `LlmClient`.
pub struct LlmRiskAssessor {
    llm: Arc<dyn LlmClient>,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    is_safe: bool,
    reasoning: String,
    risk_level: RiskLevel,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerdictEnvelope {
    Wrapped { result: Verdict },
    Bare(Verdict),
}

impl LlmRiskAssessor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(request: &AssessmentRequest) -> String {
        format!(
            "Tool: {}\nCommand: {}\nArguments: {}",
            request.tool_name, request.command, request.args
        )
    }

    /// Parse a model reply into an assessment.
    ///
    /// Accepts `{"result": {...}}` and a bare verdict object, optionally
    /// wrapped in a fenced code block.
    pub fn parse_reply(reply: &str) -> Result<Assessment> {
        let body = strip_code_fence(reply);
        let envelope: VerdictEnvelope = serde_json::from_str(body)
            .map_err(|e| Error::assessor(format!("Malformed assessor reply: {}", e)))?;
        let verdict = match envelope {
            VerdictEnvelope::Wrapped { result } => result,
            VerdictEnvelope::Bare(verdict) => verdict,
        };
        Ok(Assessment {
            is_safe: verdict.is_safe,
            reasoning: verdict.reasoning,
            risk_level: verdict.risk_level,
        })
    }
}

#[async_trait]
impl RiskAssessor for LlmRiskAssessor {
    async fn assess(&self, request: &AssessmentRequest) -> Result<Assessment> {
        let messages = [
            ChatMessage::system(REVIEW_SYSTEM_PROMPT),
            ChatMessage::user(Self::build_prompt(request)),
        ];
        let response = self.llm.chat(&messages).await.map_err(|e| match e {
            Error::Assessor(_) => e,
            other => Error::assessor(other.to_string()),
        })?;

        tracing::debug!(
            tool = %request.tool_name,
            tokens = response.usage.total_tokens,
            "Received risk assessment"
        );
        Self::parse_reply(&response.content)
    }
}

/// Strip a surrounding ``` fence (with optional language tag).
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

// =============================================================================
// Reject-all assessor
// =============================================================================

/// Judges every command unsafe.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAllAssessor;

#[async_trait]
impl RiskAssessor for RejectAllAssessor {
    async fn assess(&self, _request: &AssessmentRequest) -> Result<Assessment> {
        Ok(Assessment {
            is_safe: false,
            reasoning: "No risk assessor configured".to_string(),
            risk_level: RiskLevel::High,
        })
    }
}
