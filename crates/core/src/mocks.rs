//! Mock implementations of core traits for testing.
//!
//! These mocks are scripted and record their calls so tests can assert how
//! often an external collaborator was consulted.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::{
    traits::{ChatMessage, LlmClient, LlmResponse, LlmUsage, RiskAssessor},
    types::{Assessment, AssessmentRequest, RiskLevel},
    Error, Result,
};

// =============================================================================
// Mock LLM Client
// =============================================================================

/// Scripted mock LLM that returns predefined responses.
pub struct MockLlm {
    responses: Mutex<Vec<String>>,
    call_count: Mutex<usize>,
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl MockLlm {
    /// Create a new mock LLM with a queue of responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Create a mock that always returns the same response.
    pub fn constant(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    /// Create a mock whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// Get the number of calls made to this mock.
    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, prompt: &str) -> Result<LlmResponse> {
        let count = {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            *count
        };
        self.prompts.lock().unwrap().push(prompt.to_string());

        if self.fail {
            return Err(Error::internal("mock LLM failure"));
        }

        let responses = self.responses.lock().unwrap();
        let idx = (count - 1) % responses.len().max(1);
        let content = responses.get(idx).cloned().unwrap_or_default();

        Ok(LlmResponse {
            content,
            finish_reason: "stop".to_string(),
            usage: LlmUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            },
        })
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<LlmResponse> {
        let prompt = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        self.complete(&prompt).await
    }
}

// =============================================================================
// Mock Risk Assessor
// =============================================================================

/// Scripted risk assessor.
///
/// Commands containing a configured rejection pattern are judged unsafe,
/// commands containing a failure pattern make the call error, everything
/// else is approved.
#[derive(Default)]
pub struct MockAssessor {
    reject_patterns: Vec<String>,
    fail_patterns: Vec<String>,
    requests: Mutex<Vec<AssessmentRequest>>,
}

impl MockAssessor {
    /// Create an assessor that approves everything.
    pub fn approve_all() -> Self {
        Self::default()
    }

    /// Reject commands containing the pattern.
    pub fn reject(mut self, pattern: impl Into<String>) -> Self {
        self.reject_patterns.push(pattern.into());
        self
    }

    /// Fail (return an error) for commands containing the pattern.
    pub fn fail_on(mut self, pattern: impl Into<String>) -> Self {
        self.fail_patterns.push(pattern.into());
        self
    }

    /// Get the number of assessments requested.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<AssessmentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RiskAssessor for MockAssessor {
    async fn assess(&self, request: &AssessmentRequest) -> Result<Assessment> {
        self.requests.lock().unwrap().push(request.clone());

        if self.fail_patterns.iter().any(|p| request.command.contains(p)) {
            return Err(Error::assessor("mock assessor unavailable"));
        }

        if self.reject_patterns.iter().any(|p| request.command.contains(p)) {
            return Ok(Assessment {
                is_safe: false,
                reasoning: format!("'{}' is destructive", request.command),
                risk_level: RiskLevel::High,
            });
        }

        Ok(Assessment {
            is_safe: true,
            reasoning: "Read-only or reversible operation".to_string(),
            risk_level: RiskLevel::Low,
        })
    }
}
