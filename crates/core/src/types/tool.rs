use serde::{Deserialize, Serialize};

// =============================================================================
// Tool Call Types
// =============================================================================

/// A structured action proposed by the coding agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Arguments, opaque beyond the gated tools the filter recognizes.
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Risk level assigned to a proposed command.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input handed to a risk assessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub command: String,
    pub tool_name: String,
    pub args: serde_json::Value,
}

/// A risk assessor's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub is_safe: bool,
    pub reasoning: String,
    pub risk_level: RiskLevel,
}

/// Safety verdict for one tool call, produced fresh per filter run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEvaluation {
    pub tool_call: ToolCall,
    pub command_description: String,
    pub command_string: String,
    pub is_safe: bool,
    pub reasoning: String,
    pub risk_level: RiskLevel,
}
