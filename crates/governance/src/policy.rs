use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use agent_sandbox_core::{Assessment, AssessmentRequest, RiskAssessor, RiskLevel};

/// A versioned policy document containing command rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyFile {
    pub version: String,
    pub name: String,
    pub rules: Vec<PolicyRule>,
    #[serde(default)]
    pub thresholds: PolicyThresholds,
    /// Risk assigned to calls no rule matches.
    #[serde(default = "default_unmatched_risk")]
    pub unmatched_risk: RiskLevel,
}

fn default_unmatched_risk() -> RiskLevel {
    RiskLevel::Medium
}

/// A single command rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub description: Option<String>,
    #[serde(rename = "match")]
    pub match_rule: RuleMatch,
    pub action: RuleAction,
}

/// Condition to match a tool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleMatch {
    /// Exact tool name to match.
    pub tool: Option<String>,
    /// Glob pattern for tool name (e.g., "str_replace_*").
    pub tool_glob: Option<String>,
    /// Substrings that must all appear in the rendered command or arguments.
    pub args_contain: Option<Vec<String>>,
}

/// Action to take if a rule matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    /// Assigned risk level.
    pub risk: RiskLevel,
    /// Human-readable reason for the assignment.
    pub reason: Option<String>,
}

/// Risk score per level, reported alongside decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyThresholds {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            low: 0,
            medium: 50,
            high: 100,
        }
    }
}

/// Rule-based command risk evaluation.
pub struct PolicyEngine {
    pub policy: PolicyFile,
}

impl PolicyEngine {
    /// Load policy from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read policy file: {:?}", path.as_ref()))?;
        let policy: PolicyFile =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse policy YAML")?;
        Ok(Self { policy })
    }

    pub fn from_file(policy: PolicyFile) -> Self {
        Self { policy }
    }

    /// Evaluate a tool call. The highest-risk matching rule wins; with no
    /// match the call gets `unmatched_risk`.
    pub fn evaluate(&self, tool: &str, command: &str, args: &serde_json::Value) -> PolicyDecision {
        let haystack = format!(
            "{} {}",
            command,
            serde_json::to_string(args).unwrap_or_default()
        )
        .to_lowercase();

        let mut matched: Option<&PolicyRule> = None;
        for rule in &self.policy.rules {
            if Self::matches(rule, tool, &haystack)
                && matched.map_or(true, |m| rule.action.risk > m.action.risk)
            {
                matched = Some(rule);
            }
        }

        let (risk_level, reason) = match matched {
            Some(rule) => (
                rule.action.risk,
                rule.action
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("Matched rule: {}", rule.id)),
            ),
            None => (
                self.policy.unmatched_risk,
                "No policy rule matched".to_string(),
            ),
        };

        PolicyDecision {
            risk_level,
            risk_score: self.risk_to_score(risk_level),
            matched_rule: matched.map(|rule| rule.id.clone()),
            reason,
            policy_version: self.policy.version.clone(),
        }
    }

    fn matches(rule: &PolicyRule, tool: &str, haystack: &str) -> bool {
        if let Some(tool_name) = &rule.match_rule.tool {
            if tool_name != tool {
                return false;
            }
        }

        if let Some(glob) = &rule.match_rule.tool_glob {
            if !glob_match(glob, tool) {
                return false;
            }
        }

        if let Some(substrings) = &rule.match_rule.args_contain {
            if !substrings
                .iter()
                .all(|sub| haystack.contains(&sub.to_lowercase()))
            {
                return false;
            }
        }

        true
    }

    fn risk_to_score(&self, risk: RiskLevel) -> u32 {
        match risk {
            RiskLevel::Low => self.policy.thresholds.low,
            RiskLevel::Medium => self.policy.thresholds.medium,
            RiskLevel::High => self.policy.thresholds.high,
        }
    }

    /// Merge another policy into this one (other wins on ID conflict).
    pub fn merge(&mut self, other: PolicyFile) {
        for rule in other.rules {
            if let Some(existing) = self.policy.rules.iter_mut().find(|r| r.id == rule.id) {
                *existing = rule;
            } else {
                self.policy.rules.push(rule);
            }
        }
        self.policy.thresholds = other.thresholds;
        self.policy.unmatched_risk = other.unmatched_risk;
        self.policy.version = other.version;
    }
}

/// `*` at the start, end, or both.
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(rest), Some(_)) => text.contains(&rest[..rest.len().saturating_sub(1)]),
        (Some(suffix), None) => text.ends_with(suffix),
        (None, Some(prefix)) => text.starts_with(prefix),
        (None, None) => pattern == text,
    }
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub matched_rule: Option<String>,
    pub reason: String,
    pub policy_version: String,
}

// =============================================================================
// Policy-backed assessor
// =============================================================================

/// Static, offline risk assessor over a `PolicyEngine`.
///
/// A call is safe when the assigned risk does not exceed `max_safe_risk`.
pub struct PolicyAssessor {
    engine: PolicyEngine,
    max_safe_risk: RiskLevel,
}

impl PolicyAssessor {
    pub fn new(engine: PolicyEngine, max_safe_risk: RiskLevel) -> Self {
        Self {
            engine,
            max_safe_risk,
        }
    }

    pub fn load(path: impl AsRef<Path>, max_safe_risk: RiskLevel) -> Result<Self> {
        Ok(Self::new(PolicyEngine::load(path)?, max_safe_risk))
    }
}

#[async_trait]
impl RiskAssessor for PolicyAssessor {
    async fn assess(&self, request: &AssessmentRequest) -> agent_sandbox_core::Result<Assessment> {
        let decision = self
            .engine
            .evaluate(&request.tool_name, &request.command, &request.args);
        Ok(Assessment {
            is_safe: decision.risk_level <= self.max_safe_risk,
            reasoning: decision.reason,
            risk_level: decision.risk_level,
        })
    }
}
