//! Integration tests for the command filter pipeline.

use std::sync::Arc;

use agent_sandbox_core::mocks::{MockAssessor, MockLlm};
use agent_sandbox_core::{RiskLevel, ToolCall};
use agent_sandbox_governance::{
    AuditFilter, AuditOutcome, AuditStore, CommandFilter, InMemoryAuditStore, LlmRiskAssessor,
    PolicyAssessor, RejectAllAssessor, FAIL_CLOSED_REASONING,
};
use serde_json::json;

fn shell(id: &str, command: &[&str]) -> ToolCall {
    ToolCall::new(id, "shell", json!({ "command": command }))
}

fn ids(calls: &[ToolCall]) -> Vec<&str> {
    calls.iter().map(|c| c.id.as_str()).collect()
}

// =============================================================================
// Assessor call accounting
// =============================================================================

#[tokio::test]
async fn test_assessor_called_once_per_unknown_gated_call() {
    let assessor = Arc::new(MockAssessor::approve_all());
    let filter = CommandFilter::new(assessor.clone());

    let calls = vec![
        shell("safe-1", &["ls", "-la"]),
        shell("safe-2", &["sudo", "chmod", "755", "run.sh"]),
        shell("review-1", &["npm", "install"]),
        ToolCall::new("review-2", "view", json!({"path": "src/main.rs"})),
        ToolCall::new("other", "write_todos", json!({"todos": []})),
    ];
    let outcome = filter.filter_unsafe_commands(calls).await;

    assert_eq!(assessor.call_count(), 2);
    let assessed: Vec<String> = assessor.requests().into_iter().map(|r| r.tool_name).collect();
    assert!(assessed.contains(&"shell".to_string()));
    assert!(assessed.contains(&"view".to_string()));

    assert!(!outcome.was_filtered);
    assert_eq!(outcome.filtered_tool_calls.len(), 5);
}

#[tokio::test]
async fn test_no_assessment_for_known_safe_or_ungated() {
    let assessor = Arc::new(MockAssessor::approve_all());
    let filter = CommandFilter::new(assessor.clone());

    let outcome = filter
        .filter_unsafe_commands(vec![
            shell("1", &["cat", "/etc/passwd"]),
            shell("2", &["git", "status"]),
            shell("3", &["sed", "s/a/b/", "f.txt"]),
            ToolCall::new("4", "scratchpad", json!({"notes": "rm -rf /"})),
        ])
        .await;

    assert_eq!(assessor.call_count(), 0);
    assert_eq!(outcome.filtered_tool_calls.len(), 4);
}

#[tokio::test]
async fn test_assessor_sees_rendered_command() {
    let assessor = Arc::new(MockAssessor::approve_all());
    let filter = CommandFilter::new(assessor.clone());

    filter
        .filter_unsafe_commands(vec![shell("1", &["sed", "-i", "s/a/b/", "f.txt"])])
        .await;

    let requests = assessor.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].command, "sed -i s/a/b/ f.txt");
    assert_eq!(requests[0].tool_name, "shell");
}

// =============================================================================
// Verdicts
// =============================================================================

#[tokio::test]
async fn test_rejected_calls_are_removed() {
    let assessor = Arc::new(MockAssessor::approve_all().reject("rm -rf"));
    let filter = CommandFilter::new(assessor);

    let outcome = filter
        .filter_unsafe_commands(vec![
            shell("keep", &["npm", "test"]),
            shell("drop", &["rm", "-rf", "/workspace"]),
        ])
        .await;

    assert!(outcome.was_filtered);
    assert_eq!(ids(&outcome.filtered_tool_calls), vec!["keep"]);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].tool_call.id, "drop");
    assert!(!outcome.rejected[0].is_safe);
}

#[tokio::test]
async fn test_assessor_failure_fails_closed() {
    let assessor = Arc::new(MockAssessor::approve_all().fail_on("curl"));
    let filter = CommandFilter::new(assessor.clone());

    let outcome = filter
        .filter_unsafe_commands(vec![
            ToolCall::new("fetch", "get_url_content", json!({"url": "https://example.com"})),
            shell("build", &["npm", "run", "build"]),
        ])
        .await;

    // One failure does not affect the other assessment
    assert_eq!(assessor.call_count(), 2);
    assert!(outcome.was_filtered);
    assert_eq!(ids(&outcome.filtered_tool_calls), vec!["build"]);

    let rejected = &outcome.rejected[0];
    assert_eq!(rejected.tool_call.id, "fetch");
    assert_eq!(rejected.risk_level, RiskLevel::High);
    assert_eq!(rejected.reasoning, FAIL_CLOSED_REASONING);
}

#[tokio::test]
async fn test_malformed_llm_reply_fails_closed() {
    let llm = Arc::new(MockLlm::constant("Looks fine to me!"));
    let filter = CommandFilter::new(Arc::new(LlmRiskAssessor::new(llm.clone())));

    let outcome = filter
        .filter_unsafe_commands(vec![shell("1", &["npm", "install", "left-pad"])])
        .await;

    assert_eq!(llm.call_count(), 1);
    assert!(outcome.was_filtered);
    assert!(outcome.filtered_tool_calls.is_empty());
    assert_eq!(outcome.rejected[0].reasoning, FAIL_CLOSED_REASONING);
}

#[tokio::test]
async fn test_reject_all_keeps_known_safe_and_ungated() {
    let filter = CommandFilter::new(Arc::new(RejectAllAssessor));

    let outcome = filter
        .filter_unsafe_commands(vec![
            shell("safe", &["ls"]),
            shell("unsafe", &["make", "install"]),
            ToolCall::new("other", "write_todos", json!({})),
        ])
        .await;

    assert!(outcome.was_filtered);
    assert_eq!(ids(&outcome.filtered_tool_calls), vec!["safe", "other"]);
}

#[tokio::test]
async fn test_policy_assessor_in_pipeline() {
    let yaml = r#"
version: "1"
name: default
rules:
  - id: destructive
    match:
      tool: shell
      args_contain: ["rm -rf"]
    action:
      risk: high
  - id: installs
    match:
      tool: shell
      args_contain: ["install"]
    action:
      risk: medium
"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.yaml");
    std::fs::write(&path, yaml).unwrap();

    let assessor = PolicyAssessor::load(&path, RiskLevel::Medium).unwrap();
    let filter = CommandFilter::new(Arc::new(assessor));

    let outcome = filter
        .filter_unsafe_commands(vec![
            shell("install", &["npm", "install"]),
            shell("wipe", &["rm", "-rf", "node_modules"]),
            shell("test", &["cargo", "test"]),
        ])
        .await;

    let mut kept = ids(&outcome.filtered_tool_calls);
    kept.sort();
    assert_eq!(kept, vec!["install", "test"]);
    assert_eq!(outcome.rejected[0].reasoning, "Matched rule: destructive");
}

// =============================================================================
// Ordering & audit
// =============================================================================

#[tokio::test]
async fn test_output_groups_gated_before_passthrough() {
    let filter = CommandFilter::new(Arc::new(MockAssessor::approve_all()));

    let outcome = filter
        .filter_unsafe_commands(vec![
            ToolCall::new("p1", "write_todos", json!({})),
            shell("a1", &["npm", "test"]),
            shell("s1", &["pwd"]),
            ToolCall::new("p2", "scratchpad", json!({})),
        ])
        .await;

    assert_eq!(ids(&outcome.filtered_tool_calls), vec!["s1", "a1", "p1", "p2"]);
}

#[tokio::test]
async fn test_rejections_are_audited() {
    let store = Arc::new(InMemoryAuditStore::new());
    let filter = CommandFilter::new(Arc::new(MockAssessor::approve_all().reject("curl")))
        .with_audit_store(store.clone());

    filter
        .filter_unsafe_commands(vec![
            ToolCall::new("f", "get_url_content", json!({"url": "http://169.254.169.254"})),
            shell("ok", &["npm", "test"]),
        ])
        .await;

    let entries = store.query(AuditFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.action, "filter_tool_call");
    assert_eq!(entry.resource, "get_url_content");
    assert_eq!(entry.outcome, AuditOutcome::Denied);

    let metadata = entry.metadata.as_ref().unwrap();
    assert_eq!(metadata["risk_level"], "high");
    assert_eq!(metadata["description"], "Fetch content of http://169.254.169.254");
}

#[tokio::test]
async fn test_example_policy_file_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/policy.example.yaml");
    let filter = CommandFilter::new(Arc::new(PolicyAssessor::load(path, RiskLevel::Low).unwrap()));

    let outcome = filter
        .filter_unsafe_commands(vec![
            shell("test", &["npm", "test"]),
            shell("wipe", &["rm", "-rf", "dist"]),
            ToolCall::new("edit", "str_replace_based_edit_tool", json!({"command": "create", "path": "a.rs"})),
        ])
        .await;

    let mut kept = ids(&outcome.filtered_tool_calls);
    kept.sort();
    assert_eq!(kept, vec!["edit", "test"]);
}
