//! Sandbox integration tests.
//!
//! Tests the full pipeline: SandboxProvider → ContainerRuntime (MockRuntime).
//! These tests do NOT require Docker; they use MockRuntime for deterministic behavior.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_sandbox_core::config::{SandboxConfig, WritableMount};
use agent_sandbox_core::{
    Error, ExecOptions, NetworkMode, SandboxResourceLimits, SandboxState,
    SECURITY_VIOLATION_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
use agent_sandbox_executor::{ContainerRuntime, MockExec, MockFault, MockRuntime, SandboxProvider};

// =============================================================================
// Helpers
// =============================================================================

fn provider_with(runtime: Arc<MockRuntime>) -> SandboxProvider {
    SandboxProvider::new(runtime, SandboxConfig::default())
}

fn repo() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

// =============================================================================
// 1. Creation & hardening
// =============================================================================

#[tokio::test]
async fn test_create_sandbox_with_default_resources() {
    let runtime = Arc::new(MockRuntime::default());
    let provider = provider_with(runtime.clone());
    let repo = repo();

    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    let requested = sandbox.metadata.requested_resources;
    assert_eq!(requested.cpu_count, 2.0);
    assert_eq!(requested.memory_bytes, 2 * 1024 * 1024 * 1024);
    assert_eq!(requested.pids_limit, 512);
    assert_eq!(sandbox.metadata.applied_resources, requested);
    assert!(!sandbox.metadata.resources_clamped());
    assert_eq!(sandbox.metadata.image, "node:20");

    assert_eq!(
        provider.state(sandbox.id.as_str()),
        Some(SandboxState::Running)
    );
    assert!(runtime.is_running(&sandbox.metadata.container_id).await);
}

#[tokio::test]
async fn test_container_spec_is_hardened() {
    let runtime = Arc::new(MockRuntime::default());
    let provider = provider_with(runtime.clone());
    let repo = repo();

    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();
    let spec = runtime.spec(&sandbox.metadata.container_id).await.unwrap();

    assert_eq!(spec.cap_drop, vec!["ALL"]);
    assert!(spec.security_opt.contains(&"no-new-privileges:true".to_string()));
    assert!(spec.readonly_rootfs);
    assert_eq!(
        spec.tmpfs.get("/tmp").map(String::as_str),
        Some("rw,nosuid,nodev,noexec,size=64m")
    );
    assert_eq!(spec.user, "1000:1000");
    assert_eq!(spec.network_mode, NetworkMode::None);
    assert_eq!(spec.name, sandbox.metadata.container_name);

    let repo_mount = &spec.mounts[0];
    assert!(repo_mount.read_only);
    assert_eq!(repo_mount.target, "/workspace");
    assert_eq!(
        repo_mount.source,
        std::fs::canonicalize(repo.path()).unwrap()
    );
}

#[tokio::test]
async fn test_applied_resources_recorded_separately() {
    let clamped = SandboxResourceLimits {
        cpu_count: 1.0,
        memory_bytes: 1024 * 1024 * 1024,
        pids_limit: 512,
    };
    let runtime = Arc::new(MockRuntime::default().with_applied_resources(clamped));
    let provider = provider_with(runtime);
    let repo = repo();

    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    assert_eq!(sandbox.metadata.requested_resources, SandboxResourceLimits::default());
    assert_eq!(sandbox.metadata.applied_resources, clamped);
    assert!(sandbox.metadata.resources_clamped());
}

#[tokio::test]
async fn test_mount_path_resolution() {
    let base = repo();
    let missing = base.path().join("checkout");

    // Missing mount path without auto-create is a configuration error
    let provider = provider_with(Arc::new(MockRuntime::default()));
    let err = provider
        .create_sandbox("node:20", Some(&missing))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    // With auto-create the path is created
    let config = SandboxConfig {
        auto_create_mount_path: true,
        ..Default::default()
    };
    let provider = SandboxProvider::new(Arc::new(MockRuntime::default()), config);
    provider
        .create_sandbox("node:20", Some(&missing))
        .await
        .unwrap();
    assert!(missing.is_dir());

    // Configured default path is used when none is given
    let config = SandboxConfig {
        mount_path: Some(base.path().to_string_lossy().into_owned()),
        ..Default::default()
    };
    let provider = SandboxProvider::new(Arc::new(MockRuntime::default()), config);
    let sandbox = provider.create_sandbox("node:20", None).await.unwrap();
    assert_eq!(
        sandbox.metadata.mount_path,
        std::fs::canonicalize(base.path()).unwrap()
    );
}

#[tokio::test]
async fn test_writable_mounts_created_when_configured() {
    let base = repo();
    let out_dir = base.path().join("out");
    let config = SandboxConfig {
        writable_mounts: vec![WritableMount {
            host_path: out_dir.to_string_lossy().into_owned(),
            container_path: "/out".into(),
        }],
        create_writable_mounts: true,
        ..Default::default()
    };
    let runtime = Arc::new(MockRuntime::default());
    let provider = SandboxProvider::new(runtime.clone(), config);

    let sandbox = provider
        .create_sandbox("node:20", Some(base.path()))
        .await
        .unwrap();

    assert!(out_dir.is_dir());
    let spec = runtime.spec(&sandbox.metadata.container_id).await.unwrap();
    let out_mount = spec.mounts.iter().find(|m| m.target == "/out").unwrap();
    assert!(!out_mount.read_only);
}

#[tokio::test]
async fn test_unreachable_runtime_fails_creation() {
    let provider = provider_with(Arc::new(MockRuntime::unreachable()));
    let repo = repo();

    assert!(!provider.is_available().await);
    let err = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_failed_start_removes_container() {
    let runtime = Arc::new(MockRuntime::default());
    runtime
        .fail_next(MockFault::Start, "OCI runtime create failed: no such image layer")
        .await;
    let provider = provider_with(runtime.clone());
    let repo = repo();

    let err = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(runtime.live_containers().await.is_empty());
    assert!(provider.list_sandboxes().is_empty());
}

#[tokio::test]
async fn test_failed_inspect_removes_started_container() {
    let runtime = Arc::new(MockRuntime::default());
    runtime
        .fail_next(MockFault::Inspect, "context deadline exceeded")
        .await;
    let provider = provider_with(runtime.clone());
    let repo = repo();

    let err = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(runtime.live_containers().await.is_empty());
    assert!(provider.list_sandboxes().is_empty());
}

// =============================================================================
// 2. Exec
// =============================================================================

#[tokio::test]
async fn test_exec_success() {
    let runtime = Arc::new(MockRuntime::default());
    let provider = provider_with(runtime.clone());
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    let result = provider
        .exec(&sandbox, "echo ok", ExecOptions::new())
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "ok\n");
    assert_eq!(result.result, "ok");
    assert_eq!(result.artifacts.stdout, "ok\n");
}

#[tokio::test]
async fn test_exec_passes_cwd_and_env() {
    let runtime = Arc::new(MockRuntime::default());
    let provider = provider_with(runtime.clone());
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    provider
        .exec(sandbox.id.as_str(), "npm test", ExecOptions::new())
        .await
        .unwrap();
    provider
        .exec(
            &sandbox,
            "npm test",
            ExecOptions::new().cwd("/workspace/pkg").env("CI", "true"),
        )
        .await
        .unwrap();

    let requests = runtime.exec_requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].1.working_dir, "/workspace");
    assert!(requests[0].1.env.is_empty());
    assert_eq!(requests[1].1.working_dir, "/workspace/pkg");
    assert_eq!(requests[1].1.env, vec!["CI=true".to_string()]);
    assert_eq!(requests[1].1.user, "1000:1000");
}

#[tokio::test]
async fn test_exec_through_process_capability() {
    let provider = provider_with(Arc::new(MockRuntime::default()));
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    let result = sandbox
        .process
        .execute_command("echo via handle", ExecOptions::new())
        .await
        .unwrap();
    assert_eq!(result.result, "via handle");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_kills_and_restarts_container() {
    let runtime = Arc::new(MockRuntime::new(vec![MockExec::slow(Duration::from_secs(5))]));
    let provider = provider_with(runtime.clone());
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();
    let container_id = sandbox.metadata.container_id.clone();

    let started = tokio::time::Instant::now();
    let result = provider
        .exec(&sandbox, "sleep 5", ExecOptions::new().timeout_sec(1))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(result.stdout.is_empty());
    assert!(result.stderr.contains("timed out"));

    // The container was killed and brought back
    assert_eq!(runtime.kill_count(&container_id).await, 1);
    assert_eq!(runtime.start_count(&container_id).await, 2);
    assert_eq!(
        provider.state(sandbox.id.as_str()),
        Some(SandboxState::Running)
    );

    // The same handle still works
    let result = provider
        .exec(&sandbox, "echo ok", ExecOptions::new())
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.result, "ok");
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_disables_race() {
    let runtime = Arc::new(MockRuntime::new(vec![MockExec::slow(Duration::from_secs(5))]));
    let config = SandboxConfig {
        default_timeout_secs: 1,
        ..Default::default()
    };
    let provider = SandboxProvider::new(runtime.clone(), config);
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    let result = provider
        .exec(&sandbox, "sleep 5", ExecOptions::new().timeout_sec(0))
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(runtime.kill_count(&sandbox.metadata.container_id).await, 0);
}

#[tokio::test]
async fn test_read_only_write_is_security_violation() {
    let runtime = Arc::new(MockRuntime::new(vec![MockExec::exit(
        1,
        "touch: cannot touch '/usr/local/x': Read-only file system\n",
    )]));
    let provider = provider_with(runtime);
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    let result = provider
        .exec(&sandbox, "touch /usr/local/x", ExecOptions::new())
        .await
        .unwrap();

    assert_eq!(result.exit_code, SECURITY_VIOLATION_EXIT_CODE);
    assert!(result.stderr.contains("Read-only file system"));
}

#[tokio::test]
async fn test_ordinary_failure_keeps_exit_code() {
    let stderr = "AttributeError: 'Config' object has no attribute 'capability'\n";
    let runtime = Arc::new(MockRuntime::new(vec![MockExec::exit(1, stderr)]));
    let provider = provider_with(runtime);
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    let result = provider
        .exec(&sandbox, "pytest tests/test_config.py", ExecOptions::new())
        .await
        .unwrap();

    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, stderr);
}

#[tokio::test(start_paused = true)]
async fn test_failed_restart_after_timeout_stops_sandbox() {
    let runtime = Arc::new(MockRuntime::new(vec![MockExec::slow(Duration::from_secs(5))]));
    let provider = provider_with(runtime.clone());
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();
    runtime
        .fail_next(MockFault::Start, "Cannot connect to the Docker daemon")
        .await;

    let err = provider
        .exec(&sandbox, "sleep 5", ExecOptions::new().timeout_sec(1))
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(runtime.kill_count(&sandbox.metadata.container_id).await, 1);
    assert_eq!(
        provider.state(sandbox.id.as_str()),
        Some(SandboxState::Stopped)
    );

    // A stopped sandbox refuses further commands
    let err = provider
        .exec(&sandbox, "echo ok", ExecOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_runtime_security_error_is_downgraded() {
    let runtime = Arc::new(MockRuntime::new(vec![MockExec::error(
        "OCI runtime exec failed: operation not permitted",
    )]));
    let provider = provider_with(runtime);
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    let result = provider
        .exec(&sandbox, "mount /dev/sda1 /mnt", ExecOptions::new())
        .await
        .unwrap();

    assert_eq!(result.exit_code, SECURITY_VIOLATION_EXIT_CODE);
    assert_eq!(result.stderr, "OCI runtime exec failed: operation not permitted");
}

#[tokio::test]
async fn test_unexpected_runtime_error_propagates() {
    let runtime = Arc::new(MockRuntime::new(vec![MockExec::error(
        "Cannot connect to the Docker daemon",
    )]));
    let provider = provider_with(runtime);
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    let err = provider
        .exec(&sandbox, "ls", ExecOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_exec_unknown_sandbox() {
    let provider = provider_with(Arc::new(MockRuntime::default()));
    let err = provider
        .exec("missing", "ls", ExecOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SandboxNotFound(_)));
}

#[tokio::test]
async fn test_independent_sandboxes_run_concurrently() {
    let runtime = Arc::new(MockRuntime::default());
    let provider = provider_with(runtime);
    let repo_a = repo();
    let repo_b = repo();
    let a = provider
        .create_sandbox("node:20", Some(repo_a.path()))
        .await
        .unwrap();
    let b = provider
        .create_sandbox("python:3.12", Some(repo_b.path()))
        .await
        .unwrap();
    assert_ne!(a.id, b.id);

    let (ra, rb) = tokio::join!(
        provider.exec(&a, "echo a", ExecOptions::new()),
        provider.exec(&b, "echo b", ExecOptions::new()),
    );
    assert_eq!(ra.unwrap().result, "a");
    assert_eq!(rb.unwrap().result, "b");
}

// =============================================================================
// 3. Teardown
// =============================================================================

#[tokio::test]
async fn test_stop_is_idempotent() {
    let runtime = Arc::new(MockRuntime::default());
    let provider = provider_with(runtime.clone());
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();
    let id = sandbox.id.as_str();

    assert_eq!(provider.stop_sandbox(id).await.unwrap(), sandbox.id);
    assert_eq!(provider.stop_sandbox(id).await.unwrap(), sandbox.id);
    assert_eq!(provider.state(id), Some(SandboxState::Stopped));
    assert!(!runtime.is_running(&sandbox.metadata.container_id).await);

    // Exec against a stopped sandbox is a transport error
    let err = provider
        .exec(&sandbox, "ls", ExecOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let runtime = Arc::new(MockRuntime::default());
    let provider = provider_with(runtime.clone());
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();
    let id = sandbox.id.as_str();

    assert!(!provider.delete_sandbox("never-created").await.unwrap());
    assert!(provider.delete_sandbox(id).await.unwrap());
    assert!(!provider.delete_sandbox(id).await.unwrap());

    assert!(provider.get_sandbox(id).is_none());
    assert!(provider.list_sandboxes().is_empty());
    assert!(runtime.was_removed(&sandbox.metadata.container_id).await);
}

#[tokio::test]
async fn test_teardown_of_vanished_container_succeeds() {
    let runtime = Arc::new(MockRuntime::default());
    let provider = provider_with(runtime.clone());
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();
    let id = sandbox.id.as_str();

    // Removed behind the provider's back
    runtime
        .remove_container(&sandbox.metadata.container_id)
        .await
        .unwrap();

    assert_eq!(provider.stop_sandbox(id).await.unwrap(), sandbox.id);
    assert_eq!(provider.state(id), Some(SandboxState::Stopped));
    assert!(provider.delete_sandbox(id).await.unwrap());
    assert!(provider.get_sandbox(id).is_none());
}

#[tokio::test]
async fn test_get_sandbox_is_pure_lookup() {
    let provider = provider_with(Arc::new(MockRuntime::default()));
    let repo = repo();
    let sandbox = provider
        .create_sandbox("node:20", Some(repo.path()))
        .await
        .unwrap();

    let found = provider.get_sandbox(sandbox.id.as_str()).unwrap();
    assert_eq!(found.metadata, sandbox.metadata);
    assert!(provider.get_sandbox("unknown").is_none());
    assert!(Path::new(&found.metadata.mount_path).is_absolute());
}
