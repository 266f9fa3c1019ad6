#![deny(unused)]
//! agent-sandbox - operator front end for the sandboxed executor.
//!
//! Creates one hardened sandbox for a repository, then reads tool calls as
//! JSON lines from stdin, filters them for safety, executes approved shell
//! calls and writes one JSON report per line to stdout.

mod operator;

use std::path::PathBuf;
use std::sync::Arc;

use agent_sandbox_core::config::AppConfig;
use agent_sandbox_core::RiskAssessor;
use agent_sandbox_executor::{DockerRuntime, SandboxProvider};
use agent_sandbox_governance::{
    configure_tracing, setup_metrics_recorder, CommandFilter, FileAuditStore, PolicyAssessor,
    RejectAllAssessor,
};

use crate::operator::Operator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    configure_tracing(&config.logging)?;
    let metrics = setup_metrics_recorder()?;

    tracing::info!("Starting agent-sandbox v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Command filter
    // =========================================================================
    let assessor: Arc<dyn RiskAssessor> = match &config.filter.policy_file {
        Some(path) => {
            tracing::info!(policy = %path, max_safe_risk = %config.filter.max_safe_risk, "Using policy assessor");
            Arc::new(PolicyAssessor::load(path, config.filter.max_safe_risk)?)
        }
        None => {
            tracing::warn!("No policy configured; every unrecognized command will be rejected");
            Arc::new(RejectAllAssessor)
        }
    };

    let mut filter = CommandFilter::new(assessor);
    if let Some(path) = &config.filter.audit_log {
        tracing::info!(path = %path, "Auditing rejected tool calls");
        filter = filter.with_audit_store(Arc::new(FileAuditStore::new(path)));
    }

    // =========================================================================
    // Sandbox
    // =========================================================================
    let runtime = Arc::new(DockerRuntime::new()?);
    let provider = SandboxProvider::new(runtime, config.sandbox.clone());
    if !provider.is_available().await {
        anyhow::bail!("Docker daemon is not reachable");
    }

    let repo = std::env::args().nth(1).map(PathBuf::from);
    let sandbox = provider
        .create_sandbox(&config.sandbox.image, repo.as_deref())
        .await?;
    tracing::info!(
        sandbox_id = %sandbox.id,
        mount = %sandbox.metadata.mount_path.display(),
        "Sandbox ready, reading tool calls from stdin"
    );

    // =========================================================================
    // Session
    // =========================================================================
    let operator = Operator::new(provider, filter, sandbox);
    let session = operator.run(tokio::io::stdin(), tokio::io::stdout()).await;

    if let Err(e) = operator.shutdown().await {
        tracing::error!(error = %e, "Failed to delete sandbox");
    }
    tracing::debug!(metrics = %metrics.render(), "Session metrics");

    session
}
