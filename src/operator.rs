//! Line-oriented tool-call session against one sandbox.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use agent_sandbox_core::{ExecOptions, ExecResult, RiskLevel, SandboxHandle, ToolCall};
use agent_sandbox_executor::SandboxProvider;
use agent_sandbox_governance::{CommandFilter, GatedTool};

/// One output line.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Report {
    Executed {
        tool_call_id: String,
        result: ExecResult,
    },
    Rejected {
        tool_call_id: String,
        reasoning: String,
        risk_level: RiskLevel,
    },
    Skipped {
        tool_call_id: String,
        reason: String,
    },
    Failed {
        tool_call_id: String,
        error: String,
    },
    Invalid {
        error: String,
    },
}

pub struct Operator {
    provider: SandboxProvider,
    filter: CommandFilter,
    sandbox: SandboxHandle,
}

impl Operator {
    pub fn new(provider: SandboxProvider, filter: CommandFilter, sandbox: SandboxHandle) -> Self {
        Self {
            provider,
            filter,
            sandbox,
        }
    }

    /// Process input lines until EOF or Ctrl-C.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(input).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, shutting down");
                    break;
                }
            };
            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }

            for report in self.handle_line(&line).await {
                let mut encoded = serde_json::to_vec(&report)?;
                encoded.push(b'\n');
                output.write_all(&encoded).await?;
            }
            output.flush().await?;
        }
        Ok(())
    }

    /// A line holds one tool call object or an array of them.
    pub async fn handle_line(&self, line: &str) -> Vec<Report> {
        let calls = match parse_tool_calls(line) {
            Ok(calls) => calls,
            Err(e) => {
                return vec![Report::Invalid {
                    error: e.to_string(),
                }]
            }
        };

        let outcome = self.filter.filter_unsafe_commands(calls).await;
        let mut reports: Vec<Report> = outcome
            .rejected
            .into_iter()
            .map(|evaluation| Report::Rejected {
                tool_call_id: evaluation.tool_call.id,
                reasoning: evaluation.reasoning,
                risk_level: evaluation.risk_level,
            })
            .collect();

        for call in outcome.filtered_tool_calls {
            reports.push(self.execute(call).await);
        }
        reports
    }

    async fn execute(&self, call: ToolCall) -> Report {
        if GatedTool::from_name(&call.name) != Some(GatedTool::Shell) {
            return Report::Skipped {
                tool_call_id: call.id,
                reason: format!("'{}' is not executed by the operator", call.name),
            };
        }

        let command = GatedTool::Shell.format(&call.args).command;
        if command.is_empty() {
            return Report::Failed {
                tool_call_id: call.id,
                error: "shell call without a command".to_string(),
            };
        }

        let mut options = ExecOptions::new();
        if let Some(workdir) = call.args.get("workdir").and_then(|v| v.as_str()) {
            options = options.cwd(workdir);
        }
        if let Some(timeout) = call.args.get("timeout").and_then(|v| v.as_u64()) {
            options = options.timeout_sec(timeout);
        }

        match self.provider.exec(&self.sandbox, &command, options).await {
            Ok(result) => Report::Executed {
                tool_call_id: call.id,
                result,
            },
            Err(e) => {
                tracing::error!(tool_call_id = %call.id, error = %e, "Exec failed");
                Report::Failed {
                    tool_call_id: call.id,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Delete the session's sandbox.
    pub async fn shutdown(&self) -> agent_sandbox_core::Result<()> {
        self.provider
            .delete_sandbox(self.sandbox.id.as_str())
            .await
            .map(|_| ())
    }
}

fn parse_tool_calls(line: &str) -> serde_json::Result<Vec<ToolCall>> {
    match serde_json::from_str::<serde_json::Value>(line)? {
        value @ serde_json::Value::Array(_) => serde_json::from_value(value),
        value => Ok(vec![serde_json::from_value(value)?]),
    }
}
