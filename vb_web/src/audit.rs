//! Audit trail and metrics for tool invocations.

use serde_json::json;
use std::time::Duration;
use tracing::warn;
use vb_core::{Error, Result};
use vb_db::{AuditLogRepository, CreateAuditLog, Db};
use vb_obs::Metrics;
use vb_tools::ToolOutcome;

/// Where a tool call came from
#[derive(Debug, Clone, Default)]
pub struct CallContext<'a> {
    pub client_ip: Option<&'a str>,
    /// Set when the call ran as part of a system scan
    pub scan_id: Option<&'a str>,
}

/// Record metrics and an audit row for one tool call, whatever its result.
///
/// `target` is used only when the tool rejected its input; otherwise the
/// outcome's normalized target is stored. Audit write failures are logged
/// and never fail the request.
pub async fn record_tool_call<T>(
    db: &Db,
    metrics: &Metrics,
    tool: &'static str,
    target: &str,
    context: &CallContext<'_>,
    result: &Result<ToolOutcome<T>>,
    elapsed: Duration,
) {
    let entry = match result {
        Ok(outcome) => {
            metrics.record_tool(tool, outcome.success, elapsed.as_secs_f64());
            CreateAuditLog {
                tool: tool.to_string(),
                target: Some(outcome.target.clone()),
                command_line: outcome.command_line(),
                success: outcome.success,
                exit_code: outcome.exit_code.map(i64::from),
                duration_ms: outcome.duration_ms as i64,
                client_ip: context.client_ip.map(str::to_string),
                details: Some(
                    json!({
                        "error": outcome.error,
                        "scan_id": context.scan_id,
                    })
                    .to_string(),
                ),
            }
        }
        Err(error) => {
            metrics.record_tool(tool, false, elapsed.as_secs_f64());
            if matches!(error, Error::CommandNotAllowed(_)) {
                metrics.inc_command_rejections();
            }
            CreateAuditLog {
                tool: tool.to_string(),
                target: Some(target.chars().take(255).collect()),
                command_line: None,
                success: false,
                exit_code: None,
                duration_ms: elapsed.as_millis() as i64,
                client_ip: context.client_ip.map(str::to_string),
                details: Some(
                    json!({
                        "error": error.to_string(),
                        "kind": error.kind(),
                        "scan_id": context.scan_id,
                    })
                    .to_string(),
                ),
            }
        }
    };

    if let Err(e) = AuditLogRepository::new(db.pool()).record(entry).await {
        warn!(tool, "Failed to write audit log: {}", e);
    }
}
