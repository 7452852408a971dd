//! Background execution of multi-check system scans.
//!
//! A scan moves pending -> running -> completed | failed. Checks run
//! concurrently; each one is audited like a direct tool call. The scan
//! completes when at least one check produced tool output and fails when
//! none did. Either way subscribers get a signed event.

use crate::{
    audit::{record_tool_call, CallContext},
    models::ScanInfo,
    webhooks::{WebhookDispatcher, SCAN_COMPLETED_EVENT, SCAN_FAILED_EVENT},
};
use futures_util::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::{future::Future, net::IpAddr, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use vb_core::{MonotonicTimer, Result};
use vb_db::{Db, SystemScan, SystemScanRepository};
use vb_obs::Metrics;
use vb_tools::{aggregate_score, RecordType, ToolKit, ToolOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Failed,
    Error,
    Skipped,
}

#[derive(Debug)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    score: Option<u8>,
    value: Value,
}

impl CheckResult {
    fn skipped(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Skipped,
            score: None,
            value: json!({ "status": CheckStatus::Skipped, "reason": reason }),
        }
    }

    fn from_result<T: Serialize>(
        name: &str,
        result: &Result<ToolOutcome<T>>,
        score: Option<u8>,
    ) -> Self {
        match result {
            Ok(outcome) => {
                let status = if outcome.success {
                    CheckStatus::Ok
                } else {
                    CheckStatus::Failed
                };
                Self {
                    name: name.to_string(),
                    status,
                    score: score.filter(|_| outcome.success),
                    value: json!({ "status": status, "outcome": outcome }),
                }
            }
            Err(e) => Self {
                name: name.to_string(),
                status: CheckStatus::Error,
                score: None,
                value: json!({ "status": CheckStatus::Error, "error": e.to_string() }),
            },
        }
    }

    fn produced_output(&self) -> bool {
        matches!(self.status, CheckStatus::Ok | CheckStatus::Failed)
    }
}

/// Runs scans outside the request that created them
#[derive(Debug, Clone)]
pub struct ScanRunner {
    db: Db,
    tools: ToolKit,
    metrics: Arc<Metrics>,
    dispatcher: WebhookDispatcher,
}

impl ScanRunner {
    pub fn new(
        db: Db,
        tools: ToolKit,
        metrics: Arc<Metrics>,
        dispatcher: WebhookDispatcher,
    ) -> Self {
        Self {
            db,
            tools,
            metrics,
            dispatcher,
        }
    }

    /// Run `scan` on a detached task
    pub fn spawn(&self, scan: SystemScan) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            let scan_id = scan.id.clone();
            if let Err(e) = runner.run(scan).await {
                warn!(scan_id = %scan_id, "System scan aborted: {}", e);
                runner.abort(&scan_id, &e.to_string()).await;
            }
        })
    }

    /// Mark an unfinished scan failed and announce it
    async fn abort(&self, scan_id: &str, reason: &str) {
        match SystemScanRepository::new(self.db.pool())
            .fail(scan_id, reason)
            .await
        {
            Ok(Some(scan)) => self.notify(&scan).await,
            Ok(None) => {}
            Err(e) => warn!(scan_id = %scan_id, "Failed to mark scan as failed: {}", e),
        }
    }

    /// Execute every requested check and store the final state.
    /// Returns `None` when the scan was not pending.
    #[instrument(skip(self, scan), fields(scan_id = %scan.id, target = %scan.target))]
    pub async fn run(&self, scan: SystemScan) -> Result<Option<SystemScan>> {
        let repo = SystemScanRepository::new(self.db.pool());
        if !repo.mark_running(&scan.id).await? {
            warn!("Scan is not pending, skipping");
            return Ok(None);
        }

        let checks: Vec<String> = serde_json::from_str(&scan.checks).unwrap_or_default();
        let futures: Vec<BoxFuture<'_, CheckResult>> = checks
            .iter()
            .map(|check| self.run_check(&scan.id, check, &scan.target))
            .collect();
        let results = join_all(futures).await;

        let finished = if results.iter().any(CheckResult::produced_output) {
            let veriscore = aggregate_score(results.iter().map(|r| r.score));
            let summary: serde_json::Map<String, Value> = results
                .into_iter()
                .map(|r| (r.name, r.value))
                .collect();
            info!(?veriscore, "System scan completed");
            repo.complete(&scan.id, &Value::Object(summary), veriscore.map(i64::from))
                .await?
        } else {
            let reasons = results
                .iter()
                .map(|r| format!("{}: {}", r.name, describe(&r.value)))
                .collect::<Vec<_>>()
                .join("; ");
            info!(%reasons, "System scan failed");
            repo.fail(&scan.id, &format!("No check produced results ({})", reasons))
                .await?
        };

        if let Some(scan) = &finished {
            self.notify(scan).await;
        }
        Ok(finished)
    }

    fn run_check<'a>(
        &'a self,
        scan_id: &'a str,
        check: &'a str,
        target: &'a str,
    ) -> BoxFuture<'a, CheckResult> {
        let is_ip = target.parse::<IpAddr>().is_ok();
        async move {
            match check {
                "dns" if is_ip => CheckResult::skipped(check, "DNS lookup needs a domain name"),
                "dns" => {
                    let result = self
                        .audited("dns_lookup", target, scan_id, || {
                            self.tools.dns_lookup(target, RecordType::A)
                        })
                        .await;
                    CheckResult::from_result(check, &result, None)
                }
                "ssl" => {
                    let result = self
                        .audited("ssl_check", target, scan_id, || {
                            self.tools.ssl_check(target, None)
                        })
                        .await;
                    let score = result.as_ref().ok().and_then(|o| o.veriscore());
                    CheckResult::from_result(check, &result, score)
                }
                "rbl" if !is_ip => CheckResult::skipped(check, "RBL check needs an IP address"),
                "rbl" => {
                    let result = self
                        .audited("rbl_check", target, scan_id, || self.tools.rbl_check(target))
                        .await;
                    let score = result.as_ref().ok().and_then(|o| o.veriscore());
                    CheckResult::from_result(check, &result, score)
                }
                "ports" => {
                    let result = self
                        .audited("port_scan", target, scan_id, || {
                            self.tools.port_scan(target, &[])
                        })
                        .await;
                    CheckResult::from_result(check, &result, None)
                }
                other => CheckResult::skipped(other, "Unknown check"),
            }
        }
        .boxed()
    }

    async fn audited<T, F, Fut>(
        &self,
        tool: &'static str,
        target: &str,
        scan_id: &str,
        run: F,
    ) -> Result<ToolOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ToolOutcome<T>>>,
    {
        let timer = MonotonicTimer::new();
        let result = run().await;
        let context = CallContext {
            client_ip: None,
            scan_id: Some(scan_id),
        };
        record_tool_call(
            &self.db,
            &self.metrics,
            tool,
            target,
            &context,
            &result,
            timer.elapsed(),
        )
        .await;
        result
    }

    async fn notify(&self, scan: &SystemScan) {
        self.metrics.record_scan(&scan.status);
        let event = match scan.status() {
            Ok(vb_db::ScanStatus::Completed) => SCAN_COMPLETED_EVENT,
            _ => SCAN_FAILED_EVENT,
        };
        let data = match serde_json::to_value(ScanInfo::from(scan.clone())) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to encode scan for webhooks: {}", e);
                return;
            }
        };
        match self.dispatcher.dispatch(&self.db, event, &data).await {
            Ok(deliveries) => {
                for delivery in &deliveries {
                    self.metrics.record_webhook_delivery(delivery.success);
                }
            }
            Err(e) => warn!(event, "Failed to dispatch scan event: {}", e),
        }
    }
}

fn describe(value: &Value) -> String {
    value
        .get("reason")
        .or_else(|| value.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("no output")
        .to_string()
}
