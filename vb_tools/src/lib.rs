//! ABOUTME: Network and security tools built on the safe command executor
//! ABOUTME: Every tool validates input before anything is spawned

use serde::Serialize;
use std::sync::Arc;
use vb_config::ToolsConfig;
use vb_core::MonotonicTimer;
use vb_exec::{ExecOutput, Executor};

pub mod dns;
pub mod hash;
pub mod ping;
pub mod portscan;
pub mod rbl;
pub mod score;
pub mod ssl;
pub mod traceroute;
pub mod whois;

#[cfg(test)]
pub(crate) mod testing;

pub use dns::{DnsReport, RecordType};
pub use hash::HashReport;
pub use ping::PingReport;
pub use portscan::{PortReport, PortScanReport, PortState};
pub use rbl::{RblListing, RblReport};
pub use score::{aggregate_score, rbl_score, ssl_score};
pub use ssl::SslReport;
pub use traceroute::{Hop, TracerouteReport};
pub use whois::WhoisReport;

/// Result of one tool invocation, with what is needed for the audit log
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome<T> {
    pub tool: &'static str,
    pub target: String,
    pub success: bool,
    pub error: Option<String>,
    pub report: Option<T>,
    /// Rendered command lines, in the order they ran
    pub commands: Vec<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl<T> ToolOutcome<T> {
    /// Score carried by the report, if this tool produces one
    pub fn veriscore(&self) -> Option<u8>
    where
        T: Scored,
    {
        self.report.as_ref().and_then(Scored::veriscore)
    }

    pub fn command_line(&self) -> Option<String> {
        if self.commands.is_empty() {
            None
        } else {
            Some(self.commands.join(" ; "))
        }
    }
}

/// Reports that carry a VeriScore
pub trait Scored {
    fn veriscore(&self) -> Option<u8>;
}

/// Collects command lines and timing while a tool runs
pub(crate) struct Trace {
    tool: &'static str,
    target: String,
    commands: Vec<String>,
    exit_code: Option<i32>,
    timer: MonotonicTimer,
}

impl Trace {
    pub(crate) fn new(tool: &'static str, target: impl Into<String>) -> Self {
        Self {
            tool,
            target: target.into(),
            commands: Vec::new(),
            exit_code: None,
            timer: MonotonicTimer::new(),
        }
    }

    pub(crate) fn record(&mut self, output: &ExecOutput) {
        self.commands.push(output.command_line.clone());
        self.exit_code = output.exit_code;
    }

    pub(crate) fn ok<T>(self, report: T) -> ToolOutcome<T> {
        self.finish(Some(report), None)
    }

    pub(crate) fn failed<T>(self, error: impl Into<String>, report: Option<T>) -> ToolOutcome<T> {
        self.finish(report, Some(error.into()))
    }

    fn finish<T>(self, report: Option<T>, error: Option<String>) -> ToolOutcome<T> {
        ToolOutcome {
            tool: self.tool,
            target: self.target,
            success: error.is_none(),
            error,
            report,
            commands: self.commands,
            exit_code: self.exit_code,
            duration_ms: self.timer.elapsed_ms(),
        }
    }
}

/// Error text for a command that did not produce usable output
pub(crate) fn failure_message(output: &ExecOutput) -> String {
    output
        .error
        .clone()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "Command failed".to_string())
}

/// Entry point for all tools; cheap to clone and share across handlers
#[derive(Clone)]
pub struct ToolKit {
    executor: Arc<dyn Executor>,
    config: ToolsConfig,
}

impl ToolKit {
    pub fn new(executor: Arc<dyn Executor>, config: ToolsConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &ToolsConfig {
        &self.config
    }

    pub(crate) fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }
}

impl std::fmt::Debug for ToolKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolKit")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
