//! Path discovery via `traceroute -n`.

use crate::{failure_message, ToolKit, ToolOutcome, Trace};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::instrument;
use vb_core::{Error, Result};
use vb_exec::{validate_target, ExecRequest, MAX_TIMEOUT_SECS};

static HOP_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(.*)$").expect("valid regex"));
static RTT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d.]+)\s*ms").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hop {
    pub hop: u32,
    /// `None` when the probe got no answer (`*`)
    pub address: Option<String>,
    pub rtt_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TracerouteReport {
    pub target: String,
    pub hops: Vec<Hop>,
    pub reached: bool,
}

pub(crate) fn parse_hops(stdout: &str) -> Vec<Hop> {
    stdout
        .lines()
        .filter_map(|line| {
            let caps = HOP_LINE.captures(line)?;
            let hop = caps[1].parse().ok()?;
            let rest = &caps[2];
            let address = rest
                .split_whitespace()
                .find(|tok| tok.parse::<std::net::IpAddr>().is_ok())
                .map(str::to_string);
            let rtt_ms = RTT.captures(rest).and_then(|c| c[1].parse().ok());
            Some(Hop {
                hop,
                address,
                rtt_ms,
            })
        })
        .collect()
}

impl ToolKit {
    #[instrument(skip(self))]
    pub async fn traceroute(
        &self,
        target: &str,
        max_hops: Option<u32>,
    ) -> Result<ToolOutcome<TracerouteReport>> {
        let target = validate_target(target)?;
        let limit = self.config().max_hops;
        let max_hops = max_hops.unwrap_or(limit);
        if !(1..=limit).contains(&max_hops) {
            return Err(Error::Validation(format!(
                "max_hops must be between 1 and {}",
                limit
            )));
        }

        let rendered = target.to_string();
        let request = ExecRequest::new("traceroute")
            .args([
                "-n".to_string(),
                "-q".to_string(),
                "1".to_string(),
                "-w".to_string(),
                "2".to_string(),
                "-m".to_string(),
                max_hops.to_string(),
                rendered.clone(),
            ])
            .timeout_secs(MAX_TIMEOUT_SECS);

        let mut trace = Trace::new("traceroute", rendered.as_str());
        let output = self.executor().execute(request).await?;
        trace.record(&output);

        let hops = parse_hops(&output.stdout);
        if hops.is_empty() {
            return Ok(trace.failed(failure_message(&output), None));
        }

        let reached = match &target {
            vb_exec::Target::Ip(ip) => hops
                .last()
                .and_then(|h| h.address.as_deref())
                .map(|a| a == ip.to_string())
                .unwrap_or(false),
            vb_exec::Target::Host(_) => hops.last().map(|h| h.address.is_some()).unwrap_or(false),
        };
        let report = TracerouteReport {
            target: rendered,
            hops,
            reached,
        };

        if output.timed_out {
            return Ok(trace.failed(failure_message(&output), Some(report)));
        }
        Ok(trace.ok(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ok, toolkit, FakeExecutor};

    const OUTPUT: &str = "traceroute to 192.0.2.9 (192.0.2.9), 30 hops max, 60 byte packets
 1  10.0.0.1  0.512 ms
 2  *
 3  198.51.100.7  8.120 ms
 4  192.0.2.9  12.004 ms
";

    #[test]
    fn test_parse_hops() {
        let hops = parse_hops(OUTPUT);
        assert_eq!(hops.len(), 4);
        assert_eq!(hops[0].address.as_deref(), Some("10.0.0.1"));
        assert_eq!(hops[0].rtt_ms, Some(0.512));
        assert_eq!(
            hops[1],
            Hop {
                hop: 2,
                address: None,
                rtt_ms: None
            }
        );
        assert_eq!(hops[3].hop, 4);
    }

    #[tokio::test]
    async fn test_traceroute_reaches_target() {
        let exec = FakeExecutor::new(|_| Ok(ok(OUTPUT)));
        let outcome = toolkit(exec.clone())
            .traceroute("192.0.2.9", Some(10))
            .await
            .unwrap();

        assert!(outcome.success);
        let report = outcome.report.unwrap();
        assert!(report.reached);
        assert_eq!(report.hops.len(), 4);

        let call = &exec.calls()[0];
        assert_eq!(call.command, "traceroute");
        assert!(call.args.windows(2).any(|w| w == ["-m", "10"]));
        assert_eq!(call.args.last().map(String::as_str), Some("192.0.2.9"));
    }

    #[tokio::test]
    async fn test_max_hops_bounded_by_config() {
        let exec = FakeExecutor::new(|_| Ok(ok(OUTPUT)));
        let tools = toolkit(exec.clone());
        assert!(tools.traceroute("192.0.2.9", Some(0)).await.is_err());
        assert!(tools.traceroute("192.0.2.9", Some(31)).await.is_err());
        assert!(exec.calls().is_empty());
    }
}
