//! ICMP reachability via `ping` / `ping6`.

use crate::{failure_message, ToolKit, ToolOutcome, Trace};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::instrument;
use vb_core::{Error, Result};
use vb_exec::{validate_target, ExecRequest, Target, MAX_TIMEOUT_SECS};

pub const MAX_PING_COUNT: u32 = 20;

// Linux: "4 packets transmitted, 4 received, 0% packet loss"
// BSD:   "4 packets transmitted, 4 packets received, 0.0% packet loss"
static PACKETS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received").expect("valid regex")
});
static LOSS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d.]+)% packet loss").expect("valid regex"));
static RTT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:rtt|round-trip) min/avg/max/\w+ = ([\d.]+)/([\d.]+)/([\d.]+)")
        .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingReport {
    pub target: String,
    pub transmitted: u32,
    pub received: u32,
    pub packet_loss_percent: f64,
    pub rtt_min_ms: Option<f64>,
    pub rtt_avg_ms: Option<f64>,
    pub rtt_max_ms: Option<f64>,
    pub reachable: bool,
}

/// Parse the summary block printed by ping; `None` if it is missing
pub(crate) fn parse_ping(target: &str, stdout: &str) -> Option<PingReport> {
    let packets = PACKETS.captures(stdout)?;
    let transmitted: u32 = packets[1].parse().ok()?;
    let received: u32 = packets[2].parse().ok()?;

    let packet_loss_percent = LOSS
        .captures(stdout)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or_else(|| {
            if transmitted == 0 {
                100.0
            } else {
                100.0 * f64::from(transmitted - received.min(transmitted)) / f64::from(transmitted)
            }
        });

    let rtt = RTT.captures(stdout);
    let rtt_at = |i: usize| rtt.as_ref().and_then(|c| c[i].parse::<f64>().ok());

    Some(PingReport {
        target: target.to_string(),
        transmitted,
        received,
        packet_loss_percent,
        rtt_min_ms: rtt_at(1),
        rtt_avg_ms: rtt_at(2),
        rtt_max_ms: rtt_at(3),
        reachable: received > 0,
    })
}

impl ToolKit {
    #[instrument(skip(self))]
    pub async fn ping(&self, target: &str, count: Option<u32>) -> Result<ToolOutcome<PingReport>> {
        let target = validate_target(target)?;
        let count = count.unwrap_or(self.config().ping_count);
        if !(1..=MAX_PING_COUNT).contains(&count) {
            return Err(Error::Validation(format!(
                "Ping count must be between 1 and {}",
                MAX_PING_COUNT
            )));
        }

        let program = match target {
            Target::Ip(ip) if ip.is_ipv6() => "ping6",
            _ => "ping",
        };
        let timeout = (u64::from(count) * 2 + 5).min(MAX_TIMEOUT_SECS);
        let request = ExecRequest::new(program)
            .args(["-c".to_string(), count.to_string(), "-W".to_string(), "2".to_string(), target.to_string()])
            .timeout_secs(timeout);

        let rendered = target.to_string();
        let mut trace = Trace::new("ping", rendered.as_str());
        let output = self.executor().execute(request).await?;
        trace.record(&output);

        // ping exits 1 when nothing answered; the summary is still valid
        match parse_ping(&rendered, &output.stdout) {
            Some(report) if !output.timed_out => Ok(trace.ok(report)),
            _ => Ok(trace.failed(failure_message(&output), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{exited, ok, toolkit, FakeExecutor};

    const LINUX_OUTPUT: &str = "PING example.com (93.184.216.34) 56(84) bytes of data.
64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=11.2 ms

--- example.com ping statistics ---
4 packets transmitted, 3 received, 25% packet loss, time 3004ms
rtt min/avg/max/mdev = 10.912/11.204/11.538/0.255 ms
";

    const BSD_OUTPUT: &str = "--- 192.0.2.1 ping statistics ---
2 packets transmitted, 0 packets received, 100.0% packet loss
";

    #[test]
    fn test_parse_linux_summary() {
        let report = parse_ping("example.com", LINUX_OUTPUT).unwrap();
        assert_eq!(report.transmitted, 4);
        assert_eq!(report.received, 3);
        assert_eq!(report.packet_loss_percent, 25.0);
        assert_eq!(report.rtt_min_ms, Some(10.912));
        assert_eq!(report.rtt_avg_ms, Some(11.204));
        assert_eq!(report.rtt_max_ms, Some(11.538));
        assert!(report.reachable);
    }

    #[test]
    fn test_parse_bsd_unreachable() {
        let report = parse_ping("192.0.2.1", BSD_OUTPUT).unwrap();
        assert_eq!(report.received, 0);
        assert_eq!(report.packet_loss_percent, 100.0);
        assert!(report.rtt_avg_ms.is_none());
        assert!(!report.reachable);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_still_a_result() {
        let exec = FakeExecutor::new(|_| Ok(exited(BSD_OUTPUT, "", 1)));
        let outcome = toolkit(exec).ping("192.0.2.1", Some(2)).await.unwrap();
        assert!(outcome.success);
        assert!(!outcome.report.unwrap().reachable);
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_ipv6_uses_ping6_and_default_count() {
        let exec = FakeExecutor::new(|_| Ok(ok(LINUX_OUTPUT)));
        toolkit(exec.clone()).ping("2001:db8::1", None).await.unwrap();

        let call = &exec.calls()[0];
        assert_eq!(call.command, "ping6");
        assert_eq!(call.args, vec!["-c", "4", "-W", "2", "2001:db8::1"]);
        assert_eq!(call.timeout_secs, Some(13));
    }

    #[tokio::test]
    async fn test_count_bounds() {
        let exec = FakeExecutor::new(|_| Ok(ok(LINUX_OUTPUT)));
        let tools = toolkit(exec.clone());
        assert!(tools.ping("example.com", Some(0)).await.is_err());
        assert!(tools.ping("example.com", Some(21)).await.is_err());
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_summary_is_failure() {
        let exec = FakeExecutor::new(|_| Ok(exited("", "ping: unknown host", 2)));
        let outcome = toolkit(exec).ping("nonexistent.example", Some(1)).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("ping: unknown host"));
    }
}
