//! TCP port scanning via `nmap -oG -` (grepable output on stdout).

use crate::{failure_message, ToolKit, ToolOutcome, Trace};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::instrument;
use vb_core::{Error, Result};
use vb_exec::{validate_port, validate_target, ExecRequest, MAX_TIMEOUT_SECS};

/// Scanned when the caller does not name any ports
pub const DEFAULT_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 143, 443, 465, 587, 993, 995, 3306, 3389, 5432, 8080, 8443,
];

static IGNORED_STATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Ignored State:\s*([\w|]+)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    OpenFiltered,
    ClosedFiltered,
    Unfiltered,
    Unknown,
}

impl PortState {
    fn parse(s: &str) -> Self {
        match s {
            "open" => PortState::Open,
            "closed" => PortState::Closed,
            "filtered" => PortState::Filtered,
            "open|filtered" => PortState::OpenFiltered,
            "closed|filtered" => PortState::ClosedFiltered,
            "unfiltered" => PortState::Unfiltered,
            _ => PortState::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortReport {
    pub port: u16,
    pub protocol: String,
    pub state: PortState,
    pub service: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortScanReport {
    pub target: String,
    pub ports: Vec<PortReport>,
    pub open_count: usize,
}

/// Deduplicate, validate and bound the requested port list
pub(crate) fn normalize_ports(requested: &[u32], max_ports: usize) -> Result<Vec<u16>> {
    if requested.is_empty() {
        return Ok(DEFAULT_PORTS.iter().copied().take(max_ports).collect());
    }
    let mut ports = requested
        .iter()
        .map(|p| validate_port(*p))
        .collect::<Result<Vec<_>>>()?;
    ports.sort_unstable();
    ports.dedup();
    if ports.len() > max_ports {
        return Err(Error::Validation(format!(
            "At most {} ports may be scanned at once, got {}",
            max_ports,
            ports.len()
        )));
    }
    Ok(ports)
}

/// Parse the `Ports:` field of nmap grepable output. Requested ports that
/// nmap folded into "Ignored State" get that state.
pub(crate) fn parse_grepable(stdout: &str, requested: &[u16]) -> Option<Vec<PortReport>> {
    let host_line = stdout
        .lines()
        .find(|l| l.starts_with("Host:") && l.contains("Ports:"))?;

    let mut found: BTreeMap<u16, PortReport> = BTreeMap::new();
    let ports_field = host_line.split("Ports:").nth(1)?;
    let ports_field = ports_field.split('\t').next().unwrap_or(ports_field);

    for entry in ports_field.split(',') {
        // 22/open/tcp//ssh///
        let fields: Vec<&str> = entry.trim().split('/').collect();
        if fields.len() < 5 {
            continue;
        }
        let Ok(port) = fields[0].parse::<u16>() else {
            continue;
        };
        let service = Some(fields[4]).filter(|s| !s.is_empty()).map(str::to_string);
        found.insert(
            port,
            PortReport {
                port,
                protocol: fields[2].to_string(),
                state: PortState::parse(fields[1]),
                service,
            },
        );
    }

    let ignored = IGNORED_STATE
        .captures(host_line)
        .map(|c| PortState::parse(&c[1]))
        .unwrap_or(PortState::Unknown);
    for port in requested {
        found.entry(*port).or_insert_with(|| PortReport {
            port: *port,
            protocol: "tcp".to_string(),
            state: ignored,
            service: None,
        });
    }

    Some(found.into_values().collect())
}

impl ToolKit {
    #[instrument(skip(self, ports))]
    pub async fn port_scan(
        &self,
        target: &str,
        ports: &[u32],
    ) -> Result<ToolOutcome<PortScanReport>> {
        let target = validate_target(target)?;
        let ports = normalize_ports(ports, self.config().max_ports)?;
        let rendered = target.to_string();

        let port_list = ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut args = vec![
            "-Pn".to_string(),
            "-T4".to_string(),
            "--host-timeout".to_string(),
            format!("{}s", MAX_TIMEOUT_SECS - 5),
            "-p".to_string(),
            port_list,
            "-oG".to_string(),
            "-".to_string(),
        ];
        if target.is_ip() && rendered.contains(':') {
            args.push("-6".to_string());
        }
        args.push(rendered.clone());

        let mut trace = Trace::new("port_scan", rendered.as_str());
        let output = self
            .executor()
            .execute(
                ExecRequest::new("nmap")
                    .args(args)
                    .timeout_secs(MAX_TIMEOUT_SECS),
            )
            .await?;
        trace.record(&output);

        if !output.success() {
            return Ok(trace.failed(failure_message(&output), None));
        }
        let Some(results) = parse_grepable(&output.stdout, &ports) else {
            return Ok(trace.failed("Host did not respond to the scan", None));
        };

        let open_count = results
            .iter()
            .filter(|p| p.state == PortState::Open)
            .count();
        Ok(trace.ok(PortScanReport {
            target: rendered,
            ports: results,
            open_count,
        }))
    }
}
