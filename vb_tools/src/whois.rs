//! Domain registration lookups via `whois`.

use crate::{failure_message, ToolKit, ToolOutcome, Trace};
use serde::Serialize;
use tracing::instrument;
use vb_core::Result;
use vb_exec::{validate_domain, ExecRequest};

const WHOIS_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WhoisReport {
    pub domain: String,
    pub registrar: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub expires: Option<String>,
    pub name_servers: Vec<String>,
    pub status: Vec<String>,
    pub raw: String,
}

/// Field labels vary by registry; the first match wins
const REGISTRAR_KEYS: &[&str] = &["registrar", "sponsoring registrar", "registrar name"];
const CREATED_KEYS: &[&str] = &["creation date", "created", "created on", "registered on"];
const UPDATED_KEYS: &[&str] = &["updated date", "last updated", "last-update", "changed"];
const EXPIRES_KEYS: &[&str] = &[
    "registry expiry date",
    "registrar registration expiration date",
    "expiry date",
    "expiration date",
    "expires",
    "paid-till",
];
const NS_KEYS: &[&str] = &["name server", "nserver", "nameserver"];
const STATUS_KEYS: &[&str] = &["domain status", "status"];

pub(crate) fn parse_whois(domain: &str, raw: &str) -> WhoisReport {
    let mut report = WhoisReport {
        domain: domain.to_string(),
        raw: raw.to_string(),
        ..Default::default()
    };

    for line in raw.lines() {
        let line = line.trim();
        if line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        let set_once = |slot: &mut Option<String>, keys: &[&str]| {
            if slot.is_none() && keys.contains(&key.as_str()) {
                *slot = Some(value.to_string());
            }
        };
        set_once(&mut report.registrar, REGISTRAR_KEYS);
        set_once(&mut report.created, CREATED_KEYS);
        set_once(&mut report.updated, UPDATED_KEYS);
        set_once(&mut report.expires, EXPIRES_KEYS);

        if NS_KEYS.contains(&key.as_str()) {
            let ns = value
                .split_whitespace()
                .next()
                .unwrap_or(value)
                .trim_end_matches('.')
                .to_ascii_lowercase();
            if !report.name_servers.contains(&ns) {
                report.name_servers.push(ns);
            }
        }

        if STATUS_KEYS.contains(&key.as_str()) {
            // "clientTransferProhibited https://icann.org/epp#..."
            let status = value.split_whitespace().next().unwrap_or(value).to_string();
            if !report.status.contains(&status) {
                report.status.push(status);
            }
        }
    }

    report
}

impl ToolKit {
    #[instrument(skip(self))]
    pub async fn whois(&self, domain: &str) -> Result<ToolOutcome<WhoisReport>> {
        let domain = validate_domain(domain)?;
        let mut trace = Trace::new("whois", domain.as_str());

        let output = self
            .executor()
            .execute(
                ExecRequest::new("whois")
                    .arg(domain.clone())
                    .timeout_secs(WHOIS_TIMEOUT_SECS),
            )
            .await?;
        trace.record(&output);

        // Some registries exit non-zero while still printing a record
        if output.timed_out || output.stdout.trim().is_empty() {
            return Ok(trace.failed(failure_message(&output), None));
        }
        Ok(trace.ok(parse_whois(&domain, &output.stdout)))
    }
}
