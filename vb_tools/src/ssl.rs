//! TLS certificate inspection.
//!
//! `openssl s_client` fetches the leaf certificate, which is then fed on
//! stdin to `openssl x509` for the fields we report.

use crate::{failure_message, score::ssl_score, Scored, ToolKit, ToolOutcome, Trace};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};
use vb_core::Result;
use vb_exec::{validate_port, validate_target, ExecRequest, Target};

const CONNECT_TIMEOUT_SECS: u64 = 20;
const X509_TIMEOUT_SECS: u64 = 10;
const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SslReport {
    pub host: String,
    pub port: u16,
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub serial: Option<String>,
    pub fingerprint_sha256: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub expired: bool,
    pub not_yet_valid: bool,
    pub veriscore: u8,
}

impl Scored for SslReport {
    fn veriscore(&self) -> Option<u8> {
        Some(self.veriscore)
    }
}

/// First PEM certificate block in `text`, markers included
pub(crate) fn extract_pem(text: &str) -> Option<&str> {
    let start = text.find(PEM_BEGIN)?;
    let end = text[start..].find(PEM_END)? + start + PEM_END.len();
    Some(&text[start..end])
}

/// Parse openssl's `notAfter=Jan  1 00:00:00 2030 GMT`
pub(crate) fn parse_openssl_date(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%b %d %H:%M:%S %Y GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Build a report from `openssl x509 -noout -subject -issuer -serial -dates -fingerprint` output
pub(crate) fn parse_x509(host: &str, port: u16, text: &str, now: DateTime<Utc>) -> SslReport {
    let mut subject = None;
    let mut issuer = None;
    let mut serial = None;
    let mut fingerprint_sha256 = None;
    let mut not_before = None;
    let mut not_after = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "subject" => subject = Some(value.to_string()),
            "issuer" => issuer = Some(value.to_string()),
            "serial" => serial = Some(value.to_string()),
            "sha256 fingerprint" => fingerprint_sha256 = Some(value.to_string()),
            "notbefore" => not_before = parse_openssl_date(value),
            "notafter" => not_after = parse_openssl_date(value),
            _ => {}
        }
    }

    let expired = not_after.map(|t| now > t).unwrap_or(false);
    let not_yet_valid = not_before.map(|t| now < t).unwrap_or(false);
    let days_remaining = not_after.map(|t| (t - now).num_days());
    let veriscore = match days_remaining {
        Some(days) => ssl_score(days, expired, not_yet_valid),
        None => 0,
    };

    SslReport {
        host: host.to_string(),
        port,
        subject,
        issuer,
        serial,
        fingerprint_sha256,
        not_before,
        not_after,
        days_remaining,
        expired,
        not_yet_valid,
        veriscore,
    }
}

impl ToolKit {
    #[instrument(skip(self))]
    pub async fn ssl_check(&self, host: &str, port: Option<u32>) -> Result<ToolOutcome<SslReport>> {
        let target = validate_target(host)?;
        let port = validate_port(port.unwrap_or(443))?;
        let host = target.to_string();
        let connect = match &target {
            Target::Ip(ip) if ip.is_ipv6() => format!("[{}]:{}", ip, port),
            _ => format!("{}:{}", host, port),
        };

        let mut trace = Trace::new("ssl_check", connect.as_str());

        let mut args = vec!["s_client".to_string(), "-connect".to_string(), connect.clone()];
        if let Target::Host(name) = &target {
            args.push("-servername".to_string());
            args.push(name.clone());
        }
        let fetched = self
            .executor()
            .execute(
                ExecRequest::new("openssl")
                    .args(args)
                    .stdin(Vec::new())
                    .timeout_secs(CONNECT_TIMEOUT_SECS),
            )
            .await?;
        trace.record(&fetched);

        let Some(pem) = extract_pem(&fetched.stdout) else {
            debug!(exit_code = ?fetched.exit_code, "No certificate in s_client output");
            let reason = if fetched.success() {
                "No certificate presented".to_string()
            } else {
                failure_message(&fetched)
            };
            return Ok(trace.failed(reason, None));
        };

        let decoded = self
            .executor()
            .execute(
                ExecRequest::new("openssl")
                    .args([
                        "x509",
                        "-noout",
                        "-subject",
                        "-issuer",
                        "-serial",
                        "-dates",
                        "-fingerprint",
                        "-sha256",
                    ])
                    .stdin(format!("{}\n", pem))
                    .timeout_secs(X509_TIMEOUT_SECS),
            )
            .await?;
        trace.record(&decoded);

        if !decoded.success() {
            return Ok(trace.failed(failure_message(&decoded), None));
        }

        Ok(trace.ok(parse_x509(&host, port, &decoded.stdout, Utc::now())))
    }
}
