//! DNS record lookups via `dig +short`.

use crate::{failure_message, ToolKit, ToolOutcome, Trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;
use vb_core::{Error, Result};
use vb_exec::{validate_domain, ExecRequest};

const DIG_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    #[default]
    A,
    Aaaa,
    Mx,
    Ns,
    Txt,
    Cname,
    Soa,
    Caa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Txt => "TXT",
            RecordType::Cname => "CNAME",
            RecordType::Soa => "SOA",
            RecordType::Caa => "CAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "MX" => Ok(RecordType::Mx),
            "NS" => Ok(RecordType::Ns),
            "TXT" => Ok(RecordType::Txt),
            "CNAME" => Ok(RecordType::Cname),
            "SOA" => Ok(RecordType::Soa),
            "CAA" => Ok(RecordType::Caa),
            other => Err(Error::Validation(format!(
                "Unsupported record type: {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DnsReport {
    pub domain: String,
    pub record_type: RecordType,
    pub records: Vec<String>,
}

/// Answer lines from `dig +short`, skipping comments and blank lines
pub(crate) fn parse_short_answers(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(';'))
        .map(str::to_string)
        .collect()
}

pub(crate) fn dig_request(name: &str, record_type: RecordType) -> ExecRequest {
    ExecRequest::new("dig")
        .args(["+short", "+time=5", "+tries=2", name, record_type.as_str()])
        .timeout_secs(DIG_TIMEOUT_SECS)
}

impl ToolKit {
    #[instrument(skip(self))]
    pub async fn dns_lookup(
        &self,
        domain: &str,
        record_type: RecordType,
    ) -> Result<ToolOutcome<DnsReport>> {
        let domain = validate_domain(domain)?;
        let mut trace = Trace::new("dns_lookup", domain.as_str());

        let output = self
            .executor()
            .execute(dig_request(&domain, record_type))
            .await?;
        trace.record(&output);

        if !output.success() {
            return Ok(trace.failed(failure_message(&output), None));
        }

        Ok(trace.ok(DnsReport {
            records: parse_short_answers(&output.stdout),
            domain,
            record_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{exited, ok, toolkit, FakeExecutor};

    #[tokio::test]
    async fn test_dns_lookup_parses_answers() {
        let exec = FakeExecutor::new(|_| Ok(ok("10 mx1.example.com.\n20 mx2.example.com.\n")));
        let tools = toolkit(exec.clone());

        let outcome = tools.dns_lookup("Example.com", RecordType::Mx).await.unwrap();

        assert!(outcome.success);
        let report = outcome.report.unwrap();
        assert_eq!(report.domain, "example.com");
        assert_eq!(
            report.records,
            vec!["10 mx1.example.com.", "20 mx2.example.com."]
        );

        let calls = exec.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command, "dig");
        assert_eq!(calls[0].args.last().map(String::as_str), Some("MX"));
        assert_eq!(
            outcome.commands,
            vec!["dig +short +time=5 +tries=2 example.com MX"]
        );
    }

    #[tokio::test]
    async fn test_invalid_domain_never_reaches_executor() {
        let exec = FakeExecutor::new(|_| Ok(ok("")));
        let tools = toolkit(exec.clone());

        for bad in ["-x example.com", "example.com; id", "localhost", ""] {
            assert!(tools.dns_lookup(bad, RecordType::A).await.is_err());
        }
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dig_failure_is_reported() {
        let exec = FakeExecutor::new(|_| Ok(exited("", ";; connection timed out", 9)));
        let outcome = toolkit(exec)
            .dns_lookup("example.com", RecordType::A)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(9));
        assert_eq!(outcome.error.as_deref(), Some(";; connection timed out"));
        assert!(outcome.report.is_none());
    }

    #[test]
    fn test_record_type_parsing() {
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert!("ANY".parse::<RecordType>().is_err());
        assert_eq!(
            serde_json::to_string(&RecordType::Cname).unwrap(),
            "\"CNAME\""
        );
    }

    #[test]
    fn test_parse_short_answers_skips_comments() {
        let answers = parse_short_answers(";; warning\n\n192.0.2.1\n 192.0.2.2 \n");
        assert_eq!(answers, vec!["192.0.2.1", "192.0.2.2"]);
    }
}
