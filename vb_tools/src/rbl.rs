//! DNS blackhole list lookups.
//!
//! The address is reversed (octets for IPv4, nibbles for IPv6) and queried
//! under every configured zone. An answer in 127.0.0.0/24 means listed;
//! anything else, including the 127.255.255.x refusal codes, does not.

use crate::{
    dns::{dig_request, parse_short_answers, RecordType},
    score::rbl_score,
    Scored, ToolKit, ToolOutcome, Trace,
};
use futures_util::future::join_all;
use serde::Serialize;
use std::net::IpAddr;
use tracing::{instrument, warn};
use vb_core::Result;
use vb_exec::{validate_hostname, validate_ip};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RblListing {
    pub zone: String,
    pub listed: bool,
    pub response: Vec<String>,
    /// Set when the zone could not be queried
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RblReport {
    pub ip: String,
    pub zones_checked: usize,
    pub listed_count: usize,
    pub listings: Vec<RblListing>,
    pub veriscore: Option<u8>,
}

impl Scored for RblReport {
    fn veriscore(&self) -> Option<u8> {
        self.veriscore
    }
}

/// Query label for `ip`: "4.3.2.1" for 1.2.3.4, nibble-reversed for IPv6
pub(crate) fn reverse_ip(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => v6
            .octets()
            .iter()
            .rev()
            .flat_map(|b| [b & 0x0f, b >> 4])
            .map(|n| format!("{:x}", n))
            .collect::<Vec<_>>()
            .join("."),
    }
}

pub(crate) fn is_listing_answer(answer: &str) -> bool {
    match answer.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let o = v4.octets();
            o[0] == 127 && o[1] == 0 && o[2] == 0
        }
        _ => false,
    }
}

impl ToolKit {
    #[instrument(skip(self))]
    pub async fn rbl_check(&self, ip: &str) -> Result<ToolOutcome<RblReport>> {
        let ip = validate_ip(ip)?;
        let reversed = reverse_ip(&ip);
        let zones = self
            .config()
            .dnsbl_zones
            .iter()
            .map(|z| validate_hostname(z))
            .collect::<Result<Vec<_>>>()?;

        let mut trace = Trace::new("rbl_check", ip.to_string());

        let queries = zones.iter().map(|zone| {
            let name = format!("{}.{}", reversed, zone);
            self.executor().execute(dig_request(&name, RecordType::A))
        });
        let results = join_all(queries).await;

        let mut listings = Vec::with_capacity(zones.len());
        for (zone, result) in zones.into_iter().zip(results) {
            let output = result?;
            trace.record(&output);

            // NXDOMAIN is a clean answer: dig exits 0 with no records
            if output.success() {
                let response = parse_short_answers(&output.stdout);
                let listed = response.iter().any(|a| is_listing_answer(a));
                listings.push(RblListing {
                    zone,
                    listed,
                    response,
                    error: None,
                });
            } else {
                warn!(zone = %zone, exit_code = ?output.exit_code, "DNSBL query failed");
                listings.push(RblListing {
                    zone,
                    listed: false,
                    response: Vec::new(),
                    error: Some(crate::failure_message(&output)),
                });
            }
        }

        let zones_checked = listings.iter().filter(|l| l.error.is_none()).count();
        let listed_count = listings.iter().filter(|l| l.listed).count();
        let report = RblReport {
            ip: ip.to_string(),
            zones_checked,
            listed_count,
            veriscore: rbl_score(zones_checked, listed_count),
            listings,
        };

        if zones_checked == 0 {
            return Ok(trace.failed("No DNSBL zone could be queried", Some(report)));
        }
        Ok(trace.ok(report))
    }
}
