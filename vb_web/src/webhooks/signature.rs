//! Webhook payload signatures.
//!
//! Header format: `X-VeriBits-Signature: t=<unix seconds>,v1=<hex>` where
//! `v1` is HMAC-SHA256 over `"<t>.<raw body>"` keyed with the webhook secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-VeriBits-Signature";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    Missing,
    Malformed,
    /// Timestamp outside the accepted window, in seconds of skew
    Stale(u64),
    Mismatch,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::Missing => write!(f, "Missing {} header", SIGNATURE_HEADER),
            SignatureError::Malformed => write!(f, "Malformed signature header"),
            SignatureError::Stale(skew) => {
                write!(f, "Signature timestamp is {}s outside tolerance", skew)
            }
            SignatureError::Mismatch => write!(f, "Signature does not match payload"),
        }
    }
}

impl std::error::Error for SignatureError {}

fn mac_for(secret: &str, timestamp: u64, body: &[u8]) -> HmacSha256 {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac
}

/// Header value signing `body` at `timestamp`
pub fn sign(secret: &str, timestamp: u64, body: &[u8]) -> String {
    let digest = mac_for(secret, timestamp, body).finalize().into_bytes();
    format!("t={},v1={}", timestamp, hex::encode(digest))
}

/// Split a header into its timestamp and signature digests
fn parse_header(header: &str) -> Result<(u64, Vec<Vec<u8>>), SignatureError> {
    let mut timestamp = None;
    let mut digests = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(SignatureError::Malformed);
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<u64>().map_err(|_| SignatureError::Malformed)?)
            }
            "v1" => digests.push(hex::decode(value).map_err(|_| SignatureError::Malformed)?),
            // Unknown schemes are skipped so new versions can be added alongside v1
            _ => {}
        }
    }

    match timestamp {
        Some(t) if !digests.is_empty() => Ok((t, digests)),
        _ => Err(SignatureError::Malformed),
    }
}

/// Verify `header` against `body` at time `now`, allowing `tolerance_secs` of skew
pub fn verify(
    secret: &str,
    header: Option<&str>,
    body: &[u8],
    now: u64,
    tolerance_secs: u64,
) -> Result<u64, SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let (timestamp, digests) = parse_header(header)?;

    let skew = now.abs_diff(timestamp);
    if skew > tolerance_secs {
        return Err(SignatureError::Stale(skew));
    }

    let mac = mac_for(secret, timestamp, body);
    let matched = digests
        .iter()
        .any(|digest| mac.clone().verify_slice(digest).is_ok());
    if matched {
        Ok(timestamp)
    } else {
        Err(SignatureError::Mismatch)
    }
}
