//! Input validators applied before any user value reaches a command line.
//!
//! Every validator rejects values starting with `-` so user input can
//! never be read as an option by the spawned tool.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};
use vb_core::{Error, Result};

const MAX_HOSTNAME_LEN: usize = 253;

static HOST_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("valid regex"));

// Domains may carry service labels such as _dmarc or _443._tcp
static DOMAIN_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(_[A-Za-z0-9-]{1,62}|[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)$")
        .expect("valid regex")
});

static TLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]{2,63}|xn--[A-Za-z0-9-]{1,59})$").expect("valid regex"));

/// A scan or probe target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Target {
    Ip(IpAddr),
    Host(String),
}

impl Target {
    pub fn is_ip(&self) -> bool {
        matches!(self, Target::Ip(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Ip(ip) => write!(f, "{}", ip),
            Target::Host(host) => f.write_str(host),
        }
    }
}

fn strip_root(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Validate a hostname (RFC 1123 labels), returning it lowercased
pub fn validate_hostname(input: &str) -> Result<String> {
    let name = strip_root(input.trim());
    if name.is_empty() || name.len() > MAX_HOSTNAME_LEN {
        return Err(Error::Validation(format!("Invalid hostname: {:?}", input)));
    }
    if !name.split('.').all(|label| HOST_LABEL.is_match(label)) {
        return Err(Error::Validation(format!("Invalid hostname: {:?}", input)));
    }
    Ok(name.to_ascii_lowercase())
}

/// Validate a registrable domain name: at least two labels and an
/// alphabetic (or punycode) top-level label
pub fn validate_domain(input: &str) -> Result<String> {
    let name = strip_root(input.trim());
    if name.is_empty() || name.len() > MAX_HOSTNAME_LEN {
        return Err(Error::Validation(format!("Invalid domain: {:?}", input)));
    }

    let labels: Vec<&str> = name.split('.').collect();
    let Some((tld, rest)) = labels.split_last().filter(|(_, rest)| !rest.is_empty()) else {
        return Err(Error::Validation(format!(
            "Domain must contain at least two labels: {:?}",
            input
        )));
    };

    if !TLD.is_match(tld) || !rest.iter().all(|label| DOMAIN_LABEL.is_match(label)) {
        return Err(Error::Validation(format!("Invalid domain: {:?}", input)));
    }

    Ok(name.to_ascii_lowercase())
}

/// Validate an IPv4 or IPv6 address
pub fn validate_ip(input: &str) -> Result<IpAddr> {
    input
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| Error::Validation(format!("Invalid IP address: {:?}", input)))
}

/// Accept either an IP address or a hostname
pub fn validate_target(input: &str) -> Result<Target> {
    if let Ok(ip) = validate_ip(input) {
        return Ok(Target::Ip(ip));
    }
    validate_hostname(input)
        .map(Target::Host)
        .map_err(|_| Error::Validation(format!("Invalid target: {:?}", input)))
}

/// Validate a TCP/UDP port number
pub fn validate_port(port: u32) -> Result<u16> {
    match u16::try_from(port) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(Error::Validation(format!(
            "Port must be between 1 and 65535, got {}",
            port
        ))),
    }
}

/// Resolve `relative` inside `base` without escaping it.
///
/// Rejects absolute paths, `..` components and NUL bytes. Each existing
/// component is inspected without following it; symlinks must resolve to
/// somewhere under the canonical `base`, and dangling ones are refused.
/// Components that do not exist yet are appended as-is.
pub fn resolve_safe_path(base: &Path, relative: &str) -> Result<PathBuf> {
    if relative.is_empty() || relative.contains('\0') {
        return Err(Error::Validation("Invalid path".to_string()));
    }

    let rel = Path::new(relative);
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(escapes_base(relative));
            }
        }
    }

    let canonical_base = base.canonicalize()?;
    let mut resolved = canonical_base.clone();
    let mut missing = PathBuf::new();
    for part in rel.components().filter(|c| matches!(c, Component::Normal(_))) {
        if !missing.as_os_str().is_empty() {
            missing.push(part);
            continue;
        }
        let candidate = resolved.join(part);
        match std::fs::symlink_metadata(&candidate) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = candidate
                    .canonicalize()
                    .map_err(|_| escapes_base(relative))?;
                if !target.starts_with(&canonical_base) {
                    return Err(escapes_base(relative));
                }
                resolved = target;
            }
            Ok(_) => resolved = candidate,
            Err(_) => missing.push(part),
        }
    }

    Ok(resolved.join(missing))
}

fn escapes_base(relative: &str) -> Error {
    Error::Validation(format!("Path escapes base directory: {:?}", relative))
}
