//! Fixed set of binaries the executor is permitted to spawn.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Names accepted by [`AllowedCommand::from_name`], in declaration order
pub const ALLOWED_COMMANDS: &[&str] = &[
    "ping",
    "ping6",
    "traceroute",
    "tracepath",
    "mtr",
    "dig",
    "host",
    "nslookup",
    "whois",
    "openssl",
    "nmap",
    "curl",
    "nc",
    "ssh-keyscan",
    "gpg",
    "file",
    "sha256sum",
    "md5sum",
];

/// An allow-listed external command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllowedCommand {
    Ping,
    Ping6,
    Traceroute,
    Tracepath,
    Mtr,
    Dig,
    Host,
    Nslookup,
    Whois,
    Openssl,
    Nmap,
    Curl,
    Nc,
    SshKeyscan,
    Gpg,
    File,
    Sha256sum,
    Md5sum,
}

impl AllowedCommand {
    /// Look up a command by its exact binary name.
    ///
    /// Matching is case-sensitive and rejects anything with a path
    /// separator, so `/bin/ping` or `PING` are not allowed.
    pub fn from_name(name: &str) -> Option<Self> {
        let cmd = match name {
            "ping" => Self::Ping,
            "ping6" => Self::Ping6,
            "traceroute" => Self::Traceroute,
            "tracepath" => Self::Tracepath,
            "mtr" => Self::Mtr,
            "dig" => Self::Dig,
            "host" => Self::Host,
            "nslookup" => Self::Nslookup,
            "whois" => Self::Whois,
            "openssl" => Self::Openssl,
            "nmap" => Self::Nmap,
            "curl" => Self::Curl,
            "nc" => Self::Nc,
            "ssh-keyscan" => Self::SshKeyscan,
            "gpg" => Self::Gpg,
            "file" => Self::File,
            "sha256sum" => Self::Sha256sum,
            "md5sum" => Self::Md5sum,
            _ => return None,
        };
        Some(cmd)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Ping6 => "ping6",
            Self::Traceroute => "traceroute",
            Self::Tracepath => "tracepath",
            Self::Mtr => "mtr",
            Self::Dig => "dig",
            Self::Host => "host",
            Self::Nslookup => "nslookup",
            Self::Whois => "whois",
            Self::Openssl => "openssl",
            Self::Nmap => "nmap",
            Self::Curl => "curl",
            Self::Nc => "nc",
            Self::SshKeyscan => "ssh-keyscan",
            Self::Gpg => "gpg",
            Self::File => "file",
            Self::Sha256sum => "sha256sum",
            Self::Md5sum => "md5sum",
        }
    }

    pub fn is_allowed(name: &str) -> bool {
        Self::from_name(name).is_some()
    }
}

impl fmt::Display for AllowedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
