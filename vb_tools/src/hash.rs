//! Hash identification and digest computation. Runs in-process.

use crate::{ToolKit, ToolOutcome, Trace};
use serde::Serialize;
use sha2::{Digest, Sha256, Sha512};
use vb_core::{Error, Result};

pub const MAX_HASH_INPUT: usize = 10 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Digests {
    pub md5: String,
    pub sha256: String,
    pub sha512: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HashReport {
    pub input_length: usize,
    /// Whether the input looks like a hash rather than plaintext
    pub looks_like_hash: bool,
    /// Probable algorithms, most likely first
    pub candidates: Vec<&'static str>,
    pub digests: Digests,
}

/// Guess the algorithm behind `input` from its shape
pub(crate) fn identify(input: &str) -> Vec<&'static str> {
    // Modular crypt formats carry their own prefix
    let prefixed: &[(&str, &[&str])] = &[
        ("$2a$", &["bcrypt"]),
        ("$2b$", &["bcrypt"]),
        ("$2y$", &["bcrypt"]),
        ("$argon2id$", &["Argon2id"]),
        ("$argon2i$", &["Argon2i"]),
        ("$6$", &["SHA-512 crypt"]),
        ("$5$", &["SHA-256 crypt"]),
        ("$1$", &["MD5 crypt"]),
        ("$apr1$", &["Apache MD5"]),
    ];
    for (prefix, names) in prefixed {
        if input.starts_with(prefix) {
            return names.to_vec();
        }
    }

    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Vec::new();
    }
    match input.len() {
        8 => vec!["CRC32", "Adler-32"],
        16 => vec!["MySQL 3.x", "Half MD5"],
        32 => vec!["MD5", "NTLM", "MD4"],
        40 => vec!["SHA-1", "RIPEMD-160", "MySQL 5.x"],
        56 => vec!["SHA-224", "SHA3-224"],
        64 => vec!["SHA-256", "SHA3-256", "BLAKE2s"],
        96 => vec!["SHA-384", "SHA3-384"],
        128 => vec!["SHA-512", "SHA3-512", "Whirlpool", "BLAKE2b"],
        _ => Vec::new(),
    }
}

pub(crate) fn digests(input: &[u8]) -> Digests {
    Digests {
        md5: format!("{:x}", md5::compute(input)),
        sha256: hex::encode(Sha256::digest(input)),
        sha512: hex::encode(Sha512::digest(input)),
    }
}

impl ToolKit {
    pub fn hash_analyze(&self, input: &str) -> Result<ToolOutcome<HashReport>> {
        if input.is_empty() {
            return Err(Error::Validation("Input must not be empty".to_string()));
        }
        if input.len() > MAX_HASH_INPUT {
            return Err(Error::Validation(format!(
                "Input exceeds {} bytes",
                MAX_HASH_INPUT
            )));
        }

        let trimmed = input.trim();
        let candidates = identify(trimmed);
        let trace = Trace::new("hash_analyze", format!("{} bytes", input.len()));
        Ok(trace.ok(HashReport {
            input_length: input.len(),
            looks_like_hash: !candidates.is_empty(),
            candidates,
            digests: digests(input.as_bytes()),
        }))
    }
}
