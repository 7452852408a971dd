use serde::{Deserialize, Serialize};
use std::fmt;

/// Sortable identifier for stored records (scans, webhooks, audit rows)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(ulid::Ulid);

impl Id {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Milliseconds since the epoch encoded in the id
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    /// Parse an id coming from a URL path or request body
    pub fn parse(s: &str) -> crate::Result<Self> {
        s.parse()
            .map_err(|_| crate::Error::Validation(format!("Invalid id: {}", s)))
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Id {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Id::parse("../../etc/passwd").is_err());
        assert!(Id::parse("").is_err());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = Id::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert_eq!(Id::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_ids_are_time_ordered() {
        let first = Id::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Id::new();
        assert!(second.timestamp_ms() >= first.timestamp_ms());
        assert!(second > first);
    }
}
