//! Opaque thread identifiers.
//!
//! A `ThreadId` is the string `"<adapter>:<opaque>"`: the first segment
//! names the adapter that owns the thread, the remainder is adapter-private
//! and may itself contain colons (`slack:C123:1710000000.1234`). The
//! adapter segment must match `[a-z][a-z0-9-]*` and the opaque part must be
//! non-empty.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a platform conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThreadId {
    raw: String,
    // Byte offset of the ':' separating the adapter name from the rest.
    sep: usize,
}

impl ThreadId {
    /// Build a thread id from an adapter name and its opaque coordinates.
    pub fn new(adapter: &str, opaque: &str) -> Result<Self, String> {
        if !is_valid_adapter_name(adapter) {
            return Err(format!(
                "invalid adapter name '{adapter}': must match [a-z][a-z0-9-]*"
            ));
        }
        if opaque.is_empty() {
            return Err(format!("thread id for '{adapter}' has empty coordinates"));
        }
        Ok(Self {
            raw: format!("{adapter}:{opaque}"),
            sep: adapter.len(),
        })
    }

    /// Parse a raw `"<adapter>:<opaque>"` string.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let sep = raw
            .find(':')
            .ok_or_else(|| format!("thread id '{raw}' has no adapter prefix"))?;
        let (adapter, rest) = (&raw[..sep], &raw[sep + 1..]);
        Self::new(adapter, rest)
    }

    /// The adapter name segment.
    pub fn adapter(&self) -> &str {
        &self.raw[..self.sep]
    }

    /// The adapter-private remainder.
    pub fn opaque(&self) -> &str {
        &self.raw[self.sep + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for ThreadId {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<ThreadId> for String {
    fn from(id: ThreadId) -> Self {
        id.raw
    }
}

fn is_valid_adapter_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let id = ThreadId::new("slack", "C123:1710000000.1234").unwrap();
        assert_eq!(id.as_str(), "slack:C123:1710000000.1234");
        assert_eq!(id.adapter(), "slack");
        assert_eq!(id.opaque(), "C123:1710000000.1234");

        let reparsed = ThreadId::parse(id.as_str()).unwrap();
        assert_eq!(reparsed, id);
    }

    #[test]
    fn opaque_part_may_contain_colons() {
        let id = ThreadId::parse("googlechat:spaces/AAA:threads/BBB").unwrap();
        assert_eq!(id.adapter(), "googlechat");
        assert_eq!(id.opaque(), "spaces/AAA:threads/BBB");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(ThreadId::parse("no-colon-here").is_err());
    }

    #[test]
    fn rejects_empty_opaque() {
        assert!(ThreadId::parse("linear:").is_err());
        assert!(ThreadId::new("linear", "").is_err());
    }

    #[test]
    fn rejects_bad_adapter_names() {
        assert!(ThreadId::parse(":abc").is_err());
        assert!(ThreadId::parse("Slack:C1").is_err());
        assert!(ThreadId::parse("1slack:C1").is_err());
        assert!(ThreadId::parse("sl_ack:C1").is_err());
        assert!(ThreadId::new("my-adapter2", "x").is_ok());
    }

    #[test]
    fn serde_round_trip() {
        let id = ThreadId::parse("linear:0b5c1a2e-0000-4000-8000-000000000000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"linear:0b5c1a2e-0000-4000-8000-000000000000\"");
        let back: ThreadId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn serde_rejects_malformed() {
        let result: Result<ThreadId, _> = serde_json::from_str("\"linear:\"");
        assert!(result.is_err());
    }
}
