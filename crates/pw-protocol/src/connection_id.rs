//! Connection identifier type
//!
//! Every backend session gets an identifier when it is created. Users that
//! send this identifier in their `select` instruction join the existing
//! session instead of creating a new one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ProtocolError;

/// Leading character that distinguishes a connection id from a protocol name
pub const CONNECTION_ID_PREFIX: char = '$';

/// Length of an encoded connection id: the prefix plus a hyphenated UUID
pub const CONNECTION_ID_LENGTH: usize = 37;

/// Unique identifier for a shared backend session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh identifier from a random (v4) UUID
    pub fn generate() -> Self {
        Self(format!("{}{}", CONNECTION_ID_PREFIX, Uuid::new_v4().hyphenated()))
    }

    /// Parse an identifier received from a client
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let uuid = s
            .strip_prefix(CONNECTION_ID_PREFIX)
            .filter(|_| s.len() == CONNECTION_ID_LENGTH)
            .ok_or_else(|| ProtocolError::InvalidConnectionId(s.to_string()))?;

        Uuid::parse_str(uuid).map_err(|_| ProtocolError::InvalidConnectionId(s.to_string()))?;
        Ok(Self(s.to_string()))
    }

    /// Whether a `select` argument names an existing connection rather than a protocol
    pub fn is_join_request(identifier: &str) -> bool {
        identifier.starts_with(CONNECTION_ID_PREFIX)
    }

    /// Get the raw identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ConnectionId> for String {
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_format() {
        let id = ConnectionId::generate();
        assert_eq!(id.as_str().len(), CONNECTION_ID_LENGTH);
        assert!(id.as_str().starts_with('$'));
        assert_eq!(id.as_str().matches('-').count(), 4);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = ConnectionId::generate();
        let parsed: ConnectionId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_protocol_names() {
        assert!(ConnectionId::parse("vnc").is_err());
        assert!(ConnectionId::parse("$").is_err());
        assert!(ConnectionId::parse("$not-a-uuid-but-thirty-seven-chars-x").is_err());
    }

    #[test]
    fn test_is_join_request() {
        assert!(ConnectionId::is_join_request("$anything"));
        assert!(!ConnectionId::is_join_request("rdp"));
        assert!(!ConnectionId::is_join_request(""));
    }

    #[test]
    fn test_serde_as_string() {
        let id = ConnectionId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
