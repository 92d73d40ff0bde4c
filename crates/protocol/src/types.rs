//! Core protocol types
//!
//! Identifiers and payloads shared by the relay and its clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of characters of an identity shown in logs
const SHORT_IDENTITY_LEN: usize = 10;

/// Public-key identity of a user
///
/// Clients choose their identity (typically a base64 encoded public key) and
/// announce it with `Identify`. The relay treats it as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix of the identity suitable for log lines
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_IDENTITY_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Relay-assigned identifier for one live connection
///
/// Only unique among currently open connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opaque message payload
///
/// End-to-end encrypted content is normally carried as text. Structured
/// payloads (SDP offers, ICE candidates) may be sent as JSON values; on the
/// wire they travel as JSON text so the binary codec can carry any shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Json(#[serde(with = "json_text")] serde_json::Value),
}

impl Payload {
    /// Transport-neutral textual form of the payload
    ///
    /// Text is returned unchanged, JSON values are serialized compactly.
    pub fn to_text(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Json(value) => value.to_string(),
        }
    }

    /// Textual variant of this payload
    pub fn into_text(self) -> Payload {
        match self {
            Payload::Text(_) => self,
            Payload::Json(value) => Payload::Text(value.to_string()),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

/// JSON values encoded as strings so non-self-describing formats can carry them
mod json_text {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &serde_json::Value, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<serde_json::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(serde::de::Error::custom)
    }
}
