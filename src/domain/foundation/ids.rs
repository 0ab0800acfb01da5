//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Stable identifier for one WebSocket connection.
///
/// Generated server-side when the transport is accepted and used as the
/// address of the connection's inbox in every channel layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new random ConnectionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ConnectionId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Maximum length of a group name.
pub const MAX_GROUP_NAME_LEN: usize = 100;

/// Name of a broadcast group.
///
/// Restricted to ASCII alphanumerics, `-`, `_` and `.` so the same name is a
/// valid key in every channel-layer backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupName(String);

impl GroupName {
    /// Creates a validated group name.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::empty_field("group"));
        }
        if name.len() > MAX_GROUP_NAME_LEN {
            return Err(ValidationError::invalid_format(
                "group",
                format!("must be at most {} characters", MAX_GROUP_NAME_LEN),
            ));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(ValidationError::invalid_format(
                "group",
                format!("character '{}' is not allowed", c),
            ));
        }
        Ok(Self(name))
    }

    /// Returns the group name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for GroupName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupName> for String {
    fn from(name: GroupName) -> Self {
        name.0
    }
}

impl AsRef<str> for GroupName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_generates_unique_values() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_id_roundtrips_through_string() {
        let id = ConnectionId::new();
        let parsed: ConnectionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn connection_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn connection_id_serializes_as_plain_uuid() {
        let id = ConnectionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn group_name_accepts_allowed_characters() {
        let name = GroupName::new("room-1_a.b").unwrap();
        assert_eq!(name.as_str(), "room-1_a.b");
    }

    #[test]
    fn group_name_rejects_empty() {
        assert!(matches!(
            GroupName::new(""),
            Err(ValidationError::EmptyField { .. })
        ));
    }

    #[test]
    fn group_name_rejects_spaces_and_colons() {
        assert!(GroupName::new("room 1").is_err());
        assert!(GroupName::new("room:1").is_err());
    }

    #[test]
    fn group_name_rejects_overlong_names() {
        let long = "a".repeat(MAX_GROUP_NAME_LEN + 1);
        assert!(GroupName::new(long).is_err());
        assert!(GroupName::new("a".repeat(MAX_GROUP_NAME_LEN)).is_ok());
    }

    #[test]
    fn group_name_deserialization_validates() {
        let ok: Result<GroupName, _> = serde_json::from_str("\"lobby\"");
        assert!(ok.is_ok());
        let bad: Result<GroupName, _> = serde_json::from_str("\"no spaces\"");
        assert!(bad.is_err());
    }
}
