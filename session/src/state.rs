//! Session lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the lifecycle state of a voice session.
///
/// `Idle` is initial. `Closed` and `Failed` are terminal: a new session
/// must be constructed to try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    /// Returns true while audio is streaming in both directions.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// Returns true if no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(SessionState::Idle),
            "connecting" => Some(SessionState::Connecting),
            "active" => Some(SessionState::Active),
            "closing" => Some(SessionState::Closing),
            "closed" => Some(SessionState::Closed),
            "failed" => Some(SessionState::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for SessionState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SessionState::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown session state: {}", s)))
    }
}
