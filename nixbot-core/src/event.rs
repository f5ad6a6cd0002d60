// ABOUTME: Normalized inbound events delivered by a chat transport to the engine
// ABOUTME: One struct covers room messages and membership changes; immutable once delivered

use serde::{Deserialize, Serialize};

/// Membership value carried by a room membership event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Invite,
    Join,
    Leave,
    Ban,
    Knock,
    Other(String),
}

impl Membership {
    /// Parse a protocol membership string (e.g. "invite")
    pub fn parse(value: &str) -> Self {
        match value {
            "invite" => Self::Invite,
            "join" => Self::Join,
            "leave" => Self::Leave,
            "ban" => Self::Ban,
            "knock" => Self::Knock,
            other => Self::Other(other.to_string()),
        }
    }
}

/// State-key and membership fields, present only on membership events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    /// The user whose membership changed
    pub state_key: String,
    pub membership: Membership,
}

/// A single event pushed by the transport.
///
/// Message events carry a body (and optionally a formatted body); membership
/// events carry `membership`. Stripped invite state has no event id, so
/// `event_id` is empty for those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender: String,
    pub room_id: String,
    pub event_id: String,
    /// Origin timestamp in seconds since the Unix epoch
    pub timestamp: i64,
    pub body: String,
    pub formatted_body: Option<String>,
    pub membership: Option<MembershipChange>,
}

impl InboundEvent {
    /// Build a plain text message event
    pub fn message(
        sender: impl Into<String>,
        room_id: impl Into<String>,
        event_id: impl Into<String>,
        timestamp: i64,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            room_id: room_id.into(),
            event_id: event_id.into(),
            timestamp,
            body: body.into(),
            formatted_body: None,
            membership: None,
        }
    }

    /// Attach a formatted (rich) body
    pub fn with_formatted_body(mut self, formatted: impl Into<String>) -> Self {
        self.formatted_body = Some(formatted.into());
        self
    }

    /// Build a membership event for `state_key`
    pub fn membership(
        sender: impl Into<String>,
        room_id: impl Into<String>,
        state_key: impl Into<String>,
        membership: Membership,
        timestamp: i64,
    ) -> Self {
        Self {
            sender: sender.into(),
            room_id: room_id.into(),
            event_id: String::new(),
            timestamp,
            body: String::new(),
            formatted_body: None,
            membership: Some(MembershipChange {
                state_key: state_key.into(),
                membership,
            }),
        }
    }

    /// Text a route should match against: the formatted body when requested
    /// and present, otherwise the plain body. Surrounding whitespace is trimmed.
    pub fn match_target(&self, prefer_formatted: bool) -> &str {
        let raw = match (&self.formatted_body, prefer_formatted) {
            (Some(formatted), true) => formatted.as_str(),
            _ => self.body.as_str(),
        };
        raw.trim()
    }

    /// Whether this is an invitation addressed to `user_id`
    pub fn is_invite_for(&self, user_id: &str) -> bool {
        matches!(
            &self.membership,
            Some(MembershipChange { state_key, membership: Membership::Invite }) if state_key == user_id
        )
    }
}
