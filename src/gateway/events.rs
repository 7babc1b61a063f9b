//! Wire-format messages and protocol error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::presence::Member;

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Stable protocol error codes carried in `socket:error` payloads.
pub mod codes {
    /// App not found, or internal error while resolving it at connect time.
    pub const APP_NOT_FOUND: u16 = 4001;
    /// Generic quota/size/limit violation.
    pub const LIMIT_VIOLATION: u16 = 4100;
    /// Presence `channel_data` is not JSON-parseable.
    pub const MEMBER_NOT_JSON: u16 = 4303;
    /// Internal error during the presence existence check.
    pub const PRESENCE_CHECK_FAILED: u16 = 4304;
    /// Internal error while resolving who left a presence channel.
    pub const LEAVE_FAILED: u16 = 4305;
}

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub struct EventName;

impl EventName {
    pub const SUBSCRIBE: &'static str = "subscribe";
    pub const UNSUBSCRIBE: &'static str = "unsubscribe";
    pub const CLIENT_EVENT: &'static str = "client event";
    pub const CONNECTION_ESTABLISHED: &'static str = "connection:established";
    pub const CHANNEL_JOINED: &'static str = "channel:joined";
    pub const PRESENCE_SUBSCRIBED: &'static str = "presence:subscribed";
    pub const PRESENCE_JOINING: &'static str = "presence:joining";
    pub const PRESENCE_LEAVING: &'static str = "presence:leaving";
    pub const SOCKET_ERROR: &'static str = "socket:error";
    pub const SOCKET_INFO: &'static str = "socket:info";
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// An incoming message: `{event, data}` over a text frame.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribePayload {
    pub channel: String,
    /// Auth token for non-public tiers: `"{key}:{hmac}"`.
    #[serde(default)]
    pub auth: Option<String>,
    /// Raw member JSON for presence tiers. Kept as the string the client
    /// sent; it is part of the signed canonical string.
    #[serde(default)]
    pub channel_data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribePayload {
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientEventPayload {
    pub event: String,
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// An outgoing message: `{event, channel?, data?}` over a text frame.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ServerMessage {
    /// Greeting sent once per admitted connection; carries the socket id the
    /// client needs to request auth tokens.
    pub fn connection_established(socket_id: &str) -> Self {
        Self {
            event: EventName::CONNECTION_ESTABLISHED.to_string(),
            channel: None,
            data: Some(serde_json::json!({ "socket_id": socket_id })),
        }
    }

    pub fn channel_joined(channel: &str) -> Self {
        Self {
            event: EventName::CHANNEL_JOINED.to_string(),
            channel: None,
            data: Some(Value::String(channel.to_string())),
        }
    }

    pub fn presence_subscribed(channel: &str, members: &[Member]) -> Self {
        Self {
            event: EventName::PRESENCE_SUBSCRIBED.to_string(),
            channel: Some(channel.to_string()),
            data: serde_json::to_value(members).ok(),
        }
    }

    pub fn presence_joining(channel: &str, member: &Member) -> Self {
        Self {
            event: EventName::PRESENCE_JOINING.to_string(),
            channel: Some(channel.to_string()),
            data: serde_json::to_value(member).ok(),
        }
    }

    pub fn presence_leaving(channel: &str, member: &Member) -> Self {
        Self {
            event: EventName::PRESENCE_LEAVING.to_string(),
            channel: Some(channel.to_string()),
            data: serde_json::to_value(member).ok(),
        }
    }

    pub fn error(message: impl Into<String>, code: u16) -> Self {
        Self {
            event: EventName::SOCKET_ERROR.to_string(),
            channel: None,
            data: Some(serde_json::json!({ "message": message.into(), "code": code })),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            event: EventName::SOCKET_INFO.to_string(),
            channel: None,
            data: Some(serde_json::json!({ "message": message.into() })),
        }
    }

    /// An application event (client-sent or API-broadcast) on a channel.
    pub fn broadcast(event: &str, channel: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            channel: Some(channel.to_string()),
            data: Some(data),
        }
    }
}
