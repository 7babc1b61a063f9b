//! Channel classification and the per-tier join/leave/client-event protocol.

pub mod presence;

use std::sync::Arc;

use serde_json::Value;

use crate::auth::token;
use crate::config::Config;
use crate::gateway::events::{
    codes, ClientEventPayload, ServerMessage, SubscribePayload,
};
use crate::gateway::registry::SessionRegistry;
use crate::gateway::session::Session;
use crate::limiter::{ConsumeResult, RateLimiter};
use crate::presence::{Member, PresenceError, PresenceStorage};
use crate::stats::Stats;
use crate::webhooks::{WebhookEvent, WebhookSender, CLIENT_EVENT_WEBHOOK};

/// Channel tier, derived from the name prefix alone.
///
/// `presence-` must be checked before the generic private prefixes: presence
/// channels behave as a superset of private channels but are not named like
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Public,
    Private,
    EncryptedPrivate,
    Presence,
}

impl ChannelKind {
    pub fn of(channel: &str) -> Self {
        if channel.starts_with("presence-") {
            Self::Presence
        } else if channel.starts_with("private-encrypted-") {
            Self::EncryptedPrivate
        } else if channel.starts_with("private-") {
            Self::Private
        } else {
            Self::Public
        }
    }

    /// Whether subscribing requires a signed auth token.
    pub fn requires_signature(self) -> bool {
        !matches!(self, Self::Public)
    }
}

/// Why a join did not happen. Refusals are protocol outcomes; backend
/// failures are reported separately so callers never conflate the two.
#[derive(Debug, PartialEq, Eq)]
pub enum Refusal {
    NameTooLong,
    InvalidSignature,
    MemberNotJson,
    MemberTooLarge,
    DuplicateMember,
    ChannelFull,
}

/// Outcome of a subscribe attempt.
#[derive(Debug)]
pub enum JoinOutcome {
    /// The session is in the room; presence joins carry the bound member.
    Joined(Option<Member>),
    Refused(Refusal),
    Failed(PresenceError),
}

/// The protocol engine shared by all sessions. Tier dispatch happens here,
/// once per operation; each tier composes the previous one by explicit
/// delegation.
pub struct ChannelManager {
    registry: Arc<SessionRegistry>,
    presence: Arc<dyn PresenceStorage>,
    limiter: Arc<RateLimiter>,
    stats: Arc<dyn Stats>,
    webhooks: Arc<WebhookSender>,
    config: Arc<Config>,
}

impl ChannelManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        presence: Arc<dyn PresenceStorage>,
        limiter: Arc<RateLimiter>,
        stats: Arc<dyn Stats>,
        webhooks: Arc<WebhookSender>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            presence,
            limiter,
            stats,
            webhooks,
            config,
        }
    }

    pub(crate) fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub(crate) fn presence_storage(&self) -> &dyn PresenceStorage {
        self.presence.as_ref()
    }

    pub(crate) fn stats(&self) -> &dyn Stats {
        self.stats.as_ref()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Handle a `subscribe` message.
    pub async fn subscribe(&self, session: &Arc<Session>, payload: SubscribePayload) -> JoinOutcome {
        let max_name = self.config.channel_limits.max_name_length;
        if payload.channel.len() > max_name {
            session.send(ServerMessage::error(
                format!("The channel name is longer than the allowed {max_name} characters."),
                codes::LIMIT_VIOLATION,
            ));
            return JoinOutcome::Refused(Refusal::NameTooLong);
        }

        match ChannelKind::of(&payload.channel) {
            ChannelKind::Public => self.join_public(session, &payload.channel),
            // The encrypted tier adds key material handling on the client
            // side only; server-side admission is the private tier's.
            ChannelKind::Private | ChannelKind::EncryptedPrivate => {
                self.join_private(session, &payload)
            }
            ChannelKind::Presence => self.join_presence(session, &payload).await,
        }
    }

    /// Handle an `unsubscribe` message or disconnect cleanup for one room.
    pub async fn leave(&self, session: &Arc<Session>, channel: &str, reason: &str) {
        tracing::debug!(
            session_id = %session.id,
            app_id = %session.app.id,
            channel,
            reason,
            "leaving channel"
        );

        match ChannelKind::of(channel) {
            ChannelKind::Presence => self.leave_presence(session, channel).await,
            _ => self.registry.leave_room(session, channel),
        }
    }

    /// Public tier: a join always succeeds.
    fn join_public(&self, session: &Arc<Session>, channel: &str) -> JoinOutcome {
        self.registry.join_room(session, channel);
        self.on_join(session, channel);
        JoinOutcome::Joined(None)
    }

    /// Private tier: verify the signed token, then delegate to the public
    /// join. A bad signature resolves to "not joined" with no error event;
    /// clients may legitimately probe channels they cannot access.
    fn join_private(&self, session: &Arc<Session>, payload: &SubscribePayload) -> JoinOutcome {
        let canonical = token::private_canonical(&session.id, &payload.channel);
        let candidate = payload.auth.as_deref().unwrap_or("");

        if !token::verify(&session.app, &canonical, candidate) {
            tracing::debug!(
                session_id = %session.id,
                channel = %payload.channel,
                "subscription signature rejected"
            );
            return JoinOutcome::Refused(Refusal::InvalidSignature);
        }

        self.join_public(session, &payload.channel)
    }

    /// Shared join tail: the joining session alone gets `channel:joined`.
    pub(crate) fn on_join(&self, session: &Arc<Session>, channel: &str) {
        session.send(ServerMessage::channel_joined(channel));
        self.stats.mark_ws_message(&session.app);
    }

    /// Handle a `client event` message. Only wired for sessions whose app has
    /// client messages enabled; beyond that gate, every check here reports to
    /// the offending session only.
    pub async fn on_client_event(&self, session: &Arc<Session>, payload: ClientEventPayload) {
        if !is_client_event(&payload.event) {
            return;
        }

        // Not being in the room silently drops the event; this blocks
        // injection into channels the session never joined and consumes no
        // quota.
        if !session.in_room(&payload.channel) {
            return;
        }

        if ChannelKind::of(&payload.channel) == ChannelKind::Public {
            return;
        }

        let max_name = self.config.event_limits.max_name_length;
        if payload.event.len() > max_name {
            session.send(ServerMessage::error(
                format!(
                    "The broadcasting client event name is longer than {max_name} characters."
                ),
                codes::LIMIT_VIOLATION,
            ));
            return;
        }

        let max_kb = self.config.event_limits.max_payload_kb;
        if data_to_kilobytes(&payload.data) > max_kb {
            session.send(ServerMessage::error(
                format!("The broadcasting client event payload is greater than {max_kb} KB."),
                codes::LIMIT_VIOLATION,
            ));
            return;
        }

        let granted = self
            .limiter
            .consume_frontend_event_points(&session.app, &session.id, 1)
            .await;
        if let ConsumeResult::Denied(_) = granted {
            session.send(ServerMessage::error(
                "The number of client messages per minute got exceeded. Please slow it down.",
                codes::LIMIT_VIOLATION,
            ));
            return;
        }

        let message =
            ServerMessage::broadcast(&payload.event, &payload.channel, payload.data.clone());
        self.registry.broadcast(
            &session.namespace,
            &payload.channel,
            &message,
            Some(&session.id),
        );
        self.stats.mark_ws_message(&session.app);

        self.webhooks.send(
            &session.app,
            CLIENT_EVENT_WEBHOOK,
            vec![WebhookEvent {
                name: payload.event,
                channel: payload.channel,
                data: payload.data,
            }],
        );
    }
}

/// Client events must match the allow-listed `client-*` pattern.
pub fn is_client_event(event: &str) -> bool {
    event.starts_with("client-")
}

/// Payload size the way quotas measure it: raw length for strings, serialized
/// length otherwise.
pub fn data_to_bytes(data: &Value) -> usize {
    match data {
        Value::String(s) => s.len(),
        other => serde_json::to_string(other).map(|s| s.len()).unwrap_or(0),
    }
}

pub fn data_to_kilobytes(data: &Value) -> f64 {
    data_to_bytes(data) as f64 / 1024.0
}
