//! Presence channel member directories.

pub mod socket;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PresenceStorageKind;
use crate::gateway::registry::SessionRegistry;
use crate::gateway::session::Session;

/// A presence-channel occupant. Identity is `user_id` alone: two members with
/// the same `user_id` but different `user_data` are the same occupant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// String or number, as the client sent it.
    pub user_id: Value,
    #[serde(default)]
    pub user_data: Value,
    /// Bound to the one session carrying this member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
}

impl Member {
    pub fn same_user(&self, other: &Member) -> bool {
        self.user_id == other.user_id
    }
}

/// Failure in the storage backend; surfaced to clients as an internal error.
#[derive(Debug)]
pub struct PresenceError(pub String);

impl fmt::Display for PresenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "presence storage error: {}", self.0)
    }
}

impl std::error::Error for PresenceError {}

/// Member directory for one `(namespace, channel)` presence roster.
///
/// Implementations backed by a shared external store must perform
/// `add_member` as a compare-and-set on `user_id` so two processes racing the
/// duplicate check cannot both win.
#[async_trait]
pub trait PresenceStorage: Send + Sync {
    async fn get_members(
        &self,
        namespace: &str,
        channel: &str,
    ) -> Result<Vec<Member>, PresenceError>;

    /// Whether an occupant with this member's `user_id` is already present.
    async fn member_exists(
        &self,
        namespace: &str,
        channel: &str,
        member: &Member,
    ) -> Result<bool, PresenceError>;

    /// Attach `member` to `session`'s slot for this channel and return the
    /// updated roster, including the new member.
    async fn add_member(
        &self,
        session: &Arc<Session>,
        namespace: &str,
        channel: &str,
        member: Member,
    ) -> Result<Vec<Member>, PresenceError>;

    /// Detach the membership slot; idempotent if already absent.
    async fn remove_member(
        &self,
        session: &Arc<Session>,
        namespace: &str,
        channel: &str,
        member: &Member,
    ) -> Result<Vec<Member>, PresenceError>;

    /// The member this specific session represented in the channel, if any.
    /// Resolved from the session's own slot, not a roster scan, so a second
    /// rejected session for the same `user_id` can never be mistaken for the
    /// departing one.
    async fn who_left(
        &self,
        session: &Arc<Session>,
        namespace: &str,
        channel: &str,
    ) -> Result<Option<Member>, PresenceError>;
}

/// Build the presence storage selected by the configuration.
pub fn build(
    kind: PresenceStorageKind,
    registry: Arc<SessionRegistry>,
) -> Arc<dyn PresenceStorage> {
    match kind {
        PresenceStorageKind::Socket => Arc::new(socket::SocketPresenceStorage::new(registry)),
    }
}
