//! Session-attached presence storage.
//!
//! The member record lives on the session that carries it; rosters are
//! assembled by scanning the room's sessions. Membership cleanup therefore
//! falls out of session teardown for free. Correct only for single-process
//! topologies — a multi-process deployment needs a shared-store driver behind
//! the same trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::gateway::registry::SessionRegistry;
use crate::gateway::session::Session;

use super::{Member, PresenceError, PresenceStorage};

pub struct SocketPresenceStorage {
    registry: Arc<SessionRegistry>,
}

impl SocketPresenceStorage {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    fn roster(&self, namespace: &str, channel: &str) -> Vec<Member> {
        self.registry
            .room_sessions(namespace, channel)
            .iter()
            .filter_map(|session| session.presence_member(channel))
            .collect()
    }
}

#[async_trait]
impl PresenceStorage for SocketPresenceStorage {
    async fn get_members(
        &self,
        namespace: &str,
        channel: &str,
    ) -> Result<Vec<Member>, PresenceError> {
        Ok(self.roster(namespace, channel))
    }

    async fn member_exists(
        &self,
        namespace: &str,
        channel: &str,
        member: &Member,
    ) -> Result<bool, PresenceError> {
        Ok(self
            .roster(namespace, channel)
            .iter()
            .any(|existing| existing.same_user(member)))
    }

    async fn add_member(
        &self,
        session: &Arc<Session>,
        namespace: &str,
        channel: &str,
        member: Member,
    ) -> Result<Vec<Member>, PresenceError> {
        session.set_presence_member(channel, member.clone());

        // The session joins the room after the add, so include its member in
        // the returned roster explicitly.
        let mut members = self.roster(namespace, channel);
        if !members
            .iter()
            .any(|m| m.socket_id.as_deref() == Some(session.id.as_str()))
        {
            members.push(member);
        }

        Ok(members)
    }

    async fn remove_member(
        &self,
        session: &Arc<Session>,
        namespace: &str,
        channel: &str,
        _member: &Member,
    ) -> Result<Vec<Member>, PresenceError> {
        session.take_presence_member(channel);
        Ok(self.roster(namespace, channel))
    }

    async fn who_left(
        &self,
        session: &Arc<Session>,
        _namespace: &str,
        channel: &str,
    ) -> Result<Option<Member>, PresenceError> {
        Ok(session.presence_member(channel))
    }
}
