//! Presence tier: member bookkeeping layered on top of the private join.

use std::sync::Arc;

use super::{ChannelManager, JoinOutcome, Refusal};
use crate::auth::token;
use crate::gateway::events::{codes, ServerMessage, SubscribePayload};
use crate::gateway::session::Session;
use crate::presence::Member;

impl ChannelManager {
    /// Presence join pipeline. The signature covers the raw `channel_data`
    /// string, so verification happens before any parsing; everything after
    /// it reports failures to the joining session only.
    pub(crate) async fn join_presence(
        &self,
        session: &Arc<Session>,
        payload: &SubscribePayload,
    ) -> JoinOutcome {
        let channel = &payload.channel;
        let channel_data = payload.channel_data.as_deref().unwrap_or("");
        let canonical = token::presence_canonical(&session.id, channel, channel_data);
        let candidate = payload.auth.as_deref().unwrap_or("");

        if !token::verify(&session.app, &canonical, candidate) {
            tracing::debug!(
                session_id = %session.id,
                channel,
                "presence subscription signature rejected"
            );
            return JoinOutcome::Refused(Refusal::InvalidSignature);
        }

        let member: Member = match serde_json::from_str(channel_data) {
            Ok(member) => member,
            Err(err) => {
                tracing::debug!(session_id = %session.id, channel, %err, "member data not JSON");
                session.send(ServerMessage::error(
                    "The member received from the presence channel is not JSONable.",
                    codes::MEMBER_NOT_JSON,
                ));
                return JoinOutcome::Refused(Refusal::MemberNotJson);
            }
        };

        let max_kb = self.config().presence_limits.max_member_size_kb;
        if channel_data.len() as f64 / 1024.0 > max_kb {
            session.send(ServerMessage::error(
                format!("The member size exceeds the allowed {max_kb} KB."),
                codes::LIMIT_VIOLATION,
            ));
            return JoinOutcome::Refused(Refusal::MemberTooLarge);
        }

        let namespace = session.namespace.clone();

        match self
            .presence_storage()
            .member_exists(&namespace, channel, &member)
            .await
        {
            Ok(false) => {}
            Ok(true) => {
                session.send(ServerMessage::info(
                    "The member you are trying to connect to is already connected on another connection.",
                ));
                return JoinOutcome::Refused(Refusal::DuplicateMember);
            }
            Err(err) => {
                tracing::error!(session_id = %session.id, channel, %err, "presence lookup failed");
                session.send(ServerMessage::error(
                    "There is an internal problem.",
                    codes::PRESENCE_CHECK_FAILED,
                ));
                return JoinOutcome::Failed(err);
            }
        }

        let mut member = member;
        member.socket_id = Some(session.id.clone());

        let members = match self
            .presence_storage()
            .add_member(session, &namespace, channel, member.clone())
            .await
        {
            Ok(members) => members,
            Err(err) => {
                tracing::error!(session_id = %session.id, channel, %err, "presence add failed");
                session.send(ServerMessage::error(
                    "There is an internal problem.",
                    codes::PRESENCE_CHECK_FAILED,
                ));
                return JoinOutcome::Failed(err);
            }
        };

        // Ceiling check runs against the roster including this member, after
        // the provisional add. A full channel must not keep the half-joined
        // slot around, so the session is torn down outright.
        let max_members = self.config().presence_limits.max_members_per_channel;
        if members.len() > max_members {
            session.take_presence_member(channel);
            session.send(ServerMessage::error(
                "The maximum channel members amount has been reached.",
                codes::LIMIT_VIOLATION,
            ));
            session.close();
            return JoinOutcome::Refused(Refusal::ChannelFull);
        }

        self.registry().join_room(session, channel);

        session.send(ServerMessage::presence_subscribed(channel, &members));
        self.stats().mark_ws_message(&session.app);

        self.registry().broadcast(
            &namespace,
            channel,
            &ServerMessage::presence_joining(channel, &member),
            Some(&session.id),
        );
        self.stats().mark_ws_message(&session.app);

        self.on_join(session, channel);

        JoinOutcome::Joined(Some(member))
    }

    /// Presence leave. A session that never completed the join holds no
    /// member slot; leaving is then a silent no-op.
    pub(crate) async fn leave_presence(&self, session: &Arc<Session>, channel: &str) {
        let namespace = session.namespace.clone();

        let member = match self
            .presence_storage()
            .who_left(session, &namespace, channel)
            .await
        {
            Ok(Some(member)) => member,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(session_id = %session.id, channel, %err, "presence leave lookup failed");
                session.send(ServerMessage::error(
                    "There is an internal problem.",
                    codes::LEAVE_FAILED,
                ));
                return;
            }
        };

        if let Err(err) = self
            .presence_storage()
            .remove_member(session, &namespace, channel, &member)
            .await
        {
            tracing::error!(session_id = %session.id, channel, %err, "presence remove failed");
            session.send(ServerMessage::error(
                "There is an internal problem.",
                codes::LEAVE_FAILED,
            ));
            return;
        }

        self.registry().leave_room(session, channel);

        self.registry().broadcast(
            &namespace,
            channel,
            &ServerMessage::presence_leaving(channel, &member),
            None,
        );
        self.stats().mark_ws_message(&session.app);
    }
}
