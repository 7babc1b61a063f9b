//! Shared registry of live sessions, per-namespace counts, and rooms.
//!
//! Rooms are the live multicast groups behind channels, keyed by
//! `(namespace, channel)`. `DashMap` gives shard-level concurrency; per-key
//! values are plain sets updated under the entry lock, so concurrent
//! join/leave/list cannot lose updates.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use super::events::ServerMessage;
use super::session::Session;

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    rooms: DashMap<(String, String), HashSet<String>>,
    namespace_counts: DashMap<String, usize>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            namespace_counts: DashMap::new(),
        }
    }

    /// Register a newly admitted session. Returns the live session count for
    /// its namespace, including this one, so the caller can enforce the
    /// app's connection ceiling.
    pub fn register(&self, session: Arc<Session>) -> usize {
        let namespace = session.namespace.clone();
        self.sessions.insert(session.id.clone(), session);

        let mut count = self.namespace_counts.entry(namespace).or_insert(0);
        *count += 1;
        *count
    }

    /// Remove a session after its rooms have been cleaned up.
    pub fn deregister(&self, session: &Session) {
        self.sessions.remove(&session.id);

        if let Some(mut count) = self.namespace_counts.get_mut(&session.namespace) {
            *count = count.saturating_sub(1);
        }
        self.namespace_counts
            .remove_if(&session.namespace, |_, count| *count == 0);
    }

    pub fn namespace_count(&self, namespace: &str) -> usize {
        self.namespace_counts
            .get(namespace)
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Look up a session by socket id within one namespace, for the HTTP
    /// broadcast path's `socket_id` exclusion.
    pub fn find_in_namespace(&self, namespace: &str, socket_id: &str) -> Option<Arc<Session>> {
        self.get(socket_id).filter(|s| s.namespace == namespace)
    }

    pub fn join_room(&self, session: &Session, channel: &str) {
        self.rooms
            .entry((session.namespace.clone(), channel.to_string()))
            .or_default()
            .insert(session.id.clone());
        session.enter_room(channel);
    }

    pub fn leave_room(&self, session: &Session, channel: &str) {
        let key = (session.namespace.clone(), channel.to_string());
        if let Some(mut room) = self.rooms.get_mut(&key) {
            room.remove(&session.id);
        }
        self.rooms.remove_if(&key, |_, room| room.is_empty());
        session.exit_room(channel);
    }

    pub fn room_size(&self, namespace: &str, channel: &str) -> usize {
        self.rooms
            .get(&(namespace.to_string(), channel.to_string()))
            .map(|room| room.len())
            .unwrap_or(0)
    }

    /// Sessions currently in a room. Ids are snapshotted before the session
    /// lookups so no map lock is held across both maps.
    pub fn room_sessions(&self, namespace: &str, channel: &str) -> Vec<Arc<Session>> {
        let ids: Vec<String> = match self
            .rooms
            .get(&(namespace.to_string(), channel.to_string()))
        {
            Some(room) => room.iter().cloned().collect(),
            None => return Vec::new(),
        };

        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Occupied channels in a namespace with their subscription counts.
    pub fn channels(&self, namespace: &str) -> Vec<(String, usize)> {
        self.rooms
            .iter()
            .filter(|entry| entry.key().0 == namespace && !entry.value().is_empty())
            .map(|entry| (entry.key().1.clone(), entry.value().len()))
            .collect()
    }

    /// Fan a message out to every session in a room, optionally excluding one
    /// socket id. Returns the number of sessions the message was queued for.
    pub fn broadcast(
        &self,
        namespace: &str,
        channel: &str,
        message: &ServerMessage,
        except: Option<&str>,
    ) -> usize {
        let mut delivered = 0;
        for session in self.room_sessions(namespace, channel) {
            if except.is_some_and(|id| id == session.id) {
                continue;
            }
            session.send(message.clone());
            delivered += 1;
        }
        delivered
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use crate::apps::App;
    use crate::gateway::session::Outbound;

    use super::*;

    fn make_session(key: &str) -> (Arc<Session>, UnboundedReceiver<Outbound>) {
        let app: Arc<App> = Arc::new(
            serde_json::from_str(&format!(
                r#"{{ "id": "app-{key}", "key": "{key}", "secret": "s" }}"#
            ))
            .unwrap(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Session::new(app, tx)), rx)
    }

    #[test]
    fn register_counts_per_namespace() {
        let registry = SessionRegistry::new();
        let (s1, _r1) = make_session("k1");
        let (s2, _r2) = make_session("k1");
        let (s3, _r3) = make_session("k2");

        assert_eq!(registry.register(s1.clone()), 1);
        assert_eq!(registry.register(s2.clone()), 2);
        assert_eq!(registry.register(s3), 1);
        assert_eq!(registry.namespace_count("k1"), 2);
        assert_eq!(registry.namespace_count("k2"), 1);

        registry.deregister(&s1);
        assert_eq!(registry.namespace_count("k1"), 1);
        registry.deregister(&s2);
        assert_eq!(registry.namespace_count("k1"), 0);
    }

    #[test]
    fn rooms_are_scoped_by_namespace() {
        let registry = SessionRegistry::new();
        let (s1, _r1) = make_session("k1");
        let (s2, _r2) = make_session("k2");
        registry.register(s1.clone());
        registry.register(s2.clone());

        registry.join_room(&s1, "news");
        registry.join_room(&s2, "news");

        assert_eq!(registry.room_size("k1", "news"), 1);
        assert_eq!(registry.room_size("k2", "news"), 1);
    }

    #[test]
    fn leave_room_removes_empty_rooms() {
        let registry = SessionRegistry::new();
        let (s1, _r1) = make_session("k1");
        registry.register(s1.clone());

        registry.join_room(&s1, "news");
        assert_eq!(registry.channels("k1").len(), 1);

        registry.leave_room(&s1, "news");
        assert!(registry.channels("k1").is_empty());
        assert_eq!(registry.room_size("k1", "news"), 0);
        assert!(!s1.in_room("news"));
    }

    #[test]
    fn broadcast_excludes_the_given_socket() {
        let registry = SessionRegistry::new();
        let (s1, mut r1) = make_session("k1");
        let (s2, mut r2) = make_session("k1");
        registry.register(s1.clone());
        registry.register(s2.clone());
        registry.join_room(&s1, "news");
        registry.join_room(&s2, "news");

        let delivered = registry.broadcast(
            "k1",
            "news",
            &ServerMessage::broadcast("update", "news", serde_json::json!({})),
            Some(&s1.id),
        );

        assert_eq!(delivered, 1);
        assert!(r1.try_recv().is_err());
        assert!(matches!(r2.try_recv().unwrap(), Outbound::Message(_)));
    }

    #[test]
    fn find_in_namespace_rejects_foreign_sessions() {
        let registry = SessionRegistry::new();
        let (s1, _r1) = make_session("k1");
        registry.register(s1.clone());

        assert!(registry.find_in_namespace("k1", &s1.id).is_some());
        assert!(registry.find_in_namespace("k2", &s1.id).is_none());
    }
}
