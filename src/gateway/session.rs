//! Per-connection session state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;

use crate::apps::App;
use crate::presence::Member;

use super::events::ServerMessage;

/// What the connection task should do with a queued item.
#[derive(Debug)]
pub enum Outbound {
    Message(ServerMessage),
    Close,
}

#[derive(Default)]
struct SessionState {
    /// Channels this session has joined.
    rooms: HashSet<String>,
    /// For presence channels only: the member this session represents there.
    presence: HashMap<String, Member>,
}

/// One live transport connection bound to exactly one app.
///
/// Mutable state sits behind a `Mutex` even though message handling for one
/// session is sequential: the HTTP broadcast path and other sessions' fan-out
/// read it concurrently.
pub struct Session {
    /// Pusher-style socket id, `"<u64>.<u64>"`.
    pub id: String,
    pub app: Arc<App>,
    /// The app key; rooms and presence rosters are scoped to it.
    pub namespace: String,
    sender: mpsc::UnboundedSender<Outbound>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(app: Arc<App>, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        let namespace = app.key.clone();
        Self {
            id: generate_socket_id(),
            app,
            namespace,
            sender,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Queue a message for delivery. A send to a connection that is already
    /// tearing down is dropped silently.
    pub fn send(&self, message: ServerMessage) {
        let _ = self.sender.send(Outbound::Message(message));
    }

    /// Ask the connection task to close the transport.
    pub fn close(&self) {
        let _ = self.sender.send(Outbound::Close);
    }

    pub fn in_room(&self, channel: &str) -> bool {
        self.state.lock().rooms.contains(channel)
    }

    /// Snapshot of the joined rooms, taken before disconnect teardown so room
    /// iteration cannot race the cleanup side effects.
    pub fn rooms_snapshot(&self) -> Vec<String> {
        self.state.lock().rooms.iter().cloned().collect()
    }

    pub(crate) fn enter_room(&self, channel: &str) {
        self.state.lock().rooms.insert(channel.to_string());
    }

    pub(crate) fn exit_room(&self, channel: &str) {
        self.state.lock().rooms.remove(channel);
    }

    /// Bind the member record this session represents in a presence channel.
    pub fn set_presence_member(&self, channel: &str, member: Member) {
        self.state
            .lock()
            .presence
            .insert(channel.to_string(), member);
    }

    pub fn presence_member(&self, channel: &str) -> Option<Member> {
        self.state.lock().presence.get(channel).cloned()
    }

    pub fn take_presence_member(&self, channel: &str) -> Option<Member> {
        self.state.lock().presence.remove(channel)
    }
}

/// Generate a Pusher-like socket id.
fn generate_socket_id() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}.{}",
        rng.gen_range(0..=10_000_000_000u64),
        rng.gen_range(0..=10_000_000_000u64)
    )
}
