//! Live connection registry and room broadcast groups.

use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{dto::ws::Envelope, error::ServiceError, state::SharedState};

#[derive(Clone, Debug)]
/// Handle used to push messages to a connected player.
pub struct ConnectionHandle {
    /// Server-assigned connection id.
    pub id: String,
    /// Owner of the connection.
    pub user_id: String,
    tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    /// Wrap the writer channel of a connection.
    pub fn new(id: String, user_id: String, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, user_id, tx }
    }

    /// Queue a raw frame; `false` once the writer is gone.
    pub fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Fan-out over live connections; a connection belongs to at most one room group.
#[derive(Default)]
pub struct Broadcaster {
    connections: DashMap<String, ConnectionHandle>,
    groups: DashMap<String, HashSet<String>>,
    memberships: DashMap<String, String>,
}

impl Broadcaster {
    /// Track a new connection.
    pub fn register(&self, handle: ConnectionHandle) {
        self.connections.insert(handle.id.clone(), handle);
    }

    /// Forget a connection and its group membership.
    pub fn unregister(&self, connection_id: &str) -> Option<ConnectionHandle> {
        self.leave_group(connection_id);
        self.connections
            .remove(connection_id)
            .map(|(_, handle)| handle)
    }

    /// Number of tracked connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Put a connection in `room_code`'s group, leaving any previous one.
    pub fn join_group(&self, connection_id: &str, room_code: &str) {
        if !self.connections.contains_key(connection_id) {
            return;
        }
        let previous = self
            .memberships
            .insert(connection_id.to_owned(), room_code.to_owned());
        if let Some(previous) = previous.filter(|previous| previous != room_code) {
            self.remove_member(&previous, connection_id);
        }
        self.groups
            .entry(room_code.to_owned())
            .or_default()
            .insert(connection_id.to_owned());
        debug!(connection = %connection_id, room = %room_code, "joined room group");
    }

    /// Remove a connection from its group.
    pub fn leave_group(&self, connection_id: &str) -> Option<String> {
        let (_, room_code) = self.memberships.remove(connection_id)?;
        self.remove_member(&room_code, connection_id);
        Some(room_code)
    }

    /// Empty a room's group, e.g. once the room is closed.
    pub fn dissolve_group(&self, room_code: &str) {
        if let Some((_, members)) = self.groups.remove(room_code) {
            for member in members {
                self.memberships
                    .remove_if(&member, |_, current| current == room_code);
            }
        }
    }

    /// Room group of a connection.
    pub fn group_of(&self, connection_id: &str) -> Option<String> {
        self.memberships
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    /// Connections subscribed to a room.
    pub fn members(&self, room_code: &str) -> Vec<String> {
        self.groups
            .get(room_code)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn remove_member(&self, room_code: &str, connection_id: &str) {
        if let Some(mut members) = self.groups.get_mut(room_code) {
            members.remove(connection_id);
        }
        self.groups.remove_if(room_code, |_, members| members.is_empty());
    }

    /// Send an envelope to one connection; `false` when it is gone.
    pub fn emit_connection(&self, connection_id: &str, envelope: &Envelope) -> bool {
        let Some(handle) = self
            .connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
        else {
            return false;
        };
        match envelope.to_text() {
            Ok(text) => handle.send(Message::Text(text.into())),
            Err(err) => {
                warn!(event = %envelope.kind, error = %err, "failed to serialize envelope");
                false
            }
        }
    }

    /// Send an envelope to every connection of a room, returning how many were reached.
    pub fn emit_room(&self, room_code: &str, envelope: &Envelope) -> usize {
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(err) => {
                warn!(event = %envelope.kind, error = %err, "failed to serialize envelope");
                return 0;
            }
        };
        let mut delivered = 0;
        for member in self.members(room_code) {
            let handle = self
                .connections
                .get(&member)
                .map(|entry| entry.value().clone());
            if let Some(handle) = handle {
                if handle.send(Message::Text(text.clone().into())) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Send a close frame and stop tracking the connection.
    pub fn close(&self, connection_id: &str) {
        if let Some(handle) = self.unregister(connection_id) {
            let _ = handle.send(Message::Close(None));
        }
    }
}

/// Deliver an envelope to the live connection of `user_id`, if any.
pub async fn emit_user(
    state: &SharedState,
    user_id: &str,
    envelope: &Envelope,
) -> Result<bool, ServiceError> {
    let Some(connection_id) = state.presence().resolve(user_id).await? else {
        debug!(user = %user_id, event = %envelope.kind, "no live connection for user");
        return Ok(false);
    };
    Ok(state.broadcaster().emit_connection(&connection_id, envelope))
}

/// Subscribe the live connection of `user_id` to a room group.
pub async fn subscribe_user(state: &SharedState, user_id: &str, room_code: &str) {
    match state.presence().resolve(user_id).await {
        Ok(Some(connection_id)) => state.broadcaster().join_group(&connection_id, room_code),
        Ok(None) => {}
        Err(err) => warn!(user = %user_id, room = %room_code, error = %err, "presence lookup failed"),
    }
}

/// Drop the live connection of `user_id` from a room group.
pub async fn unsubscribe_user(state: &SharedState, user_id: &str, room_code: &str) {
    match state.presence().resolve(user_id).await {
        Ok(Some(connection_id)) => {
            if state.broadcaster().group_of(&connection_id).as_deref() == Some(room_code) {
                state.broadcaster().leave_group(&connection_id);
            }
        }
        Ok(None) => {}
        Err(err) => warn!(user = %user_id, room = %room_code, error = %err, "presence lookup failed"),
    }
}
