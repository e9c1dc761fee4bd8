use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

use crate::ws::connection::{CloseReason, Connection, SendError};

/// Connection registry: at most one live connection per user.
///
/// A second connect for the same user replaces the first. The old socket may
/// linger for the moment it takes its actor to see the close signal, but it is
/// never reachable through [`ConnectionRegistry::lookup`] again.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `conn` under `user_id` and return whatever was stored before.
    ///
    /// The caller must close the returned connection with
    /// [`CloseReason::replaced`]; [`ConnectionRegistry::admit_and_replace`]
    /// does both.
    pub fn admit(&self, user_id: &str, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        self.connections.insert(user_id.to_string(), conn)
    }

    /// Admit `conn` and close the connection it replaces, if any.
    pub fn admit_and_replace(&self, user_id: &str, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let new_id = conn.subscriber_id();
        let previous = self.admit(user_id, conn)?;
        if previous.close(CloseReason::replaced()) {
            tracing::info!(
                user_id = %user_id,
                old_subscriber_id = previous.subscriber_id(),
                new_subscriber_id = new_id,
                "Connection replaced"
            );
        }
        Some(previous)
    }

    pub fn lookup(&self, user_id: &str) -> Option<Arc<Connection>> {
        self.connections
            .get(user_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the entry for `user_id` only if it still points at `conn`.
    ///
    /// Returns false when a newer connection has already taken the slot.
    pub fn remove(&self, user_id: &str, conn: &Connection) -> bool {
        let id = conn.subscriber_id();
        self.connections
            .remove_if(user_id, |_, current| current.subscriber_id() == id)
            .is_some()
    }

    /// Send a pre-encoded frame straight to one user, bypassing topics.
    /// Returns true if the frame was queued.
    pub fn send_to_user(&self, user_id: &str, frame: Bytes) -> bool {
        let Some(conn) = self.lookup(user_id) else {
            return false;
        };
        match conn.send(frame) {
            Ok(()) => true,
            Err(SendError::Closed) => false,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Direct send dropped");
                false
            }
        }
    }

    /// Close the user's connection with `reason` (kick, ban, account removal).
    pub fn force_close(&self, user_id: &str, reason: CloseReason) -> bool {
        self.lookup(user_id)
            .map(|conn| conn.close(reason))
            .unwrap_or(false)
    }

    /// Close every connection, used on shutdown.
    pub fn close_all(&self, reason: CloseReason) {
        for entry in self.connections.iter() {
            entry.value().close(reason.clone());
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    pub fn online_users(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
