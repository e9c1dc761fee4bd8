//! Server-side presence tracking and broadcast.
//!
//! In-memory presence store (DashMap) keyed by user id. Status changes fan out
//! as `change_status` events to the user's server topics and directly to
//! friends that are online.

use crate::chat::broadcast::deliver;
use crate::proto::{self, Event};
use crate::state::AppState;
use crate::ws::codec::CodecError;
use crate::ws::topics::{server_topic, PublishReport};

/// Presence status values, carried on the wire as their string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    Away,
    Dnd,
    Offline,
}

impl PresenceStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "away" => Some(Self::Away),
            "dnd" => Some(Self::Dnd),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Dnd => "dnd",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Info tracked per user in the presence map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceInfo {
    pub user_id: String,
    pub status: PresenceStatus,
}

fn record(state: &AppState, user_id: &str, status: PresenceStatus) {
    state.presence.insert(
        user_id.to_string(),
        PresenceInfo {
            user_id: user_id.to_string(),
            status,
        },
    );
}

fn status_event(user_id: &str, status: PresenceStatus) -> Event {
    Event::StatusChanged(proto::StatusChanged {
        user_id: user_id.to_string(),
        status: status.as_str().to_string(),
    })
}

/// Set a user's status and broadcast it to every server they belong to and
/// to each friend directly.
pub fn set_user_status(
    state: &AppState,
    user_id: &str,
    status: PresenceStatus,
    server_ids: &[String],
    friend_ids: &[String],
) -> Result<PublishReport, CodecError> {
    record(state, user_id, status);

    let topics = server_ids.iter().map(|id| server_topic(id));
    let report = deliver(state, status_event(user_id, status), topics, friend_ids)?;
    tracing::debug!(
        user_id = %user_id,
        status = %status,
        delivered = report.delivered,
        "Status change published"
    );
    Ok(report)
}

/// Publish `online` to already-built server topic names. Used by session
/// bootstrap once the connection is subscribed.
pub fn announce_online(
    state: &AppState,
    user_id: &str,
    server_topics: &[String],
) -> Result<PublishReport, CodecError> {
    record(state, user_id, PresenceStatus::Online);
    deliver(
        state,
        status_event(user_id, PresenceStatus::Online),
        server_topics,
        None::<&str>,
    )
}

/// Publish `offline` at teardown and drop the user from the presence map.
///
/// Returns `Ok(None)` without publishing when the user already has a live
/// connection again, so a late teardown never overwrites a newer session.
pub fn announce_offline(
    state: &AppState,
    user_id: &str,
    server_topics: &[String],
) -> Result<Option<PublishReport>, CodecError> {
    if state.connections.is_online(user_id) {
        tracing::debug!(user_id = %user_id, "Reconnected before teardown, offline skipped");
        return Ok(None);
    }
    state.presence.remove(user_id);
    deliver(
        state,
        status_event(user_id, PresenceStatus::Offline),
        server_topics,
        None::<&str>,
    )
    .map(Some)
}

pub fn avatar_changed(
    state: &AppState,
    user_id: &str,
    avatar: &str,
    server_ids: &[String],
    friend_ids: &[String],
) -> Result<PublishReport, CodecError> {
    let event = Event::AvatarChanged(proto::AvatarChanged {
        user_id: user_id.to_string(),
        avatar: avatar.to_string(),
    });
    let topics = server_ids.iter().map(|id| server_topic(id));
    deliver(state, event, topics, friend_ids)
}

/// Current status of one user. Users absent from the map are offline.
pub fn status_of(state: &AppState, user_id: &str) -> PresenceStatus {
    state
        .presence
        .get(user_id)
        .map(|entry| entry.status)
        .unwrap_or(PresenceStatus::Offline)
}

/// Current presence for all tracked users.
pub fn snapshot(state: &AppState) -> Vec<PresenceInfo> {
    state
        .presence
        .iter()
        .map(|entry| entry.value().clone())
        .collect()
}
