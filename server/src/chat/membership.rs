//! Live subscription changes when membership changes mid-session.
//!
//! The topic store only feeds bootstrap; a user who joins a server while
//! connected needs their current connection subscribed here, before the
//! announcement goes out, so they receive it too.

use crate::chat::broadcast::publish_to_topic;
use crate::proto::{self, Event};
use crate::state::AppState;
use crate::ws::codec::CodecError;
use crate::ws::topics::{channel_topic, server_topic, PublishReport};

/// Subscribe the user's live connection (if any) to a server and its
/// channels. Returns `false` when the user is offline.
pub fn subscribe_to_server(
    state: &AppState,
    user_id: &str,
    server_id: &str,
    channel_ids: &[String],
) -> bool {
    let Some(conn) = state.connections.lookup(user_id) else {
        return false;
    };
    state.topics.subscribe(&server_topic(server_id), &conn);
    for channel_id in channel_ids {
        state.topics.subscribe(&channel_topic(channel_id), &conn);
    }
    true
}

/// A user joined a server: subscribe, then announce to the server.
pub fn join_server(
    state: &AppState,
    user: proto::User,
    server_id: &str,
    channel_ids: &[String],
) -> Result<PublishReport, CodecError> {
    let online = subscribe_to_server(state, &user.id, server_id, channel_ids);
    tracing::info!(
        user_id = %user.id,
        server_id = %server_id,
        online,
        "User joined server"
    );
    publish_to_topic(
        state,
        &server_topic(server_id),
        Event::ServerJoined(proto::ServerJoined {
            server_id: server_id.to_string(),
            user: Some(user),
        }),
    )
}

/// A user left a server: announce first so they see it too, then drop their
/// subscriptions to the server and its channels.
pub fn leave_server(
    state: &AppState,
    user_id: &str,
    server_id: &str,
    channel_ids: &[String],
) -> Result<PublishReport, CodecError> {
    let report = publish_to_topic(
        state,
        &server_topic(server_id),
        Event::ServerLeft(proto::ServerLeft {
            server_id: server_id.to_string(),
            user_id: user_id.to_string(),
        }),
    )?;

    if let Some(conn) = state.connections.lookup(user_id) {
        state.topics.unsubscribe(&server_topic(server_id), &conn);
        for channel_id in channel_ids {
            state.topics.unsubscribe(&channel_topic(channel_id), &conn);
        }
    }
    tracing::info!(user_id = %user_id, server_id = %server_id, "User left server");
    Ok(report)
}

/// Subscribe the online members among `user_ids` to a channel. Returns how
/// many connections were subscribed.
pub fn channel_members_added(state: &AppState, channel_id: &str, user_ids: &[String]) -> usize {
    let topic = channel_topic(channel_id);
    user_ids
        .iter()
        .filter_map(|user_id| state.connections.lookup(user_id))
        .filter(|conn| state.topics.subscribe(&topic, conn))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::broadcast;
    use crate::state::test_support::{connect, drain_events, state_with_store};
    use crate::store::MemoryTopicStore;

    fn user(id: &str) -> proto::User {
        proto::User {
            id: id.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_joining_user_receives_own_announcement_and_channel_traffic() {
        let state = state_with_store(MemoryTopicStore::new());
        let (owner, mut owner_rx) = connect(&state, "owner");
        let (joiner, mut joiner_rx) = connect(&state, "joiner");
        state.topics.subscribe(&server_topic("s1"), &owner);

        let report = join_server(&state, user("joiner"), "s1", &["c1".to_string()]).unwrap();
        assert_eq!(report.delivered, 2);
        assert!(state.topics.is_subscribed(&channel_topic("c1"), &joiner));

        assert!(matches!(drain_events(&mut owner_rx)[..], [Event::ServerJoined(_)]));
        assert!(matches!(drain_events(&mut joiner_rx)[..], [Event::ServerJoined(_)]));
    }

    #[test]
    fn test_join_while_offline_still_announces() {
        let state = state_with_store(MemoryTopicStore::new());
        let (owner, mut owner_rx) = connect(&state, "owner");
        state.topics.subscribe(&server_topic("s1"), &owner);

        let report = join_server(&state, user("away"), "s1", &[]).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(drain_events(&mut owner_rx).len(), 1);
    }

    #[test]
    fn test_leaving_user_sees_announcement_then_nothing_more() {
        let state = state_with_store(MemoryTopicStore::new());
        let (leaver, mut rx) = connect(&state, "leaver");
        subscribe_to_server(&state, "leaver", "s1", &["c1".to_string()]);

        leave_server(&state, "leaver", "s1", &["c1".to_string()]).unwrap();
        assert!(matches!(drain_events(&mut rx)[..], [Event::ServerLeft(_)]));
        assert!(state.topics.topics_of(&leaver).is_empty());

        broadcast::server_deleted(&state, "s1").unwrap();
        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn test_private_channel_members_subscribed_before_announcement() {
        let state = state_with_store(MemoryTopicStore::new());
        let (a, _arx) = connect(&state, "a");
        let (_b, _brx) = connect(&state, "b");

        let added = channel_members_added(
            &state,
            "secret",
            &["a".to_string(), "b".to_string(), "offline".to_string()],
        );
        assert_eq!(added, 2);
        assert!(state.topics.is_subscribed(&channel_topic("secret"), &a));
        assert_eq!(state.topics.subscriber_count(&channel_topic("secret")), 2);
    }
}
