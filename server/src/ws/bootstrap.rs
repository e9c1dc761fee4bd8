use std::sync::Arc;

use crate::chat::presence;
use crate::state::AppState;
use crate::store::{StoreError, UserTopics};
use crate::ws::connection::Connection;

/// Subscribe a freshly admitted connection to everything its user belongs
/// to, then announce the user online to their servers.
///
/// The announcement goes out only after every subscription is in place, so
/// the user's own connection sees it as well. On a store failure nothing is
/// subscribed; the connection stays admitted and still receives direct sends.
pub async fn bootstrap(state: &AppState, conn: &Arc<Connection>) -> Result<UserTopics, StoreError> {
    let user_id = conn.user_id();
    let topics = state.store.list_user_topics(user_id).await.map_err(|e| {
        tracing::error!(user_id = %user_id, error = %e, "Failed to load user topics");
        e
    })?;

    let mut subscribed = 0;
    for topic in topics.all_topics() {
        if state.topics.subscribe(&topic, conn) {
            subscribed += 1;
        }
    }

    if state.presence_enabled && !conn.is_closing() {
        let server_topics: Vec<String> = topics.server_topics().collect();
        if let Err(e) = presence::announce_online(state, user_id, &server_topics) {
            tracing::error!(user_id = %user_id, error = %e, "Failed to announce online status");
        }
    }

    tracing::info!(
        user_id = %user_id,
        subscriber_id = conn.subscriber_id(),
        servers = topics.server_ids.len(),
        topics = subscribed,
        "Session bootstrapped"
    );
    Ok(topics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtSessionValidator;
    use crate::config::GatewayConfig;
    use crate::proto::Event;
    use crate::state::test_support::{connect, drain_events, state_with_store, SECRET};
    use crate::store::{MemoryTopicStore, TopicStore};
    use crate::ws::topics::{channel_topic, dm_topic, server_topic};
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl TopicStore for FailingStore {
        async fn list_user_topics(&self, _user_id: &str) -> Result<UserTopics, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn alice_store() -> MemoryTopicStore {
        let store = MemoryTopicStore::new();
        store.set_user_topics(
            "alice",
            UserTopics {
                server_ids: vec!["s1".into()],
                channel_ids: vec!["c1".into(), "c2".into()],
                dm_thread_ids: vec!["d1".into()],
            },
        );
        store
    }

    #[tokio::test]
    async fn test_subscribes_every_topic() {
        let state = state_with_store(alice_store());
        let (conn, _rx) = connect(&state, "alice");

        let topics = bootstrap(&state, &conn).await.unwrap();
        assert_eq!(topics.server_ids, vec!["s1".to_string()]);

        for topic in [
            server_topic("s1"),
            channel_topic("c1"),
            channel_topic("c2"),
            dm_topic("d1"),
        ] {
            assert!(state.topics.is_subscribed(&topic, &conn), "{}", topic);
        }
    }

    #[tokio::test]
    async fn test_online_status_follows_subscription() {
        let state = state_with_store(alice_store());
        let (peer, mut peer_rx) = connect(&state, "bob");
        state.topics.subscribe(&server_topic("s1"), &peer);
        let (conn, mut rx) = connect(&state, "alice");

        bootstrap(&state, &conn).await.unwrap();

        // Own connection is already subscribed when the announcement goes out.
        for rx in [&mut rx, &mut peer_rx] {
            match &drain_events(rx)[..] {
                [Event::StatusChanged(s)] => {
                    assert_eq!(s.user_id, "alice");
                    assert_eq!(s.status, "online");
                }
                other => panic!("unexpected events: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_presence_disabled_publishes_nothing() {
        let mut state = state_with_store(alice_store());
        state.presence_enabled = false;
        let (conn, mut rx) = connect(&state, "alice");

        bootstrap(&state, &conn).await.unwrap();
        assert!(drain_events(&mut rx).is_empty());
        assert!(state.presence.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_keeps_connection_admitted() {
        let state = AppState::new(
            GatewayConfig::default(),
            true,
            Arc::new(JwtSessionValidator::new(SECRET)),
            Arc::new(FailingStore),
        );
        let (conn, _rx) = connect(&state, "alice");

        assert!(matches!(
            bootstrap(&state, &conn).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(state.topics.topics_of(&conn).is_empty());
        assert!(state.connections.is_online("alice"));
    }
}
