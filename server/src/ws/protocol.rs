//! Inbound frame handling for an authenticated connection.

use std::sync::Arc;

use crate::proto::{Envelope, Event};
use crate::state::AppState;
use crate::ws::codec;
use crate::ws::connection::{Connection, HEARTBEAT};
use crate::ws::topics::PublishReport;

/// Why an inbound envelope was not relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayRejection {
    /// Frame failed to inflate or decode
    Malformed(String),
    /// Envelope did not name a topic
    MissingTopic,
    /// Kind is server-originated only
    NotRelayable(&'static str),
    /// Sender is not subscribed to the target topic
    NotSubscribed,
}

impl std::fmt::Display for RelayRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "Malformed frame: {}", e),
            Self::MissingTopic => write!(f, "Envelope has no topic"),
            Self::NotRelayable(kind) => write!(f, "Event kind {} cannot be sent by clients", kind),
            Self::NotSubscribed => write!(f, "Sender is not subscribed to topic"),
        }
    }
}

/// Handle one binary frame from the client.
///
/// Clients may only relay ephemeral signals (typing) to topics they are
/// subscribed to. Anything else is dropped and the connection stays open.
pub fn handle_frame(
    state: &AppState,
    conn: &Arc<Connection>,
    data: &[u8],
) -> Result<PublishReport, RelayRejection> {
    let result = relay(state, conn, data);
    if let Err(rejection) = &result {
        tracing::debug!(
            user_id = %conn.user_id(),
            subscriber_id = conn.subscriber_id(),
            reason = %rejection,
            "Dropped inbound frame"
        );
    }
    result
}

fn relay(
    state: &AppState,
    conn: &Arc<Connection>,
    data: &[u8],
) -> Result<PublishReport, RelayRejection> {
    let Envelope { topic, event } = codec::decode(data, state.gateway.max_frame_bytes)
        .map_err(|e| RelayRejection::Malformed(e.to_string()))?;
    // decode() guarantees an event.
    let event = event.ok_or_else(|| RelayRejection::Malformed("no event".into()))?;

    if topic.is_empty() {
        return Err(RelayRejection::MissingTopic);
    }
    let kind = event.kind();
    if !kind.is_client_relayable() {
        return Err(RelayRejection::NotRelayable(kind.as_str()));
    }
    // Never trust the sender id a client writes into its own signal.
    let event = match event {
        Event::Typing(mut typing) => {
            typing.user_id = conn.user_id().to_string();
            Event::Typing(typing)
        }
        other => other,
    };
    if !state.topics.is_subscribed(&topic, conn) {
        return Err(RelayRejection::NotSubscribed);
    }

    state
        .topics
        .publish_event(&topic, event)
        .map_err(|e| RelayRejection::Malformed(e.to_string()))
}

/// Handle one text frame. Returns true if it was a heartbeat.
pub fn handle_text(conn: &Connection, text: &str) -> bool {
    if text != HEARTBEAT {
        tracing::debug!(
            user_id = %conn.user_id(),
            "Ignoring unexpected text frame: {}",
            text.chars().take(100).collect::<String>()
        );
        return false;
    }
    conn.touch();
    if let Err(e) = conn.send_heartbeat() {
        tracing::debug!(user_id = %conn.user_id(), error = %e, "Heartbeat reply dropped");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{self, EventKind};
    use crate::state::test_support::{connect, drain_events, state_with_store};
    use crate::store::MemoryTopicStore;
    use crate::ws::topics::channel_topic;
    use axum::extract::ws::Message;

    fn typing_frame(topic: &str, claimed_user: &str) -> bytes::Bytes {
        codec::encode(&Envelope {
            topic: topic.into(),
            event: Some(Event::Typing(proto::Typing {
                user_id: claimed_user.into(),
                display_name: "Someone".into(),
                channel_id: "42".into(),
                typing: true,
                timestamp: 1,
            })),
        })
        .unwrap()
    }

    #[test]
    fn test_typing_is_relayed_with_authenticated_user() {
        let state = state_with_store(MemoryTopicStore::new());
        let (sender, _srx) = connect(&state, "alice");
        let (peer, mut prx) = connect(&state, "bob");
        let topic = channel_topic("42");
        state.topics.subscribe(&topic, &sender);
        state.topics.subscribe(&topic, &peer);

        let report = handle_frame(&state, &sender, &typing_frame(&topic, "mallory")).unwrap();
        assert_eq!(report.delivered, 2);

        match &drain_events(&mut prx)[..] {
            [Event::Typing(t)] => assert_eq!(t.user_id, "alice"),
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_rejections_leave_topic_untouched() {
        let state = state_with_store(MemoryTopicStore::new());
        let (sender, _srx) = connect(&state, "alice");
        let (peer, mut prx) = connect(&state, "bob");
        let topic = channel_topic("42");
        state.topics.subscribe(&topic, &peer);

        assert_eq!(
            handle_frame(&state, &sender, &typing_frame(&topic, "alice")),
            Err(RelayRejection::NotSubscribed)
        );

        state.topics.subscribe(&topic, &sender);
        assert_eq!(
            handle_frame(&state, &sender, &typing_frame("", "alice")),
            Err(RelayRejection::MissingTopic)
        );

        let forged = codec::encode(&Envelope {
            topic: topic.clone(),
            event: Some(Event::ServerDeleted(proto::ServerDeleted {
                server_id: "s1".into(),
            })),
        })
        .unwrap();
        assert_eq!(
            handle_frame(&state, &sender, &forged),
            Err(RelayRejection::NotRelayable(EventKind::ServerDeleted.as_str()))
        );

        assert!(matches!(
            handle_frame(&state, &sender, b"not zlib"),
            Err(RelayRejection::Malformed(_))
        ));
        assert!(drain_events(&mut prx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_extends_deadline_and_replies() {
        let state = state_with_store(MemoryTopicStore::new());
        let (conn, mut rx) = connect(&state, "alice");
        let before = conn.deadline();

        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        assert!(handle_text(&conn, HEARTBEAT));
        assert!(conn.deadline() > before);
        assert!(matches!(rx.try_recv(), Ok(Message::Text(t)) if t.as_str() == HEARTBEAT));

        assert!(!handle_text(&conn, "hello"));
        assert!(rx.try_recv().is_err());
    }
}
