//! Publishers for application events.
//! Request handlers that already hold the data call these; each call encodes
//! its envelope once and delivers it to topics and/or specific users.

use crate::proto::{self, Event};
use crate::state::AppState;
use crate::ws::codec::{self, CodecError};
use crate::ws::topics::{channel_topic, server_topic, PublishReport};

/// Encode `event` once, publish it to every topic, then send it directly to
/// every listed user that is online.
pub fn deliver<T, U>(
    state: &AppState,
    event: Event,
    topics: T,
    users: U,
) -> Result<PublishReport, CodecError>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
    U: IntoIterator,
    U::Item: AsRef<str>,
{
    let kind = event.kind();
    let frame = codec::encode_event(event).map_err(|e| {
        tracing::error!(kind = %kind, error = %e, "Failed to encode event");
        e
    })?;

    let mut report = PublishReport::default();
    for topic in topics {
        let r = state.topics.publish(topic.as_ref(), frame.clone());
        report.delivered += r.delivered;
        report.failed += r.failed;
    }
    for user_id in users {
        if state.connections.send_to_user(user_id.as_ref(), frame.clone()) {
            report.delivered += 1;
        }
    }
    Ok(report)
}

/// Publish to a single topic.
pub fn publish_to_topic(
    state: &AppState,
    topic: &str,
    event: Event,
) -> Result<PublishReport, CodecError> {
    deliver(state, event, [topic], None::<&str>)
}

/// Send to a single user's live connection, if any.
pub fn send_to_user(
    state: &AppState,
    user_id: &str,
    event: Event,
) -> Result<PublishReport, CodecError> {
    deliver(state, event, None::<&str>, [user_id])
}

/// DM traffic goes to the author and the partner directly; channel traffic
/// goes to the channel topic.
fn message_route<'a>(
    private_message: bool,
    channel_id: &'a str,
    author_id: &'a str,
) -> (Option<String>, Vec<&'a str>) {
    if private_message {
        (None, vec![author_id, channel_id])
    } else {
        (Some(channel_topic(channel_id)), Vec::new())
    }
}

pub fn message_created(
    state: &AppState,
    message: proto::ChatMessage,
) -> Result<PublishReport, CodecError> {
    let author_id = message
        .author
        .as_ref()
        .map(|a| a.id.clone())
        .unwrap_or_default();
    let channel_id = message.channel_id.clone();
    let (topic, users) = message_route(message.private_message, &channel_id, &author_id);
    deliver(state, Event::MessageCreated(message), topic, users)
}

pub fn message_edited(
    state: &AppState,
    event: proto::MessageEdited,
) -> Result<PublishReport, CodecError> {
    let channel_id = event.channel_id.clone();
    let author_id = event.author_id.clone();
    let (topic, users) = message_route(event.private_message, &channel_id, &author_id);
    deliver(state, Event::MessageEdited(event), topic, users)
}

pub fn message_deleted(
    state: &AppState,
    event: proto::MessageDeleted,
) -> Result<PublishReport, CodecError> {
    let channel_id = event.channel_id.clone();
    let author_id = event.author_id.clone();
    let (topic, users) = message_route(event.private_message, &channel_id, &author_id);
    deliver(state, Event::MessageDeleted(event), topic, users)
}

/// Public channel announcement. For private channels call
/// [`crate::chat::membership::channel_members_added`] first so the members
/// are subscribed before the event goes out.
pub fn channel_created(
    state: &AppState,
    event: proto::ChannelCreated,
) -> Result<PublishReport, CodecError> {
    let topic = server_topic(&event.server_id);
    publish_to_topic(state, &topic, Event::ChannelCreated(event))
}

pub fn channel_deleted(
    state: &AppState,
    event: proto::ChannelDeleted,
) -> Result<PublishReport, CodecError> {
    let topic = server_topic(&event.server_id);
    publish_to_topic(state, &topic, Event::ChannelDeleted(event))
}

pub fn category_created(
    state: &AppState,
    event: proto::CategoryCreated,
) -> Result<PublishReport, CodecError> {
    let topic = server_topic(&event.server_id);
    publish_to_topic(state, &topic, Event::CategoryCreated(event))
}

pub fn category_deleted(
    state: &AppState,
    event: proto::CategoryDeleted,
) -> Result<PublishReport, CodecError> {
    let topic = server_topic(&event.server_id);
    publish_to_topic(state, &topic, Event::CategoryDeleted(event))
}

pub fn server_deleted(state: &AppState, server_id: &str) -> Result<PublishReport, CodecError> {
    publish_to_topic(
        state,
        &server_topic(server_id),
        Event::ServerDeleted(proto::ServerDeleted {
            server_id: server_id.to_string(),
        }),
    )
}

pub fn server_icon_changed(
    state: &AppState,
    server_id: &str,
    icon: &str,
) -> Result<PublishReport, CodecError> {
    publish_to_topic(
        state,
        &server_topic(server_id),
        Event::ServerIconChanged(proto::ServerIconChanged {
            server_id: server_id.to_string(),
            icon: icon.to_string(),
        }),
    )
}

/// Notification for one user (unread counters, mentions).
pub fn notify_user(
    state: &AppState,
    notification: proto::Notification,
) -> Result<PublishReport, CodecError> {
    let user_id = notification.user_id.clone();
    send_to_user(state, &user_id, Event::Notification(notification))
}

/// Delivered to the user the request is addressed to.
pub fn friend_request(
    state: &AppState,
    request: proto::FriendRequest,
) -> Result<PublishReport, CodecError> {
    let user_id = request.user_id.clone();
    send_to_user(state, &user_id, Event::FriendRequest(request))
}

/// Delivered to `to_user_id`; `event.friend` is the other side.
pub fn friend_accepted(
    state: &AppState,
    to_user_id: &str,
    event: proto::FriendAccepted,
) -> Result<PublishReport, CodecError> {
    send_to_user(state, to_user_id, Event::FriendAccepted(event))
}

/// Delivered to the removed friend.
pub fn friend_removed(
    state: &AppState,
    event: proto::FriendRemoved,
) -> Result<PublishReport, CodecError> {
    let friend_id = event.friend_id.clone();
    send_to_user(state, &friend_id, Event::FriendRemoved(event))
}
