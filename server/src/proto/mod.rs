// Generated protobuf types from shared/proto/gateway.proto via prost-build
// Package `gateway` -> proto::gateway, re-exported at this level.

pub mod gateway {
    include!(concat!(env!("OUT_DIR"), "/gateway.rs"));
}

pub use gateway::*;

pub use envelope::Event;

/// Discriminant of an [`Event`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageCreated,
    MessageEdited,
    MessageDeleted,
    Typing,
    ChannelCreated,
    ChannelDeleted,
    CategoryCreated,
    CategoryDeleted,
    ServerJoined,
    ServerLeft,
    ServerDeleted,
    FriendRequest,
    FriendAccepted,
    FriendRemoved,
    StatusChanged,
    AvatarChanged,
    ServerIconChanged,
    Notification,
}

impl EventKind {
    pub const ALL: [EventKind; 18] = [
        EventKind::MessageCreated,
        EventKind::MessageEdited,
        EventKind::MessageDeleted,
        EventKind::Typing,
        EventKind::ChannelCreated,
        EventKind::ChannelDeleted,
        EventKind::CategoryCreated,
        EventKind::CategoryDeleted,
        EventKind::ServerJoined,
        EventKind::ServerLeft,
        EventKind::ServerDeleted,
        EventKind::FriendRequest,
        EventKind::FriendAccepted,
        EventKind::FriendRemoved,
        EventKind::StatusChanged,
        EventKind::AvatarChanged,
        EventKind::ServerIconChanged,
        EventKind::Notification,
    ];

    /// Stable string tag, as clients see it in their event dispatch tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageCreated => "new_message",
            Self::MessageEdited => "edit_message",
            Self::MessageDeleted => "delete_message",
            Self::Typing => "typing",
            Self::ChannelCreated => "create_channel",
            Self::ChannelDeleted => "delete_channel",
            Self::CategoryCreated => "create_category",
            Self::CategoryDeleted => "delete_category",
            Self::ServerJoined => "join_server",
            Self::ServerLeft => "leave_server",
            Self::ServerDeleted => "delete_server",
            Self::FriendRequest => "friend_request",
            Self::FriendAccepted => "friend_accept",
            Self::FriendRemoved => "friend_remove",
            Self::StatusChanged => "change_status",
            Self::AvatarChanged => "new_avatar",
            Self::ServerIconChanged => "new_server_icon",
            Self::Notification => "new_notification",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }

    /// Kinds a client is allowed to relay to a topic through its own socket.
    pub fn is_client_relayable(&self) -> bool {
        matches!(self, Self::Typing)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MessageCreated(_) => EventKind::MessageCreated,
            Event::MessageEdited(_) => EventKind::MessageEdited,
            Event::MessageDeleted(_) => EventKind::MessageDeleted,
            Event::Typing(_) => EventKind::Typing,
            Event::ChannelCreated(_) => EventKind::ChannelCreated,
            Event::ChannelDeleted(_) => EventKind::ChannelDeleted,
            Event::CategoryCreated(_) => EventKind::CategoryCreated,
            Event::CategoryDeleted(_) => EventKind::CategoryDeleted,
            Event::ServerJoined(_) => EventKind::ServerJoined,
            Event::ServerLeft(_) => EventKind::ServerLeft,
            Event::ServerDeleted(_) => EventKind::ServerDeleted,
            Event::FriendRequest(_) => EventKind::FriendRequest,
            Event::FriendAccepted(_) => EventKind::FriendAccepted,
            Event::FriendRemoved(_) => EventKind::FriendRemoved,
            Event::StatusChanged(_) => EventKind::StatusChanged,
            Event::AvatarChanged(_) => EventKind::AvatarChanged,
            Event::ServerIconChanged(_) => EventKind::ServerIconChanged,
            Event::Notification(_) => EventKind::Notification,
        }
    }
}

impl Envelope {
    /// Server-originated envelope carrying `event`.
    pub fn from_event(event: Event) -> Self {
        Self {
            topic: String::new(),
            event: Some(event),
        }
    }

    pub fn kind(&self) -> Option<EventKind> {
        self.event.as_ref().map(Event::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    /// First key byte of an encoded envelope: (field number << 3) | wire type 2.
    fn leading_key(envelope: &Envelope) -> u8 {
        envelope.encode_to_vec()[0]
    }

    #[test]
    fn test_schema_tags_are_stable() {
        let typing = Envelope::from_event(Event::Typing(Typing {
            user_id: "u1".into(),
            ..Default::default()
        }));
        assert_eq!(leading_key(&typing), (5 << 3) | 2);

        let deleted = Envelope::from_event(Event::ServerDeleted(ServerDeleted {
            server_id: "s1".into(),
        }));
        assert_eq!(leading_key(&deleted), (12 << 3) | 2);

        let relayed = Envelope {
            topic: "channels:42".into(),
            event: Some(Event::ServerDeleted(ServerDeleted::default())),
        };
        assert_eq!(leading_key(&relayed), (1 << 3) | 2);
    }
}
