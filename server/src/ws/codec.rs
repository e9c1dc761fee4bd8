//! Envelope encode/decode: protobuf structure, then zlib compression.
//!
//! A publish encodes once and hands the same [`Bytes`] to every recipient,
//! so the compression cost is paid per event, not per subscriber.

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use prost::Message as ProstMessage;
use std::io::{Read, Write};

use crate::proto::{Envelope, Event};

/// Errors that can occur while encoding or decoding an envelope.
#[derive(Debug)]
pub enum CodecError {
    /// Envelope carries no event (nothing to deliver)
    EmptyEnvelope,
    /// Failed to encode protobuf
    Encode(String),
    /// Compression or decompression failed
    Compression(String),
    /// Inflated frame exceeds the configured limit
    TooLarge(usize),
    /// Failed to decode protobuf
    Decode(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyEnvelope => write!(f, "Envelope has no event"),
            Self::Encode(e) => write!(f, "Encode error: {}", e),
            Self::Compression(e) => write!(f, "Compression error: {}", e),
            Self::TooLarge(limit) => write!(f, "Frame exceeds {} bytes once inflated", limit),
            Self::Decode(e) => write!(f, "Decode error: {}", e),
        }
    }
}

impl std::error::Error for CodecError {}

/// Encode an envelope into a compressed wire frame.
pub fn encode(envelope: &Envelope) -> Result<Bytes, CodecError> {
    if envelope.event.is_none() {
        return Err(CodecError::EmptyEnvelope);
    }

    let mut buf = Vec::with_capacity(envelope.encoded_len());
    envelope
        .encode(&mut buf)
        .map_err(|e| CodecError::Encode(e.to_string()))?;

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(buf.len()), Compression::fast());
    encoder
        .write_all(&buf)
        .map_err(|e| CodecError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CodecError::Compression(e.to_string()))?;

    Ok(Bytes::from(compressed))
}

/// Encode a server-originated event.
pub fn encode_event(event: Event) -> Result<Bytes, CodecError> {
    encode(&Envelope::from_event(event))
}

/// Decode a compressed wire frame. Inflated output is capped at `max_len` bytes.
pub fn decode(data: &[u8], max_len: usize) -> Result<Envelope, CodecError> {
    let mut inflated = Vec::new();
    // Read one byte past the limit so an oversized frame is detectable.
    ZlibDecoder::new(data)
        .take(max_len as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| CodecError::Compression(e.to_string()))?;
    if inflated.len() > max_len {
        return Err(CodecError::TooLarge(max_len));
    }

    let envelope =
        Envelope::decode(inflated.as_slice()).map_err(|e| CodecError::Decode(e.to_string()))?;
    if envelope.event.is_none() {
        return Err(CodecError::EmptyEnvelope);
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::*;

    const MAX: usize = 64 * 1024;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            username: format!("{}_name", id),
            display_name: id.to_uppercase(),
            avatar: format!("avatars/{}.webp", id),
            status: "online".to_string(),
        }
    }

    /// One populated sample per kind; the match keeps this list exhaustive.
    fn sample(kind: EventKind) -> Event {
        match kind {
            EventKind::MessageCreated => Event::MessageCreated(ChatMessage {
                id: "m1".into(),
                author: Some(user("u1")),
                channel_id: "c1".into(),
                server_id: "s1".into(),
                content: "hello".into(),
                edited: false,
                images: vec!["img/1.png".into()],
                mentions: vec!["u2".into()],
                reply: Some(Reply {
                    id: "m0".into(),
                    author: Some(user("u2")),
                    content: "hi".into(),
                }),
                private_message: false,
                created_at: "2024-05-01T10:00:00Z".into(),
                updated_at: String::new(),
            }),
            EventKind::MessageEdited => Event::MessageEdited(MessageEdited {
                message_id: "m1".into(),
                channel_id: "c1".into(),
                content: "hello again".into(),
                mentions: vec![],
                updated_at: "2024-05-01T10:01:00Z".into(),
                private_message: false,
                author_id: "u1".into(),
            }),
            EventKind::MessageDeleted => Event::MessageDeleted(MessageDeleted {
                message_id: "m1".into(),
                channel_id: "c1".into(),
                author_id: "u1".into(),
                private_message: true,
            }),
            EventKind::Typing => Event::Typing(Typing {
                user_id: "u1".into(),
                display_name: "U1".into(),
                channel_id: "c1".into(),
                typing: true,
                timestamp: 1_714_557_600_000,
            }),
            EventKind::ChannelCreated => Event::ChannelCreated(ChannelCreated {
                server_id: "s1".into(),
                category_name: "general".into(),
                channel: Some(Channel {
                    id: "c2".into(),
                    name: "random".into(),
                    kind: "textuel".into(),
                    private: true,
                    created_at: "2024-05-01T10:00:00Z".into(),
                }),
            }),
            EventKind::ChannelDeleted => Event::ChannelDeleted(ChannelDeleted {
                server_id: "s1".into(),
                category_name: "general".into(),
                channel_id: "c2".into(),
            }),
            EventKind::CategoryCreated => Event::CategoryCreated(CategoryCreated {
                server_id: "s1".into(),
                name: "voice".into(),
            }),
            EventKind::CategoryDeleted => Event::CategoryDeleted(CategoryDeleted {
                server_id: "s1".into(),
                name: "voice".into(),
            }),
            EventKind::ServerJoined => Event::ServerJoined(ServerJoined {
                server_id: "s1".into(),
                user: Some(user("u3")),
            }),
            EventKind::ServerLeft => Event::ServerLeft(ServerLeft {
                server_id: "s1".into(),
                user_id: "u3".into(),
            }),
            EventKind::ServerDeleted => Event::ServerDeleted(ServerDeleted {
                server_id: "s1".into(),
            }),
            EventKind::FriendRequest => Event::FriendRequest(FriendRequest {
                id: "n1".into(),
                request_id: "r1".into(),
                initiator_id: "u1".into(),
                user_id: "u2".into(),
                message: "wants to be your friend".into(),
                created_at: "2024-05-01T10:00:00Z".into(),
            }),
            EventKind::FriendAccepted => Event::FriendAccepted(FriendAccepted {
                request_id: "r1".into(),
                friend: Some(user("u2")),
            }),
            EventKind::FriendRemoved => Event::FriendRemoved(FriendRemoved {
                user_id: "u1".into(),
                friend_id: "u2".into(),
            }),
            EventKind::StatusChanged => Event::StatusChanged(StatusChanged {
                user_id: "u1".into(),
                status: "dnd".into(),
            }),
            EventKind::AvatarChanged => Event::AvatarChanged(AvatarChanged {
                user_id: "u1".into(),
                avatar: "avatars/new.webp".into(),
            }),
            EventKind::ServerIconChanged => Event::ServerIconChanged(ServerIconChanged {
                server_id: "s1".into(),
                icon: "icons/s1.webp".into(),
            }),
            EventKind::Notification => Event::Notification(Notification {
                id: "n2".into(),
                kind: "new_message".into(),
                user_id: "u2".into(),
                channel_id: "channels:c1".into(),
                server_id: "s1".into(),
                mentions: vec!["u2".into()],
                counter: 3,
                read: false,
            }),
        }
    }

    #[test]
    fn test_every_kind_survives_encode_decode() {
        for kind in EventKind::ALL {
            let event = sample(kind);
            assert_eq!(event.kind(), kind);

            let bytes = encode_event(event.clone()).expect("encode");
            let decoded = decode(&bytes, MAX).expect("decode");

            assert_eq!(decoded.kind(), Some(kind), "kind mismatch for {}", kind);
            assert_eq!(decoded.event, Some(event), "payload mismatch for {}", kind);
        }
    }

    #[test]
    fn test_kind_tags_are_unique_and_parse_back() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_str("text_message"), None);
        assert!(EventKind::Typing.is_client_relayable());
        assert!(!EventKind::MessageCreated.is_client_relayable());
    }

    #[test]
    fn test_client_topic_is_carried() {
        let envelope = Envelope {
            topic: "channels:42".into(),
            event: Some(sample(EventKind::Typing)),
        };
        let decoded = decode(&encode(&envelope).unwrap(), MAX).unwrap();
        assert_eq!(decoded.topic, "channels:42");
    }

    #[test]
    fn test_empty_envelope_is_rejected_both_ways() {
        let empty = Envelope::default();
        assert!(matches!(encode(&empty), Err(CodecError::EmptyEnvelope)));

        // Hand-compress an empty protobuf body to reach the decode-side check.
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&empty.encode_to_vec()).unwrap();
        let frame = encoder.finish().unwrap();
        assert!(matches!(decode(&frame, MAX), Err(CodecError::EmptyEnvelope)));
    }

    #[test]
    fn test_garbage_and_uncompressed_frames_fail() {
        assert!(matches!(
            decode(b"heartbeat", MAX),
            Err(CodecError::Compression(_))
        ));

        let raw = Envelope::from_event(sample(EventKind::ServerDeleted)).encode_to_vec();
        assert!(decode(&raw, MAX).is_err());
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let event = Event::MessageCreated(ChatMessage {
            content: "x".repeat(10_000),
            ..Default::default()
        });
        let bytes = encode_event(event).unwrap();
        assert!(matches!(decode(&bytes, 1024), Err(CodecError::TooLarge(1024))));
        assert!(decode(&bytes, 20_000).is_ok());
    }
}
