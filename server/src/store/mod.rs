//! Membership lookup boundary.
//!
//! The gateway asks the persistence layer one question, once per connect:
//! which servers, channels and DM threads does this user belong to.

mod memory;

pub use memory::MemoryTopicStore;

use async_trait::async_trait;

use crate::ws::topics::{channel_topic, dm_topic, server_topic};

/// Everything a user should be subscribed to on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserTopics {
    pub server_ids: Vec<String>,
    pub channel_ids: Vec<String>,
    pub dm_thread_ids: Vec<String>,
}

impl UserTopics {
    pub fn server_topics(&self) -> impl Iterator<Item = String> + '_ {
        self.server_ids.iter().map(|id| server_topic(id))
    }

    /// Every topic name, servers first.
    pub fn all_topics(&self) -> Vec<String> {
        self.server_topics()
            .chain(self.channel_ids.iter().map(|id| channel_topic(id)))
            .chain(self.dm_thread_ids.iter().map(|id| dm_topic(id)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.server_ids.is_empty() && self.channel_ids.is_empty() && self.dm_thread_ids.is_empty()
    }
}

/// Errors from the membership backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not be reached or failed the query
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "Topic store unavailable: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait TopicStore: Send + Sync {
    /// Current memberships of `user_id`. Unknown users have none.
    async fn list_user_topics(&self, user_id: &str) -> Result<UserTopics, StoreError>;
}
