use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{StoreError, TopicStore, UserTopics};

/// In-memory membership table, kept current by whoever owns membership.
///
/// Used by the standalone binary and by tests. Thread-safe via DashMap.
#[derive(Debug, Clone, Default)]
pub struct MemoryTopicStore {
    users: Arc<DashMap<String, UserTopics>>,
}

impl MemoryTopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user_topics(&self, user_id: &str, topics: UserTopics) {
        self.users.insert(user_id.to_string(), topics);
    }

    /// Record that `user_id` joined `server_id` with access to `channel_ids`.
    pub fn add_server(&self, user_id: &str, server_id: &str, channel_ids: &[String]) {
        let mut entry = self.users.entry(user_id.to_string()).or_default();
        let topics = entry.value_mut();
        if !topics.server_ids.iter().any(|id| id == server_id) {
            topics.server_ids.push(server_id.to_string());
        }
        for channel_id in channel_ids {
            if !topics.channel_ids.contains(channel_id) {
                topics.channel_ids.push(channel_id.clone());
            }
        }
    }

    /// Forget a server membership and the given channels.
    pub fn remove_server(&self, user_id: &str, server_id: &str, channel_ids: &[String]) {
        if let Some(mut entry) = self.users.get_mut(user_id) {
            let topics = entry.value_mut();
            topics.server_ids.retain(|id| id != server_id);
            topics.channel_ids.retain(|id| !channel_ids.contains(id));
        }
    }

    pub fn add_dm_thread(&self, user_id: &str, thread_id: &str) {
        let mut entry = self.users.entry(user_id.to_string()).or_default();
        let topics = entry.value_mut();
        if !topics.dm_thread_ids.iter().any(|id| id == thread_id) {
            topics.dm_thread_ids.push(thread_id.to_string());
        }
    }
}

#[async_trait]
impl TopicStore for MemoryTopicStore {
    async fn list_user_topics(&self, user_id: &str) -> Result<UserTopics, StoreError> {
        Ok(self
            .users
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
