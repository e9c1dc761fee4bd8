use dashmap::DashMap;
use std::sync::Arc;

use crate::auth::SessionValidator;
use crate::chat::presence::PresenceInfo;
use crate::config::GatewayConfig;
use crate::store::TopicStore;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::topics::TopicIndex;

/// Shared application state passed to all handlers via axum State extractor.
///
/// Built once per process (or per test server) and cloned into every task;
/// there is no global event bus.
#[derive(Clone)]
pub struct AppState {
    /// Connection and fan-out tuning
    pub gateway: GatewayConfig,
    /// Publish online/offline status on connect/disconnect
    pub presence_enabled: bool,
    /// Handshake token validation
    pub sessions: Arc<dyn SessionValidator>,
    /// Membership lookup used at bootstrap
    pub store: Arc<dyn TopicStore>,
    /// Active WebSocket connection per user
    pub connections: ConnectionRegistry,
    /// Topic subscriptions of live connections
    pub topics: TopicIndex,
    /// In-memory presence tracking: user_id -> PresenceInfo
    pub presence: Arc<DashMap<String, PresenceInfo>>,
}

impl AppState {
    pub fn new(
        gateway: GatewayConfig,
        presence_enabled: bool,
        sessions: Arc<dyn SessionValidator>,
        store: Arc<dyn TopicStore>,
    ) -> Self {
        let topics = TopicIndex::new(gateway.topic_buckets);
        Self {
            gateway,
            presence_enabled,
            sessions,
            store,
            connections: ConnectionRegistry::new(),
            topics,
            presence: Arc::new(DashMap::new()),
        }
    }
}
