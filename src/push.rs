use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth:   String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint:   String,
    pub topic:      String,
    pub keys:       PushKeys,
    pub created_at: DateTime<Utc>,
}

/// Subscription store consulted when a recipient has no live transport.
/// The in-memory impl is process-lifetime only; a durable backend slots in
/// behind the same trait.
#[async_trait]
pub trait PushStore: Send + Sync {
    /// Insert or overwrite, keyed by endpoint.
    async fn upsert(&self, sub: PushSubscription);
    async fn remove(&self, endpoint: &str);
    async fn list_by_topic(&self, topic: &str) -> Vec<PushSubscription>;
    async fn list_all(&self) -> Vec<PushSubscription>;
}

#[derive(Default)]
pub struct MemoryPushStore {
    inner: RwLock<HashMap<String, PushSubscription>>,
}

#[async_trait]
impl PushStore for MemoryPushStore {
    async fn upsert(&self, mut sub: PushSubscription) {
        sub.topic = normalize_topic(&sub.topic);
        self.inner.write().await.insert(sub.endpoint.clone(), sub);
    }

    async fn remove(&self, endpoint: &str) {
        self.inner.write().await.remove(endpoint);
    }

    async fn list_by_topic(&self, topic: &str) -> Vec<PushSubscription> {
        let topic = normalize_topic(topic);
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.topic == topic)
            .cloned()
            .collect()
    }

    async fn list_all(&self) -> Vec<PushSubscription> {
        self.inner.read().await.values().cloned().collect()
    }
}

fn normalize_topic(raw: &str) -> String {
    raw.trim().to_lowercase()
}
