use async_trait::async_trait;
use porch_core::types::Notification;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Events pushed to a connected client over its live channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    NewNotification(Notification),
    UnreadCount { count: i64 },
    MessageUnreadCount { count: i64 },
    Notifications(Vec<Notification>),
    Pong,
}

pub type PushSender = mpsc::UnboundedSender<PushEvent>;

/// Live association between a user and their open push channels. Injected
/// into the fanout engine so a shared-store implementation can replace the
/// in-process one without touching delivery logic.
#[async_trait]
pub trait Presence: Send + Sync {
    /// Attach a channel for a user; returns a handle for `unregister`.
    async fn register(&self, user_id: i64, sender: PushSender) -> Uuid;

    /// Detach one channel. Other channels of the same user stay live.
    async fn unregister(&self, user_id: i64, connection_id: Uuid);

    /// All currently live channels for a user; empty when offline.
    async fn lookup(&self, user_id: i64) -> Vec<PushSender>;
}

/// Single-process presence registry. A user may hold several concurrent
/// connections (multiple devices/tabs).
#[derive(Clone, Default)]
pub struct LocalPresence {
    connections: Arc<RwLock<HashMap<i64, Vec<(Uuid, PushSender)>>>>,
}

impl LocalPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_present(&self, user_id: i64) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    pub async fn connected_users(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[async_trait]
impl Presence for LocalPresence {
    async fn register(&self, user_id: i64, sender: PushSender) -> Uuid {
        let connection_id = Uuid::new_v4();
        let mut connections = self.connections.write().await;
        connections
            .entry(user_id)
            .or_default()
            .push((connection_id, sender));
        connection_id
    }

    async fn unregister(&self, user_id: i64, connection_id: Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(senders) = connections.get_mut(&user_id) {
            senders.retain(|(id, _)| *id != connection_id);
            if senders.is_empty() {
                connections.remove(&user_id);
            }
        }
    }

    async fn lookup(&self, user_id: i64) -> Vec<PushSender> {
        let connections = self.connections.read().await;
        connections
            .get(&user_id)
            .map(|senders| senders.iter().map(|(_, s)| s.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_lookup() {
        let presence = LocalPresence::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        presence.register(1, tx).await;

        assert!(presence.is_present(1).await);
        assert_eq!(presence.lookup(1).await.len(), 1);
        assert!(presence.lookup(2).await.is_empty());
    }

    #[tokio::test]
    async fn multiple_connections_per_user() {
        let presence = LocalPresence::new();
        for _ in 0..3 {
            let (tx, _rx) = mpsc::unbounded_channel();
            presence.register(1, tx).await;
        }

        assert_eq!(presence.lookup(1).await.len(), 3);
        assert_eq!(presence.connected_users().await, 1);
    }

    #[tokio::test]
    async fn unregister_removes_only_that_connection() {
        let presence = LocalPresence::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let first = presence.register(1, tx1).await;
        presence.register(1, tx2).await;

        presence.unregister(1, first).await;
        assert_eq!(presence.lookup(1).await.len(), 1);

        let remaining = presence.lookup(1).await;
        drop(remaining);
        assert!(presence.is_present(1).await);
    }

    #[tokio::test]
    async fn last_unregister_clears_presence() {
        let presence = LocalPresence::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = presence.register(7, tx).await;
        presence.unregister(7, id).await;

        assert!(!presence.is_present(7).await);
        assert_eq!(presence.connected_users().await, 0);
    }

    #[tokio::test]
    async fn pushed_events_arrive_on_the_channel() {
        let presence = LocalPresence::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        presence.register(1, tx).await;

        for sender in presence.lookup(1).await {
            sender.send(PushEvent::UnreadCount { count: 4 }).unwrap();
        }

        assert_eq!(rx.recv().await, Some(PushEvent::UnreadCount { count: 4 }));
    }

    #[test]
    fn push_event_wire_format() {
        let event = PushEvent::UnreadCount { count: 2 };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "unread_count");
        assert_eq!(v["data"]["count"], 2);

        let dm = serde_json::to_value(&PushEvent::MessageUnreadCount { count: 3 }).unwrap();
        assert_eq!(dm["type"], "message_unread_count");
        assert_eq!(dm["data"]["count"], 3);

        let pong = serde_json::to_value(&PushEvent::Pong).unwrap();
        assert_eq!(pong["type"], "pong");
    }
}
