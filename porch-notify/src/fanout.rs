use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::sync::Arc;

use porch_core::schema::notifications;
use porch_core::types::{Notification, NotificationKind, Priority, RelatedRef};
use porch_core::{AppContext, Result};

use crate::presence::{Presence, PushEvent};

/// Notification fanout engine: persist first (durability), then push live if
/// the recipient is present. Live push is an optimization, never a
/// requirement; its failures are logged and swallowed.
pub struct Notifier {
    ctx: AppContext,
    presence: Arc<dyn Presence>,
}

impl Notifier {
    pub fn new(ctx: AppContext, presence: Arc<dyn Presence>) -> Self {
        Self { ctx, presence }
    }

    pub async fn notify(
        &self,
        recipient_id: i64,
        kind: NotificationKind,
        title: &str,
        content: &str,
        related: Option<RelatedRef>,
        priority: Priority,
    ) -> Result<Notification> {
        let mut conn = self.ctx.conn().await?;

        let notification: Notification = diesel::insert_into(notifications::table)
            .values((
                notifications::recipient_id.eq(recipient_id),
                notifications::kind.eq(kind.as_str()),
                notifications::title.eq(title),
                notifications::content.eq(content),
                notifications::related_type.eq(related.map(|r| r.related_type.as_str())),
                notifications::related_id.eq(related.map(|r| r.related_id)),
                notifications::priority.eq(priority.as_str()),
            ))
            .returning(Notification::as_returning())
            .get_result(&mut conn)
            .await?;

        self.push(recipient_id, PushEvent::NewNotification(notification.clone()))
            .await;

        Ok(notification)
    }

    /// Recompute the unread tally from the store and push it to any live
    /// connections. Called after every read-state change so open clients stay
    /// numerically consistent without polling.
    pub async fn emit_unread_count(&self, user_id: i64) -> Result<()> {
        let count = self.unread_count(user_id).await?;
        self.push(user_id, PushEvent::UnreadCount { count }).await;
        Ok(())
    }

    pub async fn list(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<Notification>> {
        let mut conn = self.ctx.conn().await?;
        let rows = notifications::table
            .filter(notifications::recipient_id.eq(user_id))
            .order(notifications::created_at.desc())
            .limit(limit.clamp(1, 100))
            .offset(offset.max(0))
            .select(Notification::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    /// Marking is scoped to the recipient; a foreign id reads as absent.
    pub async fn mark_read(&self, user_id: i64, notification_id: i64) -> Result<()> {
        let mut conn = self.ctx.conn().await?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::id.eq(notification_id))
                .filter(notifications::recipient_id.eq(user_id)),
        )
        .set(notifications::is_read.eq(true))
        .execute(&mut conn)
        .await?;
        if updated == 0 {
            return Err(porch_core::Error::NotFound("notification"));
        }
        self.emit_unread_count(user_id).await
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<usize> {
        let mut conn = self.ctx.conn().await?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::recipient_id.eq(user_id))
                .filter(notifications::is_read.eq(false)),
        )
        .set(notifications::is_read.eq(true))
        .execute(&mut conn)
        .await?;
        self.emit_unread_count(user_id).await?;
        Ok(updated)
    }

    pub async fn delete(&self, user_id: i64, notification_id: i64) -> Result<()> {
        let mut conn = self.ctx.conn().await?;
        let deleted = diesel::delete(
            notifications::table
                .filter(notifications::id.eq(notification_id))
                .filter(notifications::recipient_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        if deleted == 0 {
            return Err(porch_core::Error::NotFound("notification"));
        }
        self.emit_unread_count(user_id).await
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64> {
        let mut conn = self.ctx.conn().await?;
        let count = notifications::table
            .filter(notifications::recipient_id.eq(user_id))
            .filter(notifications::is_read.eq(false))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }

    /// Best-effort delivery to every live channel of a user. A closed channel
    /// mid-send must not fail the caller.
    pub async fn push(&self, user_id: i64, event: PushEvent) {
        for sender in self.presence.lookup(user_id).await {
            if let Err(e) = sender.send(event.clone()) {
                tracing::warn!("Push to user {} failed (channel closed): {}", user_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::{LocalPresence, PushSender};
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    // Fanout's presence dependency is the trait, so an offline registry can
    // stand in without a database.
    struct NobodyHome;

    #[async_trait]
    impl Presence for NobodyHome {
        async fn register(&self, _user_id: i64, _sender: PushSender) -> Uuid {
            Uuid::new_v4()
        }
        async fn unregister(&self, _user_id: i64, _connection_id: Uuid) {}
        async fn lookup(&self, _user_id: i64) -> Vec<PushSender> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn push_to_offline_user_is_a_no_op() {
        let presence = LocalPresence::new();
        let notifier_side: Arc<dyn Presence> = Arc::new(presence.clone());

        // No registration; lookup is empty and push returns silently.
        for sender in notifier_side.lookup(42).await {
            sender.send(PushEvent::Pong).unwrap();
        }
        assert!(!presence.is_present(42).await);
    }

    #[tokio::test]
    async fn push_survives_a_closed_channel() {
        let presence = LocalPresence::new();
        let (tx, rx) = mpsc::unbounded_channel();
        presence.register(9, tx).await;
        drop(rx);

        // Sending on the closed channel errors; fanout treats it as
        // best-effort, so the same loop here must not panic.
        for sender in presence.lookup(9).await {
            let _ = sender.send(PushEvent::UnreadCount { count: 1 });
        }
    }

    #[tokio::test]
    async fn offline_registry_yields_no_channels() {
        let registry = NobodyHome;
        assert!(registry.lookup(1).await.is_empty());
    }
}
