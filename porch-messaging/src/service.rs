use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text, Timestamptz};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use porch_core::memberships::active_role;
use porch_core::schema::{chat_messages, direct_messages, message_reactions, users};
use porch_core::types::{
    ChatMessage, DirectMessage, MediaDescriptor, MessageKind, NotificationKind, Priority,
    RelatedRef, RelatedType, ReplySnapshot, StatKind,
};
use porch_core::{outbox, stats, AppContext, DbConnection, Error, Result};
use porch_notify::{Notifier, PushEvent};

use crate::rules;

#[derive(Debug, Deserialize)]
pub struct SendDirectMessage {
    pub receiver_id: i64,
    pub content: String,
    #[serde(default)]
    pub media: Option<MediaDescriptor>,
    #[serde(default)]
    pub reply_to: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SendGroupMessage {
    pub content: String,
    #[serde(default)]
    pub media: Option<MediaDescriptor>,
    #[serde(default)]
    pub reply_to: Option<i64>,
}

#[derive(Debug, QueryableByName, Serialize)]
pub struct ConversationSummary {
    #[diesel(sql_type = BigInt)]
    pub peer_id: i64,
    #[diesel(sql_type = Text)]
    pub peer_name: String,
    #[diesel(sql_type = Timestamptz)]
    pub last_message_at: DateTime<Utc>,
    #[diesel(sql_type = BigInt)]
    pub unread_count: i64,
}

pub struct MessagingService {
    ctx: AppContext,
    notifier: Arc<Notifier>,
}

impl MessagingService {
    pub fn new(ctx: AppContext, notifier: Arc<Notifier>) -> Self {
        Self { ctx, notifier }
    }

    // -- direct messages ----------------------------------------------------

    pub async fn send_direct(&self, sender_id: i64, req: SendDirectMessage) -> Result<DirectMessage> {
        if sender_id == req.receiver_id {
            return Err(Error::validation("cannot send a message to yourself"));
        }
        rules::validate_content(&req.content)?;

        let mut conn = self.ctx.conn().await?;
        ensure_user_exists(&mut conn, req.receiver_id).await?;

        let snapshot = match req.reply_to {
            Some(original_id) => {
                Some(self.direct_reply_snapshot(&mut conn, original_id, sender_id, req.receiver_id).await?)
            }
            None => None,
        };

        let media = req
            .media
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::validation(format!("invalid media descriptor: {}", e)))?;

        let message: DirectMessage = diesel::insert_into(direct_messages::table)
            .values((
                direct_messages::sender_id.eq(sender_id),
                direct_messages::receiver_id.eq(req.receiver_id),
                direct_messages::content.eq(&req.content),
                direct_messages::media.eq(media),
                direct_messages::reply_to_id.eq(req.reply_to),
                direct_messages::reply_snapshot
                    .eq(snapshot.map(|s| serde_json::to_value(s).unwrap_or_default())),
            ))
            .returning(DirectMessage::as_returning())
            .get_result(&mut conn)
            .await?;

        self.record_send(&mut conn, sender_id).await;

        let title = "New Message";
        let body = preview(&req.content);
        if let Err(e) = self
            .notifier
            .notify(
                req.receiver_id,
                NotificationKind::Message,
                title,
                &body,
                Some(RelatedRef {
                    related_type: RelatedType::Message,
                    related_id: message.id,
                }),
                Priority::Normal,
            )
            .await
        {
            tracing::warn!("Failed to create message notification: {}", e);
        }

        Ok(message)
    }

    /// Messages between the requester and a peer, oldest first. Marks every
    /// message addressed to the requester as read (idempotent side effect)
    /// and re-emits the requester's message unread tally over any live
    /// channels so open clients do not go stale.
    pub async fn list_direct(
        &self,
        me: i64,
        peer_id: i64,
        before: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<DirectMessage>> {
        let limit = rules::clamp_page_size(limit);
        let mut conn = self.ctx.conn().await?;

        let mut query = direct_messages::table
            .filter(
                direct_messages::sender_id
                    .eq(me)
                    .and(direct_messages::receiver_id.eq(peer_id))
                    .or(direct_messages::sender_id
                        .eq(peer_id)
                        .and(direct_messages::receiver_id.eq(me))),
            )
            .into_boxed();

        if let Some(before_id) = before {
            query = query.filter(direct_messages::id.lt(before_id));
        }

        let mut messages: Vec<DirectMessage> = query
            .order((direct_messages::created_at.desc(), direct_messages::id.desc()))
            .limit(limit)
            .select(DirectMessage::as_select())
            .load(&mut conn)
            .await?;
        messages.reverse();

        let marked = diesel::update(
            direct_messages::table
                .filter(direct_messages::sender_id.eq(peer_id))
                .filter(direct_messages::receiver_id.eq(me))
                .filter(direct_messages::is_read.eq(false)),
        )
        .set(direct_messages::is_read.eq(true))
        .execute(&mut conn)
        .await?;

        if marked > 0 {
            let count = direct_unread(&mut conn, me).await?;
            self.notifier
                .push(me, PushEvent::MessageUnreadCount { count })
                .await;
        }

        Ok(messages)
    }

    pub async fn conversations(&self, me: i64) -> Result<Vec<ConversationSummary>> {
        let mut conn = self.ctx.conn().await?;
        let summaries = diesel::sql_query(
            "SELECT c.peer_id, u.display_name AS peer_name, c.last_message_at, c.unread_count \
             FROM ( \
                 SELECT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS peer_id, \
                        MAX(created_at) AS last_message_at, \
                        COUNT(*) FILTER (WHERE receiver_id = $1 AND NOT is_read) AS unread_count \
                 FROM direct_messages \
                 WHERE sender_id = $1 OR receiver_id = $1 \
                 GROUP BY 1 \
             ) c \
             JOIN users u ON u.id = c.peer_id \
             ORDER BY c.last_message_at DESC",
        )
        .bind::<BigInt, _>(me)
        .load(&mut conn)
        .await?;
        Ok(summaries)
    }

    pub async fn unread_direct_count(&self, me: i64) -> Result<i64> {
        let mut conn = self.ctx.conn().await?;
        direct_unread(&mut conn, me).await
    }

    pub async fn edit_direct(&self, actor: i64, id: i64, new_content: &str) -> Result<DirectMessage> {
        rules::validate_content(new_content)?;
        let mut conn = self.ctx.conn().await?;

        let message: DirectMessage = direct_messages::table
            .find(id)
            .select(DirectMessage::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(Error::NotFound("message"))?;

        rules::check_edit(
            message.sender_id,
            actor,
            message.media.is_some(),
            message.created_at,
            Utc::now(),
        )?;

        let updated: DirectMessage = diesel::update(direct_messages::table.find(id))
            .set((
                direct_messages::content.eq(new_content),
                direct_messages::is_edited.eq(true),
                direct_messages::edited_at.eq(Some(Utc::now())),
            ))
            .returning(DirectMessage::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(updated)
    }

    pub async fn delete_direct(&self, actor: i64, id: i64) -> Result<()> {
        let mut conn = self.ctx.conn().await?;

        let message: DirectMessage = direct_messages::table
            .find(id)
            .select(DirectMessage::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(Error::NotFound("message"))?;

        // Deletable only by the sender, never the receiver.
        if message.sender_id != actor {
            return Err(Error::Forbidden);
        }

        self.delete_reactions(&mut conn, id, MessageKind::Dm).await?;
        diesel::delete(direct_messages::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn react_direct(&self, actor: i64, id: i64, emoji: &str) -> Result<()> {
        rules::validate_emoji(emoji)?;
        let mut conn = self.ctx.conn().await?;

        let message: DirectMessage = direct_messages::table
            .find(id)
            .select(DirectMessage::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(Error::NotFound("message"))?;

        if message.sender_id != actor && message.receiver_id != actor {
            return Err(Error::Forbidden);
        }

        self.upsert_reaction(&mut conn, rules::ReactionKey::new(id, MessageKind::Dm, actor, emoji))
            .await
    }

    // -- group messages -----------------------------------------------------

    pub async fn send_group(&self, author_id: i64, group_id: i64, req: SendGroupMessage) -> Result<ChatMessage> {
        rules::validate_content(&req.content)?;

        let mut conn = self.ctx.conn().await?;
        // Send permission is re-derived from current membership on every call.
        if active_role(&mut conn, group_id, author_id).await?.is_none() {
            return Err(Error::Forbidden);
        }

        let snapshot = match req.reply_to {
            Some(original_id) => Some(self.group_reply_snapshot(&mut conn, original_id, group_id).await?),
            None => None,
        };

        let media = req
            .media
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::validation(format!("invalid media descriptor: {}", e)))?;

        let message: ChatMessage = diesel::insert_into(chat_messages::table)
            .values((
                chat_messages::group_id.eq(group_id),
                chat_messages::author_id.eq(author_id),
                chat_messages::content.eq(&req.content),
                chat_messages::media.eq(media),
                chat_messages::reply_to_id.eq(req.reply_to),
                chat_messages::reply_snapshot
                    .eq(snapshot.map(|s| serde_json::to_value(s).unwrap_or_default())),
            ))
            .returning(ChatMessage::as_returning())
            .get_result(&mut conn)
            .await?;

        self.record_send(&mut conn, author_id).await;

        Ok(message)
    }

    pub async fn list_group(
        &self,
        me: i64,
        group_id: i64,
        before: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>> {
        let limit = rules::clamp_page_size(limit);
        let mut conn = self.ctx.conn().await?;

        // Visibility is re-derived from current membership on every call.
        if active_role(&mut conn, group_id, me).await?.is_none() {
            return Err(Error::Forbidden);
        }

        let mut query = chat_messages::table
            .filter(chat_messages::group_id.eq(group_id))
            .into_boxed();
        if let Some(before_id) = before {
            query = query.filter(chat_messages::id.lt(before_id));
        }

        let mut messages: Vec<ChatMessage> = query
            .order((chat_messages::created_at.desc(), chat_messages::id.desc()))
            .limit(limit)
            .select(ChatMessage::as_select())
            .load(&mut conn)
            .await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn edit_group(&self, actor: i64, group_id: i64, id: i64, new_content: &str) -> Result<ChatMessage> {
        rules::validate_content(new_content)?;
        let mut conn = self.ctx.conn().await?;

        let message = self.load_group_message(&mut conn, group_id, id).await?;
        rules::check_edit(
            message.author_id,
            actor,
            message.media.is_some(),
            message.created_at,
            Utc::now(),
        )?;

        let updated: ChatMessage = diesel::update(chat_messages::table.find(id))
            .set((
                chat_messages::content.eq(new_content),
                chat_messages::is_edited.eq(true),
                chat_messages::edited_at.eq(Some(Utc::now())),
            ))
            .returning(ChatMessage::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(updated)
    }

    pub async fn delete_group(&self, actor: i64, group_id: i64, id: i64) -> Result<()> {
        let mut conn = self.ctx.conn().await?;

        let message = self.load_group_message(&mut conn, group_id, id).await?;
        let actor_role = active_role(&mut conn, group_id, actor).await?;
        if !rules::can_delete_group_message(message.author_id, actor, actor_role) {
            return Err(Error::Forbidden);
        }

        self.delete_reactions(&mut conn, id, MessageKind::Group).await?;
        diesel::delete(chat_messages::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn react_group(&self, actor: i64, group_id: i64, id: i64, emoji: &str) -> Result<()> {
        rules::validate_emoji(emoji)?;
        let mut conn = self.ctx.conn().await?;

        self.load_group_message(&mut conn, group_id, id).await?;
        if active_role(&mut conn, group_id, actor).await?.is_none() {
            return Err(Error::Forbidden);
        }

        self.upsert_reaction(&mut conn, rules::ReactionKey::new(id, MessageKind::Group, actor, emoji))
            .await
    }

    // -- internals ----------------------------------------------------------

    /// Idempotent per `ReactionKey`: re-reacting refreshes recency instead of
    /// duplicating. The conflict target is exactly the key's four parts.
    async fn upsert_reaction(&self, conn: &mut DbConnection, key: rules::ReactionKey) -> Result<()> {
        diesel::insert_into(message_reactions::table)
            .values((
                message_reactions::message_id.eq(key.message_id),
                message_reactions::message_kind.eq(key.message_kind.as_str()),
                message_reactions::user_id.eq(key.user_id),
                message_reactions::emoji.eq(&key.emoji),
            ))
            .on_conflict((
                message_reactions::message_id,
                message_reactions::message_kind,
                message_reactions::user_id,
                message_reactions::emoji,
            ))
            .do_update()
            .set(message_reactions::created_at.eq(Utc::now()))
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn delete_reactions(
        &self,
        conn: &mut DbConnection,
        message_id: i64,
        kind: MessageKind,
    ) -> Result<()> {
        diesel::delete(
            message_reactions::table
                .filter(message_reactions::message_id.eq(message_id))
                .filter(message_reactions::message_kind.eq(kind.as_str())),
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn load_group_message(
        &self,
        conn: &mut DbConnection,
        group_id: i64,
        id: i64,
    ) -> Result<ChatMessage> {
        let message: Option<ChatMessage> = chat_messages::table
            .find(id)
            .filter(chat_messages::group_id.eq(group_id))
            .select(ChatMessage::as_select())
            .first(conn)
            .await
            .optional()?;
        message.ok_or(Error::NotFound("message"))
    }

    /// Snapshot of the replied-to message, captured now; later edits or
    /// deletes of the original never alter the quoted preview.
    async fn direct_reply_snapshot(
        &self,
        conn: &mut DbConnection,
        original_id: i64,
        a: i64,
        b: i64,
    ) -> Result<ReplySnapshot> {
        let original: Option<DirectMessage> = direct_messages::table
            .find(original_id)
            .select(DirectMessage::as_select())
            .first(conn)
            .await
            .optional()?;
        let original = original.ok_or(Error::NotFound("reply target"))?;

        let participants = [original.sender_id, original.receiver_id];
        if !participants.contains(&a) || !participants.contains(&b) {
            return Err(Error::validation("reply target is not in this conversation"));
        }

        Ok(ReplySnapshot {
            message_id: original.id,
            sender_id: original.sender_id,
            content: original.content,
        })
    }

    async fn group_reply_snapshot(
        &self,
        conn: &mut DbConnection,
        original_id: i64,
        group_id: i64,
    ) -> Result<ReplySnapshot> {
        let original = self.load_group_message(conn, group_id, original_id).await.map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound("reply target"),
            other => other,
        })?;
        Ok(ReplySnapshot {
            message_id: original.id,
            sender_id: original.author_id,
            content: original.content,
        })
    }

    /// Counter bump + outbox event for the badge engine. Best effort: never
    /// fails the send.
    async fn record_send(&self, conn: &mut DbConnection, sender_id: i64) {
        if let Err(e) = stats::increment(conn, sender_id, StatKind::MessagesSent).await {
            tracing::warn!("Failed to bump messages_sent for user {}: {}", sender_id, e);
        }
        if let Err(e) = outbox::enqueue(conn, outbox::MESSAGE_SENT, outbox::user_event(sender_id)).await {
            tracing::warn!("Failed to enqueue message.sent for user {}: {}", sender_id, e);
        }
    }
}

async fn direct_unread(conn: &mut DbConnection, me: i64) -> Result<i64> {
    let count = direct_messages::table
        .filter(direct_messages::receiver_id.eq(me))
        .filter(direct_messages::is_read.eq(false))
        .count()
        .get_result(conn)
        .await?;
    Ok(count)
}

async fn ensure_user_exists(conn: &mut DbConnection, user_id: i64) -> Result<()> {
    let found: Option<i64> = users::table
        .find(user_id)
        .select(users::id)
        .first(conn)
        .await
        .optional()?;
    found.map(|_| ()).ok_or(Error::NotFound("user"))
}

fn preview(content: &str) -> String {
    const MAX: usize = 80;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(MAX).collect();
        format!("{}…", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_content() {
        let short = preview("hi");
        assert_eq!(short, "hi");

        let long = "a".repeat(200);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 81);
        assert!(p.ends_with('…'));
    }

    #[test]
    fn send_direct_request_parses_with_optional_fields() {
        let req: SendDirectMessage =
            serde_json::from_str(r#"{"receiver_id": 2, "content": "hi"}"#).unwrap();
        assert_eq!(req.receiver_id, 2);
        assert!(req.media.is_none());
        assert!(req.reply_to.is_none());
    }
}
