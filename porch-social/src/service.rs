use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

use porch_core::schema::{follows, trusted_contacts, users};
use porch_core::types::{
    NotificationKind, Priority, RelatedRef, RelatedType, StatKind, TrustSource, TrustStatus,
};
use porch_core::{outbox, stats, AppContext, DbConnection, Error, Result};
use porch_notify::Notifier;

use crate::linker::{self, MergeAction, TeardownAction};

#[derive(Debug, Serialize, PartialEq)]
pub struct FollowOutcome {
    pub followed_id: i64,
    /// True when this follow completed a mutual pair and the contact link
    /// was materialized.
    pub mutual: bool,
}

pub struct SocialService {
    ctx: AppContext,
    notifier: Arc<Notifier>,
}

impl SocialService {
    pub fn new(ctx: AppContext, notifier: Arc<Notifier>) -> Self {
        Self { ctx, notifier }
    }

    pub async fn follow(&self, actor: i64, target: i64) -> Result<FollowOutcome> {
        if actor == target {
            return Err(Error::validation("cannot follow yourself"));
        }

        let mut conn = self.ctx.conn().await?;
        ensure_user_exists(&mut conn, target).await?;

        let inserted = diesel::insert_into(follows::table)
            .values((
                follows::follower_id.eq(actor),
                follows::followed_id.eq(target),
            ))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        if inserted == 0 {
            return Err(Error::Conflict("already following"));
        }

        let mutual = follow_exists(&mut conn, target, actor).await?;
        if mutual {
            self.link_pair(&mut conn, actor, target).await?;
        } else if let Err(e) = self
            .notifier
            .notify(
                target,
                NotificationKind::System,
                "New Follower",
                "You have a new follower",
                Some(RelatedRef {
                    related_type: RelatedType::User,
                    related_id: actor,
                }),
                Priority::Low,
            )
            .await
        {
            tracing::warn!("Failed to notify {} of new follower: {}", target, e);
        }

        Ok(FollowOutcome {
            followed_id: target,
            mutual,
        })
    }

    pub async fn unfollow(&self, actor: i64, target: i64) -> Result<()> {
        let mut conn = self.ctx.conn().await?;

        let deleted = diesel::delete(
            follows::table
                .filter(follows::follower_id.eq(actor))
                .filter(follows::followed_id.eq(target)),
        )
        .execute(&mut conn)
        .await?;
        if deleted == 0 {
            return Err(Error::NotFound("follow"));
        }

        // Mutuality is broken as soon as either direction disappears.
        self.unlink_pair(&mut conn, actor, target).await?;
        Ok(())
    }

    /// Manual trusted-contact request, the second producer of trust edges.
    pub async fn request_trust(&self, actor: i64, target: i64) -> Result<()> {
        if actor == target {
            return Err(Error::validation("cannot trust yourself"));
        }

        let mut conn = self.ctx.conn().await?;
        ensure_user_exists(&mut conn, target).await?;

        let outgoing = edge(&mut conn, actor, target).await?.map(|(s, _)| s);
        let incoming = edge(&mut conn, target, actor).await?.map(|(s, _)| s);
        linker::check_trust_request(outgoing, incoming)?;

        upsert_edge(&mut conn, actor, target, TrustStatus::Pending, TrustSource::Manual).await?;

        if let Err(e) = self
            .notifier
            .notify(
                target,
                NotificationKind::System,
                "Trusted Contact Request",
                "A neighbor wants to add you as a trusted contact",
                Some(RelatedRef {
                    related_type: RelatedType::User,
                    related_id: actor,
                }),
                Priority::Normal,
            )
            .await
        {
            tracing::warn!("Failed to notify {} of trust request: {}", target, e);
        }
        Ok(())
    }

    /// Accept a pending request from `requester`. Trust is symmetric once
    /// accepted, so the reciprocal edge is created too.
    pub async fn accept_trust(&self, actor: i64, requester: i64) -> Result<()> {
        let mut conn = self.ctx.conn().await?;

        match edge(&mut conn, requester, actor).await? {
            Some((TrustStatus::Pending, _)) => {}
            _ => return Err(Error::NotFound("trust request")),
        }

        diesel::update(
            trusted_contacts::table
                .filter(trusted_contacts::user_id.eq(requester))
                .filter(trusted_contacts::trusted_user_id.eq(actor)),
        )
        .set((
            trusted_contacts::status.eq(TrustStatus::Accepted.as_str()),
            trusted_contacts::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await?;

        // The reciprocal edge may not exist yet, or may be a pending request
        // of its own; a manual block on it wins and is left alone.
        match edge(&mut conn, actor, requester).await? {
            Some((TrustStatus::Blocked, _)) => {}
            _ => {
                upsert_edge(&mut conn, actor, requester, TrustStatus::Accepted, TrustSource::Manual)
                    .await?;
            }
        }

        self.after_accept(&mut conn, actor, requester).await;

        if let Err(e) = self
            .notifier
            .notify(
                requester,
                NotificationKind::System,
                "New Trusted Contact",
                "Your trusted contact request was accepted",
                Some(RelatedRef {
                    related_type: RelatedType::User,
                    related_id: actor,
                }),
                Priority::Normal,
            )
            .await
        {
            tracing::warn!("Failed to notify {} of accepted trust: {}", requester, e);
        }
        Ok(())
    }

    pub async fn reject_trust(&self, actor: i64, requester: i64) -> Result<()> {
        let mut conn = self.ctx.conn().await?;

        let deleted = diesel::delete(
            trusted_contacts::table
                .filter(trusted_contacts::user_id.eq(requester))
                .filter(trusted_contacts::trusted_user_id.eq(actor))
                .filter(trusted_contacts::status.eq(TrustStatus::Pending.as_str())),
        )
        .execute(&mut conn)
        .await?;
        if deleted == 0 {
            return Err(Error::NotFound("trust request"));
        }
        Ok(())
    }

    /// A block replaces whatever edge the actor had toward the target and is
    /// never touched by the follow linker afterwards.
    pub async fn block_trust(&self, actor: i64, target: i64) -> Result<()> {
        if actor == target {
            return Err(Error::validation("cannot block yourself"));
        }

        let mut conn = self.ctx.conn().await?;
        ensure_user_exists(&mut conn, target).await?;
        upsert_edge(&mut conn, actor, target, TrustStatus::Blocked, TrustSource::Manual).await?;
        self.refresh_contact_stat(&mut conn, actor).await;
        Ok(())
    }

    // -- linker -------------------------------------------------------------

    /// Both directed edges become `accepted` per the merge table. The
    /// distinguished contact notification goes out only when the relink
    /// actually changed an edge; re-following an already-linked pair is
    /// silent.
    async fn link_pair(&self, conn: &mut DbConnection, a: i64, b: i64) -> Result<()> {
        let forward = linker::merge_on_mutual(edge(conn, a, b).await?);
        let reverse = linker::merge_on_mutual(edge(conn, b, a).await?);

        for ((from, to), action) in [((a, b), forward), ((b, a), reverse)] {
            match action {
                MergeAction::Insert => {
                    upsert_edge(conn, from, to, TrustStatus::Accepted, TrustSource::Follow).await?;
                }
                MergeAction::Upgrade => {
                    diesel::update(
                        trusted_contacts::table
                            .filter(trusted_contacts::user_id.eq(from))
                            .filter(trusted_contacts::trusted_user_id.eq(to)),
                    )
                    .set((
                        trusted_contacts::status.eq(TrustStatus::Accepted.as_str()),
                        trusted_contacts::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;
                }
                MergeAction::Leave => {}
            }
        }

        if !linker::pair_newly_linked(forward, reverse) {
            return Ok(());
        }

        self.after_accept(conn, a, b).await;

        for (recipient, other) in [(a, b), (b, a)] {
            if let Err(e) = self
                .notifier
                .notify(
                    recipient,
                    NotificationKind::System,
                    "New Trusted Contact",
                    "You follow each other and are now trusted contacts",
                    Some(RelatedRef {
                        related_type: RelatedType::User,
                        related_id: other,
                    }),
                    Priority::Normal,
                )
                .await
            {
                tracing::warn!("Failed to notify {} of trusted contact: {}", recipient, e);
            }
        }
        Ok(())
    }

    async fn unlink_pair(&self, conn: &mut DbConnection, a: i64, b: i64) -> Result<()> {
        let mut changed = false;
        for (from, to) in [(a, b), (b, a)] {
            if let Some((_, source)) = edge(conn, from, to).await? {
                if linker::teardown_on_broken(source) == TeardownAction::Delete {
                    diesel::delete(
                        trusted_contacts::table
                            .filter(trusted_contacts::user_id.eq(from))
                            .filter(trusted_contacts::trusted_user_id.eq(to)),
                    )
                    .execute(conn)
                    .await?;
                    changed = true;
                }
            }
        }

        if changed {
            self.refresh_contact_stat(conn, a).await;
            self.refresh_contact_stat(conn, b).await;
        }
        Ok(())
    }

    /// Counter refresh and the badge-pipeline event, best effort on both
    /// sides of a newly accepted pair.
    async fn after_accept(&self, conn: &mut DbConnection, a: i64, b: i64) {
        for user in [a, b] {
            self.refresh_contact_stat(conn, user).await;
            if let Err(e) =
                outbox::enqueue(conn, outbox::CONTACT_ACCEPTED, outbox::user_event(user)).await
            {
                tracing::warn!("Failed to enqueue contact event for {}: {}", user, e);
            }
        }
    }

    async fn refresh_contact_stat(&self, conn: &mut DbConnection, user_id: i64) {
        let count: std::result::Result<i64, _> = trusted_contacts::table
            .filter(trusted_contacts::user_id.eq(user_id))
            .filter(trusted_contacts::status.eq(TrustStatus::Accepted.as_str()))
            .count()
            .get_result(conn)
            .await;

        let outcome = match count {
            Ok(n) => stats::set(conn, user_id, StatKind::TrustedContacts, n as i32).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = outcome {
            tracing::warn!("Failed to refresh contact stat for {}: {}", user_id, e);
        }
    }
}

async fn follow_exists(conn: &mut DbConnection, follower: i64, followed: i64) -> Result<bool> {
    let row: Option<i64> = follows::table
        .filter(follows::follower_id.eq(follower))
        .filter(follows::followed_id.eq(followed))
        .select(follows::id)
        .first(conn)
        .await
        .optional()?;
    Ok(row.is_some())
}

async fn edge(
    conn: &mut DbConnection,
    from: i64,
    to: i64,
) -> Result<Option<(TrustStatus, TrustSource)>> {
    let row: Option<(String, String)> = trusted_contacts::table
        .filter(trusted_contacts::user_id.eq(from))
        .filter(trusted_contacts::trusted_user_id.eq(to))
        .select((trusted_contacts::status, trusted_contacts::source))
        .first(conn)
        .await
        .optional()?;

    match row {
        None => Ok(None),
        Some((status, source)) => {
            let status = TrustStatus::from_str(&status)
                .map_err(|_| Error::Store(format!("invalid trust status in store: {}", status)))?;
            let source = TrustSource::from_str(&source)
                .map_err(|_| Error::Store(format!("invalid trust source in store: {}", source)))?;
            Ok(Some((status, source)))
        }
    }
}

async fn upsert_edge(
    conn: &mut DbConnection,
    from: i64,
    to: i64,
    status: TrustStatus,
    source: TrustSource,
) -> Result<()> {
    diesel::insert_into(trusted_contacts::table)
        .values((
            trusted_contacts::user_id.eq(from),
            trusted_contacts::trusted_user_id.eq(to),
            trusted_contacts::status.eq(status.as_str()),
            trusted_contacts::source.eq(source.as_str()),
        ))
        .on_conflict((trusted_contacts::user_id, trusted_contacts::trusted_user_id))
        .do_update()
        .set((
            trusted_contacts::status.eq(status.as_str()),
            trusted_contacts::source.eq(source.as_str()),
            trusted_contacts::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

async fn ensure_user_exists(conn: &mut DbConnection, user_id: i64) -> Result<()> {
    let exists: Option<i64> = users::table
        .find(user_id)
        .select(users::id)
        .first(conn)
        .await
        .optional()?;
    exists.map(|_| ()).ok_or(Error::NotFound("user"))
}
