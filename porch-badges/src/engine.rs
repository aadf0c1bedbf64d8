use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

use porch_core::schema::{badges, user_badges, user_stats};
use porch_core::types::{Badge, NotificationKind, Priority, StatKind, UserStats};
use porch_core::{AppContext, DbConnection, Result};
use porch_notify::Notifier;

/// One row of `GET /badges/progress`.
#[derive(Debug, Serialize)]
pub struct BadgeProgress {
    pub badge_id: i64,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub current: i32,
    pub required: i32,
    pub earned: bool,
}

pub struct BadgeEngine {
    ctx: AppContext,
    notifier: Arc<Notifier>,
}

impl BadgeEngine {
    pub fn new(ctx: AppContext, notifier: Arc<Notifier>) -> Self {
        Self { ctx, notifier }
    }

    /// Re-evaluate every unearned criteria badge for a user against a single
    /// counter snapshot. Idempotent: calling twice awards nothing new, and a
    /// concurrent duplicate award collapses into a silent no-op at the
    /// unique index.
    pub async fn evaluate(&self, user_id: i64) -> Result<Vec<Badge>> {
        let mut conn = self.ctx.conn().await?;

        let snapshot = stats_snapshot(&mut conn, user_id).await?;
        let earned = earned_badge_ids(&mut conn, user_id).await?;

        let candidates: Vec<Badge> = badges::table
            .filter(badges::criteria_type.is_not_null())
            .filter(badges::criteria_value.is_not_null())
            .filter(badges::id.ne_all(&earned))
            .select(Badge::as_select())
            .load(&mut conn)
            .await?;

        let mut awarded = Vec::new();
        for badge in candidates {
            if !newly_satisfied(&badge, &snapshot) {
                continue;
            }

            let inserted = diesel::insert_into(user_badges::table)
                .values((
                    user_badges::user_id.eq(user_id),
                    user_badges::badge_id.eq(badge.id),
                ))
                .on_conflict_do_nothing()
                .execute(&mut conn)
                .await?;
            if !award_was_new(inserted) {
                continue;
            }

            if let Err(e) = self
                .notifier
                .notify(
                    user_id,
                    NotificationKind::Badge,
                    "Badge Earned",
                    &format!("You earned the {} badge", badge.name),
                    None,
                    Priority::Normal,
                )
                .await
            {
                tracing::warn!("Failed to notify {} of badge {}: {}", user_id, badge.id, e);
            }
            awarded.push(badge);
        }

        if !awarded.is_empty() {
            tracing::info!("Awarded {} badge(s) to user {}", awarded.len(), user_id);
        }
        Ok(awarded)
    }

    /// Per-badge progress for the profile screen, earned ones included.
    pub async fn progress(&self, user_id: i64) -> Result<Vec<BadgeProgress>> {
        let mut conn = self.ctx.conn().await?;

        let snapshot = stats_snapshot(&mut conn, user_id).await?;
        let earned = earned_badge_ids(&mut conn, user_id).await?;

        let all: Vec<Badge> = badges::table
            .filter(badges::criteria_type.is_not_null())
            .filter(badges::criteria_value.is_not_null())
            .order(badges::id.asc())
            .select(Badge::as_select())
            .load(&mut conn)
            .await?;

        let mut out = Vec::with_capacity(all.len());
        for badge in all {
            let required = badge.criteria_value.unwrap_or(0);
            let current = badge
                .criteria_type
                .as_deref()
                .and_then(|c| StatKind::from_str(c).ok())
                .map(|kind| snapshot.counter(kind))
                .unwrap_or(0);
            out.push(BadgeProgress {
                badge_id: badge.id,
                name: badge.name,
                description: badge.description,
                icon: badge.icon,
                current,
                required,
                earned: earned.contains(&badge.id),
            });
        }
        Ok(out)
    }
}

/// Users with no activity have no stats row yet; they evaluate against zero.
async fn stats_snapshot(conn: &mut DbConnection, user_id: i64) -> Result<UserStats> {
    let row: Option<UserStats> = user_stats::table
        .find(user_id)
        .select(UserStats::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(row.unwrap_or_else(|| UserStats::zero(user_id)))
}

async fn earned_badge_ids(conn: &mut DbConnection, user_id: i64) -> Result<Vec<i64>> {
    let ids = user_badges::table
        .filter(user_badges::user_id.eq(user_id))
        .select(user_badges::badge_id)
        .load(conn)
        .await?;
    Ok(ids)
}

/// Notification gate for an award insert. Zero rows means the unique index
/// swallowed a concurrent duplicate; the evaluation that actually inserted
/// the row is the one that announces it.
fn award_was_new(inserted: usize) -> bool {
    inserted > 0
}

/// Threshold check against the snapshot. A badge whose criteria name is not
/// a known counter can never be satisfied automatically.
fn newly_satisfied(badge: &Badge, snapshot: &UserStats) -> bool {
    let (criteria, required) = match (&badge.criteria_type, badge.criteria_value) {
        (Some(c), Some(v)) => (c, v),
        _ => return false,
    };
    match StatKind::from_str(criteria) {
        Ok(kind) => snapshot.counter(kind) >= required,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn badge(criteria: Option<&str>, value: Option<i32>) -> Badge {
        Badge {
            id: 1,
            name: "Chatterbox".into(),
            description: "Send messages".into(),
            icon: None,
            criteria_type: criteria.map(String::from),
            criteria_value: value,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn satisfied_exactly_at_threshold() {
        let mut snapshot = UserStats::zero(7);
        snapshot.messages_sent = 10;
        assert!(newly_satisfied(&badge(Some("messages_sent"), Some(10)), &snapshot));
        snapshot.messages_sent = 9;
        assert!(!newly_satisfied(&badge(Some("messages_sent"), Some(10)), &snapshot));
    }

    #[test]
    fn missing_criteria_never_satisfies() {
        let snapshot = UserStats::zero(7);
        assert!(!newly_satisfied(&badge(None, Some(1)), &snapshot));
        assert!(!newly_satisfied(&badge(Some("messages_sent"), None), &snapshot));
    }

    #[test]
    fn unknown_counter_name_never_satisfies() {
        let mut snapshot = UserStats::zero(7);
        snapshot.messages_sent = 100;
        assert!(!newly_satisfied(&badge(Some("karma_points"), Some(1)), &snapshot));
    }

    #[test]
    fn losing_the_award_race_suppresses_the_notification() {
        // The unique index collapses a concurrent duplicate into a zero-row
        // insert; only the winning insert may announce.
        assert!(!award_was_new(0));
        assert!(award_was_new(1));
    }

    #[test]
    fn zero_threshold_badges_fire_for_fresh_users() {
        let snapshot = UserStats::zero(7);
        assert!(newly_satisfied(&badge(Some("posts_created"), Some(0)), &snapshot));
    }
}
