use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use porch_core::memberships::{active_admin_count, active_role};
use porch_core::schema::{group_memberships, user_groups, users};
use porch_core::types::{
    GroupMembership, GroupType, MemberRole, MemberStatus, NotificationKind, Priority, RelatedRef,
    RelatedType, UserGroup,
};
use porch_core::{AppContext, DbConnection, Error, Result};
use porch_notify::Notifier;

use crate::state;

#[derive(Debug, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub group_type: GroupType,
    #[serde(default)]
    pub is_private: bool,
}

/// An invite as seen by the invited user. Carries the token they must
/// present to accept or reject.
#[derive(Debug, Serialize)]
pub struct InviteView {
    pub invite_id: i64,
    pub group_id: i64,
    pub group_name: String,
    pub invited_by: Option<i64>,
    pub invite_token: Option<String>,
    pub invited_at: Option<chrono::DateTime<Utc>>,
}

pub struct GroupsService {
    ctx: AppContext,
    notifier: Arc<Notifier>,
}

impl GroupsService {
    pub fn new(ctx: AppContext, notifier: Arc<Notifier>) -> Self {
        Self { ctx, notifier }
    }

    /// The creator enters directly as an active admin.
    pub async fn create_group(&self, creator: i64, req: CreateGroup) -> Result<UserGroup> {
        if req.name.trim().is_empty() {
            return Err(Error::validation("group name is required"));
        }
        if req.name.chars().count() > 100 {
            return Err(Error::validation("group name exceeds 100 characters"));
        }

        let mut conn = self.ctx.conn().await?;

        let group: UserGroup = diesel::insert_into(user_groups::table)
            .values((
                user_groups::name.eq(req.name.trim()),
                user_groups::description.eq(&req.description),
                user_groups::group_type.eq(req.group_type.as_str()),
                user_groups::is_private.eq(req.is_private),
                user_groups::created_by.eq(creator),
            ))
            .returning(UserGroup::as_returning())
            .get_result(&mut conn)
            .await?;

        diesel::insert_into(group_memberships::table)
            .values((
                group_memberships::group_id.eq(group.id),
                group_memberships::user_id.eq(creator),
                group_memberships::role.eq(MemberRole::Admin.as_str()),
                group_memberships::status.eq(MemberStatus::Active.as_str()),
            ))
            .execute(&mut conn)
            .await?;

        let count = self.recompute_member_count(&mut conn, group.id).await?;

        Ok(UserGroup {
            member_count: count,
            ..group
        })
    }

    /// Direct add: the target becomes an active member immediately.
    pub async fn add_member(&self, actor: i64, group_id: i64, user_id: i64) -> Result<GroupMembership> {
        let mut conn = self.ctx.conn().await?;
        let group = load_group(&mut conn, group_id).await?;
        self.require_manager(&mut conn, group_id, actor).await?;
        ensure_user_exists(&mut conn, user_id).await?;

        let existing = membership_status(&mut conn, group_id, user_id).await?;
        if existing == Some(MemberStatus::Active) {
            return Err(Error::Conflict("already a member"));
        }

        let membership = self
            .upsert_membership(
                &mut conn,
                group_id,
                user_id,
                MemberRole::Member,
                MemberStatus::Active,
                None,
            )
            .await?;

        self.recompute_member_count(&mut conn, group_id).await?;

        if let Err(e) = self
            .notifier
            .notify(
                user_id,
                NotificationKind::Group,
                "Added to Group",
                &format!("You were added to {}", group.name),
                Some(RelatedRef {
                    related_type: RelatedType::Group,
                    related_id: group_id,
                }),
                Priority::Normal,
            )
            .await
        {
            tracing::warn!("Failed to notify added member {}: {}", user_id, e);
        }

        Ok(membership)
    }

    /// Issue (or re-surface) an invite. Re-inviting an already-invited user
    /// is a no-op returning the existing token.
    pub async fn invite(&self, actor: i64, group_id: i64, user_id: i64) -> Result<GroupMembership> {
        let mut conn = self.ctx.conn().await?;
        let group = load_group(&mut conn, group_id).await?;
        self.require_manager(&mut conn, group_id, actor).await?;
        ensure_user_exists(&mut conn, user_id).await?;

        let existing = membership_status(&mut conn, group_id, user_id).await?;
        match state::invite_action(existing)? {
            state::InviteAction::Reuse => {
                let membership = load_membership(&mut conn, group_id, user_id).await?;
                Ok(membership)
            }
            state::InviteAction::Issue => {
                let token = Uuid::new_v4().simple().to_string();
                let membership = self
                    .upsert_membership(
                        &mut conn,
                        group_id,
                        user_id,
                        MemberRole::Member,
                        MemberStatus::Invited,
                        Some((actor, token)),
                    )
                    .await?;

                if let Err(e) = self
                    .notifier
                    .notify(
                        user_id,
                        NotificationKind::GroupInvite,
                        "Group Invitation",
                        &format!("You were invited to join {}", group.name),
                        Some(RelatedRef {
                            related_type: RelatedType::Group,
                            related_id: group_id,
                        }),
                        Priority::Normal,
                    )
                    .await
                {
                    tracing::warn!("Failed to notify invited user {}: {}", user_id, e);
                }

                Ok(membership)
            }
        }
    }

    /// Invites pending for the given user, with enough context to accept.
    pub async fn list_invites(&self, me: i64) -> Result<Vec<InviteView>> {
        let mut conn = self.ctx.conn().await?;
        let rows: Vec<(GroupMembership, String)> = group_memberships::table
            .inner_join(user_groups::table.on(user_groups::id.eq(group_memberships::group_id)))
            .filter(group_memberships::user_id.eq(me))
            .filter(group_memberships::status.eq(MemberStatus::Invited.as_str()))
            .order(group_memberships::invited_at.desc())
            .select((GroupMembership::as_select(), user_groups::name))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(m, group_name)| InviteView {
                invite_id: m.id,
                group_id: m.group_id,
                group_name,
                invited_by: m.invited_by,
                invite_token: m.invite_token,
                invited_at: m.invited_at,
            })
            .collect())
    }

    pub async fn accept_invite(&self, actor: i64, group_id: i64, invite_id: i64, token: &str) -> Result<GroupMembership> {
        let mut conn = self.ctx.conn().await?;
        let membership = load_membership_by_id(&mut conn, group_id, invite_id).await?;

        let status = parse_status(&membership.status)?;
        state::check_invite_resolution(
            status,
            membership.user_id,
            actor,
            membership.invite_token.as_deref(),
            token,
        )?;

        let updated: GroupMembership = diesel::update(group_memberships::table.find(membership.id))
            .set((
                group_memberships::status.eq(MemberStatus::Active.as_str()),
                group_memberships::invited_by.eq(None::<i64>),
                group_memberships::invite_token.eq(None::<String>),
                group_memberships::invited_at.eq(None::<chrono::DateTime<Utc>>),
                group_memberships::updated_at.eq(Utc::now()),
            ))
            .returning(GroupMembership::as_returning())
            .get_result(&mut conn)
            .await?;

        self.recompute_member_count(&mut conn, group_id).await?;
        Ok(updated)
    }

    pub async fn reject_invite(&self, actor: i64, group_id: i64, invite_id: i64, token: &str) -> Result<()> {
        let mut conn = self.ctx.conn().await?;
        let membership = load_membership_by_id(&mut conn, group_id, invite_id).await?;

        let status = parse_status(&membership.status)?;
        state::check_invite_resolution(
            status,
            membership.user_id,
            actor,
            membership.invite_token.as_deref(),
            token,
        )?;

        diesel::update(group_memberships::table.find(membership.id))
            .set((
                group_memberships::status.eq(MemberStatus::Rejected.as_str()),
                group_memberships::invited_by.eq(None::<i64>),
                group_memberships::invite_token.eq(None::<String>),
                group_memberships::invited_at.eq(None::<chrono::DateTime<Utc>>),
                group_memberships::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Self-leave. Guarded so the sole active admin cannot orphan the group.
    pub async fn leave(&self, actor: i64, group_id: i64) -> Result<()> {
        let mut conn = self.ctx.conn().await?;
        load_group(&mut conn, group_id).await?;

        let membership = load_membership(&mut conn, group_id, actor).await?;
        let status = parse_status(&membership.status)?;

        if status == MemberStatus::Active {
            let role = MemberRole::from_str(&membership.role)
                .map_err(|_| Error::Store(format!("invalid role in store: {}", membership.role)))?;
            // The count and the status write share this connection but not a
            // transaction; two admins leaving at once can both pass the check.
            let admins = active_admin_count(&mut conn, group_id).await?;
            state::check_self_leave(role, admins)?;
        }

        self.mark_removed(&mut conn, membership.id).await?;
        self.recompute_member_count(&mut conn, group_id).await?;
        Ok(())
    }

    /// Admin/moderator-driven removal. Removing yourself goes through the
    /// self-leave guard instead.
    pub async fn remove_member(&self, actor: i64, group_id: i64, target_user: i64) -> Result<()> {
        if actor == target_user {
            return self.leave(actor, group_id).await;
        }

        let mut conn = self.ctx.conn().await?;
        load_group(&mut conn, group_id).await?;
        self.require_manager(&mut conn, group_id, actor).await?;

        let membership = load_membership(&mut conn, group_id, target_user).await?;
        self.mark_removed(&mut conn, membership.id).await?;
        self.recompute_member_count(&mut conn, group_id).await?;
        Ok(())
    }

    /// Role changes are reserved to active admins and never target oneself.
    pub async fn change_role(
        &self,
        actor: i64,
        group_id: i64,
        target_user: i64,
        new_role: MemberRole,
    ) -> Result<GroupMembership> {
        let mut conn = self.ctx.conn().await?;
        load_group(&mut conn, group_id).await?;

        let actor_role = active_role(&mut conn, group_id, actor)
            .await?
            .ok_or(Error::Forbidden)?;
        state::check_role_change(actor_role, actor, target_user)?;

        let membership = load_membership(&mut conn, group_id, target_user).await?;
        if parse_status(&membership.status)? != MemberStatus::Active {
            return Err(Error::NotFound("member"));
        }

        let updated: GroupMembership = diesel::update(group_memberships::table.find(membership.id))
            .set((
                group_memberships::role.eq(new_role.as_str()),
                group_memberships::updated_at.eq(Utc::now()),
            ))
            .returning(GroupMembership::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(updated)
    }

    // -- internals ----------------------------------------------------------

    async fn require_manager(&self, conn: &mut DbConnection, group_id: i64, actor: i64) -> Result<MemberRole> {
        let role = active_role(conn, group_id, actor).await?.ok_or(Error::Forbidden)?;
        if !state::can_manage_members(role) {
            return Err(Error::Forbidden);
        }
        Ok(role)
    }

    async fn upsert_membership(
        &self,
        conn: &mut DbConnection,
        group_id: i64,
        user_id: i64,
        role: MemberRole,
        status: MemberStatus,
        invite: Option<(i64, String)>,
    ) -> Result<GroupMembership> {
        let (invited_by, invite_token, invited_at) = match invite {
            Some((inviter, token)) => (Some(inviter), Some(token), Some(Utc::now())),
            None => (None, None, None),
        };

        let membership: GroupMembership = diesel::insert_into(group_memberships::table)
            .values((
                group_memberships::group_id.eq(group_id),
                group_memberships::user_id.eq(user_id),
                group_memberships::role.eq(role.as_str()),
                group_memberships::status.eq(status.as_str()),
                group_memberships::invited_by.eq(invited_by),
                group_memberships::invite_token.eq(&invite_token),
                group_memberships::invited_at.eq(invited_at),
            ))
            .on_conflict((group_memberships::group_id, group_memberships::user_id))
            .do_update()
            .set((
                group_memberships::role.eq(role.as_str()),
                group_memberships::status.eq(status.as_str()),
                group_memberships::invited_by.eq(invited_by),
                group_memberships::invite_token.eq(&invite_token),
                group_memberships::invited_at.eq(invited_at),
                group_memberships::updated_at.eq(Utc::now()),
            ))
            .returning(GroupMembership::as_returning())
            .get_result(conn)
            .await?;
        Ok(membership)
    }

    async fn mark_removed(&self, conn: &mut DbConnection, membership_id: i64) -> Result<()> {
        diesel::update(group_memberships::table.find(membership_id))
            .set((
                group_memberships::status.eq(MemberStatus::Removed.as_str()),
                group_memberships::invited_by.eq(None::<i64>),
                group_memberships::invite_token.eq(None::<String>),
                group_memberships::invited_at.eq(None::<chrono::DateTime<Utc>>),
                group_memberships::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// `member_count` is derived from the membership table, never counted
    /// independently.
    async fn recompute_member_count(&self, conn: &mut DbConnection, group_id: i64) -> Result<i32> {
        let count: i64 = group_memberships::table
            .filter(group_memberships::group_id.eq(group_id))
            .filter(group_memberships::status.eq(MemberStatus::Active.as_str()))
            .count()
            .get_result(conn)
            .await?;

        diesel::update(user_groups::table.find(group_id))
            .set(user_groups::member_count.eq(count as i32))
            .execute(conn)
            .await?;
        Ok(count as i32)
    }
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

async fn load_group(conn: &mut DbConnection, group_id: i64) -> Result<UserGroup> {
    let group: Option<UserGroup> = user_groups::table
        .find(group_id)
        .select(UserGroup::as_select())
        .first(conn)
        .await
        .optional()?;
    group.ok_or(Error::NotFound("group"))
}

async fn load_membership(conn: &mut DbConnection, group_id: i64, user_id: i64) -> Result<GroupMembership> {
    let membership: Option<GroupMembership> = group_memberships::table
        .filter(group_memberships::group_id.eq(group_id))
        .filter(group_memberships::user_id.eq(user_id))
        .select(GroupMembership::as_select())
        .first(conn)
        .await
        .optional()?;
    membership.ok_or(Error::NotFound("membership"))
}

async fn load_membership_by_id(conn: &mut DbConnection, group_id: i64, membership_id: i64) -> Result<GroupMembership> {
    let membership: Option<GroupMembership> = group_memberships::table
        .find(membership_id)
        .filter(group_memberships::group_id.eq(group_id))
        .select(GroupMembership::as_select())
        .first(conn)
        .await
        .optional()?;
    membership.ok_or(Error::NotFound("invite"))
}

async fn membership_status(conn: &mut DbConnection, group_id: i64, user_id: i64) -> Result<Option<MemberStatus>> {
    let status: Option<String> = group_memberships::table
        .filter(group_memberships::group_id.eq(group_id))
        .filter(group_memberships::user_id.eq(user_id))
        .select(group_memberships::status)
        .first(conn)
        .await
        .optional()?;
    status.map(|s| parse_status(&s)).transpose()
}

fn parse_status(status: &str) -> Result<MemberStatus> {
    MemberStatus::from_str(status)
        .map_err(|_| Error::Store(format!("invalid membership status in store: {}", status)))
}
