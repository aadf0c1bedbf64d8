use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::str::FromStr;

use crate::db::DbConnection;
use crate::error::{Error, Result};
use crate::schema::group_memberships;
use crate::types::{MemberRole, MemberStatus};

/// The user's role in a group, only while their membership is `active`.
/// Permissions are always re-derived from this at call time; nothing caches
/// it across requests.
pub async fn active_role(
    conn: &mut DbConnection,
    group_id: i64,
    user_id: i64,
) -> Result<Option<MemberRole>> {
    let row: Option<(String, String)> = group_memberships::table
        .filter(group_memberships::group_id.eq(group_id))
        .filter(group_memberships::user_id.eq(user_id))
        .select((group_memberships::role, group_memberships::status))
        .first(conn)
        .await
        .optional()?;

    match row {
        Some((role, status)) if status == MemberStatus::Active.as_str() => {
            let role = MemberRole::from_str(&role)
                .map_err(|_| Error::Store(format!("invalid role in store: {}", role)))?;
            Ok(Some(role))
        }
        _ => Ok(None),
    }
}

/// Number of active admin memberships in a group.
pub async fn active_admin_count(conn: &mut DbConnection, group_id: i64) -> Result<i64> {
    let count = group_memberships::table
        .filter(group_memberships::group_id.eq(group_id))
        .filter(group_memberships::role.eq(MemberRole::Admin.as_str()))
        .filter(group_memberships::status.eq(MemberStatus::Active.as_str()))
        .count()
        .get_result(conn)
        .await?;
    Ok(count)
}
