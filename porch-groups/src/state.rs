use porch_core::types::{MemberRole, MemberStatus};
use porch_core::{Error, Result};

/// Membership management (adding, inviting, removing others) requires an
/// active admin or moderator.
pub fn can_manage_members(role: MemberRole) -> bool {
    matches!(role, MemberRole::Admin | MemberRole::Moderator)
}

/// What an invite should do given the target's existing membership status.
#[derive(Debug, PartialEq)]
pub enum InviteAction {
    /// No membership row, or a dormant one; issue a fresh token.
    Issue,
    /// Already invited; the existing token is returned unchanged.
    Reuse,
}

pub fn invite_action(existing: Option<MemberStatus>) -> Result<InviteAction> {
    match existing {
        Some(MemberStatus::Active) => Err(Error::Conflict("already a member")),
        Some(MemberStatus::Invited) => Ok(InviteAction::Reuse),
        Some(MemberStatus::Pending)
        | Some(MemberStatus::Removed)
        | Some(MemberStatus::Rejected)
        | None => Ok(InviteAction::Issue),
    }
}

/// Only the invited user, presenting the matching token, may resolve an
/// invite (accept or reject).
pub fn check_invite_resolution(
    status: MemberStatus,
    invited_user: i64,
    actor: i64,
    stored_token: Option<&str>,
    presented_token: &str,
) -> Result<()> {
    if status != MemberStatus::Invited {
        return Err(Error::NotFound("invite"));
    }
    if invited_user != actor {
        return Err(Error::Forbidden);
    }
    match stored_token {
        Some(token) if token == presented_token => Ok(()),
        _ => Err(Error::Forbidden),
    }
}

/// Self-leave is rejected when the actor is the sole active admin: the group
/// must never be left with active members but no admin.
pub fn check_self_leave(actor_role: MemberRole, active_admin_count: i64) -> Result<()> {
    if actor_role == MemberRole::Admin && active_admin_count <= 1 {
        return Err(Error::LastAdminGuard);
    }
    Ok(())
}

pub fn check_role_change(actor_role: MemberRole, actor: i64, target: i64) -> Result<()> {
    if actor_role != MemberRole::Admin {
        return Err(Error::Forbidden);
    }
    if actor == target {
        return Err(Error::validation("cannot change your own role"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_and_moderator_manage_members() {
        assert!(can_manage_members(MemberRole::Admin));
        assert!(can_manage_members(MemberRole::Moderator));
        assert!(!can_manage_members(MemberRole::Member));
    }

    #[test]
    fn inviting_an_active_member_conflicts() {
        let err = invite_action(Some(MemberStatus::Active)).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn reinviting_reuses_the_existing_token() {
        assert_eq!(
            invite_action(Some(MemberStatus::Invited)).unwrap(),
            InviteAction::Reuse
        );
    }

    #[test]
    fn dormant_statuses_get_a_fresh_invite() {
        for status in [
            None,
            Some(MemberStatus::Removed),
            Some(MemberStatus::Rejected),
            Some(MemberStatus::Pending),
        ] {
            assert_eq!(invite_action(status).unwrap(), InviteAction::Issue);
        }
    }

    #[test]
    fn invite_resolution_requires_matching_token_and_user() {
        // Happy path.
        assert!(check_invite_resolution(MemberStatus::Invited, 2, 2, Some("tok"), "tok").is_ok());

        // Wrong user.
        assert!(matches!(
            check_invite_resolution(MemberStatus::Invited, 2, 3, Some("tok"), "tok"),
            Err(Error::Forbidden)
        ));

        // Wrong token.
        assert!(matches!(
            check_invite_resolution(MemberStatus::Invited, 2, 2, Some("tok"), "other"),
            Err(Error::Forbidden)
        ));

        // Not an invite any more.
        assert!(matches!(
            check_invite_resolution(MemberStatus::Active, 2, 2, Some("tok"), "tok"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn sole_active_admin_cannot_self_leave() {
        assert!(matches!(
            check_self_leave(MemberRole::Admin, 1),
            Err(Error::LastAdminGuard)
        ));
    }

    #[test]
    fn admin_leaves_freely_once_a_second_admin_exists() {
        assert!(check_self_leave(MemberRole::Admin, 2).is_ok());
    }

    #[test]
    fn non_admins_leave_regardless_of_admin_count() {
        assert!(check_self_leave(MemberRole::Member, 1).is_ok());
        assert!(check_self_leave(MemberRole::Moderator, 1).is_ok());
    }

    #[test]
    fn role_change_requires_admin_and_a_different_target() {
        assert!(check_role_change(MemberRole::Admin, 1, 2).is_ok());
        assert!(matches!(
            check_role_change(MemberRole::Moderator, 1, 2),
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            check_role_change(MemberRole::Admin, 1, 1),
            Err(Error::Validation(_))
        ));
    }
}
