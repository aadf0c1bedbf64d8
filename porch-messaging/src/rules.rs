use chrono::{DateTime, Duration, Utc};

use porch_core::types::{MemberRole, MessageKind};
use porch_core::{Error, Result};

pub const MAX_CONTENT_CHARS: usize = 5000;
pub const EDIT_WINDOW_MINUTES: i64 = 15;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

pub fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::validation("content is required"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(Error::validation(format!(
            "content exceeds {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(())
}

pub fn clamp_page_size(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Wall-clock delta against the stored creation timestamp.
pub fn within_edit_window(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at <= Duration::minutes(EDIT_WINDOW_MINUTES)
}

/// Edit permission: original author only, no media attached, inside the
/// 15-minute window. Surfaces the precise failing condition.
pub fn check_edit(
    author_id: i64,
    actor_id: i64,
    has_media: bool,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    if actor_id != author_id {
        return Err(Error::Forbidden);
    }
    if has_media {
        return Err(Error::validation("messages with media cannot be edited"));
    }
    if !within_edit_window(created_at, now) {
        return Err(Error::EditWindowExpired);
    }
    Ok(())
}

/// Group message deletion: author, or a member currently holding the admin or
/// moderator role.
pub fn can_delete_group_message(
    author_id: i64,
    actor_id: i64,
    actor_role: Option<MemberRole>,
) -> bool {
    actor_id == author_id
        || matches!(actor_role, Some(MemberRole::Admin) | Some(MemberRole::Moderator))
}

/// Identity of a reaction. The store enforces uniqueness over exactly these
/// four parts, so a repeat of the same key resolves to a refresh of the
/// existing row; any difference (another emoji, user, or message kind) is a
/// new reaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReactionKey {
    pub message_id: i64,
    pub message_kind: MessageKind,
    pub user_id: i64,
    pub emoji: String,
}

impl ReactionKey {
    pub fn new(message_id: i64, message_kind: MessageKind, user_id: i64, emoji: &str) -> Self {
        ReactionKey {
            message_id,
            message_kind,
            user_id,
            emoji: emoji.to_string(),
        }
    }
}

pub fn validate_emoji(emoji: &str) -> Result<()> {
    if emoji.trim().is_empty() {
        return Err(Error::validation("emoji is required"));
    }
    if emoji.chars().count() > 16 {
        return Err(Error::validation("emoji too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(created: DateTime<Utc>, secs_later: i64) -> DateTime<Utc> {
        created + Duration::seconds(secs_later)
    }

    #[test]
    fn edit_allowed_just_inside_the_window() {
        let created = Utc::now();
        // 14:59 since creation
        let now = at(created, 14 * 60 + 59);
        assert!(check_edit(1, 1, false, created, now).is_ok());
    }

    #[test]
    fn edit_rejected_just_outside_the_window() {
        let created = Utc::now();
        // 15:01 since creation
        let now = at(created, 15 * 60 + 1);
        let err = check_edit(1, 1, false, created, now).unwrap_err();
        assert!(matches!(err, Error::EditWindowExpired));
    }

    #[test]
    fn edit_by_non_author_is_forbidden_before_window_check() {
        let created = Utc::now();
        let now = at(created, 20 * 60);
        let err = check_edit(1, 2, false, created, now).unwrap_err();
        assert!(matches!(err, Error::Forbidden));
    }

    #[test]
    fn edit_with_media_fails_validation() {
        let created = Utc::now();
        let err = check_edit(1, 1, true, created, at(created, 60)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn content_limits() {
        assert!(validate_content("hi").is_ok());
        assert!(validate_content("").is_err());
        assert!(validate_content("   ").is_err());

        let exactly_max = "x".repeat(MAX_CONTENT_CHARS);
        assert!(validate_content(&exactly_max).is_ok());
        let over = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert!(matches!(validate_content(&over), Err(Error::Validation(_))));
    }

    #[test]
    fn page_size_defaults_and_caps() {
        assert_eq!(clamp_page_size(None), 50);
        assert_eq!(clamp_page_size(Some(25)), 25);
        assert_eq!(clamp_page_size(Some(1000)), 200);
        assert_eq!(clamp_page_size(Some(0)), 1);
        assert_eq!(clamp_page_size(Some(-5)), 1);
    }

    #[test]
    fn reaction_identity_covers_all_four_parts() {
        let first = ReactionKey::new(1, MessageKind::Dm, 2, "👍");

        // Repeating the exact reaction collides with the existing row.
        assert_eq!(first, ReactionKey::new(1, MessageKind::Dm, 2, "👍"));

        // Any single differing part is a distinct reaction.
        assert_ne!(first, ReactionKey::new(1, MessageKind::Dm, 2, "❤️"));
        assert_ne!(first, ReactionKey::new(1, MessageKind::Dm, 3, "👍"));
        assert_ne!(first, ReactionKey::new(1, MessageKind::Group, 2, "👍"));
        assert_ne!(first, ReactionKey::new(9, MessageKind::Dm, 2, "👍"));
    }

    #[test]
    fn group_delete_permission_table() {
        // Author may always delete their own message.
        assert!(can_delete_group_message(1, 1, Some(MemberRole::Member)));
        assert!(can_delete_group_message(1, 1, None));
        // Admins and moderators may delete anyone's.
        assert!(can_delete_group_message(1, 2, Some(MemberRole::Admin)));
        assert!(can_delete_group_message(1, 2, Some(MemberRole::Moderator)));
        // Plain members may not delete others'.
        assert!(!can_delete_group_message(1, 2, Some(MemberRole::Member)));
        assert!(!can_delete_group_message(1, 2, None));
    }
}
