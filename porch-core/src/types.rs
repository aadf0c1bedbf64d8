use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::follows)]
pub struct Follow {
    pub id: i64,
    pub follower_id: i64,
    pub followed_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::trusted_contacts)]
pub struct TrustedContact {
    pub id: i64,
    pub user_id: i64,
    pub trusted_user_id: i64,
    pub status: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::user_groups)]
pub struct UserGroup {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub group_type: String,
    pub is_private: bool,
    pub created_by: i64,
    pub member_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::group_memberships)]
pub struct GroupMembership {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub role: String,
    pub status: String,
    pub invited_by: Option<i64>,
    pub invite_token: Option<String>,
    pub invited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::direct_messages)]
pub struct DirectMessage {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub media: Option<serde_json::Value>,
    pub is_read: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub reply_to_id: Option<i64>,
    pub reply_snapshot: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::chat_messages)]
pub struct ChatMessage {
    pub id: i64,
    pub group_id: i64,
    pub author_id: i64,
    pub content: String,
    pub media: Option<serde_json::Value>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub reply_to_id: Option<i64>,
    pub reply_snapshot: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::message_reactions)]
pub struct MessageReaction {
    pub id: i64,
    pub message_id: i64,
    pub message_kind: String,
    pub user_id: i64,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::notifications)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub related_type: Option<String>,
    pub related_id: Option<i64>,
    pub is_read: bool,
    pub priority: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::badges)]
pub struct Badge {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub criteria_type: Option<String>,
    pub criteria_value: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::user_badges)]
pub struct UserBadge {
    pub id: i64,
    pub user_id: i64,
    pub badge_id: i64,
    pub earned_at: DateTime<Utc>,
    pub is_displayed: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::user_stats)]
pub struct UserStats {
    pub user_id: i64,
    pub posts_created: i32,
    pub comments_posted: i32,
    pub likes_received: i32,
    pub events_attended: i32,
    pub events_created: i32,
    pub incidents_reported: i32,
    pub trusted_contacts: i32,
    pub messages_sent: i32,
    pub updated_at: DateTime<Utc>,
}

impl UserStats {
    pub fn zero(user_id: i64) -> Self {
        UserStats {
            user_id,
            posts_created: 0,
            comments_posted: 0,
            likes_received: 0,
            events_attended: 0,
            events_created: 0,
            incidents_reported: 0,
            trusted_contacts: 0,
            messages_sent: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn counter(&self, stat: StatKind) -> i32 {
        match stat {
            StatKind::PostsCreated => self.posts_created,
            StatKind::CommentsPosted => self.comments_posted,
            StatKind::LikesReceived => self.likes_received,
            StatKind::EventsAttended => self.events_attended,
            StatKind::EventsCreated => self.events_created,
            StatKind::IncidentsReported => self.incidents_reported,
            StatKind::TrustedContacts => self.trusted_contacts,
            StatKind::MessagesSent => self.messages_sent,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct OutboxEvent {
    pub id: i64,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Value objects
// ---------------------------------------------------------------------------

/// Attachment descriptor carried verbatim on messages. A message with media
/// can never be edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub url: String,
    pub media_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Immutable quote of the replied-to message, captured at send time. Later
/// edits or deletes of the original do not alter it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub message_id: i64,
    pub sender_id: i64,
    pub content: String,
}

/// Reference to the entity a notification is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RelatedRef {
    pub related_type: RelatedType,
    pub related_id: i64,
}

// ---------------------------------------------------------------------------
// Closed enums
// ---------------------------------------------------------------------------

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }, $what:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Error> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::validation(format!(
                        concat!("unknown ", $what, ": {}"),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(NotificationKind {
    Alert => "alert",
    Message => "message",
    Event => "event",
    Badge => "badge",
    Verification => "verification",
    System => "system",
    GroupInvite => "group_invite",
    Group => "group",
}, "notification type");

text_enum!(RelatedType {
    Post => "post",
    Event => "event",
    Message => "message",
    User => "user",
    Group => "group",
}, "related entity type");

text_enum!(Priority {
    Low => "low",
    Normal => "normal",
    High => "high",
}, "priority");

text_enum!(MemberRole {
    Admin => "admin",
    Moderator => "moderator",
    Member => "member",
}, "member role");

text_enum!(MemberStatus {
    Active => "active",
    Pending => "pending",
    Invited => "invited",
    Removed => "removed",
    Rejected => "rejected",
}, "membership status");

text_enum!(GroupType {
    Street => "street",
    Block => "block",
    Neighborhood => "neighborhood",
    Interest => "interest",
}, "group type");

text_enum!(TrustStatus {
    Pending => "pending",
    Accepted => "accepted",
    Blocked => "blocked",
}, "trust status");

text_enum!(TrustSource {
    Follow => "follow",
    Manual => "manual",
}, "trust source");

text_enum!(MessageKind {
    Dm => "dm",
    Group => "group",
}, "message kind");

text_enum!(StatKind {
    PostsCreated => "posts_created",
    CommentsPosted => "comments_posted",
    LikesReceived => "likes_received",
    EventsAttended => "events_attended",
    EventsCreated => "events_created",
    IncidentsReported => "incidents_reported",
    TrustedContacts => "trusted_contacts",
    MessagesSent => "messages_sent",
}, "stat counter");

impl StatKind {
    /// Column name in `user_stats`; the schema uses the wire names directly.
    pub fn column(&self) -> &'static str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_kind_round_trips() {
        for kind in NotificationKind::ALL {
            assert_eq!(&NotificationKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_notification_kind_is_a_validation_error() {
        let err = NotificationKind::from_str("carrier_pigeon").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn group_invite_wire_form() {
        assert_eq!(NotificationKind::GroupInvite.as_str(), "group_invite");
        let json = serde_json::to_string(&NotificationKind::GroupInvite).unwrap();
        assert_eq!(json, "\"group_invite\"");
    }

    #[test]
    fn membership_enums_parse_all_stored_values() {
        for s in ["active", "pending", "invited", "removed", "rejected"] {
            MemberStatus::from_str(s).unwrap();
        }
        for r in ["admin", "moderator", "member"] {
            MemberRole::from_str(r).unwrap();
        }
    }

    #[test]
    fn stat_columns_match_wire_names() {
        for stat in StatKind::ALL {
            assert_eq!(stat.column(), stat.as_str());
        }
    }

    #[test]
    fn reply_snapshot_serializes_flat() {
        let snap = ReplySnapshot {
            message_id: 7,
            sender_id: 3,
            content: "original".into(),
        };
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["message_id"], 7);
        assert_eq!(v["content"], "original");
    }
}
