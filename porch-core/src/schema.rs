use diesel::{allow_tables_to_appear_in_same_query, table};

table! {
    users (id) {
        id -> BigInt,
        display_name -> Text,
        is_verified -> Bool,
        created_at -> Timestamptz,
    }
}

table! {
    follows (id) {
        id -> BigInt,
        follower_id -> BigInt,
        followed_id -> BigInt,
        created_at -> Timestamptz,
    }
}

table! {
    trusted_contacts (id) {
        id -> BigInt,
        user_id -> BigInt,
        trusted_user_id -> BigInt,
        status -> Text,
        source -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    user_groups (id) {
        id -> BigInt,
        name -> Text,
        description -> Nullable<Text>,
        group_type -> Text,
        is_private -> Bool,
        created_by -> BigInt,
        member_count -> Integer,
        created_at -> Timestamptz,
    }
}

table! {
    group_memberships (id) {
        id -> BigInt,
        group_id -> BigInt,
        user_id -> BigInt,
        role -> Text,
        status -> Text,
        invited_by -> Nullable<BigInt>,
        invite_token -> Nullable<Text>,
        invited_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    direct_messages (id) {
        id -> BigInt,
        sender_id -> BigInt,
        receiver_id -> BigInt,
        content -> Text,
        media -> Nullable<Jsonb>,
        is_read -> Bool,
        is_edited -> Bool,
        edited_at -> Nullable<Timestamptz>,
        reply_to_id -> Nullable<BigInt>,
        reply_snapshot -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

table! {
    chat_messages (id) {
        id -> BigInt,
        group_id -> BigInt,
        author_id -> BigInt,
        content -> Text,
        media -> Nullable<Jsonb>,
        is_edited -> Bool,
        edited_at -> Nullable<Timestamptz>,
        reply_to_id -> Nullable<BigInt>,
        reply_snapshot -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

table! {
    message_reactions (id) {
        id -> BigInt,
        message_id -> BigInt,
        message_kind -> Text,
        user_id -> BigInt,
        emoji -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    notifications (id) {
        id -> BigInt,
        recipient_id -> BigInt,
        kind -> Text,
        title -> Text,
        content -> Text,
        related_type -> Nullable<Text>,
        related_id -> Nullable<BigInt>,
        is_read -> Bool,
        priority -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    badges (id) {
        id -> BigInt,
        name -> Text,
        description -> Text,
        icon -> Nullable<Text>,
        criteria_type -> Nullable<Text>,
        criteria_value -> Nullable<Integer>,
        created_at -> Timestamptz,
    }
}

table! {
    user_badges (id) {
        id -> BigInt,
        user_id -> BigInt,
        badge_id -> BigInt,
        earned_at -> Timestamptz,
        is_displayed -> Bool,
    }
}

table! {
    user_stats (user_id) {
        user_id -> BigInt,
        posts_created -> Integer,
        comments_posted -> Integer,
        likes_received -> Integer,
        events_attended -> Integer,
        events_created -> Integer,
        incidents_reported -> Integer,
        trusted_contacts -> Integer,
        messages_sent -> Integer,
        updated_at -> Timestamptz,
    }
}

table! {
    outbox_events (id) {
        id -> BigInt,
        event_type -> Text,
        event_data -> Jsonb,
        created_at -> Timestamptz,
        processed_at -> Nullable<Timestamptz>,
        retry_count -> Integer,
        error_message -> Nullable<Text>,
    }
}

allow_tables_to_appear_in_same_query!(
    users,
    follows,
    trusted_contacts,
    user_groups,
    group_memberships,
    direct_messages,
    chat_messages,
    message_reactions,
    notifications,
    badges,
    user_badges,
    user_stats,
    outbox_events,
);
