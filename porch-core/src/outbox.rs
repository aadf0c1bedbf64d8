use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::db::DbConnection;
use crate::error::Result;
use crate::schema::outbox_events;

/// Domain event types consumed by the outbox poller. Writers outside this
/// workspace (posts, events, incidents) enqueue the same way.
pub const MESSAGE_SENT: &str = "message.sent";
pub const CONTACT_ACCEPTED: &str = "contact.accepted";
pub const POST_CREATED: &str = "post.created";
pub const COMMENT_CREATED: &str = "comment.created";
pub const EVENT_ATTENDED: &str = "event.attended";
pub const EVENT_CREATED: &str = "event.created";
pub const INCIDENT_REPORTED: &str = "incident.reported";

/// Append a domain event for asynchronous consumption. The write shares the
/// caller's connection so it lands in the same request path as the state
/// change it describes.
pub async fn enqueue(
    conn: &mut DbConnection,
    event_type: &str,
    event_data: serde_json::Value,
) -> Result<()> {
    diesel::insert_into(outbox_events::table)
        .values((
            outbox_events::event_type.eq(event_type),
            outbox_events::event_data.eq(event_data),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Convenience payload for single-user events.
pub fn user_event(user_id: i64) -> serde_json::Value {
    serde_json::json!({ "user_id": user_id })
}
