use anyhow::{anyhow, Result};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::sync::Arc;
use std::time::Duration;

use porch_badges::BadgeEngine;
use porch_core::schema::outbox_events;
use porch_core::AppContext;

#[derive(Queryable, Selectable)]
#[diesel(table_name = porch_core::schema::outbox_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct OutboxRow {
    id: i64,
    event_type: String,
    event_data: serde_json::Value,
}

/// Drains the outbox and feeds each event to the badge engine. Write paths
/// only enqueue; this loop is the single place evaluation happens.
pub async fn run(ctx: AppContext, engine: Arc<BadgeEngine>) -> Result<()> {
    tracing::info!("Starting outbox poller");

    let interval = Duration::from_millis(ctx.config.outbox.poll_interval_ms);

    loop {
        match poll_and_dispatch(&ctx, &engine).await {
            Ok(_) => {
                tokio::time::sleep(interval).await;
            }
            Err(e) => {
                tracing::error!("Error in outbox poller: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn poll_and_dispatch(ctx: &AppContext, engine: &BadgeEngine) -> Result<()> {
    let mut conn = ctx.db_pool.get().await?;

    let events: Vec<OutboxRow> = outbox_events::table
        .filter(outbox_events::processed_at.is_null())
        .filter(outbox_events::retry_count.lt(&ctx.config.outbox.max_retries))
        .order(outbox_events::created_at.asc())
        .limit(ctx.config.outbox.batch_size)
        .select(OutboxRow::as_select())
        .load(&mut conn)
        .await?;

    if events.is_empty() {
        return Ok(());
    }

    tracing::debug!("Found {} unprocessed events", events.len());

    for event in events {
        match dispatch_event(engine, &event.event_type, &event.event_data).await {
            Ok(_) => {
                diesel::update(outbox_events::table.filter(outbox_events::id.eq(event.id)))
                    .set(outbox_events::processed_at.eq(Utc::now()))
                    .execute(&mut conn)
                    .await?;

                tracing::debug!("Dispatched and marked event {} as processed", event.id);
            }
            Err(e) => {
                diesel::update(outbox_events::table.filter(outbox_events::id.eq(event.id)))
                    .set((
                        outbox_events::retry_count.eq(outbox_events::retry_count + 1),
                        outbox_events::error_message.eq(Some(format!("{}", e))),
                    ))
                    .execute(&mut conn)
                    .await?;

                tracing::warn!("Failed to dispatch event {}: {}", event.id, e);
            }
        }
    }

    Ok(())
}

/// Every event type carries a `user_id`; all of them funnel into a badge
/// re-evaluation for that user.
async fn dispatch_event(
    engine: &BadgeEngine,
    event_type: &str,
    event_data: &serde_json::Value,
) -> Result<()> {
    let user_id = event_data
        .get("user_id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("event {} has no user_id", event_type))?;

    let awarded = engine.evaluate(user_id).await?;
    if !awarded.is_empty() {
        tracing::debug!(
            "Event {} triggered {} badge award(s) for user {}",
            event_type,
            awarded.len(),
            user_id
        );
    }
    Ok(())
}
