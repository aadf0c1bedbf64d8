use diesel::sql_types::BigInt;
use diesel_async::RunQueryDsl;

use crate::db::DbConnection;
use crate::error::Result;
use crate::types::StatKind;

/// Increment one per-user counter, creating the stats row on first touch.
/// The column name comes from the closed `StatKind` enum, never from input.
pub async fn increment(conn: &mut DbConnection, user_id: i64, stat: StatKind) -> Result<()> {
    let col = stat.column();
    let query = format!(
        "INSERT INTO user_stats (user_id, {col}) VALUES ($1, 1) \
         ON CONFLICT (user_id) DO UPDATE \
         SET {col} = user_stats.{col} + 1, updated_at = NOW()",
    );

    diesel::sql_query(query)
        .bind::<BigInt, _>(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Set an absolute counter value (used when the counter is a derived count
/// recomputed by its owning component, e.g. trusted contacts).
pub async fn set(conn: &mut DbConnection, user_id: i64, stat: StatKind, value: i32) -> Result<()> {
    let col = stat.column();
    let query = format!(
        "INSERT INTO user_stats (user_id, {col}) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE \
         SET {col} = EXCLUDED.{col}, updated_at = NOW()",
    );

    diesel::sql_query(query)
        .bind::<BigInt, _>(user_id)
        .bind::<diesel::sql_types::Integer, _>(value)
        .execute(conn)
        .await?;
    Ok(())
}
