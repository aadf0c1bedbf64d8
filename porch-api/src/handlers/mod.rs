pub mod badges;
pub mod direct;
pub mod follows;
pub mod groups;
pub mod notifications;

use axum::response::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "porch-api"
    }))
}
