use axum::{
    extract::{Extension, Path, Query},
    response::Json,
};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::error::ApiResult;
use crate::server::ApiState;

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let notifications = state
        .notifier
        .list(user.user_id, params.limit.unwrap_or(50), params.offset.unwrap_or(0))
        .await?;
    Ok(Json(serde_json::json!(notifications)))
}

pub async fn unread_count(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.notifier.unread_count(user.user_id).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

pub async fn mark_read(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.notifier.mark_read(user.user_id, id).await?;
    Ok(Json(serde_json::json!({ "read": true })))
}

pub async fn mark_all_read(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state.notifier.mark_all_read(user.user_id).await?;
    Ok(Json(serde_json::json!({ "read": updated })))
}

pub async fn remove(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.notifier.delete(user.user_id, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
