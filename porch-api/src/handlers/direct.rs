use axum::{
    extract::{Extension, Path, Query},
    response::Json,
};
use serde::Deserialize;

use porch_messaging::SendDirectMessage;

use crate::auth::AuthenticatedUser;
use crate::error::ApiResult;
use crate::server::ApiState;

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub before: Option<i64>,
}

#[derive(Deserialize)]
pub struct EditBody {
    pub content: String,
}

#[derive(Deserialize)]
pub struct ReactBody {
    pub emoji: String,
}

pub async fn send(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<SendDirectMessage>,
) -> ApiResult<Json<serde_json::Value>> {
    let message = state.messaging.send_direct(user.user_id, body).await?;
    Ok(Json(serde_json::json!(message)))
}

pub async fn conversations(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let summaries = state.messaging.conversations(user.user_id).await?;
    Ok(Json(serde_json::json!(summaries)))
}

pub async fn unread_count(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.messaging.unread_direct_count(user.user_id).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

pub async fn list(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(peer_id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let messages = state
        .messaging
        .list_direct(user.user_id, peer_id, page.before, page.limit)
        .await?;
    Ok(Json(serde_json::json!(messages)))
}

pub async fn edit(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<EditBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let message = state
        .messaging
        .edit_direct(user.user_id, id, &body.content)
        .await?;
    Ok(Json(serde_json::json!(message)))
}

pub async fn remove(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.messaging.delete_direct(user.user_id, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn react(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<ReactBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .messaging
        .react_direct(user.user_id, id, &body.emoji)
        .await?;
    Ok(Json(serde_json::json!({ "reacted": true })))
}
