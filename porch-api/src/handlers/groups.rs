use axum::{
    extract::{Extension, Path, Query},
    response::Json,
};
use serde::Deserialize;
use std::str::FromStr;

use porch_core::types::MemberRole;
use porch_core::Error;
use porch_groups::CreateGroup;
use porch_messaging::SendGroupMessage;

use crate::auth::AuthenticatedUser;
use crate::error::ApiResult;
use crate::handlers::direct::{EditBody, PageQuery, ReactBody};
use crate::server::ApiState;

#[derive(Deserialize)]
pub struct MemberBody {
    pub user_id: i64,
}

#[derive(Deserialize)]
pub struct InviteResolveBody {
    pub token: String,
}

#[derive(Deserialize)]
pub struct RoleBody {
    pub role: String,
}

pub async fn create(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateGroup>,
) -> ApiResult<Json<serde_json::Value>> {
    let group = state.groups.create_group(user.user_id, body).await?;
    Ok(Json(serde_json::json!(group)))
}

pub async fn send_message(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(group_id): Path<i64>,
    Json(body): Json<SendGroupMessage>,
) -> ApiResult<Json<serde_json::Value>> {
    let message = state
        .messaging
        .send_group(user.user_id, group_id, body)
        .await?;
    Ok(Json(serde_json::json!(message)))
}

pub async fn list_messages(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(group_id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let messages = state
        .messaging
        .list_group(user.user_id, group_id, page.before, page.limit)
        .await?;
    Ok(Json(serde_json::json!(messages)))
}

pub async fn edit_message(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((group_id, id)): Path<(i64, i64)>,
    Json(body): Json<EditBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let message = state
        .messaging
        .edit_group(user.user_id, group_id, id, &body.content)
        .await?;
    Ok(Json(serde_json::json!(message)))
}

pub async fn delete_message(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((group_id, id)): Path<(i64, i64)>,
) -> ApiResult<Json<serde_json::Value>> {
    state.messaging.delete_group(user.user_id, group_id, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn react_message(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((group_id, id)): Path<(i64, i64)>,
    Json(body): Json<ReactBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .messaging
        .react_group(user.user_id, group_id, id, &body.emoji)
        .await?;
    Ok(Json(serde_json::json!({ "reacted": true })))
}

pub async fn add_member(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(group_id): Path<i64>,
    Json(body): Json<MemberBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let membership = state
        .groups
        .add_member(user.user_id, group_id, body.user_id)
        .await?;
    Ok(Json(serde_json::json!(membership)))
}

pub async fn remove_member(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((group_id, member_id)): Path<(i64, i64)>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .groups
        .remove_member(user.user_id, group_id, member_id)
        .await?;
    Ok(Json(serde_json::json!({ "removed": true })))
}

pub async fn change_role(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((group_id, member_id)): Path<(i64, i64)>,
    Json(body): Json<RoleBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let role = MemberRole::from_str(&body.role).map_err(|_| Error::validation("unknown role"))?;
    let membership = state
        .groups
        .change_role(user.user_id, group_id, member_id, role)
        .await?;
    Ok(Json(serde_json::json!(membership)))
}

pub async fn invite(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(group_id): Path<i64>,
    Json(body): Json<MemberBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let membership = state
        .groups
        .invite(user.user_id, group_id, body.user_id)
        .await?;
    Ok(Json(serde_json::json!(membership)))
}

pub async fn list_invites(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let invites = state.groups.list_invites(user.user_id).await?;
    Ok(Json(serde_json::json!(invites)))
}

pub async fn accept_invite(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((group_id, invite_id)): Path<(i64, i64)>,
    Json(body): Json<InviteResolveBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let membership = state
        .groups
        .accept_invite(user.user_id, group_id, invite_id, &body.token)
        .await?;
    Ok(Json(serde_json::json!(membership)))
}

pub async fn reject_invite(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((group_id, invite_id)): Path<(i64, i64)>,
    Json(body): Json<InviteResolveBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .groups
        .reject_invite(user.user_id, group_id, invite_id, &body.token)
        .await?;
    Ok(Json(serde_json::json!({ "rejected": true })))
}

pub async fn leave(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(group_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.groups.leave(user.user_id, group_id).await?;
    Ok(Json(serde_json::json!({ "left": true })))
}
