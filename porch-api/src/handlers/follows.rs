use axum::{
    extract::{Extension, Path},
    response::Json,
};

use crate::auth::AuthenticatedUser;
use crate::error::ApiResult;
use crate::server::ApiState;

pub async fn follow(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(target): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state.social.follow(user.user_id, target).await?;
    Ok(Json(serde_json::json!(outcome)))
}

pub async fn unfollow(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(target): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.social.unfollow(user.user_id, target).await?;
    Ok(Json(serde_json::json!({ "unfollowed": true })))
}
