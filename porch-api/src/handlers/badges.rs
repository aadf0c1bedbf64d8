use axum::{extract::Extension, response::Json};

use crate::auth::AuthenticatedUser;
use crate::error::ApiResult;
use crate::server::ApiState;

pub async fn progress(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let progress = state.badges.progress(user.user_id).await?;
    Ok(Json(serde_json::json!(progress)))
}
