use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use porch_core::Error;

/// Wrapper turning domain errors into HTTP responses with a stable
/// machine-readable `error` code alongside the human message.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) | Error::EditWindowExpired | Error::LastAdminGuard => {
                StatusCode::CONFLICT
            }
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self.0);
        }
        // Storage details stay in the logs, not the response body.
        let message = match &self.0 {
            Error::Store(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        let body = Json(serde_json::json!({
            "error": self.0.code(),
            "message": message,
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_a_distinct_condition() {
        let cases = [
            (Error::Unauthorized, StatusCode::UNAUTHORIZED),
            (Error::Forbidden, StatusCode::FORBIDDEN),
            (Error::NotFound("x"), StatusCode::NOT_FOUND),
            (Error::Conflict("x"), StatusCode::CONFLICT),
            (Error::EditWindowExpired, StatusCode::CONFLICT),
            (Error::LastAdminGuard, StatusCode::CONFLICT),
            (Error::validation("x"), StatusCode::BAD_REQUEST),
            (Error::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn conflict_shaped_errors_keep_distinct_codes() {
        // All three return 409 but callers can still tell them apart.
        let codes: Vec<&str> = [Error::Conflict("x"), Error::EditWindowExpired, Error::LastAdminGuard]
            .iter()
            .map(|e| e.code())
            .collect();
        assert_eq!(codes.len(), 3);
        assert!(codes.windows(2).all(|w| w[0] != w[1]));
    }
}
