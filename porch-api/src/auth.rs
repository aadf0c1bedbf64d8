use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::server::ApiState;

/// JWT claims. `sub` is the numeric user id, issued by the identity service
/// upstream of this subsystem.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: i64,
}

fn extract_token(auth_header: Option<&str>) -> Option<String> {
    auth_header?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
}

pub fn generate_token(user_id: i64, secret: &str, expires_in_days: u64) -> Result<String, StatusCode> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .as_secs() as usize;

    let claims = Claims {
        sub: user_id,
        exp: now + (expires_in_days * 24 * 60 * 60) as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref())).map_err(|e| {
        tracing::error!("Failed to generate JWT token: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub fn verify_token(token: &str, secret: &str) -> Result<i64, StatusCode> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());
    let validation = Validation::default();

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(token_data) => Ok(token_data.claims.sub),
        Err(e) => {
            tracing::debug!("JWT verification failed: {}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Bearer-token middleware. `/health` is open; `/ws` authenticates itself
/// from the handshake query string.
pub async fn auth_middleware(
    mut req: Request,
    next: axum::middleware::Next,
) -> Result<Response, StatusCode> {
    let path = req.uri().path();
    if path == "/health" || path.starts_with("/ws") {
        return Ok(next.run(req).await);
    }

    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match extract_token(auth_header) {
        Some(t) => t,
        None => {
            tracing::debug!("Missing Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let state = req
        .extensions()
        .get::<ApiState>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let user_id = verify_token(&token, &state.ctx.config.server.jwt_secret)?;

    req.extensions_mut().insert(AuthenticatedUser { user_id });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_token(Some("Bearer abc")), Some("abc".to_string()));
        assert_eq!(extract_token(Some("abc")), None);
        assert_eq!(extract_token(None), None);
    }

    #[test]
    fn round_trip_token_carries_the_user_id() {
        let token = generate_token(42, "test-secret", 1).unwrap();
        assert_eq!(verify_token(&token, "test-secret").unwrap(), 42);
        assert!(verify_token(&token, "other-secret").is_err());
    }
}
