use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::UserType;
use crate::state::AppState;

/// Bearer token claims. `sub` is the identity-provider user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// The authenticated caller, with the role mirrored in the `users` table.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub role: Option<UserType>,
}

impl AuthUser {
    pub fn customer(id: &str) -> Self {
        Self {
            id: id.to_string(),
            role: None,
        }
    }

    pub fn mechanic(id: &str) -> Self {
        Self {
            id: id.to_string(),
            role: Some(UserType::Mechanic),
        }
    }

    pub fn is_mechanic(&self) -> bool {
        self.role == Some(UserType::Mechanic)
    }

    pub fn require_mechanic(&self) -> Result<(), AppError> {
        if self.is_mechanic() {
            Ok(())
        } else {
            Err(AppError::Forbidden("mechanic account required".into()))
        }
    }
}

pub fn issue_token(user_id: &str, secret: &str, ttl_secs: i64) -> anyhow::Result<String> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.max(0) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        AppError::Unauthorized
    })?;

    if data.claims.sub.is_empty() {
        return Err(AppError::Unauthorized);
    }
    Ok(data.claims)
}

#[derive(Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Reads `Authorization: Bearer ...`, falling back to an `access_token` query
/// parameter (EventSource can't set headers).
fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = header {
        return Some(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|q| q.0.access_token)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.config.jwt_secret.is_empty() {
            return Err(AppError::Config("JWT_SECRET is not set".into()));
        }

        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let claims = verify_token(&token, &state.config.jwt_secret)?;

        let role = {
            let db = state.conn();
            queries::get_user_type(&db, &claims.sub)?
        };

        Ok(AuthUser {
            id: claims.sub,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = issue_token("user_1", "secret", 60).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user_1");
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let token = issue_token("user_1", "secret", 60).unwrap();
        assert!(matches!(
            verify_token(&token, "other"),
            Err(AppError::Unauthorized)
        ));

        let expired = issue_token("user_1", "secret", -3600).unwrap();
        assert!(matches!(
            verify_token(&expired, "secret"),
            Err(AppError::Unauthorized)
        ));
        assert!(verify_token("not-a-jwt", "secret").is_err());
    }

    #[test]
    fn test_bearer_token_sources() {
        let req = axum::http::Request::builder()
            .uri("/api/realtime/repairs?access_token=abc")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(bearer_token(&parts).as_deref(), Some("abc"));

        let req = axum::http::Request::builder()
            .uri("/api/repairs?access_token=query")
            .header("authorization", "Bearer header")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(bearer_token(&parts).as_deref(), Some("header"));

        let req = axum::http::Request::builder()
            .uri("/api/repairs")
            .header("authorization", "Basic abc")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(bearer_token(&parts), None);
    }
}
