use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::User;
use crate::state::AppState;

/// Accepted clock skew between the sender and us.
const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    email_address: String,
}

/// User payload sent by the identity provider. Times are unix milliseconds.
#[derive(Debug, Deserialize)]
struct IdentityUser {
    id: String,
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
    created_at: Option<i64>,
    updated_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DeletedUser {
    id: String,
}

fn webhook_mac(
    secret: &str,
    msg_id: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<Hmac<Sha256>, AppError> {
    let key = STANDARD
        .decode(secret.strip_prefix("whsec_").unwrap_or(secret))
        .map_err(|_| AppError::Config("webhook secret is not valid base64".into()))?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|_| AppError::Config("invalid webhook key".into()))?;
    mac.update(msg_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// `v1,<base64>` signature for a payload, as the sender computes it.
pub fn sign(secret: &str, msg_id: &str, timestamp: &str, body: &[u8]) -> Result<String, AppError> {
    let mac = webhook_mac(secret, msg_id, timestamp, body)?;
    Ok(format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes())))
}

/// Checks a space-separated list of `v1,<base64>` signatures. Any one valid
/// entry is enough.
pub fn verify_signature(
    secret: &str,
    msg_id: &str,
    timestamp: &str,
    body: &[u8],
    signatures: &str,
    now: i64,
) -> Result<(), AppError> {
    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| AppError::BadRequest("invalid webhook timestamp".into()))?;
    if (now - sent_at).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(AppError::BadRequest("webhook timestamp out of tolerance".into()));
    }

    let mac = webhook_mac(secret, msg_id, timestamp, body)?;
    let valid = signatures
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix("v1,"))
        .filter_map(|sig| STANDARD.decode(sig).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());

    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest("invalid webhook signature".into()))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(format!("missing {name} header")))
}

fn format_millis(millis: Option<i64>) -> String {
    millis
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.naive_utc().format(queries::TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(queries::now_timestamp)
}

// POST /webhooks/identity
pub async fn identity_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.config.webhook_secret.is_empty() {
        tracing::error!("WEBHOOK_SECRET not configured, rejecting identity webhook");
        return Err(AppError::Config("webhook secret not configured".into()));
    }

    let msg_id = header(&headers, "svix-id")?;
    let timestamp = header(&headers, "svix-timestamp")?;
    let signatures = header(&headers, "svix-signature")?;

    if let Err(e) = verify_signature(
        &state.config.webhook_secret,
        msg_id,
        timestamp,
        &body,
        signatures,
        chrono::Utc::now().timestamp(),
    ) {
        tracing::warn!(msg_id = %msg_id, error = %e, "identity webhook verification failed");
        return Err(e);
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid webhook payload: {e}")))?;

    tracing::info!(msg_id = %msg_id, kind = %event.kind, "identity webhook received");

    match event.kind.as_str() {
        "user.created" | "user.updated" => {
            let data: IdentityUser = serde_json::from_value(event.data)
                .map_err(|e| AppError::BadRequest(format!("invalid user payload: {e}")))?;

            let user = {
                let db = state.conn();
                queries::upsert_user(
                    &db,
                    &User {
                        id: data.id.clone(),
                        email: data.email_addresses.first().map(|e| e.email_address.clone()),
                        first_name: data.first_name,
                        last_name: data.last_name,
                        avatar_url: data.image_url,
                        user_type: None,
                    },
                    &format_millis(data.created_at),
                    &format_millis(data.updated_at),
                )?;
                queries::get_user(&db, &data.id)?
            };
            Ok(Json(serde_json::json!({ "user": user })))
        }
        "user.deleted" => {
            let data: DeletedUser = serde_json::from_value(event.data)
                .map_err(|e| AppError::BadRequest(format!("invalid user payload: {e}")))?;
            let removed = {
                let db = state.conn();
                queries::delete_user(&db, &data.id)?
            };
            tracing::info!(user_id = %data.id, removed, "identity user deleted");
            Ok(Json(serde_json::json!({ "success": true })))
        }
        other => {
            tracing::debug!(kind = %other, "ignoring identity webhook event");
            Ok(Json(serde_json::json!({ "success": true })))
        }
    }
}
