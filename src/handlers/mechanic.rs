use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, MechanicApplication, MechanicProfile};
use crate::services::lifecycle::{self, MechanicScope};
use crate::services::mechanics::{self, ReportUpload};
use crate::services::validation::MechanicForm;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ScopeQuery {
    pub scope: Option<MechanicScope>,
}

// GET /api/mechanic/repairs?scope=all|open|assigned
pub async fn list_repairs(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let scope = query.scope.unwrap_or_default();
    Ok(Json(lifecycle::list_for_mechanic(&state, &caller, scope)?))
}

// POST /api/mechanic/repairs/:id/accept
pub async fn accept_repair(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(lifecycle::assign_mechanic(&state, &caller, &id)?))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

// POST /api/mechanic/repairs/:id/status
pub async fn advance_status(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Booking>, AppError> {
    let target = BookingStatus::parse(&req.status)
        .ok_or_else(|| AppError::invalid_field("status", "Unknown status"))?;
    Ok(Json(lifecycle::advance_status(&state, &caller, &id, target)?))
}

// POST /api/mechanic/applications (multipart)
pub async fn submit_application(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MechanicApplication>), AppError> {
    let mut form = MechanicForm::default();
    let mut report = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "policeReport" {
            let file_name = field.file_name().unwrap_or("police-report.pdf").to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
            report = Some(ReportUpload {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read field {name}: {e}")))?;
        match name.as_str() {
            "firstName" => form.first_name = value,
            "lastName" => form.last_name = value,
            "email" => form.email = value,
            "phone" => form.phone = value,
            "postcode" => form.postcode = value,
            "address" => form.address = Some(value),
            other => tracing::debug!(field = %other, "ignoring unknown application field"),
        }
    }

    let application = mechanics::submit_application(&state, &caller, form, report).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

// GET /api/mechanic/application
pub async fn my_application(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<MechanicApplication>, AppError> {
    Ok(Json(mechanics::my_application(&state, &caller)?))
}

// GET /api/mechanics/:id
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(mechanic_id): Path<String>,
) -> Result<Json<MechanicProfile>, AppError> {
    Ok(Json(mechanics::profile(&state, &caller, &mechanic_id)?))
}

// GET /api/mechanics/:id/police-report
pub async fn police_report_url(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(mechanic_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let url = mechanics::police_report_url(&state, &caller, &mechanic_id).await?;
    Ok(Json(serde_json::json!({
        "url": url,
        "expires_in": state.config.signed_url_ttl_secs,
    })))
}
