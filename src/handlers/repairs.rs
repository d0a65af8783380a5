use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{Booking, RepairUpdate};
use crate::services::lifecycle;
use crate::services::validation::{self, FormStage, PriceEstimate, RepairForm};
use crate::services::wizard::BookingWizard;
use crate::state::AppState;

// POST /api/repairs
pub async fn create_repair(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(form): Json<RepairForm>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = lifecycle::create(&state, &caller, &form)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/repairs
pub async fn list_repairs(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(lifecycle::list(&state, &caller)?))
}

#[derive(Deserialize)]
pub struct EstimateQuery {
    pub work_types: Option<String>,
}

// GET /api/repairs/estimate?work_types=Repair,MOT
pub async fn estimate(Query(query): Query<EstimateQuery>) -> Json<PriceEstimate> {
    let names: Vec<&str> = query
        .work_types
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    Json(validation::estimate_for_names(&names))
}

// POST /api/repairs/validate/:stage
pub async fn validate_stage(
    Path(stage): Path<String>,
    Json(form): Json<RepairForm>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stage = FormStage::parse(&stage)
        .ok_or_else(|| AppError::BadRequest(format!("unknown form stage: {stage}")))?;

    let mut wizard = BookingWizard::at(stage, form);
    let next = wizard.next().map_err(AppError::Validation)?;

    let mut body = serde_json::json!({
        "stage": stage,
        "next": next,
        "estimate": wizard.estimate(),
    });
    if next == FormStage::Review {
        body["summary"] = serde_json::to_value(wizard.summary()).unwrap_or_default();
    }
    Ok(Json(body))
}

// GET /api/repairs/:id
pub async fn get_repair(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(lifecycle::get_by_id(&state, &caller, &id)?))
}

// PATCH /api/repairs/:id
pub async fn update_repair(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(fields): Json<RepairUpdate>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(lifecycle::update(&state, &caller, &id, &fields)?))
}

// DELETE /api/repairs/:id
pub async fn delete_repair(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    lifecycle::delete(&state, &caller, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
