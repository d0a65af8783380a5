pub mod events;
pub mod health;
pub mod mechanic;
pub mod repairs;
pub mod users;
pub mod webhook;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Police reports are scanned PDFs and run larger than the default body limit.
const UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/me", get(users::me))
        .route(
            "/api/repairs",
            post(repairs::create_repair).get(repairs::list_repairs),
        )
        .route("/api/repairs/estimate", get(repairs::estimate))
        .route("/api/repairs/validate/:stage", post(repairs::validate_stage))
        .route(
            "/api/repairs/:id",
            get(repairs::get_repair)
                .patch(repairs::update_repair)
                .delete(repairs::delete_repair),
        )
        .route("/api/mechanic/repairs", get(mechanic::list_repairs))
        .route(
            "/api/mechanic/repairs/:id/accept",
            post(mechanic::accept_repair),
        )
        .route(
            "/api/mechanic/repairs/:id/status",
            post(mechanic::advance_status),
        )
        .route(
            "/api/mechanic/applications",
            post(mechanic::submit_application).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/api/mechanic/application", get(mechanic::my_application))
        .route("/api/mechanics/:id", get(mechanic::get_profile))
        .route(
            "/api/mechanics/:id/police-report",
            get(mechanic::police_report_url),
        )
        .route("/api/realtime/:table", get(events::change_stream))
        .route("/webhooks/identity", post(webhook::identity_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
