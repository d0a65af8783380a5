use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use repairdesk::config::AppConfig;
use repairdesk::db;
use repairdesk::handlers;
use repairdesk::services::realtime::ChangeFeed;
use repairdesk::services::storage::supabase::SupabaseStorage;
use repairdesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    anyhow::ensure!(!config.jwt_secret.is_empty(), "JWT_SECRET must be set");
    if config.webhook_secret.is_empty() {
        tracing::warn!("WEBHOOK_SECRET not set, identity webhooks will be rejected");
    }

    let conn = db::init_db(&config.database_url)?;

    tracing::info!(url = %config.storage_url, bucket = %config.police_report_bucket, "using storage");
    let storage = SupabaseStorage::new(
        config.storage_url.clone(),
        config.storage_service_key.clone(),
    );

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        storage: Box::new(storage),
        changes: ChangeFeed::default(),
    });

    let app = handlers::build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
