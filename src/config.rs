use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// HS256 secret the identity provider signs store-scoped bearer tokens with.
    pub jwt_secret: String,
    /// `whsec_`-prefixed secret for identity webhooks.
    pub webhook_secret: String,
    pub storage_url: String,
    pub storage_service_key: String,
    pub police_report_bucket: String,
    pub signed_url_ttl_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "repairdesk.db".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),
            storage_url: env::var("STORAGE_URL")
                .unwrap_or_else(|_| "http://localhost:54321".to_string()),
            storage_service_key: env::var("STORAGE_SERVICE_KEY").unwrap_or_default(),
            police_report_bucket: env::var("POLICE_REPORT_BUCKET")
                .unwrap_or_else(|_| "police-reports".to_string()),
            signed_url_ttl_secs: env::var("SIGNED_URL_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        }
    }
}
