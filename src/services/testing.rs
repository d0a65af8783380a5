use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::db;
use crate::services::realtime::ChangeFeed;
use crate::services::storage::BlobStorage;
use crate::services::validation::{RepairForm, SlotInput};
use crate::state::AppState;

#[derive(Default)]
pub struct MockStorage {
    pub uploads: Arc<Mutex<Vec<(String, String, usize)>>>,
    pub fail: bool,
}

#[async_trait]
impl BlobStorage for MockStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<String> {
        if self.fail {
            anyhow::bail!("storage unavailable");
        }
        self.uploads
            .lock()
            .unwrap()
            .push((bucket.to_string(), path.to_string(), bytes.len()));
        Ok(path.to_string())
    }

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: u64,
    ) -> anyhow::Result<String> {
        Ok(format!("https://storage.test/{bucket}/{path}?expires={expires_in}"))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        jwt_secret: "test-secret".to_string(),
        webhook_secret: String::new(),
        storage_url: "http://localhost:54321".to_string(),
        storage_service_key: String::new(),
        police_report_bucket: "police-reports".to_string(),
        signed_url_ttl_secs: 3600,
    }
}

pub fn state_with_storage(storage: MockStorage) -> AppState {
    let conn = db::init_db(":memory:").unwrap();
    AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        storage: Box::new(storage),
        changes: ChangeFeed::new(64),
    }
}

pub fn test_state() -> AppState {
    state_with_storage(MockStorage::default())
}

pub fn repair_form() -> RepairForm {
    RepairForm {
        reg_number: "ABC-123DE".to_string(),
        postcode: "100001".to_string(),
        make: "Toyota".to_string(),
        model: "Corolla".to_string(),
        year: "2015".to_string(),
        transmission: "Manual".to_string(),
        fuel_type: "Petrol".to_string(),
        mileage: None,
        work_types: vec!["Diagnostics".to_string()],
        full_name: "Amaka Obi".to_string(),
        phone: "08031234567".to_string(),
        email: "amaka@example.com".to_string(),
        address1: "12 Allen Avenue".to_string(),
        address2: None,
        city: "Ikeja".to_string(),
        state: "Lagos".to_string(),
        country: "Nigeria".to_string(),
        problem_description: "Engine knocks when cold".to_string(),
        availability: vec![SlotInput {
            date: "2025-06-01".to_string(),
            start: "09:00".to_string(),
            end: "10:00".to_string(),
        }],
    }
}
