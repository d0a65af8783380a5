use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::realtime::ChangeFeed;
use crate::services::storage::BlobStorage;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub storage: Box<dyn BlobStorage>,
    pub changes: ChangeFeed,
}

impl AppState {
    /// Locks the connection. A panic while holding the lock leaves SQLite in a
    /// consistent state, so a poisoned lock is recovered rather than propagated.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }
}
