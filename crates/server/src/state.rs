use std::sync::Arc;

use db::{DBService, models::page::PageRequest};

use crate::config::AppConfig;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: DBService, config: AppConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Page request from `?page=&page_size=` using the configured default size.
    pub fn page_request(&self, page: Option<u64>, page_size: Option<u64>) -> PageRequest {
        PageRequest::new(page, page_size, self.config.page_size)
    }
}
