//! Read API over the article store.
//!
//! ```text
//! GET /api/articles              paginated list
//! GET /api/articles/{id}         one article
//! GET /api/authors               authors with article counts
//! GET /api/tags                  tag catalog
//! GET /api/cycles                recent scrape cycles
//! GET /api/status                scheduler and store status
//! GET /api/events                new-article event stream (SSE)
//! ```

mod error;
mod handlers;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::models::ApiConfig;
use crate::notify::BroadcastNotifier;
use crate::pipeline::{CycleHistory, Scheduler};
use crate::services::TagCatalog;
use crate::storage::ArticleStorage;

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ArticleStorage>,
    pub catalog: Arc<TagCatalog>,
    pub history: Arc<CycleHistory>,
    /// Absent when the API is served without a running scheduler
    pub scheduler: Option<Arc<Scheduler>>,
    pub notifier: BroadcastNotifier,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ArticleStorage>,
        catalog: Arc<TagCatalog>,
        history: Arc<CycleHistory>,
        notifier: BroadcastNotifier,
        config: &ApiConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            history,
            scheduler: None,
            notifier,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.history = scheduler.history();
        self.scheduler = Some(scheduler);
        self
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/articles", get(handlers::list_articles))
        .route("/api/articles/{external_id}", get(handlers::get_article))
        .route("/api/authors", get(handlers::list_authors))
        .route("/api/tags", get(handlers::list_tags))
        .route("/api/cycles", get(handlers::list_cycles))
        .route("/api/status", get(handlers::status))
        .route("/api/events", get(handlers::events))
        .with_state(state)
}
