//! Wiring of the store, pipeline, scheduler and API from configuration.

use std::sync::Arc;

use crate::api::AppState;
use crate::error::Result;
use crate::models::Config;
use crate::notify::BroadcastNotifier;
use crate::pipeline::{ScrapePipeline, Scheduler};
use crate::services::{HttpFetcher, TagCatalog};
use crate::storage::{ArticleStorage, LocalStorage};

/// Every long-lived component of a running instance.
pub struct App {
    pub config: Config,
    pub store: Arc<LocalStorage>,
    pub notifier: BroadcastNotifier,
    pub pipeline: Arc<ScrapePipeline>,
    pub scheduler: Arc<Scheduler>,
}

impl App {
    /// Open the store and build all components.
    pub async fn build(config: Config) -> Result<Self> {
        let store = Arc::new(match &config.storage.dir {
            Some(dir) => LocalStorage::open(dir).await?,
            None => {
                log::warn!("No storage directory configured, articles are kept in memory only");
                LocalStorage::in_memory()
            }
        });
        let notifier = BroadcastNotifier::new(config.notifier.capacity);
        let fetcher = Arc::new(HttpFetcher::new(&config.crawler)?);

        let pipeline = Arc::new(ScrapePipeline::from_config(
            &config,
            fetcher,
            store.clone(),
            Arc::new(notifier.clone()),
        )?);
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&pipeline), &config.scheduler));

        Ok(Self {
            config,
            store,
            notifier,
            pipeline,
            scheduler,
        })
    }

    /// Handler state for the read API.
    pub fn api_state(&self) -> AppState {
        let store: Arc<dyn ArticleStorage> = self.store.clone();
        AppState::new(
            store,
            Arc::new(TagCatalog::new(self.config.tags.iter().cloned())),
            self.scheduler.history(),
            self.notifier.clone(),
            &self.config.api,
        )
        .with_scheduler(Arc::clone(&self.scheduler))
    }
}
