//! One scrape cycle: listing fetch, detail fetches, reconciliation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::{CycleError, Result};
use crate::models::{ArticleSummary, Config, ItemFailure, ScrapeCycleResult};
use crate::notify::Notifier;
use crate::pipeline::reconcile::{BatchItem, Reconciler};
use crate::services::{ArticleParser, Fetch};
use crate::storage::ArticleStorage;

/// Tunables of a cycle, taken from the configuration.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub listing_url: String,
    pub max_concurrent: usize,
    pub request_delay: Duration,
    /// Reuse stored content instead of fetching known articles again
    pub skip_known: bool,
}

impl CycleOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            listing_url: config.source.listing_url.clone(),
            max_concurrent: config.crawler.max_concurrent,
            request_delay: config.crawler.request_delay(),
            skip_known: config.source.skip_known,
        }
    }
}

/// Runs scrape cycles against one source.
pub struct ScrapePipeline {
    fetcher: Arc<dyn Fetch>,
    parser: Arc<ArticleParser>,
    store: Arc<dyn ArticleStorage>,
    reconciler: Reconciler,
    options: CycleOptions,
}

impl ScrapePipeline {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        parser: Arc<ArticleParser>,
        store: Arc<dyn ArticleStorage>,
        notifier: Arc<dyn Notifier>,
        options: CycleOptions,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(Arc::clone(&store), notifier),
            fetcher,
            parser,
            store,
            options,
        }
    }

    /// Build the pipeline from configuration.
    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn Fetch>,
        store: Arc<dyn ArticleStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let parser = Arc::new(ArticleParser::from_config(config)?);
        Ok(Self::new(
            fetcher,
            parser,
            store,
            notifier,
            CycleOptions::from_config(config),
        ))
    }

    pub fn parser(&self) -> &ArticleParser {
        &self.parser
    }

    /// Run one full cycle.
    ///
    /// Fails only when the listing page cannot be fetched, or when `stop` is
    /// raised before any write happened. Everything else ends up in the
    /// returned counters.
    pub async fn run_cycle(
        &self,
        cycle_id: u64,
        stop: &AtomicBool,
    ) -> std::result::Result<ScrapeCycleResult, CycleError> {
        let started_at = Utc::now();
        log::info!("Cycle #{} started: {}", cycle_id, self.options.listing_url);

        let listing_html = self
            .fetcher
            .fetch(&self.options.listing_url)
            .await
            .map_err(CycleError::Listing)?;

        let mut batch: Vec<BatchItem> = Vec::new();
        let mut summaries = Vec::new();
        let mut listed = 0;

        for (position, entry) in self.parser.parse_listing(&listing_html).into_iter().enumerate() {
            listed += 1;
            match entry {
                Ok(summary) => summaries.push(summary),
                Err(error) => batch.push(Err(ItemFailure::listing(position, &error))),
            }
        }
        log::info!(
            "Cycle #{}: {} listing entries, {} articles",
            cycle_id,
            listed,
            summaries.len()
        );

        let to_fetch = if self.options.skip_known {
            self.reuse_known(summaries, &mut batch).await
        } else {
            summaries
        };

        batch.extend(self.fetch_details(to_fetch, stop).await);

        if stop.load(Ordering::SeqCst) {
            log::info!("Cycle #{} cancelled before reconciliation", cycle_id);
            return Err(CycleError::Cancelled);
        }

        let mut result = self.reconciler.reconcile_until(batch, stop).await;
        result.cycle_id = cycle_id;
        result.listed = listed;
        result.started_at = started_at;
        result.finished_at = Utc::now();

        log::info!("{}", result.summary());
        Ok(result)
    }

    /// Move already stored articles straight into the batch.
    async fn reuse_known(
        &self,
        summaries: Vec<ArticleSummary>,
        batch: &mut Vec<BatchItem>,
    ) -> Vec<ArticleSummary> {
        let mut unknown = Vec::new();
        for summary in summaries {
            match self.store.get_by_id(&summary.external_id).await {
                Ok(Some(stored)) => {
                    log::debug!("Article already stored, skipping fetch: {}", summary.url);
                    batch.push(Ok(stored.to_detail(summary.list_position)));
                }
                Ok(None) => unknown.push(summary),
                Err(error) => {
                    log::warn!("Store lookup failed for {}: {}", summary.external_id, error);
                    unknown.push(summary);
                }
            }
        }
        unknown
    }

    /// Fetch and parse article pages with bounded concurrency, in listing order.
    async fn fetch_details(&self, summaries: Vec<ArticleSummary>, stop: &AtomicBool) -> Vec<BatchItem> {
        let delay = self.options.request_delay;
        let concurrency = self.options.max_concurrent.max(1);

        let mut detail_stream = stream::iter(summaries)
            .map(|summary| async move { self.fetch_detail(summary).await })
            .buffered(concurrency);

        let mut items = Vec::new();
        while let Some(item) = detail_stream.next().await {
            items.push(item);

            if stop.load(Ordering::SeqCst) {
                break;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        items
    }

    async fn fetch_detail(&self, summary: ArticleSummary) -> BatchItem {
        let html = self
            .fetcher
            .fetch(&summary.url)
            .await
            .map_err(|e| ItemFailure::fetch(&summary.external_id, &e))?;

        self.parser
            .parse_detail(&html, &summary)
            .map_err(|e| ItemFailure::parse(&summary.external_id, &summary.url, &e))
    }
}
