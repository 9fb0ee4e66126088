//! Reconciliation of a scraped batch against the store.
//!
//! Items are processed sequentially, one conditional upsert each. Only
//! genuinely new articles are announced; content updates are counted but do
//! not notify.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StoreError;
use crate::models::{ArticleDetail, ItemFailure, ScrapeCycleResult};
use crate::notify::{ArticleEvent, Notifier};
use crate::storage::{ArticleStorage, UpsertKind};

/// One entry of a cycle's batch: a scraped article or why it could not be scraped.
pub type BatchItem = Result<ArticleDetail, ItemFailure>;

/// Merges scraped articles into the store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ArticleStorage>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ArticleStorage>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Reconcile a whole batch.
    pub async fn reconcile(&self, batch: Vec<BatchItem>) -> ScrapeCycleResult {
        self.reconcile_until(batch, &AtomicBool::new(false)).await
    }

    /// Reconcile until `stop` is raised; items not yet reached are left untouched.
    ///
    /// The returned result has a zero `cycle_id`; the caller stamps it.
    pub async fn reconcile_until(&self, batch: Vec<BatchItem>, stop: &AtomicBool) -> ScrapeCycleResult {
        let mut result = ScrapeCycleResult::new(0);

        for item in batch {
            if stop.load(Ordering::SeqCst) {
                log::info!(
                    "Stop requested, leaving remaining items after {} processed",
                    result.processed()
                );
                break;
            }

            let detail = match item {
                Ok(detail) => detail,
                Err(failure) => {
                    log::warn!(
                        "Skipping {} ({:?}): {}",
                        failure.external_id.as_deref().unwrap_or("listing entry"),
                        failure.stage,
                        failure.reason
                    );
                    result.record_failure(failure);
                    continue;
                }
            };

            let external_id = detail.external_id.clone();
            match self.store.upsert(detail).await {
                Ok(outcome) => match outcome.kind {
                    UpsertKind::Inserted => {
                        result.new += 1;
                        log::info!("New article {}: {}", external_id, outcome.article.title);
                        self.notifier
                            .publish(ArticleEvent::new_article(&outcome.article));
                    }
                    UpsertKind::Updated => {
                        result.updated += 1;
                        log::info!("Updated article {}", external_id);
                    }
                    UpsertKind::Unchanged => {
                        result.unchanged += 1;
                    }
                },
                Err(error @ StoreError::ConstraintViolation { .. }) => {
                    log::warn!("Rejected {}: {}", external_id, error);
                    result.record_failure(ItemFailure::store(&external_id, &error));
                }
                Err(error @ StoreError::Unavailable(_)) => {
                    log::error!("Store unavailable, aborting the rest of the batch: {}", error);
                    result.record_failure(ItemFailure::store(&external_id, &error));
                    result.aborted = Some(error.to_string());
                    break;
                }
            }
        }

        result.finished_at = chrono::Utc::now();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::error::{FetchError, ParseError};
    use crate::models::{FailureStage, StoredArticle};
    use crate::storage::{AuthorCount, ListQuery, LocalStorage, Page, StoreResult, UpsertOutcome};

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<ArticleEvent>>,
    }

    impl RecordingNotifier {
        fn ids(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.external_id.clone())
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn publish(&self, event: ArticleEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    /// Accepts `fail_after` writes, then reports itself unavailable.
    struct FlakyStore {
        inner: LocalStorage,
        fail_after: usize,
        writes: Mutex<usize>,
    }

    #[async_trait]
    impl ArticleStorage for FlakyStore {
        async fn upsert(&self, detail: ArticleDetail) -> StoreResult<UpsertOutcome> {
            {
                let mut writes = self.writes.lock().unwrap();
                if *writes >= self.fail_after {
                    return Err(StoreError::unavailable("disk full"));
                }
                *writes += 1;
            }
            self.inner.upsert(detail).await
        }

        async fn get_by_id(&self, external_id: &str) -> StoreResult<Option<StoredArticle>> {
            self.inner.get_by_id(external_id).await
        }

        async fn list(&self, query: &ListQuery) -> StoreResult<Page<StoredArticle>> {
            self.inner.list(query).await
        }

        async fn authors(&self) -> StoreResult<Vec<AuthorCount>> {
            self.inner.authors().await
        }

        async fn len(&self) -> StoreResult<usize> {
            self.inner.len().await
        }
    }

    fn detail(id: &str, body: &str, position: u32) -> ArticleDetail {
        ArticleDetail {
            external_id: id.to_string(),
            url: format!("https://tw-nba.udn.com/nba/story/7002/{id}"),
            title: format!("Title {id}"),
            thumbnail_url: None,
            published_at: None,
            list_position: position,
            author: None,
            body_text: body.to_string(),
            tags: BTreeSet::new(),
            content_hash: crate::utils::text::content_hash(body),
            scraped_at: Utc::now(),
        }
    }

    fn setup() -> (Reconciler, Arc<LocalStorage>, Arc<RecordingNotifier>) {
        let store = Arc::new(LocalStorage::in_memory());
        let notifier = Arc::new(RecordingNotifier::default());
        let reconciler = Reconciler::new(store.clone(), notifier.clone());
        (reconciler, store, notifier)
    }

    async fn snapshot(store: &LocalStorage) -> Vec<StoredArticle> {
        store
            .list(&ListQuery {
                page: 1,
                page_size: 100,
                ..ListQuery::default()
            })
            .await
            .unwrap()
            .items
    }

    #[tokio::test]
    async fn test_reconcile_twice_is_idempotent() {
        let (reconciler, store, notifier) = setup();
        let batch = || vec![Ok(detail("A", "a", 0)), Ok(detail("B", "b", 1))];

        let first = reconciler.reconcile(batch()).await;
        let state = snapshot(&store).await;
        let second = reconciler.reconcile(batch()).await;

        assert_eq!((first.new, first.unchanged), (2, 0));
        assert_eq!((second.new, second.updated, second.unchanged), (0, 0, 2));
        assert_eq!(snapshot(&store).await, state);
        assert_eq!(notifier.ids(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_unchanged_content_emits_no_event() {
        let (reconciler, _store, notifier) = setup();
        reconciler.reconcile(vec![Ok(detail("A", "a", 0))]).await;
        reconciler.reconcile(vec![Ok(detail("A", "a", 3))]).await;

        assert_eq!(notifier.ids(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let (reconciler, store, _notifier) = setup();
        let timeout = FetchError::Timeout {
            url: "https://tw-nba.udn.com/nba/story/7002/B".into(),
        };

        let result = reconciler
            .reconcile(vec![
                Ok(detail("A", "a", 0)),
                Err(ItemFailure::fetch("B", &timeout)),
                Err(ItemFailure::parse("C", "https://x/C", &ParseError::missing("title"))),
                Ok(detail("D", "d", 3)),
            ])
            .await;

        assert_eq!((result.new, result.failed), (2, 2));
        assert_eq!(result.failures[0].stage, FailureStage::Fetch);
        assert_eq!(result.failures[1].stage, FailureStage::Parse);
        assert!(store.get_by_id("B").await.unwrap().is_none());
        assert!(store.get_by_id("D").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_changed_content_updates_without_event() {
        let (reconciler, store, notifier) = setup();
        reconciler.reconcile(vec![Ok(detail("B", "old", 1))]).await;
        let before = store.get_by_id("B").await.unwrap().unwrap();

        let result = reconciler.reconcile(vec![Ok(detail("B", "new", 1))]).await;

        let after = store.get_by_id("B").await.unwrap().unwrap();
        assert_eq!(result.updated, 1);
        assert!(after.last_updated_at > before.last_updated_at);
        assert_eq!(after.body_text, "new");
        assert_eq!(notifier.ids(), vec!["B"]);
    }

    #[tokio::test]
    async fn test_constraint_violation_fails_item_only() {
        let (reconciler, _store, _notifier) = setup();
        let result = reconciler
            .reconcile(vec![Ok(detail("", "x", 0)), Ok(detail("A", "a", 1))])
            .await;

        assert_eq!((result.new, result.failed), (1, 1));
        assert_eq!(result.failures[0].stage, FailureStage::Store);
        assert!(result.aborted.is_none());
    }

    #[tokio::test]
    async fn test_store_unavailable_aborts_rest() {
        let store = Arc::new(FlakyStore {
            inner: LocalStorage::in_memory(),
            fail_after: 1,
            writes: Mutex::new(0),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let reconciler = Reconciler::new(store.clone(), notifier.clone());

        let result = reconciler
            .reconcile(vec![
                Ok(detail("A", "a", 0)),
                Ok(detail("B", "b", 1)),
                Ok(detail("C", "c", 2)),
            ])
            .await;

        assert_eq!((result.new, result.failed), (1, 1));
        assert_eq!(result.aborted.as_deref(), Some("store unavailable: disk full"));
        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(notifier.ids(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_stop_flag_leaves_items_untouched() {
        let (reconciler, store, _notifier) = setup();
        let stop = AtomicBool::new(true);

        let result = reconciler
            .reconcile_until(vec![Ok(detail("A", "a", 0))], &stop)
            .await;

        assert_eq!(result.processed(), 0);
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
