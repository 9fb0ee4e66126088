//! Local storage implementation.
//!
//! Articles live in memory behind an async `RwLock`, indexed by id and by
//! each supported sort order. Writers are serialized by a separate mutex.
//! When a directory is configured, a write builds the snapshot under a read
//! lock, persists it (temp file + rename) with no index lock held, and only
//! then takes the write lock to commit in memory. A failed write leaves both
//! copies unchanged, and readers are never blocked by file I/O.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml     # Scraper configuration
//! └── articles.json   # Article snapshot
//! ```

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::error::{AppError, Result, StoreError};
use crate::models::{ArticleDetail, StoredArticle};
use crate::storage::{
    ArticleSnapshot, ArticleStorage, AuthorCount, ListQuery, OrderBy, Page, StoreResult,
    UpsertKind, UpsertOutcome,
};

const SNAPSHOT_KEY: &str = "articles.json";

/// Articles plus one ordered index per sort order.
#[derive(Debug, Default)]
struct ArticleIndex {
    articles: HashMap<String, StoredArticle>,
    by_position: BTreeSet<(u32, String)>,
    by_published: BTreeSet<(Reverse<Option<DateTime<Utc>>>, String)>,
    by_first_seen: BTreeSet<(Reverse<DateTime<Utc>>, String)>,
}

impl ArticleIndex {
    fn from_articles(articles: Vec<StoredArticle>) -> Self {
        let mut index = Self::default();
        for article in articles {
            index.insert(article);
        }
        index
    }

    fn insert(&mut self, article: StoredArticle) {
        let id = article.external_id.clone();
        if let Some(old) = self.articles.remove(&id) {
            self.by_position.remove(&(old.list_position, id.clone()));
            self.by_published
                .remove(&(Reverse(old.published_at), id.clone()));
            self.by_first_seen
                .remove(&(Reverse(old.first_seen_at), id.clone()));
        }

        self.by_position.insert((article.list_position, id.clone()));
        self.by_published
            .insert((Reverse(article.published_at), id.clone()));
        self.by_first_seen
            .insert((Reverse(article.first_seen_at), id.clone()));
        self.articles.insert(id, article);
    }

    fn ordered_ids(&self, order_by: OrderBy) -> Box<dyn Iterator<Item = &String> + '_> {
        match order_by {
            OrderBy::ListPosition => Box::new(self.by_position.iter().map(|(_, id)| id)),
            OrderBy::PublishedAt => Box::new(self.by_published.iter().map(|(_, id)| id)),
            OrderBy::FirstSeen => Box::new(self.by_first_seen.iter().map(|(_, id)| id)),
        }
    }

    /// All articles with `candidate` in place of its stored version.
    fn snapshot_with(&self, candidate: &StoredArticle) -> Vec<StoredArticle> {
        let mut articles: Vec<StoredArticle> = self
            .articles
            .values()
            .filter(|a| a.external_id != candidate.external_id)
            .cloned()
            .chain(std::iter::once(candidate.clone()))
            .collect();
        articles.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        articles
    }
}

/// In-process article store with optional JSON persistence.
#[derive(Debug)]
pub struct LocalStorage {
    root_dir: Option<PathBuf>,
    index: RwLock<ArticleIndex>,
    /// Held for a whole upsert; the index never changes between the
    /// decision and the commit.
    writer: Mutex<()>,
}

impl LocalStorage {
    /// Create an empty store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            root_dir: None,
            index: RwLock::new(ArticleIndex::default()),
            writer: Mutex::new(()),
        }
    }

    /// Create an empty store persisting under `root_dir` without loading it.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: Some(root_dir.into()),
            index: RwLock::new(ArticleIndex::default()),
            writer: Mutex::new(()),
        }
    }

    /// Open the store under `root_dir`, loading the existing snapshot if any.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        let articles = match read_json::<ArticleSnapshot>(&root_dir.join(SNAPSHOT_KEY)).await? {
            Some(snapshot) => snapshot.articles,
            None => {
                log::warn!("No {} found in {:?}, starting empty", SNAPSHOT_KEY, root_dir);
                Vec::new()
            }
        };
        log::info!("Loaded {} articles from {:?}", articles.len(), root_dir);

        Ok(Self {
            root_dir: Some(root_dir),
            index: RwLock::new(ArticleIndex::from_articles(articles)),
            writer: Mutex::new(()),
        })
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    async fn persist(&self, articles: Vec<StoredArticle>) -> Result<()> {
        let Some(root) = &self.root_dir else {
            return Ok(());
        };
        write_json(&root.join(SNAPSHOT_KEY), &ArticleSnapshot::new(articles)).await
    }
}

#[async_trait]
impl ArticleStorage for LocalStorage {
    async fn upsert(&self, detail: ArticleDetail) -> StoreResult<UpsertOutcome> {
        if detail.external_id.trim().is_empty() {
            return Err(StoreError::constraint(
                detail.external_id,
                "external_id must not be empty",
            ));
        }
        if detail.title.trim().is_empty() {
            return Err(StoreError::constraint(
                detail.external_id,
                "title must not be empty",
            ));
        }

        let _writer = self.writer.lock().await;

        let (kind, candidate, snapshot) = {
            let index = self.index.read().await;
            let (kind, candidate) = match index.articles.get(&detail.external_id) {
                None => (UpsertKind::Inserted, StoredArticle::from_detail(detail)),
                Some(existing) if existing.content_hash == detail.content_hash => {
                    if existing.list_position == detail.list_position {
                        return Ok(UpsertOutcome {
                            kind: UpsertKind::Unchanged,
                            article: existing.clone(),
                        });
                    }
                    let mut moved = existing.clone();
                    moved.list_position = detail.list_position;
                    (UpsertKind::Unchanged, moved)
                }
                Some(existing) => {
                    let mut updated = existing.clone();
                    updated.apply_update(detail);
                    (UpsertKind::Updated, updated)
                }
            };
            let snapshot = self
                .root_dir
                .is_some()
                .then(|| index.snapshot_with(&candidate));
            (kind, candidate, snapshot)
        };

        if let Some(articles) = snapshot {
            self.persist(articles)
                .await
                .map_err(StoreError::unavailable)?;
        }

        self.index.write().await.insert(candidate.clone());
        Ok(UpsertOutcome {
            kind,
            article: candidate,
        })
    }

    async fn get_by_id(&self, external_id: &str) -> StoreResult<Option<StoredArticle>> {
        Ok(self.index.read().await.articles.get(external_id).cloned())
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Page<StoredArticle>> {
        let index = self.index.read().await;
        let items = index
            .ordered_ids(query.order_by)
            .skip(query.offset())
            .take(query.page_size)
            .filter_map(|id| index.articles.get(id).cloned())
            .collect();

        Ok(Page {
            page: query.page.max(1),
            page_size: query.page_size,
            total: index.articles.len(),
            items,
        })
    }

    async fn authors(&self) -> StoreResult<Vec<AuthorCount>> {
        let index = self.index.read().await;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for author in index.articles.values().filter_map(|a| a.author.as_deref()) {
            *counts.entry(author).or_default() += 1;
        }

        let mut authors: Vec<AuthorCount> = counts
            .into_iter()
            .map(|(name, articles)| AuthorCount {
                name: name.to_string(),
                articles,
            })
            .collect();
        authors.sort_by(|a, b| b.articles.cmp(&a.articles).then_with(|| a.name.cmp(&b.name)));
        Ok(authors)
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.index.read().await.articles.len())
    }
}

/// Write bytes atomically (write to temp, then rename).
async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &bytes).await
}

/// Read JSON data, returning None if the file doesn't exist.
async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

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

    #[tokio::test]
    async fn test_upsert_insert_update_unchanged() {
        let store = LocalStorage::in_memory();

        let first = store.upsert(detail("A", "one", 0)).await.unwrap();
        assert_eq!(first.kind, UpsertKind::Inserted);

        let again = store.upsert(detail("A", "one", 0)).await.unwrap();
        assert_eq!(again.kind, UpsertKind::Unchanged);
        assert_eq!(again.article, first.article);

        let changed = store.upsert(detail("A", "two", 0)).await.unwrap();
        assert_eq!(changed.kind, UpsertKind::Updated);
        assert!(changed.article.last_updated_at > first.article.last_updated_at);
        assert_eq!(changed.article.first_seen_at, first.article.first_seen_at);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_refreshes_position_only() {
        let store = LocalStorage::in_memory();
        let first = store.upsert(detail("A", "one", 0)).await.unwrap();

        let moved = store.upsert(detail("A", "one", 4)).await.unwrap();
        assert_eq!(moved.kind, UpsertKind::Unchanged);
        assert_eq!(moved.article.list_position, 4);
        assert_eq!(moved.article.last_updated_at, first.article.last_updated_at);

        let page = store.list(&ListQuery::default()).await.unwrap();
        assert_eq!(page.items[0].list_position, 4);
    }

    #[tokio::test]
    async fn test_constraint_violation() {
        let store = LocalStorage::in_memory();
        let err = store.upsert(detail(" ", "body", 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { .. }));

        let mut untitled = detail("A", "body", 0);
        untitled.title = String::new();
        let err = store.upsert(untitled).await.unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { .. }));
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_keep_one_row() {
        let store = Arc::new(LocalStorage::in_memory());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.upsert(detail("A", &format!("v{i}"), 0)).await })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().kind == UpsertKind::Inserted {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(store.len().await.unwrap(), 1);

        // a later write with a different hash wins
        store.upsert(detail("A", "final", 0)).await.unwrap();
        let stored = store.get_by_id("A").await.unwrap().unwrap();
        assert_eq!(stored.body_text, "final");
    }

    #[tokio::test]
    async fn test_list_orders_and_pages() {
        let store = LocalStorage::in_memory();
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        let mut a = detail("A", "a", 2);
        a.published_at = Some(base);
        let mut b = detail("B", "b", 0);
        b.published_at = Some(base + Duration::hours(1));
        let c = detail("C", "c", 1);

        for item in [a, b, c] {
            store.upsert(item).await.unwrap();
        }

        let ids = |page: Page<StoredArticle>| -> Vec<String> {
            page.items.into_iter().map(|a| a.external_id).collect()
        };

        let by_position = store.list(&ListQuery::default()).await.unwrap();
        assert_eq!(by_position.total, 3);
        assert_eq!(ids(by_position), vec!["B", "C", "A"]);

        let by_published = store
            .list(&ListQuery {
                order_by: OrderBy::PublishedAt,
                ..ListQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(ids(by_published), vec!["B", "A", "C"]);

        let second_page = store
            .list(&ListQuery {
                page: 2,
                page_size: 2,
                order_by: OrderBy::ListPosition,
            })
            .await
            .unwrap();
        assert_eq!(second_page.page, 2);
        assert_eq!(ids(second_page), vec!["A"]);

        let past_end = store
            .list(&ListQuery {
                page: 5,
                page_size: 2,
                order_by: OrderBy::ListPosition,
            })
            .await
            .unwrap();
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 3);
    }

    #[tokio::test]
    async fn test_authors_counted() {
        let store = LocalStorage::in_memory();
        for (id, author) in [("A", Some("王小明")), ("B", Some("王小明")), ("C", Some("李四")), ("D", None)] {
            let mut item = detail(id, id, 0);
            item.author = author.map(String::from);
            store.upsert(item).await.unwrap();
        }

        let authors = store.authors().await.unwrap();
        assert_eq!(
            authors,
            vec![
                AuthorCount {
                    name: "王小明".into(),
                    articles: 2
                },
                AuthorCount {
                    name: "李四".into(),
                    articles: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_persist_and_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = LocalStorage::open(tmp.path()).await.unwrap();
            store.upsert(detail("A", "one", 0)).await.unwrap();
            store.upsert(detail("B", "two", 1)).await.unwrap();
        }
        assert!(tmp.path().join(SNAPSHOT_KEY).exists());
        assert!(!tmp.path().join("articles.tmp").exists());

        let reopened = LocalStorage::open(tmp.path()).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        let again = reopened.upsert(detail("A", "one", 0)).await.unwrap();
        assert_eq!(again.kind, UpsertKind::Unchanged);
    }

    #[tokio::test]
    async fn test_open_missing_dir_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStorage::open(tmp.path().join("fresh")).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_is_unavailable_and_leaves_state() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = LocalStorage::new(blocker.join("sub"));
        let err = store.upsert(detail("A", "one", 0)).await.unwrap_err();

        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.get_by_id("A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reads_not_blocked_by_pending_write() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStorage::open(tmp.path()).await.unwrap());
        store.upsert(detail("A", "one", 0)).await.unwrap();

        // stand-in for a writer stuck in a slow snapshot write
        let writer = store.writer.lock().await;
        let pending = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.upsert(detail("A", "two", 0)).await })
        };
        tokio::task::yield_now().await;

        let read = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            let article = store.get_by_id("A").await.unwrap().unwrap();
            let page = store.list(&ListQuery::default()).await.unwrap();
            (article, page.total)
        })
        .await
        .expect("reads must not wait for the writer");
        assert_eq!(read.0.body_text, "one");
        assert_eq!(read.1, 1);
        assert!(!pending.is_finished());

        drop(writer);
        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome.kind, UpsertKind::Updated);
        assert_eq!(store.get_by_id("A").await.unwrap().unwrap().body_text, "two");
    }
}
