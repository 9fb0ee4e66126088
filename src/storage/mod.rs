//! Storage abstractions for article persistence.
//!
//! The store owns the unique `external_id` key and the ordered indexes the
//! read API pages through. Every write goes through [`ArticleStorage::upsert`],
//! a single conditional operation that decides insert/update/no-op under the
//! store's own lock.
//!
//! ## Directory Structure
//!
//! ```text
//! {dir}/
//! └── articles.json   # snapshot of every stored article
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{ArticleDetail, StoredArticle};

// Re-export for convenience
pub use local::LocalStorage;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// What an upsert did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertKind {
    Inserted,
    Updated,
    /// Same content hash; at most `list_position` was refreshed
    Unchanged,
}

/// Outcome of a single upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub kind: UpsertKind,
    /// The record as committed
    pub article: StoredArticle,
}

/// Sort order for paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Listing page order, ascending
    #[default]
    ListPosition,
    /// Newest first, undated articles last
    PublishedAt,
    /// Most recently discovered first
    #[serde(rename = "first_seen")]
    FirstSeen,
}

/// A page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub page: usize,
    pub page_size: usize,
    pub order_by: OrderBy,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            order_by: OrderBy::default(),
        }
    }
}

impl ListQuery {
    /// Number of items before this page.
    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1).saturating_mul(self.page_size)
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            page: self.page,
            page_size: self.page_size,
            total: self.total,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

/// An author and the number of stored articles they wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    pub name: String,
    pub articles: usize,
}

/// On-disk snapshot with a header for consumers reading the file directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSnapshot {
    /// ISO 8601 timestamp of the write
    pub updated_at: DateTime<Utc>,
    pub count: usize,
    pub articles: Vec<StoredArticle>,
}

impl ArticleSnapshot {
    pub fn new(articles: Vec<StoredArticle>) -> Self {
        Self {
            updated_at: Utc::now(),
            count: articles.len(),
            articles,
        }
    }
}

/// Trait for article storage backends.
#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Insert, update or leave the article keyed by `detail.external_id`.
    ///
    /// Atomic per article: readers observe either the previous record or the
    /// committed one, and two concurrent calls for the same id never produce
    /// two records.
    async fn upsert(&self, detail: ArticleDetail) -> StoreResult<UpsertOutcome>;

    async fn get_by_id(&self, external_id: &str) -> StoreResult<Option<StoredArticle>>;

    /// Load one page in the requested order.
    async fn list(&self, query: &ListQuery) -> StoreResult<Page<StoredArticle>>;

    /// Distinct authors with article counts, most prolific first.
    async fn authors(&self) -> StoreResult<Vec<AuthorCount>>;

    /// Number of stored articles.
    async fn len(&self) -> StoreResult<usize>;
}
