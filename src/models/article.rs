//! Article data structures, from listing entry to stored record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article as it appears on the listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleSummary {
    /// Stable identifier derived from the article URL
    pub external_id: String,

    /// Absolute URL of the detail page
    pub url: String,

    pub title: String,

    #[serde(default)]
    pub thumbnail_url: Option<String>,

    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    /// Position on the listing page (0-based); changes between scrapes
    pub list_position: u32,
}

/// A fully scraped article: the summary identity plus detail-page content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleDetail {
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub list_position: u32,
    pub author: Option<String>,
    pub body_text: String,
    pub tags: BTreeSet<String>,
    /// SHA-256 of the normalized body
    pub content_hash: String,
    pub scraped_at: DateTime<Utc>,
}

/// The persisted article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredArticle {
    pub external_id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub list_position: u32,
    #[serde(default)]
    pub author: Option<String>,
    pub body_text: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub content_hash: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl StoredArticle {
    /// Build a new record from a scraped article.
    pub fn from_detail(detail: ArticleDetail) -> Self {
        Self {
            external_id: detail.external_id,
            url: detail.url,
            title: detail.title,
            thumbnail_url: detail.thumbnail_url,
            published_at: detail.published_at,
            list_position: detail.list_position,
            author: detail.author,
            body_text: detail.body_text,
            tags: detail.tags,
            content_hash: detail.content_hash,
            first_seen_at: detail.scraped_at,
            last_updated_at: detail.scraped_at,
        }
    }

    /// Replace the content fields with a newer scrape.
    ///
    /// `last_updated_at` always moves forward, even when the new scrape
    /// carries a timestamp that is not later than the stored one.
    pub fn apply_update(&mut self, detail: ArticleDetail) {
        let advanced = if detail.scraped_at > self.last_updated_at {
            detail.scraped_at
        } else {
            self.last_updated_at + chrono::Duration::milliseconds(1)
        };

        self.url = detail.url;
        self.title = detail.title;
        self.thumbnail_url = detail.thumbnail_url;
        self.published_at = detail.published_at;
        self.list_position = detail.list_position;
        self.author = detail.author;
        self.body_text = detail.body_text;
        self.tags = detail.tags;
        self.content_hash = detail.content_hash;
        self.last_updated_at = advanced;
    }

    /// Rebuild the detail record this article was stored from.
    ///
    /// Used when a detail fetch is skipped for an already stored article.
    pub fn to_detail(&self, list_position: u32) -> ArticleDetail {
        ArticleDetail {
            external_id: self.external_id.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            published_at: self.published_at,
            list_position,
            author: self.author.clone(),
            body_text: self.body_text.clone(),
            tags: self.tags.clone(),
            content_hash: self.content_hash.clone(),
            scraped_at: self.last_updated_at,
        }
    }
}

/// Compact list entry returned by the read API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleListItem {
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub list_position: u32,
    pub author: Option<String>,
    pub tags: BTreeSet<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl From<&StoredArticle> for ArticleListItem {
    fn from(article: &StoredArticle) -> Self {
        Self {
            external_id: article.external_id.clone(),
            url: article.url.clone(),
            title: article.title.clone(),
            thumbnail_url: article.thumbnail_url.clone(),
            published_at: article.published_at,
            list_position: article.list_position,
            author: article.author.clone(),
            tags: article.tags.clone(),
            first_seen_at: article.first_seen_at,
            last_updated_at: article.last_updated_at,
        }
    }
}
