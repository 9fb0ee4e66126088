//! Service layer for the scraper application.
//!
//! This module contains the source-facing logic:
//! - Page fetching with retry (`HttpFetcher`)
//! - HTML extraction (`ArticleParser`)
//! - Keyword tagging (`TagCatalog`)

mod fetcher;
mod parser;
mod tags;

pub use fetcher::{Fetch, HttpFetcher};
pub use parser::{ArticleParser, MAX_TITLE_GRAPHEMES};
pub use tags::TagCatalog;
