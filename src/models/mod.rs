// src/models/mod.rs

//! Domain models for the scraper application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod article;
mod config;
mod cycle;
mod tag;

// Re-export all public types
pub use article::{ArticleDetail, ArticleListItem, ArticleSummary, StoredArticle};
pub use config::{
    ApiConfig, Config, CrawlerConfig, NotifierConfig, SchedulerConfig, SelectorConfig,
    SourceConfig, StorageConfig,
};
pub use cycle::{FailureStage, ItemFailure, ScrapeCycleResult};
pub use tag::{TagDefinition, TagKind};
