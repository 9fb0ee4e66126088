//! Scrape cycle bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, ParseError, StoreError};

/// Stage of the pipeline where an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Listing,
    Fetch,
    Parse,
    Store,
}

/// A single item that could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Unknown when the listing entry itself was unusable
    pub external_id: Option<String>,
    pub url: Option<String>,
    pub stage: FailureStage,
    pub reason: String,
}

impl ItemFailure {
    pub fn listing(position: usize, error: &ParseError) -> Self {
        Self {
            external_id: None,
            url: None,
            stage: FailureStage::Listing,
            reason: format!("listing entry {position}: {error}"),
        }
    }

    pub fn fetch(external_id: &str, error: &FetchError) -> Self {
        Self {
            external_id: Some(external_id.to_string()),
            url: Some(error.url().to_string()),
            stage: FailureStage::Fetch,
            reason: error.to_string(),
        }
    }

    pub fn parse(external_id: &str, url: &str, error: &ParseError) -> Self {
        Self {
            external_id: Some(external_id.to_string()),
            url: Some(url.to_string()),
            stage: FailureStage::Parse,
            reason: error.to_string(),
        }
    }

    pub fn store(external_id: &str, error: &StoreError) -> Self {
        Self {
            external_id: Some(external_id.to_string()),
            url: None,
            stage: FailureStage::Store,
            reason: error.to_string(),
        }
    }
}

/// Outcome of one scrape cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeCycleResult {
    pub cycle_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Entries found on the listing page
    pub listed: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
    /// Set when the store became unavailable and the batch was cut short
    pub aborted: Option<String>,
}

impl ScrapeCycleResult {
    pub fn new(cycle_id: u64) -> Self {
        let now = Utc::now();
        Self {
            cycle_id,
            started_at: now,
            finished_at: now,
            listed: 0,
            new: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            failures: Vec::new(),
            aborted: None,
        }
    }

    pub fn record_failure(&mut self, failure: ItemFailure) {
        self.failed += 1;
        self.failures.push(failure);
    }

    /// Items that reached a final state in this cycle.
    pub fn processed(&self) -> usize {
        self.new + self.updated + self.unchanged + self.failed
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "cycle #{}: {} listed, {} new, {} updated, {} unchanged, {} failed",
            self.cycle_id, self.listed, self.new, self.updated, self.unchanged, self.failed
        )
    }
}
