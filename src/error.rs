// src/error.rs

//! Unified error handling for the scraper application.
//!
//! Per-item failures (`FetchError`, `ParseError`) are contained by the
//! pipeline and recorded in the cycle result; `StoreError` decides whether
//! a cycle continues; `AppError` covers everything that reaches the binary.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Regular expression failed to compile
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Coarse classification of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    HttpStatus,
    Network,
}

/// Failure to retrieve a page from the source site.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} responded with HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Timeout { .. } => FetchErrorKind::Timeout,
            Self::HttpStatus { .. } => FetchErrorKind::HttpStatus,
            Self::Network { .. } => FetchErrorKind::Network,
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// Client errors other than 408/429 are permanent: the page will not
    /// appear by asking again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url } | Self::HttpStatus { url, .. } | Self::Network { url, .. } => url,
        }
    }
}

/// Failure to extract a record from HTML.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("malformed page structure: {0}")]
    MalformedStructure(String),
}

impl ParseError {
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}

/// Failure reported by an article store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The write would break a store constraint (e.g. an empty key).
    #[error("constraint violation on `{external_id}`: {message}")]
    ConstraintViolation {
        external_id: String,
        message: String,
    },

    /// The store cannot persist right now; the caller should stop writing.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn constraint(external_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            external_id: external_id.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl fmt::Display) -> Self {
        Self::Unavailable(message.to_string())
    }
}

/// Failure of a whole scrape cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    /// The listing page could not be fetched, so the cycle never started.
    #[error("listing fetch failed: {0}")]
    Listing(FetchError),

    /// Shutdown was requested before reconciliation began.
    #[error("cycle cancelled before reconciliation")]
    Cancelled,
}
