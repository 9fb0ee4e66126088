// src/services/fetcher.rs

//! Page fetching with timeout and retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{FetchError, Result};
use crate::models::CrawlerConfig;
use crate::utils::http::create_async_client;
use crate::utils::retry::RetryPolicy;

/// Retrieves raw HTML for a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// HTTP fetcher on a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    policy: RetryPolicy,
}

impl HttpFetcher {
    /// Create a fetcher from the crawler configuration.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self::with_client(
            create_async_client(config)?,
            config.timeout(),
            RetryPolicy::for_requests(config),
        ))
    }

    pub fn with_client(client: Client, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            client,
            timeout,
            policy,
        }
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify(url, e))
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(error) if error.is_transient() && self.policy.should_retry(attempt) => {
                    attempt += 1;
                    let backoff = self.policy.calculate_backoff(attempt);
                    log::debug!(
                        "Retry {}/{} for {} in {:?}: {}",
                        attempt,
                        self.policy.max_retries,
                        url,
                        backoff,
                        error
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(error) => {
                    if attempt > 0 {
                        log::warn!("Giving up on {} after {} retries: {}", url, attempt, error);
                    }
                    return Err(error);
                }
            }
        }
    }
}

fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = error.status() {
        FetchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_from_default_config() {
        let fetcher = HttpFetcher::new(&CrawlerConfig::default()).unwrap();
        assert_eq!(fetcher.timeout, Duration::from_secs(10));
        assert_eq!(fetcher.policy.max_retries, 3);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let policy = RetryPolicy {
            max_retries: 0,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        let fetcher = HttpFetcher::with_client(Client::new(), Duration::from_secs(2), policy);

        // port 9 on localhost refuses connections
        let error = fetcher.fetch("http://127.0.0.1:9/").await.unwrap_err();
        assert!(error.is_transient());
        assert_eq!(error.url(), "http://127.0.0.1:9/");
    }
}
