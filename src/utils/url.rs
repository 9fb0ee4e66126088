// src/utils/url.rs

//! Article identifier extraction.

use std::sync::LazyLock;

use regex::Regex;

static STORY_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"/story/(\d+)(?:/(\d+))?/?$").ok());

/// Extract a stable article identifier from a detail URL.
///
/// Story URLs (`/nba/story/{category}/{id}`) yield `"{category}-{id}"` so two
/// categories reusing the same number stay distinct. Other URLs fall back to a
/// well-known query key, then to the normalized host and path.
///
/// # Examples
/// ```
/// use newsroom::utils::url::extract_article_id;
///
/// assert_eq!(
///     extract_article_id("https://tw-nba.udn.com/nba/story/7002/8612345?from=index"),
///     Some("7002-8612345".to_string())
/// );
/// ```
pub fn extract_article_id(url: &str) -> Option<String> {
    let parsed = ::url::Url::parse(url).ok()?;

    if let Some(caps) = STORY_PATH
        .as_ref()
        .and_then(|re| re.captures(parsed.path()))
    {
        return match (caps.get(1), caps.get(2)) {
            (Some(category), Some(id)) => Some(format!("{}-{}", category.as_str(), id.as_str())),
            (Some(id), None) => Some(id.as_str().to_string()),
            _ => None,
        };
    }

    for (key, value) in parsed.query_pairs() {
        if value.is_empty() {
            continue;
        }
        if matches!(
            key.to_lowercase().as_str(),
            "id" | "article_id" | "articleid" | "story_id" | "newsid"
        ) {
            return Some(value.to_string());
        }
    }

    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path().trim_matches('/');
    if path.is_empty() {
        return None;
    }
    Some(format!("{host}/{path}"))
}
