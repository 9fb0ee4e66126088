// src/services/parser.rs

//! HTML extraction for the listing and article pages.
//!
//! The page layout is described entirely by [`SelectorConfig`]; when the
//! source site changes its markup only the configuration needs to follow.
//! Failures are per item: one unusable listing entry or article page never
//! affects the others.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, ParseError, Result};
use crate::models::{ArticleDetail, ArticleSummary, Config, SelectorConfig};
use crate::services::TagCatalog;
use crate::utils::resolve_url;
use crate::utils::text::{content_hash, normalize_whitespace, truncate_graphemes};
use crate::utils::url::extract_article_id;

/// Titles longer than this are cut at a grapheme boundary.
pub const MAX_TITLE_GRAPHEMES: usize = 200;

/// Share-bar timestamps are Taiwan local time.
const SOURCE_UTC_OFFSET_SECS: i32 = 8 * 3600;

static SHARE_BAR_TIME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2})").ok());

struct CompiledSelectors {
    listing_item: Selector,
    listing_link: Selector,
    listing_title: Selector,
    listing_thumbnail: Selector,
    detail_title: Selector,
    detail_thumbnail: Selector,
    detail_author: Selector,
    detail_published: Selector,
    detail_body_container: Selector,
    detail_body: Selector,
    detail_tags: Selector,
    published_meta: Selector,
    paragraph: Selector,
    figure: Selector,
}

impl CompiledSelectors {
    fn compile(config: &SelectorConfig) -> Result<Self> {
        Ok(Self {
            listing_item: parse_selector(&config.listing_item)?,
            listing_link: parse_selector(&config.listing_link)?,
            listing_title: parse_selector(&config.listing_title)?,
            listing_thumbnail: parse_selector(&config.listing_thumbnail)?,
            detail_title: parse_selector(&config.detail_title)?,
            detail_thumbnail: parse_selector(&config.detail_thumbnail)?,
            detail_author: parse_selector(&config.detail_author)?,
            detail_published: parse_selector(&config.detail_published)?,
            detail_body_container: parse_selector(&config.detail_body_container)?,
            detail_body: parse_selector(&config.detail_body)?,
            detail_tags: parse_selector(&config.detail_tags)?,
            published_meta: parse_selector("meta[property='article:published_time']")?,
            paragraph: parse_selector("p")?,
            figure: parse_selector("figure")?,
        })
    }
}

/// Extracts articles from the source pages.
pub struct ArticleParser {
    listing_url: Url,
    selectors: CompiledSelectors,
    clone_marker: String,
    author_pattern: Regex,
    catalog: TagCatalog,
}

impl ArticleParser {
    /// Compile the configured selectors; an invalid one is a configuration error.
    pub fn new(config: &SelectorConfig, listing_url: Url, catalog: TagCatalog) -> Result<Self> {
        Ok(Self {
            listing_url,
            selectors: CompiledSelectors::compile(config)?,
            clone_marker: config.clone_marker.clone(),
            author_pattern: Regex::new(&config.author_pattern)?,
            catalog,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.selectors,
            Url::parse(&config.source.listing_url)?,
            TagCatalog::new(config.tags.iter().cloned()),
        )
    }

    pub fn catalog(&self) -> &TagCatalog {
        &self.catalog
    }

    /// Extract the featured entries of the listing page in source order.
    ///
    /// Carousel clones are ignored and a repeated id keeps its first
    /// occurrence. Each remaining entry is either a summary or the reason it
    /// could not be used.
    pub fn parse_listing(&self, html: &str) -> Vec<std::result::Result<ArticleSummary, ParseError>> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        let items = document
            .select(&self.selectors.listing_item)
            .filter(|item| !self.is_clone(item));

        for (position, item) in items.enumerate() {
            let entry = self.parse_listing_item(&item, position as u32);
            if let Ok(summary) = &entry {
                if !seen.insert(summary.external_id.clone()) {
                    log::debug!(
                        "Duplicate listing entry {} at position {}",
                        summary.external_id,
                        position
                    );
                    continue;
                }
            }
            entries.push(entry);
        }

        entries
    }

    fn is_clone(&self, item: &ElementRef) -> bool {
        item.value()
            .attr("id")
            .is_some_and(|id| id.contains(self.clone_marker.as_str()))
    }

    fn parse_listing_item(
        &self,
        item: &ElementRef,
        list_position: u32,
    ) -> std::result::Result<ArticleSummary, ParseError> {
        let anchor = item
            .select(&self.selectors.listing_link)
            .next()
            .ok_or(ParseError::missing("external_id"))?;
        let href = anchor
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .ok_or(ParseError::missing("external_id"))?;

        let url = resolve_url(&self.listing_url, href);
        let external_id = extract_article_id(&url).ok_or(ParseError::missing("external_id"))?;

        let image = item.select(&self.selectors.listing_thumbnail).next();

        let title = item
            .select(&self.selectors.listing_title)
            .map(|el| element_text(&el))
            .find(|t| !t.is_empty())
            .or_else(|| non_empty_attr(&anchor, "title"))
            .or_else(|| image.as_ref().and_then(|img| non_empty_attr(img, "alt")))
            .or_else(|| Some(element_text(&anchor)).filter(|t| !t.is_empty()))
            .ok_or(ParseError::missing("title"))?;

        let thumbnail_url = image
            .as_ref()
            .and_then(image_source)
            .map(|src| resolve_url(&self.listing_url, &src));

        Ok(ArticleSummary {
            external_id,
            url,
            title: truncate_graphemes(&title, MAX_TITLE_GRAPHEMES),
            thumbnail_url,
            published_at: None,
            list_position,
        })
    }

    /// Extract the article page for a listing entry.
    pub fn parse_detail(
        &self,
        html: &str,
        summary: &ArticleSummary,
    ) -> std::result::Result<ArticleDetail, ParseError> {
        let document = Html::parse_document(html);

        let container = document
            .select(&self.selectors.detail_body_container)
            .next()
            .ok_or_else(|| {
                ParseError::MalformedStructure(format!(
                    "no article body container on {}",
                    summary.url
                ))
            })?;

        let mut paragraphs = self.body_paragraphs(document.select(&self.selectors.detail_body));
        if paragraphs.is_empty() {
            paragraphs = self.body_paragraphs(container.select(&self.selectors.paragraph));
        }
        if paragraphs.is_empty() {
            return Err(ParseError::missing("body"));
        }
        let body_text = paragraphs.join("\n");

        let title = document
            .select(&self.selectors.detail_title)
            .map(|el| element_text(&el))
            .find(|t| !t.is_empty())
            .unwrap_or_else(|| summary.title.clone());
        if title.is_empty() {
            return Err(ParseError::missing("title"));
        }
        let title = truncate_graphemes(&title, MAX_TITLE_GRAPHEMES);

        let page_url = Url::parse(&summary.url).unwrap_or_else(|_| self.listing_url.clone());
        let thumbnail_url = document
            .select(&self.selectors.detail_thumbnail)
            .find_map(|img| image_source(&img))
            .map(|src| resolve_url(&page_url, &src))
            .or_else(|| summary.thumbnail_url.clone());

        let author = document
            .select(&self.selectors.detail_author)
            .next()
            .and_then(|el| self.extract_author(&element_text(&el)));

        let published_at = self
            .extract_published(&document)
            .or(summary.published_at);

        let mut tags: BTreeSet<String> = document
            .select(&self.selectors.detail_tags)
            .map(|el| element_text(&el))
            .filter(|t| !t.is_empty())
            .collect();
        tags.extend(self.catalog.match_title(&title));

        Ok(ArticleDetail {
            external_id: summary.external_id.clone(),
            url: summary.url.clone(),
            title,
            thumbnail_url,
            published_at,
            list_position: summary.list_position,
            author,
            content_hash: content_hash(&body_text),
            body_text,
            tags,
            scraped_at: Utc::now(),
        })
    }

    fn body_paragraphs<'a>(&self, paragraphs: impl Iterator<Item = ElementRef<'a>>) -> Vec<String> {
        paragraphs
            .filter(|p| p.select(&self.selectors.figure).next().is_none())
            .map(|p| element_text(&p))
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn extract_author(&self, text: &str) -> Option<String> {
        self.author_pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|name| !name.is_empty())
    }

    fn extract_published(&self, document: &Html) -> Option<DateTime<Utc>> {
        let from_meta = document
            .select(&self.selectors.published_meta)
            .find_map(|meta| meta.value().attr("content"))
            .and_then(|content| DateTime::parse_from_rfc3339(content.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc));

        from_meta.or_else(|| {
            document
                .select(&self.selectors.detail_published)
                .find_map(|el| parse_share_bar_time(&element_text(&el)))
        })
    }
}

/// Parse a `YYYY-MM-DD HH:MM` timestamp in source local time.
fn parse_share_bar_time(text: &str) -> Option<DateTime<Utc>> {
    let caps = SHARE_BAR_TIME.as_ref()?.captures(text)?;
    let naive = NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d %H:%M").ok()?;
    let offset = FixedOffset::east_opt(SOURCE_UTC_OFFSET_SECS)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn element_text(element: &ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

fn non_empty_attr(element: &ElementRef, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(normalize_whitespace)
        .filter(|v| !v.is_empty())
}

/// Lazy-loaded images keep the real source in `data-src`.
fn image_source(image: &ElementRef) -> Option<String> {
    non_empty_attr(image, "data-src").or_else(|| non_empty_attr(image, "src"))
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TagDefinition, TagKind};

    const LISTING: &str = r#"
        <html><body>
          <ul class="splide__list">
            <li class="splide__slide splide__slide--clone" id="splide01-clone01">
              <a href="/nba/story/7002/100" title="Clone">Clone</a>
            </li>
            <li class="splide__slide" id="splide01-slide01">
              <a href="/nba/story/7002/100"><img src="/img/a.jpg" alt="alt A"><h3> 湖人  大勝 </h3></a>
            </li>
            <li class="splide__slide" id="splide01-slide02">
              <a href="https://tw-nba.udn.com/nba/story/7002/200" title="勇士輸球">
                <img data-src="https://pgw.udn.com.tw/b.jpg" src="placeholder.gif">
              </a>
            </li>
            <li class="splide__slide" id="splide01-slide03">
              <span>no link here</span>
            </li>
            <li class="splide__slide" id="splide01-slide04">
              <a href="/nba/story/7002/100">Repeated</a>
            </li>
            <li class="splide__slide" id="splide01-slide05">
              <a href="/nba/story/7002/300"></a>
            </li>
          </ul>
        </body></html>
    "#;

    const DETAIL: &str = r#"
        <html><head>
          <meta property="article:published_time" content="2025-03-01T20:15:00+08:00">
        </head><body>
          <h1 class="story_art_title">  詹姆斯率湖人  逆轉勇士 </h1>
          <div class="photo-story"><img src="/photo/1.jpg"></div>
          <div class="shareBar__info--author"><span>2025-03-01 20:15</span> 聯合報 記者王小明／即時報導</div>
          <div id="story_body_content">
            <span>
              <p>第一段   內容</p>
              <p><figure><img src="x.jpg"></figure></p>
              <p>   </p>
              <p>第二段內容</p>
            </span>
          </div>
          <div class="story_tags"><a href="/tag/1">NBA</a><a href="/tag/2"> 季後賽 </a></div>
        </body></html>
    "#;

    fn parser() -> ArticleParser {
        let catalog = TagCatalog::new([
            TagDefinition {
                name: "湖人".into(),
                kind: TagKind::Team,
            },
            TagDefinition {
                name: "詹姆斯".into(),
                kind: TagKind::Player,
            },
        ]);
        ArticleParser::new(
            &SelectorConfig::default(),
            Url::parse("https://tw-nba.udn.com/nba/index").unwrap(),
            catalog,
        )
        .unwrap()
    }

    fn summary(id: &str) -> ArticleSummary {
        ArticleSummary {
            external_id: id.to_string(),
            url: format!("https://tw-nba.udn.com/nba/story/7002/{id}"),
            title: "listing title".into(),
            thumbnail_url: Some("https://tw-nba.udn.com/img/listing.jpg".into()),
            published_at: None,
            list_position: 3,
        }
    }

    #[test]
    fn test_parse_selector_invalid() {
        assert!(parse_selector("div.class").is_ok());
        assert!(parse_selector("[[invalid").is_err());

        let mut config = SelectorConfig::default();
        config.detail_body = "[[invalid".into();
        let result = ArticleParser::new(
            &config,
            Url::parse("https://tw-nba.udn.com/nba/index").unwrap(),
            TagCatalog::default(),
        );
        assert!(matches!(result, Err(AppError::Selector { .. })));
    }

    #[test]
    fn test_parse_listing_order_and_fallbacks() {
        let entries = parser().parse_listing(LISTING);
        // clone skipped, repeated id dropped
        assert_eq!(entries.len(), 4);

        let first = entries[0].as_ref().unwrap();
        assert_eq!(first.external_id, "7002-100");
        assert_eq!(first.url, "https://tw-nba.udn.com/nba/story/7002/100");
        assert_eq!(first.title, "湖人 大勝");
        assert_eq!(first.list_position, 0);
        assert_eq!(
            first.thumbnail_url.as_deref(),
            Some("https://tw-nba.udn.com/img/a.jpg")
        );

        let second = entries[1].as_ref().unwrap();
        assert_eq!(second.external_id, "7002-200");
        assert_eq!(second.title, "勇士輸球");
        assert_eq!(second.list_position, 1);
        assert_eq!(
            second.thumbnail_url.as_deref(),
            Some("https://pgw.udn.com.tw/b.jpg")
        );

        assert_eq!(entries[2], Err(ParseError::missing("external_id")));
        assert_eq!(entries[3], Err(ParseError::missing("title")));
    }

    #[test]
    fn test_parse_listing_empty_page() {
        assert!(parser().parse_listing("<html><body></body></html>").is_empty());
    }

    #[test]
    fn test_parse_detail_full() {
        let detail = parser().parse_detail(DETAIL, &summary("100")).unwrap();

        assert_eq!(detail.external_id, "100");
        assert_eq!(detail.title, "詹姆斯率湖人 逆轉勇士");
        assert_eq!(detail.body_text, "第一段 內容\n第二段內容");
        assert_eq!(detail.author.as_deref(), Some("王小明"));
        assert_eq!(
            detail.thumbnail_url.as_deref(),
            Some("https://tw-nba.udn.com/photo/1.jpg")
        );
        assert_eq!(detail.list_position, 3);
        assert_eq!(
            detail.published_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 15, 0).unwrap())
        );
        let tags: Vec<_> = detail.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["NBA", "季後賽", "湖人", "詹姆斯"]);
        assert_eq!(detail.content_hash, content_hash("第一段 內容\n第二段內容"));
    }

    #[test]
    fn test_parse_detail_optional_fields_default() {
        let html = r#"<div id="story_body_content"><p>Paragraph 1</p><p>Paragraph 2</p></div>"#;
        let detail = parser().parse_detail(html, &summary("1")).unwrap();

        assert_eq!(detail.title, "listing title");
        assert_eq!(detail.body_text, "Paragraph 1\nParagraph 2");
        assert_eq!(detail.author, None);
        assert_eq!(detail.published_at, None);
        assert_eq!(
            detail.thumbnail_url.as_deref(),
            Some("https://tw-nba.udn.com/img/listing.jpg")
        );
    }

    #[test]
    fn test_parse_detail_share_bar_time() {
        let html = r#"
            <div class="shareBar__info--author"><span>2025-01-05 08:30</span>記者李四／報導</div>
            <div id="story_body_content"><span><p>body</p></span></div>
        "#;
        let detail = parser().parse_detail(html, &summary("1")).unwrap();
        assert_eq!(
            detail.published_at,
            Some(Utc.with_ymd_and_hms(2025, 1, 5, 0, 30, 0).unwrap())
        );
        assert_eq!(detail.author.as_deref(), Some("李四"));
    }

    #[test]
    fn test_parse_detail_without_container_is_malformed() {
        let result = parser().parse_detail("<html><body><p>x</p></body></html>", &summary("1"));
        assert!(matches!(result, Err(ParseError::MalformedStructure(_))));
    }

    #[test]
    fn test_parse_detail_empty_body() {
        let html = r#"<div id="story_body_content"><span><p> </p></span></div>"#;
        assert_eq!(
            parser().parse_detail(html, &summary("1")),
            Err(ParseError::missing("body"))
        );
    }

    #[test]
    fn test_parse_detail_missing_title() {
        let html = r#"<div id="story_body_content"><p>body</p></div>"#;
        let mut entry = summary("1");
        entry.title = String::new();
        assert_eq!(
            parser().parse_detail(html, &entry),
            Err(ParseError::missing("title"))
        );
    }

    #[test]
    fn test_content_hash_ignores_whitespace_noise() {
        let a = r#"<div id="story_body_content"><span><p>same   text</p></span></div>"#;
        let b = "<div id=\"story_body_content\">\n<span>\n<p>\n same\ntext \n</p></span></div>";
        let parser = parser();
        let first = parser.parse_detail(a, &summary("1")).unwrap();
        let second = parser.parse_detail(b, &summary("1")).unwrap();
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[test]
    fn test_title_truncated_to_grapheme_limit() {
        let long = "湖".repeat(MAX_TITLE_GRAPHEMES + 20);
        let html = format!(
            r#"<h1 class="story_art_title">{long}</h1><div id="story_body_content"><p>b</p></div>"#
        );
        let detail = parser().parse_detail(&html, &summary("1")).unwrap();
        assert_eq!(detail.title.chars().count(), MAX_TITLE_GRAPHEMES);
    }

    #[test]
    fn test_parse_share_bar_time_invalid() {
        assert_eq!(parse_share_bar_time("記者王小明／報導"), None);
        assert_eq!(parse_share_bar_time("2025-13-40 99:99"), None);
    }
}
