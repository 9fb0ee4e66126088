//! Request handlers.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::api::{ApiError, AppState};
use crate::models::{ArticleListItem, ScrapeCycleResult, StoredArticle, TagDefinition, TagKind};
use crate::notify::ArticleEvent;
use crate::pipeline::SchedulerStatus;
use crate::storage::{AuthorCount, ListQuery, OrderBy, Page};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ArticlesParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub order_by: Option<OrderBy>,
}

pub async fn list_articles(
    State(state): State<AppState>,
    Query(params): Query<ArticlesParams>,
) -> ApiResult<Page<ArticleListItem>> {
    let page = params.page.unwrap_or(1);
    if page == 0 {
        return Err(ApiError::bad_request("page starts at 1"));
    }
    let page_size = params.page_size.unwrap_or(state.default_page_size);
    if page_size == 0 {
        return Err(ApiError::bad_request("page_size must be at least 1"));
    }

    let query = ListQuery {
        page,
        page_size: page_size.min(state.max_page_size),
        order_by: params.order_by.unwrap_or_default(),
    };
    let page = state.store.list(&query).await?;
    Ok(Json(page.map(|article| ArticleListItem::from(&article))))
}

pub async fn get_article(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult<StoredArticle> {
    state
        .store
        .get_by_id(&external_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("article '{external_id}' not found")))
}

pub async fn list_authors(State(state): State<AppState>) -> ApiResult<Vec<AuthorCount>> {
    Ok(Json(state.store.authors().await?))
}

#[derive(Debug, Deserialize)]
pub struct TagsParams {
    pub name: Option<String>,
    pub kind: Option<String>,
}

pub async fn list_tags(
    State(state): State<AppState>,
    Query(params): Query<TagsParams>,
) -> ApiResult<Vec<TagDefinition>> {
    if params.name.is_some() && params.kind.is_some() {
        return Err(ApiError::bad_request(
            "filter by either name or kind, not both",
        ));
    }
    let kind = params
        .kind
        .as_deref()
        .map(|k| {
            TagKind::parse(k).ok_or_else(|| ApiError::bad_request(format!("unknown tag kind '{k}'")))
        })
        .transpose()?;

    let tags = state
        .catalog
        .filter(params.name.as_deref(), kind)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(tags))
}

#[derive(Debug, Deserialize)]
pub struct CyclesParams {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

pub async fn list_cycles(
    State(state): State<AppState>,
    Query(params): Query<CyclesParams>,
) -> ApiResult<Vec<ScrapeCycleResult>> {
    if params.month.is_some() && params.year.is_none() {
        return Err(ApiError::bad_request("month requires year"));
    }
    if params.day.is_some() && (params.year.is_none() || params.month.is_none()) {
        return Err(ApiError::bad_request("day requires year and month"));
    }
    if params.month.is_some_and(|m| !(1..=12).contains(&m)) {
        return Err(ApiError::bad_request("month must be between 1 and 12"));
    }
    if params.day.is_some_and(|d| !(1..=31).contains(&d)) {
        return Err(ApiError::bad_request("day must be between 1 and 31"));
    }

    Ok(Json(state.history.filter(params.year, params.month, params.day)))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub articles: usize,
    pub subscribers: usize,
    pub scheduler: Option<SchedulerStatus>,
    pub last_cycle: Option<ScrapeCycleResult>,
}

pub async fn status(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    Ok(Json(StatusResponse {
        articles: state.store.len().await?,
        subscribers: state.notifier.subscriber_count(),
        scheduler: state.scheduler.as_ref().map(|s| s.status()),
        last_cycle: state.history.latest(),
    }))
}

/// Stream `new_article` events to the client as they are published.
///
/// A client that falls behind skips the events it missed.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.notifier.subscribe();

    let stream = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match sse_event(&event) {
                    Some(frame) => return Some((Ok(frame), receiver)),
                    None => continue,
                },
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Event subscriber lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: &ArticleEvent) -> Option<Event> {
    Event::default()
        .event(ArticleEvent::NEW_ARTICLE)
        .id(event.external_id.clone())
        .json_data(event)
        .map_err(|e| log::warn!("Dropping unserializable event {}: {}", event.external_id, e))
        .ok()
}
