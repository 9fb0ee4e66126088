//! New-article event fan-out.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::StoredArticle;

/// Event published when an article is stored for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleEvent {
    /// Always `new_article`
    #[serde(rename = "type")]
    pub event_type: String,
    pub external_id: String,
    pub title: String,
    pub url: String,
}

impl ArticleEvent {
    pub const NEW_ARTICLE: &'static str = "new_article";

    pub fn new_article(article: &StoredArticle) -> Self {
        Self {
            event_type: Self::NEW_ARTICLE.to_string(),
            external_id: article.external_id.clone(),
            title: article.title.clone(),
            url: article.url.clone(),
        }
    }
}

/// Sink for article events.
///
/// Publishing is fire-and-forget: implementations must not block and must
/// not report failures back to the writer.
pub trait Notifier: Send + Sync {
    fn publish(&self, event: ArticleEvent);
}

/// Fans events out to every current subscriber.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ArticleEvent>,
}

impl BroadcastNotifier {
    /// `capacity` events are buffered per subscriber; slower subscribers lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArticleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: ArticleEvent) {
        let id = event.external_id.clone();
        match self.sender.send(event) {
            Ok(receivers) => log::debug!("Event for {} sent to {} subscribers", id, receivers),
            Err(_) => log::debug!("No subscribers for event {}", id),
        }
    }
}
