use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::citations::{dedup_by_url, Citation};

/// Receiver of the citations mined from one completed stream.
///
/// Called at most once per stream, and only when the stream ended cleanly.
/// `citations` are raw matches in encounter order; implementations dedup.
pub trait CitationSink: Send + Sync {
    fn on_stream_complete(&self, citations: Vec<Citation>);
}

impl<S: CitationSink + ?Sized> CitationSink for Arc<S> {
    fn on_stream_complete(&self, citations: Vec<Citation>) {
        (**self).on_stream_complete(citations)
    }
}

/// Last-value holder for the most recent completed stream's citations.
///
/// Each completion replaces the whole set in a single store, so readers
/// see either the previous set or the new one, never a mix.
pub struct CitationStore {
    current: watch::Sender<Arc<Vec<Citation>>>,
}

impl CitationStore {
    pub fn new() -> Self {
        let (current, _) = watch::channel(Arc::new(Vec::new()));
        Self { current }
    }

    /// Current set; empty until a stream has completed. Never blocks.
    pub fn query(&self) -> Vec<Citation> {
        self.current.borrow().as_ref().clone()
    }

    /// Watch for replacements.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Citation>>> {
        self.current.subscribe()
    }

    pub fn replace(&self, citations: Vec<Citation>) {
        let deduped = dedup_by_url(citations);
        debug!(count = deduped.len(), "citation set replaced");
        self.current.send_replace(Arc::new(deduped));
    }
}

impl Default for CitationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CitationSink for CitationStore {
    fn on_stream_complete(&self, citations: Vec<Citation>) {
        self.replace(citations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cite(url: &str) -> Citation {
        Citation {
            url: url.to_string(),
            title: String::new(),
            attribution: String::new(),
        }
    }

    #[test]
    fn test_query_before_completion_is_empty() {
        let store = CitationStore::new();
        assert!(store.query().is_empty());
    }

    #[test]
    fn test_dedup_then_full_replace() {
        let store = CitationStore::new();
        store.on_stream_complete(vec![cite("a"), cite("b"), cite("a")]);
        assert_eq!(store.query(), vec![cite("a"), cite("b")]);

        store.on_stream_complete(vec![cite("c")]);
        assert_eq!(store.query(), vec![cite("c")]);

        store.on_stream_complete(vec![]);
        assert!(store.query().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_see_replacement() {
        let store = Arc::new(CitationStore::new());
        let mut rx = store.subscribe();
        let writer = Arc::clone(&store);
        tokio::spawn(async move { writer.on_stream_complete(vec![cite("x")]) });
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref(), &vec![cite("x")]);
    }
}
