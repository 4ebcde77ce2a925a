use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::types::{BridgeRequest, BridgeResponse, Delivery, PageInfo};
use super::Envelope;
use crate::citations::Citation;
use crate::service::classify;

/// UI-side handle for querying the in-page listener.
#[derive(Clone)]
pub struct BridgeClient {
    tx: Option<mpsc::Sender<Envelope>>,
    timeout: Duration,
}

impl BridgeClient {
    pub(crate) fn new(tx: mpsc::Sender<Envelope>, timeout: Duration) -> Self {
        Self {
            tx: Some(tx),
            timeout,
        }
    }

    /// A client for a page where no listener was ever installed.
    pub fn disconnected() -> Self {
        Self {
            tx: None,
            timeout: Duration::ZERO,
        }
    }

    /// Send one request and wait up to the configured timeout for the answer.
    pub async fn request(&self, request: BridgeRequest) -> Delivery<BridgeResponse> {
        let Some(tx) = &self.tx else {
            return Delivery::NoResponse;
        };

        let exchange = async {
            let (reply, answer) = oneshot::channel();
            tx.send(Envelope { request, reply }).await.ok()?;
            answer.await.ok()
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Some(response)) => Delivery::Responded(response),
            Ok(None) => {
                debug!(?request, "bridge listener gone");
                Delivery::NoResponse
            }
            Err(_) => {
                debug!(
                    ?request,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "bridge request timed out"
                );
                Delivery::NoResponse
            }
        }
    }

    /// Page info from the listener, or a local guess from `tab_url` when
    /// the listener does not answer.
    pub async fn page_info(&self, tab_url: &str) -> PageInfo {
        match self.request(BridgeRequest::GetPageInfo).await.responded() {
            Some(BridgeResponse::PageInfo(info)) => info,
            _ => PageInfo {
                service: classify(tab_url),
                page_url: tab_url.to_string(),
            },
        }
    }

    /// Citations from the last completed stream; empty when unanswered.
    pub async fn sources(&self) -> Vec<Citation> {
        match self.request(BridgeRequest::GetSources).await.responded() {
            Some(BridgeResponse::Sources { sources }) => sources,
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ContentBridge;
    use crate::service::ServiceId;
    use crate::sink::CitationSink;

    #[tokio::test]
    async fn test_disconnected_falls_back_to_local_detection() {
        let client = BridgeClient::disconnected();
        assert_eq!(
            client.request(BridgeRequest::GetSources).await,
            Delivery::NoResponse
        );
        let info = client.page_info("https://claude.ai/chat/1").await;
        assert_eq!(info.service, ServiceId::Claude);
        assert!(client.sources().await.is_empty());
    }

    #[tokio::test]
    async fn test_served_requests() {
        let bridge = ContentBridge::new("https://chatgpt.com/c/9");
        let client = bridge.serve(Duration::from_secs(1));

        bridge.store().on_stream_complete(vec![Citation {
            url: "https://a.example".to_string(),
            title: "A".to_string(),
            attribution: String::new(),
        }]);

        let info = client.page_info("https://ignored.example/").await;
        assert_eq!(info.service, ServiceId::Chatgpt);
        assert_eq!(info.page_url, "https://chatgpt.com/c/9");

        let sources = client.sources().await;
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].title, "A");
    }

    #[tokio::test]
    async fn test_silent_listener_times_out() {
        // Requests are accepted but never answered.
        let (tx, mut rx) = mpsc::channel::<Envelope>(4);
        let parked = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(envelope) = rx.recv().await {
                held.push(envelope);
            }
        });
        let client = BridgeClient::new(tx, Duration::from_millis(50));
        assert_eq!(
            client.request(BridgeRequest::GetPageInfo).await,
            Delivery::NoResponse
        );
        let info = client.page_info("https://perplexity.ai/search").await;
        assert_eq!(info.service, ServiceId::Perplexity);
        parked.abort();
    }

    #[tokio::test]
    async fn test_dropped_listener_is_no_response() {
        let (tx, rx) = mpsc::channel::<Envelope>(4);
        drop(rx);
        let client = BridgeClient::new(tx, Duration::from_secs(1));
        assert_eq!(
            client.request(BridgeRequest::GetSources).await,
            Delivery::NoResponse
        );
    }
}
