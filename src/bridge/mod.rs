pub mod client;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::citations::{dedup_by_url, Citation};
use crate::service::classify;
use crate::sink::{CitationSink, CitationStore};

pub use client::BridgeClient;
use types::{BridgeRequest, BridgeResponse, PageEvent, PageInfo};

/// Pending UI requests the listener will queue before senders wait.
const REQUEST_QUEUE: usize = 32;

/// Same-page broadcast between the interception layer and the listener.
#[derive(Clone)]
pub struct PageChannel {
    tx: broadcast::Sender<PageEvent>,
}

impl PageChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.tx.subscribe()
    }

    /// Post an event to every current listener. Nobody listening is fine.
    pub fn post(&self, event: PageEvent) {
        if self.tx.send(event).is_err() {
            debug!("page event posted with no listeners");
        }
    }
}

impl CitationSink for PageChannel {
    fn on_stream_complete(&self, citations: Vec<Citation>) {
        let sources = dedup_by_url(citations);
        debug!(count = sources.len(), "posting citations");
        self.post(PageEvent::Citations { sources });
    }
}

/// A UI request waiting for its answer.
pub(crate) struct Envelope {
    pub(crate) request: BridgeRequest,
    pub(crate) reply: oneshot::Sender<BridgeResponse>,
}

/// In-page listener: keeps the last citation set posted on the page and
/// answers the UI surface's queries. Clones share the same store.
#[derive(Clone)]
pub struct ContentBridge {
    page_url: String,
    store: Arc<CitationStore>,
}

impl ContentBridge {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            store: Arc::new(CitationStore::new()),
        }
    }

    pub fn store(&self) -> &CitationStore {
        &self.store
    }

    pub fn page_info(&self) -> PageInfo {
        PageInfo {
            service: classify(&self.page_url),
            page_url: self.page_url.clone(),
        }
    }

    pub fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        match request {
            BridgeRequest::GetPageInfo => BridgeResponse::PageInfo(self.page_info()),
            BridgeRequest::GetSources => BridgeResponse::Sources {
                sources: self.store.query(),
            },
        }
    }

    /// Answer a raw JSON message. Messages this listener does not
    /// understand get no answer at all, like an unhandled message.
    pub fn handle_message(&self, message: &Value) -> Option<Value> {
        let request: BridgeRequest = serde_json::from_value(message.clone()).ok()?;
        serde_json::to_value(self.handle(request)).ok()
    }

    /// Start keeping the citation sets posted on `channel`.
    ///
    /// The subscription exists once this returns, so nothing posted after
    /// the call is missed.
    pub fn listen(&self, channel: &PageChannel) -> JoinHandle<()> {
        let mut rx = channel.subscribe();
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(PageEvent::Citations { sources }) => {
                        info!(count = sources.len(), "citations received from page");
                        store.on_stream_complete(sources);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "page channel lagged; older citation sets dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("page listener stopped");
        })
    }

    /// Start answering UI requests. Returns the client end.
    pub fn serve(&self, timeout: Duration) -> BridgeClient {
        let (tx, mut rx) = mpsc::channel::<Envelope>(REQUEST_QUEUE);
        let bridge = self.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                debug!(request = ?envelope.request, "bridge request");
                let response = bridge.handle(envelope.request);
                // The asker may have timed out already.
                let _ = envelope.reply.send(response);
            }
        });
        BridgeClient::new(tx, timeout)
    }
}
