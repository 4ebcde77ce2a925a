pub mod sse;
pub mod tee;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::citations::{mine, Citation};
use crate::fetch::{Body, BodyError, Fetch, FetchRequest, FetchResult};
use crate::sink::CitationSink;

use sse::{parse_data_line, EventStreamDecoder};

/// Which calls get teed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptRules {
    /// Path segment every conversation endpoint lives under.
    pub base_segment: String,
    /// Path segment naming the conversation action.
    pub action_segment: String,
    /// Media types treated as event streams (compared without parameters).
    pub stream_content_types: Vec<String>,
}

impl Default for InterceptRules {
    fn default() -> Self {
        Self {
            base_segment: "/backend-api/".to_string(),
            action_segment: "/conversation".to_string(),
            stream_content_types: vec!["text/event-stream".to_string(), "text/plain".to_string()],
        }
    }
}

impl InterceptRules {
    /// POST to a path containing both segments.
    pub fn in_scope(&self, request: &FetchRequest) -> bool {
        if request.method() != "POST" {
            return false;
        }
        let url = request.url();
        // Relative URLs don't parse; their raw text is already a path.
        let path = match reqwest::Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
        };
        path.contains(&self.base_segment) && path.contains(&self.action_segment)
    }

    pub fn accepts_content_type(&self, content_type: &str) -> bool {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        self.stream_content_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(essence))
    }
}

#[derive(Debug, Default)]
struct Counters {
    intercepted: AtomicU64,
    teed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of interceptor activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InterceptStats {
    /// In-scope calls that got a response.
    pub intercepted: u64,
    /// Responses whose body was duplicated.
    pub teed: u64,
    /// Shadow streams that ran to the end and reached the sink.
    pub completed: u64,
    /// Shadow streams abandoned on a body error.
    pub failed: u64,
}

/// Wraps the page's network primitive and mines citations out of
/// conversation streams without touching what the page receives.
pub struct Interceptor<F> {
    inner: F,
    sink: Arc<dyn CitationSink>,
    rules: InterceptRules,
    counters: Arc<Counters>,
}

impl<F: Fetch> Interceptor<F> {
    pub fn install(inner: F, sink: Arc<dyn CitationSink>, rules: InterceptRules) -> Self {
        info!(
            base = %rules.base_segment,
            action = %rules.action_segment,
            "interceptor installed"
        );
        Self {
            inner,
            sink,
            rules,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn rules(&self) -> &InterceptRules {
        &self.rules
    }

    pub fn stats(&self) -> InterceptStats {
        InterceptStats {
            intercepted: self.counters.intercepted.load(Ordering::Relaxed),
            teed: self.counters.teed.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Run one call through the wrapped primitive.
    ///
    /// Returns as soon as the wrapped call resolves. Upstream failures come
    /// back unchanged. For in-scope event streams the body is teed and the
    /// copy is mined on a background task nobody awaits.
    pub async fn call(&self, request: FetchRequest) -> FetchResult {
        if !self.rules.in_scope(&request) {
            return self.inner.fetch(request).await;
        }

        let url = request.url().to_string();
        let mut response = self.inner.fetch(request).await?;
        self.counters.intercepted.fetch_add(1, Ordering::Relaxed);

        if !response.ok() || response.body.is_none() {
            debug!(%url, status = %response.status, "unsuccessful or empty response, not observed");
            return Ok(response);
        }
        if !self.rules.accepts_content_type(response.content_type()) {
            debug!(%url, content_type = response.content_type(), "not an event stream, skipping");
            return Ok(response);
        }
        let Some(body) = response.body.take() else {
            return Ok(response);
        };

        let (primary, shadow) = tee::tee(body);
        self.counters.teed.fetch_add(1, Ordering::Relaxed);
        debug!(%url, "conversation stream teed");

        let sink = Arc::clone(&self.sink);
        let counters = Arc::clone(&self.counters);
        tokio::spawn(async move {
            match observe_stream(shadow, sink.as_ref()).await {
                Ok(found) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    info!(%url, found, "conversation stream observed");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(%url, error = %e, "shadow stream failed, citations discarded");
                }
            }
        });

        response.body = Some(primary);
        Ok(response)
    }
}

impl<F: Fetch> Fetch for Interceptor<F> {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, FetchResult> {
        Box::pin(self.call(request))
    }
}

/// Per-stream extraction state. Owned by one shadow task.
#[derive(Default)]
struct StreamObservation {
    decoder: EventStreamDecoder,
    matches: Vec<Citation>,
}

impl StreamObservation {
    fn feed(&mut self, chunk: &[u8]) {
        let lines = self.decoder.push(chunk);
        self.absorb(lines);
    }

    fn finish(mut self) -> Vec<Citation> {
        let lines = self.decoder.finish();
        self.absorb(lines);
        self.matches
    }

    fn absorb(&mut self, lines: Vec<String>) {
        for line in lines {
            if let Some(payload) = parse_data_line(&line) {
                mine(&payload, &mut self.matches);
            }
        }
    }
}

/// Drain an event-stream body, mining every JSON payload for citations.
///
/// On a clean end the raw matches go to `sink` and their count is returned.
/// On a body error nothing reaches the sink.
pub async fn observe_stream(mut body: Body, sink: &dyn CitationSink) -> Result<usize, BodyError> {
    let mut observation = StreamObservation::default();
    while let Some(chunk) = body.next().await {
        observation.feed(&chunk?);
    }
    let citations = observation.finish();
    let found = citations.len();
    sink.on_stream_complete(citations);
    Ok(found)
}
