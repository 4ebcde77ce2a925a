use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};

/// Outcome of one network call.
pub type FetchResult = std::result::Result<FetchResponse, FetchError>;

/// Response body as delivered by the network primitive.
pub type Body = BoxStream<'static, std::result::Result<Bytes, BodyError>>;

/// A failure while reading a response body. Cloneable so a single upstream
/// failure can be handed to every reader of a teed body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("body read failed: {0}")]
pub struct BodyError(pub String);

/// Failure of the network call itself, before any response exists.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// A request object passed in place of a bare URL.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: String,
}

/// First argument of a fetch call: either a URL or a request descriptor.
#[derive(Debug, Clone)]
pub enum RequestInput {
    Url(String),
    Descriptor(RequestDescriptor),
}

/// Per-call options. A method set here overrides the descriptor's.
#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    pub method: Option<String>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub input: RequestInput,
    pub init: RequestInit,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            input: RequestInput::Url(url.into()),
            init: RequestInit::default(),
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            input: RequestInput::Url(url.into()),
            init: RequestInit {
                method: Some("POST".to_string()),
                headers,
                body: Some(body.into()),
            },
        }
    }

    pub fn from_descriptor(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            input: RequestInput::Descriptor(RequestDescriptor {
                url: url.into(),
                method: method.into(),
            }),
            init: RequestInit::default(),
        }
    }

    /// Effective request URL.
    pub fn url(&self) -> &str {
        match &self.input {
            RequestInput::Url(url) => url,
            RequestInput::Descriptor(d) => &d.url,
        }
    }

    /// Effective method, upper-cased: options first, then descriptor, then GET.
    pub fn method(&self) -> String {
        let raw = match (&self.init.method, &self.input) {
            (Some(m), _) => m.as_str(),
            (None, RequestInput::Descriptor(d)) => d.method.as_str(),
            (None, RequestInput::Url(_)) => "GET",
        };
        raw.to_ascii_uppercase()
    }
}

pub struct FetchResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Option<Body>,
}

impl FetchResponse {
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Raw `content-type` header, empty when absent or not ASCII.
    pub fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Read the whole body into memory.
    pub async fn bytes(self) -> std::result::Result<Bytes, BodyError> {
        let Some(body) = self.body else {
            return Ok(Bytes::new());
        };
        let chunks: Vec<Bytes> = body.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// The network-call primitive.
pub trait Fetch: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, FetchResult>;
}

/// `Fetch` over a real HTTP client.
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        // Only the connect phase is bounded; streamed bodies may run for minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetch {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, FetchResult> {
        Box::pin(async move {
            let method = Method::from_bytes(request.method().as_bytes())
                .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
            let mut req = self
                .client
                .request(method, request.url())
                .headers(request.init.headers.clone());
            if let Some(body) = request.init.body {
                req = req.body(body);
            }

            let resp = req.send().await?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp
                .bytes_stream()
                .map_err(|e| BodyError(e.to_string()))
                .boxed();

            Ok(FetchResponse {
                status,
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                headers,
                body: Some(body),
            })
        })
    }
}

/// `Fetch` that answers every call with the same captured payload, split
/// into fixed-size chunks.
pub struct ReplayFetch {
    payload: Bytes,
    status: StatusCode,
    headers: HeaderMap,
    chunk_size: usize,
    has_body: bool,
    fail_after: Option<usize>,
    calls: AtomicUsize,
}

impl ReplayFetch {
    /// A 200 `text/event-stream` replay in 64-byte chunks.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        Self {
            payload: payload.into(),
            status: StatusCode::OK,
            headers,
            chunk_size: 64,
            has_body: true,
            fail_after: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn without_header(mut self, name: HeaderName) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn without_body(mut self) -> Self {
        self.has_body = false;
        self
    }

    /// Emit a body error after `chunks` chunks instead of finishing cleanly.
    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn body(&self) -> Body {
        let mut chunks: Vec<std::result::Result<Bytes, BodyError>> = (0..self.payload.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end = (start + self.chunk_size).min(self.payload.len());
                Ok(self.payload.slice(start..end))
            })
            .collect();
        if let Some(n) = self.fail_after {
            chunks.truncate(n);
            chunks.push(Err(BodyError("connection reset".to_string())));
        }
        stream::iter(chunks).boxed()
    }
}

impl Fetch for ReplayFetch {
    fn fetch(&self, _request: FetchRequest) -> BoxFuture<'_, FetchResult> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchResponse {
                status: self.status,
                status_text: self.status.canonical_reason().unwrap_or("").to_string(),
                headers: self.headers.clone(),
                body: self.has_body.then(|| self.body()),
            })
        })
    }
}
