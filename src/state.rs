use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::Level;

use crate::bridge::{BridgeClient, ContentBridge, PageChannel};
use crate::fetch::Fetch;
use crate::intercept::{InterceptRules, Interceptor};

/// Events the page channel buffers for a slow listener.
const PAGE_CHANNEL_CAPACITY: usize = 16;

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct TapConfig {
    pub rules: InterceptRules,
    /// URL of the page the bridge reports on.
    pub page_url: String,
    /// How long the UI waits for the in-page listener.
    pub bridge_timeout: Duration,
    pub http_connect_timeout: Duration,
    pub log_level: Level,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            rules: InterceptRules::default(),
            page_url: "https://chatgpt.com/".to_string(),
            bridge_timeout: Duration::from_millis(1000),
            http_connect_timeout: Duration::from_secs(120),
            log_level: Level::INFO,
        }
    }
}

impl TapConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(base) = dotenv::var("TAP_BASE_SEGMENT") {
            config.rules.base_segment = base;
        }
        if let Ok(action) = dotenv::var("TAP_ACTION_SEGMENT") {
            config.rules.action_segment = action;
        }
        if let Ok(types) = dotenv::var("TAP_STREAM_CONTENT_TYPES") {
            config.rules.stream_content_types = types
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Ok(url) = dotenv::var("TAP_PAGE_URL") {
            config.page_url = url;
        }
        if let Ok(ms) = dotenv::var("TAP_BRIDGE_TIMEOUT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .context("TAP_BRIDGE_TIMEOUT_MS must be an integer")?;
            config.bridge_timeout = Duration::from_millis(ms);
        }
        if let Ok(secs) = dotenv::var("TAP_HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .context("TAP_HTTP_TIMEOUT_SECS must be an integer")?;
            config.http_connect_timeout = Duration::from_secs(secs);
        }
        if let Ok(level) = dotenv::var("TAP_LOG_LEVEL") {
            config.log_level = level.trim().parse().map_err(|_| {
                anyhow::anyhow!("TAP_LOG_LEVEL must be one of trace|debug|info|warn|error")
            })?;
        }

        Ok(config)
    }
}

/// Everything installed for one page: the wrapped primitive, the channel it
/// posts on, the in-page listener and the UI's handle to it.
pub struct AppState<F> {
    pub interceptor: Arc<Interceptor<F>>,
    pub channel: PageChannel,
    pub bridge: ContentBridge,
    pub client: BridgeClient,
}

impl<F: Fetch> AppState<F> {
    /// Install the pipeline around `fetch`. Must run inside a tokio runtime.
    pub fn install(fetch: F, config: &TapConfig) -> Self {
        let channel = PageChannel::new(PAGE_CHANNEL_CAPACITY);

        let bridge = ContentBridge::new(config.page_url.clone());
        bridge.listen(&channel);
        let client = bridge.serve(config.bridge_timeout);

        let interceptor = Arc::new(Interceptor::install(
            fetch,
            Arc::new(channel.clone()),
            config.rules.clone(),
        ));

        Self {
            interceptor,
            channel,
            bridge,
            client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchRequest, ReplayFetch};
    use crate::service::ServiceId;

    const STREAM: &str = concat!(
        "data: {\"type\":\"sources_footnote\",\"sources\":[",
        "{\"url\":\"https://a.example\"},{\"url\":\"https://b.example\"},{\"url\":\"https://a.example\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    #[test]
    fn test_defaults() {
        let config = TapConfig::default();
        assert_eq!(config.rules, InterceptRules::default());
        assert_eq!(config.bridge_timeout, Duration::from_secs(1));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[tokio::test]
    async fn test_pipeline_end_to_end() {
        let config = TapConfig {
            page_url: "https://chatgpt.com/c/abc".to_string(),
            ..TapConfig::default()
        };
        let state = AppState::install(ReplayFetch::new(STREAM).with_chunk_size(5), &config);
        assert_eq!(state.interceptor.rules(), &config.rules);

        // Nothing observed yet.
        assert!(state.client.sources().await.is_empty());

        let mut updates = state.bridge.store().subscribe();
        let resp = state
            .interceptor
            .fetch(FetchRequest::post("https://chatgpt.com/backend-api/conversation", "{}"))
            .await
            .unwrap();
        assert_eq!(&resp.bytes().await.unwrap()[..], STREAM.as_bytes());
        updates.changed().await.unwrap();

        let sources = state.client.sources().await;
        let urls: Vec<&str> = sources.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);

        let info = state.client.page_info("https://fallback.example/").await;
        assert_eq!(info.service, ServiceId::Chatgpt);
        assert_eq!(info.page_url, "https://chatgpt.com/c/abc");
    }
}
