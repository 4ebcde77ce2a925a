use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use citation_tap::fetch::{Fetch, FetchRequest, HttpFetch, ReplayFetch};
use citation_tap::state::{AppState, TapConfig};

/// How long to wait for the shadow stream after the page finished reading.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

const USAGE: &str = "usage: citation-tap <capture-file> | citation-tap --live <url> [json-body]";

#[tokio::main]
async fn main() -> Result<()> {
    // Load env
    let _ = dotenv::dotenv();
    let config = TapConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [flag, url, rest @ ..] if flag == "--live" => {
            let body = rest.first().cloned().unwrap_or_else(|| "{}".to_string());
            let fetch = HttpFetch::new(config.http_connect_timeout)?;
            info!(%url, "live capture");
            run(fetch, &config, FetchRequest::post(url.clone(), body)).await
        }
        [path] if !path.starts_with('-') => {
            let capture = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read capture file {}", path))?;
            info!(%path, size = capture.len(), "replaying capture");
            let url = replay_url(&config)?;
            run(ReplayFetch::new(capture), &config, FetchRequest::post(url, "{}")).await
        }
        _ => bail!(USAGE),
    }
}

/// Conversation endpoint on the configured page's origin.
fn replay_url(config: &TapConfig) -> Result<String> {
    let page = reqwest::Url::parse(&config.page_url).context("TAP_PAGE_URL is not a valid URL")?;
    let path = format!(
        "{}{}",
        config.rules.base_segment.trim_end_matches('/'),
        config.rules.action_segment
    );
    Ok(page.join(&path).context("Failed to build conversation URL")?.to_string())
}

async fn run<F: Fetch>(fetch: F, config: &TapConfig, request: FetchRequest) -> Result<()> {
    let state = AppState::install(fetch, config);
    let mut updates = state.bridge.store().subscribe();

    // Act as the page: issue the call and read the whole body.
    let response = state.interceptor.fetch(request).await?;
    info!(status = %response.status, content_type = response.content_type(), "response received");
    let body = response.bytes().await?;
    info!(bytes = body.len(), "page consumer finished");

    if tokio::time::timeout(SETTLE_TIMEOUT, updates.changed()).await.is_err() {
        warn!("no citation set arrived; the call may not have been a conversation stream");
    }

    // Act as the UI: query the listener.
    let page = state.client.page_info(&config.page_url).await;
    let sources = state.client.sources().await;
    info!(
        service = %page.service,
        count = sources.len(),
        stats = ?state.interceptor.stats(),
        "done"
    );

    let report = serde_json::json!({ "page": page, "sources": sources });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
