use std::fmt;

use serde::{Deserialize, Serialize};

/// Chat application a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceId {
    Chatgpt,
    Claude,
    Gemini,
    Perplexity,
    Unknown,
}

/// Exact hostname matches. Anything not listed here is `Unknown`.
const HOSTS: &[(&str, ServiceId)] = &[
    ("chatgpt.com", ServiceId::Chatgpt),
    ("chat.openai.com", ServiceId::Chatgpt),
    ("claude.ai", ServiceId::Claude),
    ("gemini.google.com", ServiceId::Gemini),
    ("perplexity.ai", ServiceId::Perplexity),
];

impl ServiceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::Chatgpt => "chatgpt",
            ServiceId::Claude => "claude",
            ServiceId::Gemini => "gemini",
            ServiceId::Perplexity => "perplexity",
            ServiceId::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a page URL by its host.
///
/// Never fails: empty input, unparseable URLs and hostless URLs all map to
/// `ServiceId::Unknown`. Both the page-side bridge and the UI-side fallback
/// call this, so there is exactly one table.
pub fn classify(url: &str) -> ServiceId {
    let Ok(parsed) = reqwest::Url::parse(url.trim()) else {
        return ServiceId::Unknown;
    };
    let Some(host) = parsed.host_str() else {
        return ServiceId::Unknown;
    };
    let host = host.to_ascii_lowercase();

    HOSTS
        .iter()
        .find(|(name, _)| *name == host)
        .map(|(_, id)| *id)
        .unwrap_or(ServiceId::Unknown)
}
