use serde::{Deserialize, Serialize};

use crate::citations::Citation;
use crate::service::ServiceId;

/// Broadcast posted on the page when a conversation stream finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageEvent {
    #[serde(rename = "CITATIONS_FOUND")]
    Citations { sources: Vec<Citation> },
}

/// Query sent by the UI surface to the in-page listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeRequest {
    #[serde(rename = "GET_PAGE_INFO")]
    GetPageInfo,
    #[serde(rename = "GET_SOURCES")]
    GetSources,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub service: ServiceId,
    pub page_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeResponse {
    PageInfo(PageInfo),
    Sources { sources: Vec<Citation> },
}

/// Outcome of a request across the bridge. `NoResponse` covers a missing
/// listener, a listener that went away and a reply that never came.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    Responded(T),
    NoResponse,
}

impl<T> Delivery<T> {
    pub fn responded(self) -> Option<T> {
        match self {
            Delivery::Responded(v) => Some(v),
            Delivery::NoResponse => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_event_wire_shape() {
        let event = PageEvent::Citations {
            sources: vec![Citation {
                url: "https://a.example".to_string(),
                title: "A".to_string(),
                attribution: String::new(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "CITATIONS_FOUND",
                "sources": [{"url": "https://a.example", "title": "A", "attribution": ""}]
            })
        );
    }

    #[test]
    fn test_request_and_response_wire_shape() {
        let req: BridgeRequest = serde_json::from_value(json!({"type": "GET_SOURCES"})).unwrap();
        assert_eq!(req, BridgeRequest::GetSources);
        assert!(serde_json::from_value::<BridgeRequest>(json!({"type": "PING"})).is_err());

        let info = BridgeResponse::PageInfo(PageInfo {
            service: ServiceId::Claude,
            page_url: "https://claude.ai/chat".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"service": "claude", "pageUrl": "https://claude.ai/chat"})
        );

        let back: BridgeResponse = serde_json::from_value(json!({"sources": []})).unwrap();
        assert_eq!(back, BridgeResponse::Sources { sources: vec![] });
    }
}
