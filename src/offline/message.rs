//! Control messages posted to the offline worker by the page.

use serde::{Deserialize, Serialize};

/// ```json
/// {"type": "SKIP_WAITING"}
/// {"type": "CACHE_URLS", "urls": ["/manuals/g609.pdf"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    SkipWaiting,
    CacheUrls { urls: Vec<String> },
}

/// Reply sent back to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_use_screaming_type_tags() {
        let skip: ControlMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(skip, ControlMessage::SkipWaiting);

        let urls: ControlMessage =
            serde_json::from_str(r#"{"type":"CACHE_URLS","urls":["/a.png","/b.css"]}"#).unwrap();
        assert_eq!(
            urls,
            ControlMessage::CacheUrls {
                urls: vec!["/a.png".to_string(), "/b.css".to_string()]
            }
        );

        assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"RELOAD"}"#).is_err());
    }
}
