//! Core data models used throughout Workshop Hub.
//!
//! Two families live here: the manual ingestion types (pages, chunks,
//! processing status) and the HTTP request/response values that flow through
//! the offline cache worker.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// Manual ingestion
// ═══════════════════════════════════════════════════════════════════════

/// Text extracted from one PDF page. Page numbers are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Heuristic classification of a chunk's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Table,
    Procedure,
    DiagramCaption,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Table => "table",
            ContentType::Procedure => "procedure",
            ContentType::DiagramCaption => "diagram_caption",
        }
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "table" => Ok(ContentType::Table),
            "procedure" => Ok(ContentType::Procedure),
            "diagram_caption" => Ok(ContentType::DiagramCaption),
            other => anyhow::bail!("unknown content type: '{}'", other),
        }
    }
}

/// A bounded-size fragment of one manual page, the unit persisted and searched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualChunk {
    pub id: String,
    /// Source filename in object storage.
    pub manual_name: String,
    /// Position of the chunk within the whole manual, starting at 0.
    pub chunk_index: i64,
    pub page_number: u32,
    /// 1-based part index, set only when the page produced more than one chunk.
    pub part: Option<u32>,
    pub title: String,
    pub content: String,
    pub content_type: ContentType,
    pub section_title: Option<String>,
    /// SHA-256 of `content`.
    pub hash: String,
}

/// Processing lifecycle of a manual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => anyhow::bail!("unknown processing status: '{}'", other),
        }
    }
}

/// Descriptive metadata derived from a manual's filename and first page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManualMetadata {
    pub title: String,
    pub category: String,
    pub model_codes: Vec<String>,
    pub year_range: Option<String>,
}

/// Per-manual status record, pollable without re-parsing the PDF.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualStatus {
    pub filename: String,
    pub status: ProcessingStatus,
    pub title: Option<String>,
    pub category: Option<String>,
    pub model_codes: Vec<String>,
    pub year_range: Option<String>,
    pub page_count: Option<u32>,
    pub chunk_count: Option<u32>,
    pub file_size: Option<u64>,
    pub error_message: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: DateTime<Utc>,
}

impl ManualStatus {
    /// A fresh `processing` record for `filename`.
    pub fn processing(filename: &str, now: DateTime<Utc>) -> Self {
        Self {
            filename: filename.to_string(),
            status: ProcessingStatus::Processing,
            title: None,
            category: None,
            model_codes: Vec::new(),
            year_range: None,
            page_count: None,
            chunk_count: None,
            file_size: None,
            error_message: None,
            processing_started_at: Some(now),
            processed_at: now,
        }
    }
}

/// Which stage of `process` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Download,
    Parse,
    Persist,
}

/// Outcome of processing one manual. Never an `Err`: callers such as batch
/// drivers inspect `success` and carry on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

impl ProcessingResult {
    pub fn succeeded(filename: &str, pages: u32, chunks: usize) -> Self {
        Self {
            filename: filename.to_string(),
            success: true,
            chunks: Some(chunks),
            pages: Some(pages),
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(filename: &str, kind: FailureKind, error: String) -> Self {
        Self {
            filename: filename.to_string(),
            success: false,
            chunks: None,
            pages: None,
            error: Some(error),
            error_kind: Some(kind),
        }
    }
}

/// A keyword search hit over manual chunks.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub manual_name: String,
    pub page_number: u32,
    pub title: String,
    pub score: f64,
    pub snippet: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Offline cache worker
// ═══════════════════════════════════════════════════════════════════════

/// How the page issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// A top-level document navigation.
    Navigate,
    #[default]
    Other,
}

/// Fingerprint of a request within a cache: `"{METHOD} {URL}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &str, url: &str) -> Self {
        Self(format!("{} {}", method.to_ascii_uppercase(), url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An intercepted request. `url` is absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            mode: RequestMode::Other,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Path component of the URL, or `None` if the URL does not parse.
    pub fn path(&self) -> Option<String> {
        url::Url::parse(&self.url).ok().map(|u| u.path().to_string())
    }
}

/// A response as stored in, or served from, the offline cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// `true` for 2xx statuses.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Synthetic 503 for API requests that could be served neither from the
    /// network nor the cache.
    pub fn offline_json(message: &str) -> Self {
        let body = serde_json::json!({ "error": "offline", "message": message });
        Self {
            status: 503,
            status_text: "Service Unavailable".to_string(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        }
    }

    /// Synthetic 503 for static requests with no cached copy.
    pub fn network_error() -> Self {
        Self {
            status: 503,
            status_text: "Service Unavailable".to_string(),
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: b"Network error".to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_key_includes_method_and_url() {
        let req = HttpRequest::get("https://hub.test/api/posts?page=2");
        assert_eq!(req.key().as_str(), "GET https://hub.test/api/posts?page=2");
        assert_eq!(req.path().as_deref(), Some("/api/posts"));
    }

    #[test]
    fn offline_json_body_is_detectable() {
        let resp = HttpResponse::offline_json("You are offline");
        assert_eq!(resp.status, 503);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"], "offline");
        assert_eq!(body["message"], "You are offline");
    }

    #[test]
    fn processing_result_omits_absent_fields() {
        let ok = serde_json::to_value(ProcessingResult::succeeded("a.pdf", 3, 4)).unwrap();
        assert_eq!(ok["success"], true);
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(ProcessingResult::failed(
            "a.pdf",
            FailureKind::Parse,
            "bad xref".to_string(),
        ))
        .unwrap();
        assert_eq!(err["error_kind"], "parse");
        assert!(err.get("chunks").is_none());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(s.as_str().parse::<ProcessingStatus>().unwrap(), s);
        }
    }
}
