#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use workshop_hub::extract::{ExtractError, PageExtractor};
use workshop_hub::object_store::{ObjectInfo, ObjectStore, StorageError};
use workshop_hub::offline::{FetchError, Fetcher};
use workshop_hub_core::models::{HttpRequest, HttpResponse};

/// Page separator understood by [`FormFeedExtractor`].
pub const PAGE_BREAK: char = '\u{c}';

/// Object store over an in-memory map of name to bytes.
#[derive(Default)]
pub struct MemoryObjects {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.into());
    }

    /// Store `pages` as a fake document understood by [`FormFeedExtractor`].
    pub fn insert_pages(&self, name: &str, pages: &[String]) {
        self.insert(name, pages.join(&PAGE_BREAK.to_string()));
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn download(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects: Vec<ObjectInfo> = self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(name, bytes)| ObjectInfo {
                name: name.clone(),
                size: bytes.len() as u64,
                last_modified: None,
            })
            .collect();
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }
}

/// Treats bytes as UTF-8 text with pages separated by form feeds.
/// Documents starting with `BROKEN` fail to parse and ones starting with
/// `PANIC` make the extractor panic.
pub struct FormFeedExtractor;

impl PageExtractor for FormFeedExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        if bytes.starts_with(b"PANIC") {
            panic!("extractor blew up");
        }
        if bytes.starts_with(b"BROKEN") {
            return Err(ExtractError::Pdf("invalid xref table".to_string()));
        }
        let text = String::from_utf8_lossy(bytes);
        Ok(text.split(PAGE_BREAK).map(str::to_string).collect())
    }
}

/// `count` sentences of exactly `len` characters each, joined by spaces.
pub fn sentences(count: usize, len: usize) -> String {
    (0..count)
        .map(|i| {
            let stem = format!("Step {} ", i);
            let filler = "x".repeat(len - stem.len() - 1);
            format!("{}{}.", stem, filler)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scriptable network for the offline worker.
#[derive(Default)]
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, (u16, String)>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every subsequent fetch wait for a permit on the returned notify.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    pub fn release(&self) {
        *self.gate.lock().unwrap() = None;
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        self.calls.lock().unwrap().push(request.url.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network("connection refused".to_string()));
        }

        let found = self.responses.lock().unwrap().get(&request.url).cloned();
        Ok(match found {
            Some((status, body)) => HttpResponse::new(status, body),
            None => HttpResponse::new(404, "not found"),
        })
    }
}

/// A minimal one-page PDF showing `phrase`, parseable by `pdf-extract`.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
