//! Manual ingestion pipeline.
//!
//! [`ManualProcessor::process`] takes one PDF from object storage to
//! persisted chunks:
//!
//! ```text
//! status=processing → download → extract pages → normalize → chunk
//!     → classify → replace chunks (one transaction) → status=completed|failed
//! ```
//!
//! Every failure is captured in the returned [`ProcessingResult`] and in the
//! manual's status record; `process` itself never returns an error.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use workshop_hub_core::chunk::{chunk_manual, normalize_page_text, DEFAULT_MAX_CHUNK_CHARS};
use workshop_hub_core::classify::derive_metadata;
use workshop_hub_core::models::{
    FailureKind, ManualMetadata, ManualStatus, PageText, ProcessingResult, ProcessingStatus,
};
use workshop_hub_core::store::ManualStore;

use crate::extract::{panic_message, PageExtractor};
use crate::object_store::{ObjectInfo, ObjectStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to download {filename}: {source}")]
    Download {
        filename: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to parse {filename}: {message}")]
    Parse { filename: String, message: String },

    #[error("failed to persist chunks for {filename}: {message}")]
    Persist { filename: String, message: String },
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Download { .. } => FailureKind::Download,
            IngestError::Parse { .. } => FailureKind::Parse,
            IngestError::Persist { .. } => FailureKind::Persist,
        }
    }
}

struct Processed {
    pages: u32,
    chunks: usize,
    file_size: u64,
    metadata: ManualMetadata,
}

/// Runs the ingestion pipeline against pluggable storage, extraction and
/// persistence.
pub struct ManualProcessor {
    storage: Arc<dyn ObjectStore>,
    extractor: Arc<dyn PageExtractor>,
    store: Arc<dyn ManualStore>,
    max_chars: usize,
}

impl ManualProcessor {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        extractor: Arc<dyn PageExtractor>,
        store: Arc<dyn ManualStore>,
    ) -> Self {
        Self {
            storage,
            extractor,
            store,
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn store(&self) -> &Arc<dyn ManualStore> {
        &self.store
    }

    /// Process one manual end to end.
    pub async fn process(&self, filename: &str) -> ProcessingResult {
        let started_at = Utc::now();
        info!(filename, "processing manual");

        if let Err(e) = self
            .store
            .upsert_status(&ManualStatus::processing(filename, started_at))
            .await
        {
            warn!(filename, error = %format!("{:#}", e), "could not record processing status");
        }

        let mut status = ManualStatus::processing(filename, started_at);
        status.processed_at = Utc::now();

        let result = match self.run(filename).await {
            Ok(done) => {
                info!(
                    filename,
                    pages = done.pages,
                    chunks = done.chunks,
                    "manual processed"
                );
                status.status = ProcessingStatus::Completed;
                status.page_count = Some(done.pages);
                status.chunk_count = Some(done.chunks as u32);
                status.file_size = Some(done.file_size);
                status.title = Some(done.metadata.title);
                status.category = Some(done.metadata.category);
                status.model_codes = done.metadata.model_codes;
                status.year_range = done.metadata.year_range;
                ProcessingResult::succeeded(filename, done.pages, done.chunks)
            }
            Err(e) => {
                error!(filename, kind = ?e.kind(), error = %e, "manual processing failed");
                status.status = ProcessingStatus::Failed;
                status.error_message = Some(e.to_string());
                ProcessingResult::failed(filename, e.kind(), e.to_string())
            }
        };

        status.processed_at = Utc::now();
        if let Err(e) = self.store.upsert_status(&status).await {
            warn!(filename, error = %format!("{:#}", e), "could not record final status");
        }
        result
    }

    async fn run(&self, filename: &str) -> Result<Processed, IngestError> {
        let bytes = self
            .storage
            .download(filename)
            .await
            .map_err(|source| IngestError::Download {
                filename: filename.to_string(),
                source,
            })?;
        let file_size = bytes.len() as u64;

        let raw_pages = self.extract(filename, bytes).await?;
        let page_count = raw_pages.len() as u32;
        let pages: Vec<PageText> = raw_pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageText {
                number: i as u32 + 1,
                text,
            })
            .collect();

        let chunks = chunk_manual(filename, &pages, self.max_chars);

        let first_page = pages
            .iter()
            .map(|p| normalize_page_text(&p.text))
            .find(|t| !t.is_empty())
            .unwrap_or_default();
        let metadata = derive_metadata(filename, &first_page);

        match self.store.chunk_count(filename).await {
            Ok(0) => {}
            Ok(existing) => info!(filename, existing, "replacing existing chunks"),
            Err(e) => warn!(filename, error = %format!("{:#}", e), "could not count existing chunks"),
        }

        self.store
            .replace_chunks(filename, &chunks)
            .await
            .map_err(|e| IngestError::Persist {
                filename: filename.to_string(),
                message: format!("{:#}", e),
            })?;

        Ok(Processed {
            pages: page_count,
            chunks: chunks.len(),
            file_size,
            metadata,
        })
    }

    /// Run the extractor on the blocking pool, turning panics into parse
    /// errors.
    async fn extract(&self, filename: &str, bytes: Vec<u8>) -> Result<Vec<String>, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let parse_error = |message: String| IngestError::Parse {
            filename: filename.to_string(),
            message,
        };

        match tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes)).await {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(parse_error(e.to_string())),
            Err(join) if join.is_panic() => Err(parse_error(format!(
                "extractor panicked: {}",
                panic_message(join.into_panic().as_ref())
            ))),
            Err(join) => Err(parse_error(join.to_string())),
        }
    }

    /// PDFs in storage without a `completed` status record.
    pub async fn unprocessed_manuals(&self) -> anyhow::Result<Vec<ObjectInfo>> {
        let objects = self.storage.list().await?;
        let completed: std::collections::HashSet<String> = self
            .store
            .list_statuses()
            .await?
            .into_iter()
            .filter(|s| s.status == ProcessingStatus::Completed)
            .map(|s| s.filename)
            .collect();

        Ok(objects
            .into_iter()
            .filter(|o| !completed.contains(&o.name))
            .collect())
    }

    /// Every PDF in storage.
    pub async fn storage_manuals(&self) -> anyhow::Result<Vec<ObjectInfo>> {
        Ok(self.storage.list().await?)
    }
}
