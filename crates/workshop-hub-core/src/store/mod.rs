//! Storage abstraction for processed manuals.
//!
//! The [`ManualStore`] trait covers everything the ingestion pipeline, the
//! status endpoints and keyword search need: chunk persistence, per-manual
//! status records and a simple full-text query.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkHit, ManualChunk, ManualStatus};

/// Abstract storage backend for manual chunks and status records.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`chunk_count`](ManualStore::chunk_count) | Chunks currently stored for a manual |
/// | [`replace_chunks`](ManualStore::replace_chunks) | Atomically swap a manual's chunk set |
/// | [`chunks_for`](ManualStore::chunks_for) | Stored chunks in index order |
/// | [`upsert_status`](ManualStore::upsert_status) | Insert or update a status record |
/// | [`get_status`](ManualStore::get_status) | Status record for one manual |
/// | [`list_statuses`](ManualStore::list_statuses) | All status records, by filename |
/// | [`search_chunks`](ManualStore::search_chunks) | Keyword search over chunk content |
#[async_trait]
pub trait ManualStore: Send + Sync {
    async fn chunk_count(&self, manual_name: &str) -> Result<usize>;

    /// Delete every chunk of `manual_name` and insert `chunks` in their place.
    ///
    /// Either the whole new set becomes visible or the old set is kept.
    async fn replace_chunks(&self, manual_name: &str, chunks: &[ManualChunk]) -> Result<()>;

    async fn chunks_for(&self, manual_name: &str) -> Result<Vec<ManualChunk>>;

    /// Insert or update the record keyed by `status.filename`.
    async fn upsert_status(&self, status: &ManualStatus) -> Result<()>;

    async fn get_status(&self, filename: &str) -> Result<Option<ManualStatus>>;

    async fn list_statuses(&self) -> Result<Vec<ManualStatus>>;

    async fn search_chunks(&self, query: &str, limit: usize) -> Result<Vec<ChunkHit>>;
}
