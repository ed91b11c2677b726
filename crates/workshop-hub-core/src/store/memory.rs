//! In-memory [`ManualStore`] implementation for tests.
//!
//! Uses `HashMap` behind `std::sync::RwLock`. Keyword search is a naive
//! case-insensitive term match scored by the fraction of query terms present.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ChunkHit, ManualChunk, ManualStatus};

use super::ManualStore;

const SNIPPET_CHARS: usize = 200;

/// In-memory manual store.
pub struct InMemoryManualStore {
    chunks: RwLock<HashMap<String, Vec<ManualChunk>>>,
    statuses: RwLock<HashMap<String, ManualStatus>>,
}

impl InMemoryManualStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryManualStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("manual store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("manual store lock poisoned"))
}

#[async_trait]
impl ManualStore for InMemoryManualStore {
    async fn chunk_count(&self, manual_name: &str) -> Result<usize> {
        Ok(read(&self.chunks)?.get(manual_name).map_or(0, Vec::len))
    }

    async fn replace_chunks(&self, manual_name: &str, chunks: &[ManualChunk]) -> Result<()> {
        let mut stored = write(&self.chunks)?;
        if chunks.is_empty() {
            stored.remove(manual_name);
        } else {
            stored.insert(manual_name.to_string(), chunks.to_vec());
        }
        Ok(())
    }

    async fn chunks_for(&self, manual_name: &str) -> Result<Vec<ManualChunk>> {
        let mut chunks = read(&self.chunks)?
            .get(manual_name)
            .cloned()
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn upsert_status(&self, status: &ManualStatus) -> Result<()> {
        write(&self.statuses)?.insert(status.filename.clone(), status.clone());
        Ok(())
    }

    async fn get_status(&self, filename: &str) -> Result<Option<ManualStatus>> {
        Ok(read(&self.statuses)?.get(filename).cloned())
    }

    async fn list_statuses(&self) -> Result<Vec<ManualStatus>> {
        let mut all: Vec<ManualStatus> = read(&self.statuses)?.values().cloned().collect();
        all.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(all)
    }

    async fn search_chunks(&self, query: &str, limit: usize) -> Result<Vec<ChunkHit>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let stored = read(&self.chunks)?;
        let mut hits: Vec<ChunkHit> = stored
            .values()
            .flatten()
            .filter_map(|chunk| {
                let haystack = chunk.content.to_lowercase();
                let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                (matched > 0).then(|| ChunkHit {
                    chunk_id: chunk.id.clone(),
                    manual_name: chunk.manual_name.clone(),
                    page_number: chunk.page_number,
                    title: chunk.title.clone(),
                    score: matched as f64 / terms.len() as f64,
                    snippet: chunk.content.chars().take(SNIPPET_CHARS).collect(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.title.cmp(&b.title))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
