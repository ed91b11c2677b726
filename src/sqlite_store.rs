//! SQLite-backed [`ManualStore`] implementation.
//!
//! Chunks live in `manual_chunks` with a mirrored FTS5 index in
//! `manual_chunks_fts`; status records live in `processed_manuals`. The
//! schema is created by [`crate::migrate`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use workshop_hub_core::models::{ChunkHit, ManualChunk, ManualStatus};
use workshop_hub_core::store::ManualStore;

/// SQLite implementation of the [`ManualStore`] trait.
pub struct SqliteManualStore {
    pool: SqlitePool,
}

impl SqliteManualStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

/// Quote each whitespace-separated term so FTS5 operators in user input are
/// treated as literals, and OR them together.
fn fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn chunk_from_row(row: &SqliteRow) -> Result<ManualChunk> {
    let content_type: String = row.get("content_type");
    Ok(ManualChunk {
        id: row.get("id"),
        manual_name: row.get("manual_name"),
        chunk_index: row.get("chunk_index"),
        page_number: row.get::<i64, _>("page_number") as u32,
        part: row.get::<Option<i64>, _>("part").map(|p| p as u32),
        title: row.get("title"),
        content: row.get("content"),
        content_type: content_type.parse()?,
        section_title: row.get("section_title"),
        hash: row.get("hash"),
    })
}

fn status_from_row(row: &SqliteRow) -> Result<ManualStatus> {
    let status: String = row.get("status");
    let model_codes: String = row.get("model_codes");
    Ok(ManualStatus {
        filename: row.get("filename"),
        status: status.parse()?,
        title: row.get("title"),
        category: row.get("category"),
        model_codes: serde_json::from_str(&model_codes).unwrap_or_default(),
        year_range: row.get("year_range"),
        page_count: row.get::<Option<i64>, _>("page_count").map(|v| v as u32),
        chunk_count: row.get::<Option<i64>, _>("chunk_count").map(|v| v as u32),
        file_size: row.get::<Option<i64>, _>("file_size").map(|v| v as u64),
        error_message: row.get("error_message"),
        processing_started_at: row
            .get::<Option<i64>, _>("processing_started_at")
            .map(from_ts),
        processed_at: from_ts(row.get("processed_at")),
    })
}

#[async_trait]
impl ManualStore for SqliteManualStore {
    async fn chunk_count(&self, manual_name: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM manual_chunks WHERE manual_name = ?")
            .bind(manual_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn replace_chunks(&self, manual_name: &str, chunks: &[ManualChunk]) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM manual_chunks_fts WHERE manual_name = ?")
            .bind(manual_name)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM manual_chunks WHERE manual_name = ?")
            .bind(manual_name)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO manual_chunks (id, manual_name, chunk_index, page_number, part,
                                           title, content, content_type, section_title,
                                           hash, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(manual_name)
            .bind(chunk.chunk_index)
            .bind(chunk.page_number as i64)
            .bind(chunk.part.map(|p| p as i64))
            .bind(&chunk.title)
            .bind(&chunk.content)
            .bind(chunk.content_type.as_str())
            .bind(&chunk.section_title)
            .bind(&chunk.hash)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert chunk {} of {}", chunk.chunk_index, manual_name))?;

            sqlx::query(
                "INSERT INTO manual_chunks_fts (chunk_id, manual_name, content) VALUES (?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(manual_name)
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn chunks_for(&self, manual_name: &str) -> Result<Vec<ManualChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, manual_name, chunk_index, page_number, part, title, content,
                   content_type, section_title, hash
            FROM manual_chunks
            WHERE manual_name = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(manual_name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn upsert_status(&self, status: &ManualStatus) -> Result<()> {
        let model_codes = serde_json::to_string(&status.model_codes)?;
        sqlx::query(
            r#"
            INSERT INTO processed_manuals (filename, status, title, category, model_codes,
                                           year_range, page_count, chunk_count, file_size,
                                           error_message, processing_started_at, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                status = excluded.status,
                title = excluded.title,
                category = excluded.category,
                model_codes = excluded.model_codes,
                year_range = excluded.year_range,
                page_count = excluded.page_count,
                chunk_count = excluded.chunk_count,
                file_size = excluded.file_size,
                error_message = excluded.error_message,
                processing_started_at = excluded.processing_started_at,
                processed_at = excluded.processed_at
            "#,
        )
        .bind(&status.filename)
        .bind(status.status.as_str())
        .bind(&status.title)
        .bind(&status.category)
        .bind(&model_codes)
        .bind(&status.year_range)
        .bind(status.page_count.map(|v| v as i64))
        .bind(status.chunk_count.map(|v| v as i64))
        .bind(status.file_size.map(|v| v as i64))
        .bind(&status.error_message)
        .bind(status.processing_started_at.map(|t| t.timestamp()))
        .bind(status.processed_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_status(&self, filename: &str) -> Result<Option<ManualStatus>> {
        let row = sqlx::query("SELECT * FROM processed_manuals WHERE filename = ?")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(status_from_row).transpose()
    }

    async fn list_statuses(&self) -> Result<Vec<ManualStatus>> {
        let rows = sqlx::query("SELECT * FROM processed_manuals ORDER BY filename ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(status_from_row).collect()
    }

    async fn search_chunks(&self, query: &str, limit: usize) -> Result<Vec<ChunkHit>> {
        let fts = fts_query(query);
        if fts.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT f.chunk_id, f.manual_name, f.rank, c.page_number, c.title,
                   snippet(manual_chunks_fts, 2, '>>>', '<<<', '...', 48) AS snippet
            FROM manual_chunks_fts f
            JOIN manual_chunks c ON c.id = f.chunk_id
            WHERE manual_chunks_fts MATCH ?
            ORDER BY f.rank
            LIMIT ?
            "#,
        )
        .bind(&fts)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                ChunkHit {
                    chunk_id: row.get("chunk_id"),
                    manual_name: row.get("manual_name"),
                    page_number: row.get::<i64, _>("page_number") as u32,
                    title: row.get("title"),
                    score: -rank,
                    snippet: row.get("snippet"),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_pool;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use workshop_hub_core::chunk::chunk_manual;
    use workshop_hub_core::models::{PageText, ProcessingStatus};

    async fn temp_store(dir: &tempfile::TempDir) -> SqliteManualStore {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", dir.path().join("t.sqlite").display()))
                .unwrap()
                .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        migrate_pool(&pool).await.unwrap();
        SqliteManualStore::new(pool)
    }

    fn pages(texts: &[&str]) -> Vec<PageText> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| PageText {
                number: i as u32 + 1,
                text: t.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn replace_chunks_swaps_the_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir).await;

        let first = chunk_manual("g609.pdf", &pages(&["Drain the coolant.", "Refill."]), 1500);
        store.replace_chunks("g609.pdf", &first).await.unwrap();
        assert_eq!(store.chunk_count("g609.pdf").await.unwrap(), 2);

        let second = chunk_manual("g609.pdf", &pages(&["Torque to 40 Nm."]), 1500);
        store.replace_chunks("g609.pdf", &second).await.unwrap();

        let stored = store.chunks_for("g609.pdf").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "Torque to 40 Nm.");
        assert_eq!(stored[0].title, "g609.pdf - Page 1");

        let stale = store.search_chunks("coolant", 10).await.unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn failed_replace_keeps_previous_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir).await;

        let original = chunk_manual("g609.pdf", &pages(&["A.", "B."]), 1500);
        store.replace_chunks("g609.pdf", &original).await.unwrap();

        let mut clashing = chunk_manual("g609.pdf", &pages(&["C.", "D."]), 1500);
        clashing[1].chunk_index = clashing[0].chunk_index;
        assert!(store.replace_chunks("g609.pdf", &clashing).await.is_err());

        let kept: Vec<String> = store
            .chunks_for("g609.pdf")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.content)
            .collect();
        assert_eq!(kept, vec!["A.", "B."]);
        assert_eq!(store.search_chunks("C.", 5).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn status_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir).await;

        let mut status = ManualStatus::processing("u1700.pdf", Utc::now());
        status.status = ProcessingStatus::Completed;
        status.model_codes = vec!["U1700L".to_string()];
        status.page_count = Some(3);
        status.chunk_count = Some(4);
        store.upsert_status(&status).await.unwrap();

        let loaded = store.get_status("u1700.pdf").await.unwrap().unwrap();
        assert_eq!(loaded.status, ProcessingStatus::Completed);
        assert_eq!(loaded.model_codes, vec!["U1700L".to_string()]);
        assert_eq!(loaded.chunk_count, Some(4));
        assert_eq!(store.list_statuses().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_tolerates_fts_syntax_in_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir).await;
        let chunks = chunk_manual("a.pdf", &pages(&["Check the portal axle oil level."]), 1500);
        store.replace_chunks("a.pdf", &chunks).await.unwrap();

        let hits = store.search_chunks("axle AND \"oil", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page_number, 1);
    }
}
