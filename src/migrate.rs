use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the hub schema on a fresh connection. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the hub schema on an existing pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manual_chunks (
            id TEXT PRIMARY KEY,
            manual_name TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            page_number INTEGER NOT NULL,
            part INTEGER,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text',
            section_title TEXT,
            hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(manual_name, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_manuals (
            filename TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            title TEXT,
            category TEXT,
            model_codes TEXT NOT NULL DEFAULT '[]',
            year_range TEXT,
            page_count INTEGER,
            chunk_count INTEGER,
            file_size INTEGER,
            error_message TEXT,
            processing_started_at INTEGER,
            processed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='manual_chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE manual_chunks_fts USING fts5(
                chunk_id UNINDEXED,
                manual_name UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_manual_chunks_manual_name ON manual_chunks(manual_name)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_processed_manuals_status ON processed_manuals(status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
