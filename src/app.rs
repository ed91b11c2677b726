//! Wiring from [`Config`] to ready-to-use components.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::extract::PdfPageExtractor;
use crate::ingest::ManualProcessor;
use crate::migrate;
use crate::object_store;
use crate::sqlite_store::SqliteManualStore;

/// Open the database, creating the schema if missing.
pub async fn open_store(config: &Config) -> Result<SqliteManualStore> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    Ok(SqliteManualStore::new(pool))
}

/// Open the database and build a processor over the configured storage
/// backend.
pub async fn open_processor(config: &Config) -> Result<ManualProcessor> {
    let store = Arc::new(open_store(config).await?);
    let storage = object_store::from_config(&config.storage)?;

    Ok(
        ManualProcessor::new(storage, Arc::new(PdfPageExtractor), store)
            .with_max_chars(config.chunking.max_chars),
    )
}
