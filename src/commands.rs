//! CLI command implementations. Results go to stdout as plain `key: value`
//! reports; logs go to stderr.

use anyhow::{bail, Result};

use workshop_hub_core::models::ManualStatus;
use workshop_hub_core::store::ManualStore;

use crate::app;
use crate::batch::{process_batch, BatchOptions};
use crate::config::Config;

pub async fn run_process(config: &Config, filename: &str) -> Result<()> {
    let processor = app::open_processor(config).await?;
    let result = processor.process(filename).await;

    println!("process {}", filename);
    if result.success {
        println!("  pages: {}", result.pages.unwrap_or(0));
        println!("  chunks: {}", result.chunks.unwrap_or(0));
        println!("ok");
        Ok(())
    } else {
        let kind = result
            .error_kind
            .map(|k| format!("{:?}", k).to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        println!("  failed ({}): {}", kind, result.error.unwrap_or_default());
        bail!("processing {} failed", filename)
    }
}

pub async fn run_process_all(
    config: &Config,
    unprocessed_only: bool,
    concurrency: Option<usize>,
    delay_ms: Option<u64>,
) -> Result<()> {
    let processor = app::open_processor(config).await?;

    let objects = if unprocessed_only {
        processor.unprocessed_manuals().await?
    } else {
        processor.storage_manuals().await?
    };
    let filenames: Vec<String> = objects.into_iter().map(|o| o.name).collect();

    let mut options = BatchOptions::from(&config.batch);
    if let Some(n) = concurrency {
        if n == 0 {
            bail!("--concurrency must be >= 1");
        }
        options.concurrency = n;
    }
    if let Some(ms) = delay_ms {
        options.delay = std::time::Duration::from_millis(ms);
    }

    let report = process_batch(&processor, &filenames, &options).await;

    println!("process-all");
    println!("  manuals: {}", filenames.len());
    println!("  succeeded: {}", report.succeeded);
    println!("  failed: {}", report.failed);
    for failed in report.results.iter().filter(|r| !r.success) {
        println!(
            "    {}: {}",
            failed.filename,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("ok");
    Ok(())
}

fn print_status(status: &ManualStatus) {
    println!("{}", status.filename);
    println!("  status: {}", status.status);
    if let Some(ref title) = status.title {
        println!("  title: {}", title);
    }
    if let Some(ref category) = status.category {
        println!("  category: {}", category);
    }
    if !status.model_codes.is_empty() {
        println!("  models: {}", status.model_codes.join(", "));
    }
    if let Some(ref years) = status.year_range {
        println!("  years: {}", years);
    }
    if let Some(pages) = status.page_count {
        println!("  pages: {}", pages);
    }
    if let Some(chunks) = status.chunk_count {
        println!("  chunks: {}", chunks);
    }
    if let Some(ref err) = status.error_message {
        println!("  error: {}", err);
    }
    println!(
        "  processed_at: {}",
        status.processed_at.format("%Y-%m-%dT%H:%M:%SZ")
    );
}

pub async fn run_status(config: &Config, filename: Option<&str>) -> Result<()> {
    let store = app::open_store(config).await?;

    match filename {
        Some(name) => match store.get_status(name).await? {
            Some(status) => print_status(&status),
            None => bail!("no status recorded for {}", name),
        },
        None => {
            let statuses = store.list_statuses().await?;
            if statuses.is_empty() {
                println!("No manuals processed yet.");
            }
            for status in &statuses {
                println!(
                    "{}  {}  pages={}  chunks={}",
                    status.filename,
                    status.status,
                    status.page_count.map_or("-".to_string(), |p| p.to_string()),
                    status.chunk_count.map_or("-".to_string(), |c| c.to_string()),
                );
            }
        }
    }
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let store = app::open_store(config).await?;
    let hits = store.search_chunks(query, limit).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.title);
        println!("    manual: {}  page: {}", hit.manual_name, hit.page_number);
        println!("    {}", hit.snippet);
    }
    Ok(())
}
