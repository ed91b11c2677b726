//! Batch processing of many manuals.
//!
//! Sequential mode (`concurrency <= 1`) processes one manual at a time with
//! an optional pause between them. Otherwise up to `concurrency` manuals run
//! at once. Either way results come back in input order and one failure
//! never stops the batch.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::info;

use workshop_hub_core::models::ProcessingResult;

use crate::config::BatchConfig;
use crate::ingest::ManualProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            delay: Duration::ZERO,
        }
    }
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<ProcessingResult>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    fn from_results(results: Vec<ProcessingResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        Self {
            results,
            succeeded,
            failed,
        }
    }
}

pub async fn process_batch(
    processor: &ManualProcessor,
    filenames: &[String],
    options: &BatchOptions,
) -> BatchReport {
    info!(
        total = filenames.len(),
        concurrency = options.concurrency,
        "starting batch"
    );

    let results = if options.concurrency <= 1 {
        let mut results = Vec::with_capacity(filenames.len());
        for (i, filename) in filenames.iter().enumerate() {
            if i > 0 && !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
            let result = processor.process(filename).await;
            info!(
                progress = %format!("{}/{}", i + 1, filenames.len()),
                filename = %filename,
                success = result.success,
                "batch item done"
            );
            results.push(result);
        }
        results
    } else {
        stream::iter(filenames)
            .map(|filename| processor.process(filename))
            .buffered(options.concurrency)
            .collect::<Vec<_>>()
            .await
    };

    let report = BatchReport::from_results(results);
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        "batch finished"
    );
    report
}
