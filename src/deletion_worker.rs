//! Deferred-deletion worker (C7, spec §4.7): a single background task
//! draining the deletion queue against S3 with adaptive polling.

use std::time::Duration;

use tokio::sync::watch;

use crate::catalog::Catalog;
use crate::config::DeletionWorkerConfig;
use crate::error::Result;
use crate::s3_client::S3Client;

/// Runs until `shutdown` fires. Adaptive interval: resets to `min_interval`
/// whenever work was found, backs off by ×1.5 (capped at `max_interval`)
/// when a tick finds nothing due, and retries after a fixed 10s on error
/// (spec §4.7 step 1). A full batch is followed immediately by another tick
/// rather than waiting out the interval (step 3).
pub async fn run(catalog: &dyn Catalog, s3: &S3Client, config: &DeletionWorkerConfig, mut shutdown: watch::Receiver<bool>) {
    let mut interval = config.min_interval;

    loop {
        if *shutdown.borrow() {
            return;
        }

        match run_batch(catalog, s3, config.batch_size).await {
            Ok(processed) => {
                if processed as i64 == config.batch_size {
                    continue;
                }
                interval = if processed == 0 {
                    std::cmp::min(scale_interval(interval, 1.5), config.max_interval)
                } else {
                    config.min_interval
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "deletion worker batch failed");
                interval = Duration::from_secs(10);
            }
        }

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn run_batch(catalog: &dyn Catalog, s3: &S3Client, batch_size: i64) -> Result<usize> {
    let due = catalog.get_due_deletions(batch_size).await?;
    let mut processed = 0;

    for row in &due {
        match s3.delete_object(&row.object_key).await {
            Ok(()) => {
                catalog.delete_queue_row(&row.id).await?;
                processed += 1;
            }
            Err(e) => {
                tracing::warn!(object_key = %row.object_key, error = %e, "deferred delete failed, retrying later");
            }
        }
    }

    Ok(processed)
}

fn scale_interval(interval: Duration, factor: f64) -> Duration {
    Duration::from_secs_f64((interval.as_secs_f64() * factor).max(0.001))
}
