//! Periodic eviction of old jobs from the job table.
//!
//! Jobs are removed once they are older than the retention window,
//! whatever their status. A job that never finished is simply dropped; the
//! engine is not told to abort it.

use std::sync::Arc;
use std::time::Duration;

use relay_core::job_table::JobTable;
use tokio_util::sync::CancellationToken;

/// Shortest sweep period; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Run the retention sweep loop until `cancel` is triggered.
pub async fn run(
    jobs: Arc<JobTable>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let interval = interval.max(MIN_SWEEP_INTERVAL);
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Job retention sweep started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                let removed = jobs.sweep(retention).await;
                if removed > 0 {
                    let remaining = jobs.len().await;
                    tracing::info!(removed, remaining, "Job retention: evicted old jobs");
                } else {
                    tracing::debug!("Job retention: nothing to evict");
                }
            }
        }
    }
}
