//! Event consumer task.
//!
//! Drains the listener's channel and applies each [`EngineEvent`] through
//! [`JobRelay::apply_event`]. Status transitions are applied inline, in
//! receive order. Reconciliation (which performs HTTP round-trips) runs on
//! tracked tasks so the stream keeps flowing while artifacts download.

use std::sync::Arc;
use std::time::Duration;

use relay_comfyui::events::EngineEvent;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::engine::relay::JobRelay;

/// How long to wait for in-flight reconciliations on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run until the channel closes or `cancel` fires.
///
/// `reconcile_interval`, when set, periodically reconciles all active jobs
/// to recover from drained signals lost while the stream was down.
pub async fn run_event_consumer(
    relay: Arc<JobRelay>,
    mut rx: mpsc::Receiver<EngineEvent>,
    reconcile_interval: Option<Duration>,
    cancel: CancellationToken,
) {
    let tracker = TaskTracker::new();
    let mut ticker = reconcile_interval.map(|period| {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    tracing::info!(
        reconcile_interval_secs = reconcile_interval.map(|d| d.as_secs()),
        "Event consumer started",
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Event consumer shutting down");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed");
                    break;
                };
                match event {
                    EngineEvent::QueueDrained | EngineEvent::JobFinished { .. } => {
                        let relay = Arc::clone(&relay);
                        tracker.spawn(async move { relay.apply_event(event).await });
                    }
                    other => relay.apply_event(other).await,
                }
            }
            _ = next_tick(&mut ticker) => {
                let relay = Arc::clone(&relay);
                tracker.spawn(async move {
                    let outcomes = relay.reconcile_active().await;
                    if !outcomes.is_empty() {
                        tracing::debug!(checked = outcomes.len(), "Periodic reconcile");
                    }
                });
            }
        }
    }

    tracker.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, tracker.wait()).await.is_err() {
        tracing::warn!("Reconcile tasks still running at shutdown");
    }
}

/// Resolves on the next tick, or never when no interval is configured.
async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
