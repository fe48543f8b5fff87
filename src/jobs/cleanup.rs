//! Background job: prune requests whose hook process has exited.
//!
//! Listing already prunes, but only while a browser is polling. This keeps
//! the queue directory tidy when nobody has the page open.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::service::ApprovalService;
use crate::store::queue::QueueStore;

/// Spawn the background sweep. Call this once at startup.
pub fn spawn(service: Arc<ApprovalService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweep(service.queue()).await;
        }
    })
}

/// One pruning pass. Errors are logged; the job keeps running.
pub async fn sweep(queue: &QueueStore) -> usize {
    match queue.prune_orphans().await {
        Ok(0) => 0,
        Ok(pruned) => {
            tracing::info!(pruned, "cleanup job pruned orphaned requests");
            pruned
        }
        Err(e) => {
            tracing::error!("cleanup job failed: {}", e);
            0
        }
    }
}
