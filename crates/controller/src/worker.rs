//! Fixed-size worker pool draining the work queue.

use std::sync::Arc;

use rollgate_core::ObjectKey;
use rollgate_store::WorkQueue;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::reconcile::Reconciler;

/// Spawn `workers` tasks; each returns once the queue is shut down.
pub fn spawn_workers(workers: usize, queue: Arc<WorkQueue<ObjectKey>>, reconciler: Arc<Reconciler>) -> Vec<JoinHandle<()>> {
    (0..workers)
        .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&queue), Arc::clone(&reconciler))))
        .collect()
}

async fn worker_loop(id: usize, queue: Arc<WorkQueue<ObjectKey>>, reconciler: Arc<Reconciler>) {
    debug!(worker = id, "worker started");
    while let Some(key) = queue.get().await {
        match reconciler.reconcile(&key).await {
            Ok(outcome) => {
                debug!(worker = id, deployment = %key, outcome = outcome.as_str(), "reconciled");
                queue.forget(&key);
            }
            Err(e) => {
                warn!(worker = id, deployment = %key, error = %e, retries = queue.num_requeues(&key), "reconcile failed; requeue");
                queue.add_rate_limited(key.clone());
            }
        }
        queue.done(&key);
    }
    info!(worker = id, "worker stopped");
}
