//! Routes cache change events into the work queue.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use kube::Resource;
use rollgate_core::ObjectKey;
use rollgate_store::{key_of, Change, WorkQueue};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::filter::accept_deployment;
use crate::owner::owner_keys;

/// Enqueue the Deployment key for every change the filter approves.
pub fn route_deployment(change: &Change<Deployment>, queue: &WorkQueue<ObjectKey>) -> bool {
    if !accept_deployment(change) {
        return false;
    }
    let obj = match change {
        Change::Created(o) | Change::Deleted(o) => o,
        Change::Updated { new, .. } => new,
    };
    queue.add(key_of(obj.as_ref()));
    true
}

/// Enqueue the controlling Deployment of a dependent object; returns the
/// number of keys added.
pub fn route_owned<K: Resource>(change: &Change<K>, queue: &WorkQueue<ObjectKey>) -> usize {
    let keys = owner_keys(change);
    let n = keys.len();
    for k in keys {
        debug!(owner = %k, "dependent changed; enqueue owner");
        queue.add(k);
    }
    n
}

pub async fn run_deployment_router(mut rx: mpsc::Receiver<Change<Deployment>>, queue: Arc<WorkQueue<ObjectKey>>) {
    while let Some(change) = rx.recv().await {
        route_deployment(&change, &queue);
    }
    info!("deployment router stopped");
}

pub async fn run_owner_router<K: Resource>(kind: &'static str, mut rx: mpsc::Receiver<Change<K>>, queue: Arc<WorkQueue<ObjectKey>>) {
    while let Some(change) = rx.recv().await {
        route_owned(&change, &queue);
    }
    info!(kind, "owner router stopped");
}
