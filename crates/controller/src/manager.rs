//! Wires watchers, caches, routers, the work queue and the worker pool.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Pod;
use rollgate_core::{ControllerConfig, ObjectKey, CONTROLLER_NAME};
use rollgate_kubehub::{api_for, kube_client, start_watcher, KubeRecorder};
use rollgate_store::{spawn_cache, CacheReader, WorkQueue};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::context::{Listers, Shared};
use crate::dispatch::{run_deployment_router, run_owner_router};
use crate::gate::Gate;
use crate::reconcile::Reconciler;
use crate::sync::SyncEngine;
use crate::worker::spawn_workers;

fn spawn_logged<F>(what: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            error!(task = what, error = ?e, "background task failed");
        }
    })
}

/// Wait for every cache under one shared timeout; returns the first kind that
/// did not sync.
async fn first_unsynced(
    timeout: Duration,
    deployments: &CacheReader<Deployment>,
    replica_sets: &CacheReader<ReplicaSet>,
    pods: &CacheReader<Pod>,
) -> Option<&'static str> {
    let (d_ok, rs_ok, pod_ok) =
        tokio::join!(deployments.wait_synced(timeout), replica_sets.wait_synced(timeout), pods.wait_synced(timeout));
    [("Deployment", d_ok), ("ReplicaSet", rs_ok), ("Pod", pod_ok)].into_iter().find(|(_, ok)| !ok).map(|(kind, _)| kind)
}

/// Run the controller until Ctrl-C. Returns immediately when the feature gate is off.
pub async fn run(config: ControllerConfig, engine: Arc<dyn SyncEngine>) -> Result<()> {
    if !config.enabled {
        warn!("advanced deployment controller is disabled");
        return Ok(());
    }
    let client = kube_client().await?;
    let ns = config.namespace.as_deref();
    let cap = config.queue_cap;
    let queue: Arc<WorkQueue<ObjectKey>> = Arc::new(WorkQueue::new());

    let (d_changes_tx, d_changes_rx) = mpsc::channel(cap);
    let (rs_changes_tx, rs_changes_rx) = mpsc::channel(cap);
    let (d_tx, deployments) = spawn_cache::<Deployment>("Deployment", cap, Some(d_changes_tx));
    let (rs_tx, replica_sets) = spawn_cache::<ReplicaSet>("ReplicaSet", cap, Some(rs_changes_tx));
    let (pod_tx, pods) = spawn_cache::<Pod>("Pod", cap, None);

    let watchers = vec![
        spawn_logged("deployment-watcher", start_watcher("Deployment", api_for::<Deployment>(client.clone(), ns), d_tx)),
        spawn_logged("replicaset-watcher", start_watcher("ReplicaSet", api_for::<ReplicaSet>(client.clone(), ns), rs_tx)),
        spawn_logged("pod-watcher", start_watcher("Pod", api_for::<Pod>(client.clone(), ns), pod_tx)),
    ];
    tokio::spawn(run_deployment_router(d_changes_rx, Arc::clone(&queue)));
    tokio::spawn(run_owner_router("ReplicaSet", rs_changes_rx, Arc::clone(&queue)));

    let timeout = Duration::from_secs(config.sync_timeout_secs);
    if let Some(kind) = first_unsynced(timeout, &deployments, &replica_sets, &pods).await {
        watchers.iter().for_each(|w| w.abort());
        bail!("timed out waiting for {kind} cache to sync");
    }
    info!("caches synced");

    let shared = Shared {
        client: Some(client.clone()),
        listers: Listers { replica_sets, pods },
        recorder: Arc::new(KubeRecorder::new(client, CONTROLLER_NAME)),
    };
    let reconciler = Arc::new(Reconciler::new(Arc::new(deployments), Gate::new(shared), engine));
    let workers = spawn_workers(config.workers, Arc::clone(&queue), reconciler);
    info!(workers = config.workers, ns = ?ns, "controller started");

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received; letting in-flight reconciles finish");
    queue.shut_down();
    for w in workers {
        let _ = w.await;
    }
    watchers.iter().for_each(|w| w.abort());
    info!("controller stopped");
    Ok(())
}
