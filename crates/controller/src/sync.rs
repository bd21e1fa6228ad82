//! Sync Engine seam. Rollout progression lives behind [`SyncEngine`]; the
//! crate only ships an engine that reports what it observed.

use kube::Resource;
use rollgate_kubehub::EventNote;
use tracing::info;

use crate::context::SyncContext;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("kube: {0}")]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Performs the rollout work for one dispatched Deployment. Errors are
/// retried by the work queue with backoff.
#[async_trait::async_trait]
pub trait SyncEngine: Send + Sync {
    async fn sync(&self, ctx: SyncContext) -> Result<(), SyncError>;
}

/// Records a `StrategyObserved` event summarizing the decoded strategy and the
/// owned ReplicaSets, or a `DeploymentPaused` warning when `spec.paused` blocks
/// the rollout. Makes no changes to the cluster.
pub struct ObserveOnly;

#[async_trait::async_trait]
impl SyncEngine for ObserveOnly {
    async fn sync(&self, ctx: SyncContext) -> Result<(), SyncError> {
        let style = ctx.strategy().style();
        let replica_sets = ctx.listers().replica_sets_for(ctx.deployment());
        let pods: usize = replica_sets.iter().map(|rs| ctx.listers().pods_for(rs).len()).sum();
        info!(deployment = %ctx.key(), %style, replica_sets = replica_sets.len(), pods, "observed strategy");
        let note = format!("{style} strategy with {} replica sets and {pods} pods", replica_sets.len());
        let paused = ctx.deployment().spec.as_ref().and_then(|s| s.paused).unwrap_or(false);
        let ev = if paused {
            EventNote::warning("DeploymentPaused", "Reconcile", format!("{note}; spec.paused holds the rollout"))
        } else {
            EventNote::normal("StrategyObserved", "Reconcile", note)
        };
        let reference = ctx.deployment().object_ref(&());
        ctx.recorder().record(&reference, ev).await?;
        Ok(())
    }
}
