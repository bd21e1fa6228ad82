//! Reconcile entry point: fetch, classify, gate, dispatch.

use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::api::apps::v1::Deployment;
use metrics::{counter, histogram};
use rollgate_core::{ObjectKey, Outcome};
use rollgate_store::{CacheReader, FetchError};
use tracing::{debug, info_span, Instrument};

use crate::gate::{Gate, GateDecision};
use crate::sync::{SyncEngine, SyncError};

/// Read access to the current Deployment state.
#[async_trait::async_trait]
pub trait DeploymentSource: Send + Sync {
    async fn fetch(&self, key: &ObjectKey) -> Result<Arc<Deployment>, FetchError>;
}

#[async_trait::async_trait]
impl DeploymentSource for CacheReader<Deployment> {
    async fn fetch(&self, key: &ObjectKey) -> Result<Arc<Deployment>, FetchError> { self.get(key) }
}

/// Retryable reconcile failures. Everything else completes as an [`Outcome`].
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("fetching deployment: {0}")]
    Fetch(#[source] FetchError),
    #[error("syncing deployment: {0}")]
    Sync(#[from] SyncError),
}

pub struct Reconciler {
    source: Arc<dyn DeploymentSource>,
    gate: Gate,
    engine: Arc<dyn SyncEngine>,
}

impl Reconciler {
    pub fn new(source: Arc<dyn DeploymentSource>, gate: Gate, engine: Arc<dyn SyncEngine>) -> Self {
        Self { source, gate, engine }
    }

    /// Reconcile one key. Always re-fetches; nothing captured at enqueue time is trusted.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ReconcileError> {
        let started = Instant::now();
        let res = self.run(key).instrument(info_span!("reconcile", deployment = %key)).await;
        let label = match &res {
            Ok(outcome) => outcome.as_str(),
            Err(ReconcileError::Fetch(_)) => "fetch_error",
            Err(ReconcileError::Sync(_)) => "sync_error",
        };
        counter!("rollgate_reconcile_total", 1u64, "outcome" => label);
        histogram!("rollgate_reconcile_ms", started.elapsed().as_secs_f64() * 1000.0);
        res
    }

    async fn run(&self, key: &ObjectKey) -> Result<Outcome, ReconcileError> {
        let deployment = match self.source.fetch(key).await {
            Ok(d) => d,
            Err(FetchError::NotFound(_)) => {
                // deleted; dependents are garbage collected by the cluster
                debug!("deployment not found");
                return Ok(Outcome::NotFound);
            }
            Err(e) => return Err(ReconcileError::Fetch(e)),
        };

        let ctx = match self.gate.evaluate(deployment) {
            GateDecision::Skip(reason) => return Ok(Outcome::Skipped(reason)),
            GateDecision::Dispatch(ctx) => ctx,
        };
        self.engine.sync(ctx).await?;
        Ok(Outcome::Dispatched)
    }
}
