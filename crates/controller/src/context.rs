//! Shared capabilities and the per-reconcile execution context.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Pod;
use kube::Client;
use rollgate_core::{DeploymentStrategy, ObjectKey};
use rollgate_kubehub::EventRecorder;
use rollgate_store::{key_of, CacheReader, OwnerKey};

/// Read-only cache readers for the dependent kinds. Safe to share across workers.
#[derive(Clone)]
pub struct Listers {
    pub replica_sets: CacheReader<ReplicaSet>,
    pub pods: CacheReader<Pod>,
}

impl Listers {
    /// ReplicaSets controlled by the Deployment.
    pub fn replica_sets_for(&self, d: &Deployment) -> Vec<Arc<ReplicaSet>> {
        let key = key_of(d);
        self.replica_sets.owned_by(&OwnerKey::new(key.namespace, "Deployment", key.name))
    }

    /// Pods controlled by the ReplicaSet.
    pub fn pods_for(&self, rs: &ReplicaSet) -> Vec<Arc<Pod>> {
        let key = key_of(rs);
        self.pods.owned_by(&OwnerKey::new(key.namespace, "ReplicaSet", key.name))
    }
}

/// Capabilities bound into every execution context.
#[derive(Clone)]
pub struct Shared {
    /// API client for writes; `None` when running detached from an API server.
    pub client: Option<Client>,
    pub listers: Listers,
    pub recorder: Arc<dyn EventRecorder>,
}

/// Immutable bundle handed to exactly one Sync Engine call.
pub struct SyncContext {
    deployment: Arc<Deployment>,
    strategy: DeploymentStrategy,
    shared: Shared,
}

impl SyncContext {
    pub(crate) fn new(deployment: Arc<Deployment>, strategy: DeploymentStrategy, shared: Shared) -> Self {
        Self { deployment, strategy, shared }
    }

    pub fn key(&self) -> ObjectKey { key_of(self.deployment.as_ref()) }
    pub fn deployment(&self) -> &Deployment { &self.deployment }
    pub fn strategy(&self) -> &DeploymentStrategy { &self.strategy }
    pub fn client(&self) -> Option<&Client> { self.shared.client.as_ref() }
    pub fn listers(&self) -> &Listers { &self.shared.listers }
    pub fn recorder(&self) -> &dyn EventRecorder { self.shared.recorder.as_ref() }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext").field("deployment", &self.key()).field("strategy", &self.strategy).finish()
    }
}
