#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use rollgate_controller::{DeploymentSource, Listers, Shared, SyncContext, SyncEngine, SyncError};
use rollgate_core::{DeploymentStrategy, ObjectKey, DEPLOYMENT_STRATEGY_ANNOTATION};
use rollgate_kubehub::{EventNote, EventRecorder};
use rollgate_store::{CacheReader, FetchError};

pub fn deployment(ns: &str, name: &str, generation: i64, annos: &[(&str, &str)]) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            namespace: Some(ns.into()),
            name: Some(name.into()),
            generation: Some(generation),
            annotations: Some(annos.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn managed(ns: &str, name: &str, strategy: &str) -> Deployment {
    deployment(ns, name, 1, &[(DEPLOYMENT_STRATEGY_ANNOTATION, strategy)])
}

#[derive(Default)]
pub struct MemRecorder {
    pub events: Mutex<Vec<(String, EventNote)>>,
}

#[async_trait::async_trait]
impl EventRecorder for MemRecorder {
    async fn record(&self, target: &ObjectReference, ev: EventNote) -> anyhow::Result<()> {
        let name = target.name.clone().unwrap_or_default();
        self.events.lock().unwrap().push((name, ev));
        Ok(())
    }
}

pub fn shared(recorder: Arc<MemRecorder>) -> Shared {
    Shared {
        client: None,
        listers: Listers {
            replica_sets: CacheReader::seeded(vec![]),
            pods: CacheReader::seeded(vec![]),
        },
        recorder,
    }
}

/// Captures what each dispatched context carried.
#[derive(Default)]
pub struct CountingEngine {
    pub seen: Mutex<Vec<(ObjectKey, DeploymentStrategy)>>,
    pub fail: bool,
}

impl CountingEngine {
    pub fn failing() -> Self { Self { fail: true, ..Default::default() } }
    pub fn calls(&self) -> usize { self.seen.lock().unwrap().len() }
}

#[async_trait::async_trait]
impl SyncEngine for CountingEngine {
    async fn sync(&self, ctx: SyncContext) -> Result<(), SyncError> {
        self.seen.lock().unwrap().push((ctx.key(), ctx.strategy().clone()));
        if self.fail {
            return Err(SyncError::Other(anyhow::anyhow!("replica set update conflict")));
        }
        Ok(())
    }
}

/// Source with a scripted answer and a call counter.
pub struct ScriptedSource {
    pub answer: Result<Arc<Deployment>, FetchError>,
    pub calls: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new(answer: Result<Deployment, FetchError>) -> Self {
        Self { answer: answer.map(Arc::new), calls: Mutex::new(0) }
    }
    pub fn calls(&self) -> usize { *self.calls.lock().unwrap() }
}

#[async_trait::async_trait]
impl DeploymentSource for ScriptedSource {
    async fn fetch(&self, _key: &ObjectKey) -> Result<Arc<Deployment>, FetchError> {
        *self.calls.lock().unwrap() += 1;
        self.answer.clone()
    }
}
