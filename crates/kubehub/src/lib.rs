//! Rollgate kubehub: client, watcher wiring and event recording.

#![forbid(unsafe_code)]

use std::fmt::Debug;

use anyhow::{Context, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::Api,
    runtime::{
        events::{Event as KubeEvent, EventType, Recorder, Reporter},
        watcher::{self, Event},
        WatchStreamExt,
    },
    Client, Resource,
};
use metrics::counter;
use rollgate_store::Delta;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Build a client from the ambient kubeconfig / in-cluster config.
pub async fn kube_client() -> Result<Client> {
    Client::try_default().await.context("creating kube client")
}

/// Namespaced API handle, or cluster-wide when `namespace` is `None`.
pub fn api_for<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// List+watch one kind and forward deltas into the cache ingest channel.
/// Watch errors are retried with the default backoff; returns when the
/// ingest side goes away.
pub async fn start_watcher<K>(kind: &'static str, api: Api<K>, delta_tx: mpsc::Sender<Delta<K>>) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
    futures::pin_mut!(stream);
    info!(kind, "watcher started");
    while let Some(ev) = stream.next().await {
        let d = match ev {
            Ok(Event::Applied(o)) => Delta::Applied(o),
            Ok(Event::Deleted(o)) => Delta::Deleted(o),
            Ok(Event::Restarted(list)) => {
                debug!(kind, count = list.len(), "watch restart");
                Delta::Restarted(list)
            }
            Err(e) => {
                counter!("rollgate_watch_errors_total", 1u64, "kind" => kind);
                warn!(kind, error = %e, "watch error; backing off");
                continue;
            }
        };
        if delta_tx.send(d).await.is_err() {
            break;
        }
    }
    warn!(kind, "watcher stream ended");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// A Kubernetes Event to attach to an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNote {
    pub kind: EventKind,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

impl EventNote {
    pub fn normal(reason: impl Into<String>, action: impl Into<String>, note: impl Into<String>) -> Self {
        Self { kind: EventKind::Normal, reason: reason.into(), action: action.into(), note: Some(note.into()) }
    }

    pub fn warning(reason: impl Into<String>, action: impl Into<String>, note: impl Into<String>) -> Self {
        Self { kind: EventKind::Warning, reason: reason.into(), action: action.into(), note: Some(note.into()) }
    }
}

/// Event-recording capability shared by all workers.
#[async_trait::async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, target: &ObjectReference, ev: EventNote) -> Result<()>;
}

/// Publishes `events.k8s.io` Events through the API server.
pub struct KubeRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeRecorder {
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter { controller: controller.to_string(), instance: std::env::var("POD_NAME").ok() };
        Self { client, reporter }
    }
}

#[async_trait::async_trait]
impl EventRecorder for KubeRecorder {
    async fn record(&self, target: &ObjectReference, ev: EventNote) -> Result<()> {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), target.clone());
        let type_ = match ev.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };
        recorder
            .publish(KubeEvent { type_, reason: ev.reason, note: ev.note, action: ev.action, secondary: None })
            .await
            .context("publishing event")?;
        Ok(())
    }
}
