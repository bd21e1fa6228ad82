//! Watch-fed object cache: applies watcher deltas, derives change events with
//! previous/current snapshots, and publishes read-only snapshots for workers.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use metrics::{counter, histogram};
use rollgate_core::ObjectKey;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Upper bound on deltas folded into one published snapshot.
const MAX_BATCH: usize = 256;

/// Raw watcher input.
#[derive(Debug, Clone)]
pub enum Delta<K> {
    Applied(K),
    Deleted(K),
    /// Full relist; objects missing from the list are treated as deleted.
    Restarted(Vec<K>),
}

/// Change event with previous/current snapshots.
#[derive(Debug, Clone)]
pub enum Change<K> {
    Created(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(Arc<K>),
}

/// Controller owner of a cached object, as named by its owner reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerKey {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl OwnerKey {
    pub fn new(namespace: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), kind: kind.into(), name: name.into() }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{0} not found")]
    NotFound(ObjectKey),
    #[error("cache not synced yet")]
    NotSynced,
}

/// The single owner reference flagged `controller: true`, if any.
pub fn controller_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references.as_ref()?.iter().find(|o| o.controller == Some(true))
}

pub fn key_of<K: Resource>(obj: &K) -> ObjectKey {
    let meta = obj.meta();
    ObjectKey::new(meta.namespace.clone().unwrap_or_default(), meta.name.clone().unwrap_or_default())
}

/// Immutable view published to readers.
pub struct CacheSnapshot<K> {
    pub epoch: u64,
    pub synced: bool,
    objects: FxHashMap<ObjectKey, Arc<K>>,
    by_owner: FxHashMap<OwnerKey, SmallVec<[ObjectKey; 4]>>,
}

impl<K> Default for CacheSnapshot<K> {
    fn default() -> Self {
        Self { epoch: 0, synced: false, objects: FxHashMap::default(), by_owner: FxHashMap::default() }
    }
}

impl<K> CacheSnapshot<K> {
    pub fn len(&self) -> usize { self.objects.len() }
    pub fn is_empty(&self) -> bool { self.objects.is_empty() }
}

/// Mutable side of the cache; owned by the ingest task.
pub struct CacheBuilder<K> {
    epoch: u64,
    synced: bool,
    objects: FxHashMap<ObjectKey, Arc<K>>,
}

impl<K: Resource> Default for CacheBuilder<K> {
    fn default() -> Self { Self::new() }
}

impl<K: Resource> CacheBuilder<K> {
    pub fn new() -> Self { Self { epoch: 0, synced: false, objects: FxHashMap::default() } }

    /// Apply one delta and return the change events it produces.
    pub fn apply(&mut self, d: Delta<K>) -> Vec<Change<K>> {
        match d {
            Delta::Applied(obj) => self.upsert(obj).into_iter().collect(),
            Delta::Deleted(obj) => {
                let key = key_of(&obj);
                self.objects.remove(&key);
                vec![Change::Deleted(Arc::new(obj))]
            }
            Delta::Restarted(list) => {
                self.synced = true;
                let mut seen: FxHashSet<ObjectKey> = FxHashSet::default();
                let mut out = Vec::with_capacity(list.len());
                for obj in list {
                    seen.insert(key_of(&obj));
                    out.extend(self.upsert(obj));
                }
                let gone: Vec<ObjectKey> = self.objects.keys().filter(|k| !seen.contains(*k)).cloned().collect();
                for k in gone {
                    if let Some(old) = self.objects.remove(&k) {
                        out.push(Change::Deleted(old));
                    }
                }
                out
            }
        }
    }

    fn upsert(&mut self, obj: K) -> Option<Change<K>> {
        let key = key_of(&obj);
        let new = Arc::new(obj);
        match self.objects.insert(key, Arc::clone(&new)) {
            None => Some(Change::Created(new)),
            Some(old) => {
                let (orv, nrv) = (old.meta().resource_version.as_deref(), new.meta().resource_version.as_deref());
                if orv.is_some() && orv == nrv {
                    // same revision re-delivered (relist); nothing changed
                    None
                } else {
                    Some(Change::Updated { old, new })
                }
            }
        }
    }

    /// Build an immutable snapshot (including the owner index) and bump the epoch.
    pub fn freeze(&mut self) -> Arc<CacheSnapshot<K>> {
        self.epoch = self.epoch.saturating_add(1);
        let mut by_owner: FxHashMap<OwnerKey, SmallVec<[ObjectKey; 4]>> = FxHashMap::default();
        for (key, obj) in &self.objects {
            if let Some(owner) = controller_owner(obj.meta()) {
                by_owner
                    .entry(OwnerKey::new(key.namespace.clone(), owner.kind.clone(), owner.name.clone()))
                    .or_default()
                    .push(key.clone());
            }
        }
        Arc::new(CacheSnapshot { epoch: self.epoch, synced: self.synced, objects: self.objects.clone(), by_owner })
    }
}

/// Cheap, cloneable read handle. Reads never block the ingest task.
pub struct CacheReader<K> {
    snap: Arc<ArcSwap<CacheSnapshot<K>>>,
    epoch_rx: watch::Receiver<u64>,
}

impl<K> Clone for CacheReader<K> {
    fn clone(&self) -> Self { Self { snap: Arc::clone(&self.snap), epoch_rx: self.epoch_rx.clone() } }
}

impl<K: Resource> CacheReader<K> {
    /// A synced reader over a fixed object set.
    pub fn seeded(items: Vec<K>) -> Self {
        let mut b = CacheBuilder::new();
        b.apply(Delta::Restarted(items));
        let snap = b.freeze();
        let (_tx, epoch_rx) = watch::channel(snap.epoch);
        Self { snap: Arc::new(ArcSwap::new(snap)), epoch_rx }
    }

    pub fn is_synced(&self) -> bool { self.snap.load().synced }

    pub fn get(&self, key: &ObjectKey) -> Result<Arc<K>, FetchError> {
        let snap = self.snap.load();
        if !snap.synced {
            return Err(FetchError::NotSynced);
        }
        snap.objects.get(key).cloned().ok_or_else(|| FetchError::NotFound(key.clone()))
    }

    /// Objects whose controller owner matches `owner`, sorted by key.
    pub fn owned_by(&self, owner: &OwnerKey) -> Vec<Arc<K>> {
        let snap = self.snap.load();
        let Some(keys) = snap.by_owner.get(owner) else { return Vec::new() };
        let mut keys: Vec<&ObjectKey> = keys.iter().collect();
        keys.sort_unstable();
        keys.into_iter().filter_map(|k| snap.objects.get(k).cloned()).collect()
    }

    /// Wait until the first full list has been applied, or the timeout elapses.
    pub async fn wait_synced(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut rx = self.epoch_rx.clone();
        while !self.is_synced() {
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                _ => break,
            }
        }
        self.is_synced()
    }
}

/// Spawn the ingest loop for one object kind. Returns the delta sender for the
/// watcher and a reader for workers. Change events, if a sink is given, are
/// sent only after the snapshot containing them is published.
pub fn spawn_cache<K>(kind: &'static str, cap: usize, changes: Option<mpsc::Sender<Change<K>>>) -> (mpsc::Sender<Delta<K>>, CacheReader<K>)
where
    K: Resource + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Delta<K>>(cap);
    let snap = Arc::new(ArcSwap::from_pointee(CacheSnapshot::default()));
    let (epoch_tx, epoch_rx) = watch::channel(0u64);
    let snap_clone = Arc::clone(&snap);

    tokio::spawn(async move {
        let mut builder = CacheBuilder::<K>::new();
        while let Some(first) = rx.recv().await {
            let started = std::time::Instant::now();
            let mut out = builder.apply(first);
            let mut batched = 1usize;
            while batched < MAX_BATCH {
                match rx.try_recv() {
                    Ok(d) => {
                        out.extend(builder.apply(d));
                        batched += 1;
                    }
                    Err(_) => break,
                }
            }
            let next = builder.freeze();
            let epoch = next.epoch;
            debug!(kind, epoch, objects = next.len(), batched, changes = out.len(), "cache snapshot published");
            snap_clone.store(next);
            let _ = epoch_tx.send(epoch);
            histogram!("rollgate_cache_apply_ms", started.elapsed().as_secs_f64() * 1000.0, "kind" => kind);
            counter!("rollgate_cache_changes_total", out.len() as u64, "kind" => kind);

            if let Some(sink) = changes.as_ref() {
                for c in out {
                    if sink.send(c).await.is_err() {
                        warn!(kind, "change sink closed; dropping remaining events");
                        break;
                    }
                }
            }
        }
        info!(kind, "cache ingest loop stopped");
    });

    (tx, CacheReader { snap, epoch_rx })
}
