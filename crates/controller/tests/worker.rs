#![forbid(unsafe_code)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use rollgate_controller::worker::spawn_workers;
use rollgate_controller::{Gate, Reconciler};
use rollgate_core::ObjectKey;
use rollgate_store::{FetchError, WorkQueue};
use support::{managed, shared, CountingEngine, MemRecorder, ScriptedSource};

fn fast_queue() -> Arc<WorkQueue<ObjectKey>> {
    Arc::new(WorkQueue::with_backoff(Duration::from_millis(1), Duration::from_millis(5)))
}

fn reconciler(source: Arc<ScriptedSource>, engine: Arc<CountingEngine>) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(source, Gate::new(shared(Arc::new(MemRecorder::default()))), engine))
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

async fn stop(queue: &WorkQueue<ObjectKey>, workers: Vec<tokio::task::JoinHandle<()>>) {
    queue.shut_down();
    for w in workers {
        tokio::time::timeout(Duration::from_secs(1), w).await.expect("worker exits").expect("join");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_sync_is_redelivered_with_backoff() {
    let key = ObjectKey::new("prod", "web");
    let queue = fast_queue();
    let engine = Arc::new(CountingEngine::failing());
    let source = Arc::new(ScriptedSource::new(Ok(managed("prod", "web", r#"{"rollingStyle":"Rolling"}"#))));
    let workers = spawn_workers(2, Arc::clone(&queue), reconciler(source, Arc::clone(&engine)));

    queue.add(key.clone());
    eventually("a retry", || engine.calls() >= 2).await;
    assert!(queue.num_requeues(&key) >= 1);
    stop(&queue, workers).await;

    let seen = engine.seen.lock().unwrap();
    assert!(seen.iter().all(|(k, _)| k == &key));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_fetch_error_is_redelivered() {
    let key = ObjectKey::new("prod", "web");
    let queue = fast_queue();
    let engine = Arc::new(CountingEngine::default());
    let source = Arc::new(ScriptedSource::new(Err(FetchError::NotSynced)));
    let workers = spawn_workers(1, Arc::clone(&queue), reconciler(Arc::clone(&source), Arc::clone(&engine)));

    queue.add(key.clone());
    eventually("a second fetch", || source.calls() >= 2).await;
    assert!(queue.num_requeues(&key) >= 1);
    assert_eq!(engine.calls(), 0);
    stop(&queue, workers).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn skipped_key_is_not_retried() {
    let key = ObjectKey::new("prod", "web");
    let queue = fast_queue();
    let engine = Arc::new(CountingEngine::default());
    let source = Arc::new(ScriptedSource::new(Ok(managed("prod", "web", "not json"))));
    let workers = spawn_workers(1, Arc::clone(&queue), reconciler(Arc::clone(&source), Arc::clone(&engine)));

    queue.add(key.clone());
    eventually("the first reconcile", || source.calls() == 1).await;
    // Several backoff periods; a scheduled retry would have fired by now.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.calls(), 1);
    assert_eq!(queue.num_requeues(&key), 0);
    assert_eq!(engine.calls(), 0);
    stop(&queue, workers).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn success_after_dispatch_clears_backoff() {
    let key = ObjectKey::new("prod", "web");
    let queue = fast_queue();
    let engine = Arc::new(CountingEngine::default());
    let source = Arc::new(ScriptedSource::new(Ok(managed("prod", "web", r#"{"rollingStyle":"Partition"}"#))));
    let workers = spawn_workers(1, Arc::clone(&queue), reconciler(source, Arc::clone(&engine)));

    queue.add(key.clone());
    eventually("dispatch", || engine.calls() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.calls(), 1);
    assert_eq!(queue.num_requeues(&key), 0);
    stop(&queue, workers).await;
}
