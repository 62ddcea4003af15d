//! # Worker Pool (`spec.md` §4.E, §9)
//!
//! Two cooperating roles: the [`Ticker`], which periodically claims due
//! calls and does no execution itself, and a pool of executor tasks that
//! drain an internal queue and run each call via [`crate::executor::CallExecutor`].
//! A third background task, the orphan [`reaper`], reclaims calls whose
//! executor died mid-flight.

pub mod reaper;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::PostopError;
use crate::executor::CallExecutor;
use crate::fabric::CallFabric;
use crate::model::CallStatus;
use crate::store::AtomicStore;

pub struct WorkerPoolConfig {
    pub tick_interval: Duration,
    pub max_batch: usize,
    pub concurrency: usize,
}

/// Owns the ticker loop, the executor task pool, and the reaper; started
/// once at process startup and stopped via [`WorkerPool::shutdown`].
pub struct WorkerPool {
    ticker: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    reaper: JoinHandle<()>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawns the ticker, `config.concurrency` executor workers, and the
    /// reaper. All tasks share one `mpsc` queue and one `watch` shutdown
    /// signal.
    pub fn spawn<S, F>(
        store: Arc<S>,
        executor: Arc<CallExecutor<S, F>>,
        config: WorkerPoolConfig,
        call_timeout: Duration,
        reaper_grace: Duration,
    ) -> Self
    where
        S: AtomicStore + 'static,
        F: CallFabric + 'static,
    {
        let (tx, rx) = mpsc::channel::<String>(config.max_batch.max(1) * 4);
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let ticker = tokio::spawn(ticker_loop(
            store.clone(),
            tx,
            config.tick_interval,
            config.max_batch,
            shutdown_rx.clone(),
        ));

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = Vec::with_capacity(config.concurrency);
        for _ in 0..config.concurrency {
            workers.push(tokio::spawn(executor_worker_loop(
                rx.clone(),
                store.clone(),
                executor.clone(),
            )));
        }

        let reaper = tokio::spawn(reaper::reaper_loop(store, call_timeout, reaper_grace, shutdown_rx));

        Self { ticker, workers, reaper, shutdown_tx }
    }

    /// Graceful shutdown (`spec.md` §4.E, §5): stop the ticker first, then
    /// wait up to `drain_timeout` for in-flight executor workers to finish
    /// the calls they already claimed before aborting anything left.
    pub async fn shutdown(self, drain_timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        self.ticker.abort();

        let drain = async {
            for worker in self.workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(drain_timeout, drain).await.is_err() {
            log::warn!("worker pool drain exceeded {:?}, remaining calls left in-flight for the reaper", drain_timeout);
        }
        self.reaper.abort();
    }
}

/// Runs `dequeue_due` every `tick_interval`, pushing claimed ids onto the
/// queue in the order returned — priority asc, created_at asc within the
/// tick (`spec.md` §4.E ordering contract). Performs no execution itself.
async fn ticker_loop<S: AtomicStore + 'static>(
    store: Arc<S>,
    tx: mpsc::Sender<String>,
    tick_interval: Duration,
    max_batch: usize,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(tick_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match store.dequeue_due(Utc::now(), max_batch).await {
                    Ok(ids) => {
                        for id in ids {
                            if tx.send(id).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => log::warn!("ticker's dequeue_due failed: {e}"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}

async fn executor_worker_loop<S, F>(
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    store: Arc<S>,
    executor: Arc<CallExecutor<S, F>>,
) where
    S: AtomicStore + 'static,
    F: CallFabric + 'static,
{
    loop {
        let id = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(id) = id else {
            return;
        };

        match store.get_by_id(&id).await {
            Ok(Some(item)) => {
                if let Err(e) = executor.execute(&item).await {
                    log::warn!("call {id} execution returned an error: {e}");
                }
            }
            Ok(None) => log::warn!("claimed call {id} vanished from the store before execution"),
            Err(e @ PostopError::StoreCorrupt(_)) => {
                log::warn!("claimed call {id} is corrupt, quarantining: {e}");
                if let Err(e) = store
                    .conditional_status_update(&id, CallStatus::InProgress, CallStatus::Failed, Some("corrupt"))
                    .await
                {
                    log::warn!("failed to quarantine corrupt call {id}: {e}");
                }
            }
            Err(e) => log::warn!("failed to load claimed call {id}: {e}"),
        }
    }
}
