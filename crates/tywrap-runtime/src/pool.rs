//! Multi-transport worker pool.
//!
//! Workers (a transport plus an in-flight counter) are created lazily up to
//! `max_workers`; saturated pools queue callers with a bounded wait. The
//! pool only hands out workers — executing calls on them is the protocol
//! layer's job.

use crate::context::BoundedContext;
use crate::transport::{PythonTransport, TransportConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use tywrap_core::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_workers: usize,
    /// In-flight bound per worker. The default of 1 gives strict ownership:
    /// one caller per subprocess at a time.
    pub max_concurrent_per_worker: usize,
    /// How long a caller may wait for a worker under saturation.
    pub queue_timeout: Duration,
    /// Template for each worker's transport.
    pub transport: TransportConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_concurrent_per_worker: 1,
            queue_timeout: Duration::from_secs(30),
            transport: TransportConfig::default(),
        }
    }
}

/// A pooled transport with its in-flight counter.
pub struct PoolWorker {
    id: usize,
    transport: PythonTransport,
    in_flight: AtomicUsize,
}

impl std::fmt::Debug for PoolWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolWorker")
            .field("id", &self.id)
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

impl PoolWorker {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn transport(&self) -> &PythonTransport {
        &self.transport
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

type Waiter = (u64, oneshot::Sender<Arc<PoolWorker>>);

struct PoolState {
    workers: Vec<Arc<PoolWorker>>,
    queue: VecDeque<Waiter>,
}

pub struct WorkerPool {
    config: PoolConfig,
    ctx: BoundedContext,
    state: Mutex<PoolState>,
    next_waiter: AtomicU64,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            ctx: BoundedContext::new("worker-pool"),
            state: Mutex::new(PoolState {
                workers: Vec::new(),
                queue: VecDeque::new(),
            }),
            next_waiter: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn context(&self) -> &BoundedContext {
        &self.ctx
    }

    pub fn worker_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .workers
            .len()
    }

    /// Acquires a worker: the first with spare capacity, a fresh one while
    /// below `max_workers`, else a bounded queue wait. Pair every acquire
    /// with a [`Self::release`].
    pub async fn acquire(&self) -> BridgeResult<Arc<PoolWorker>> {
        if self.ctx.is_disposed_like() {
            return Err(BridgeError::disposed("worker pool has been disposed"));
        }

        let (waiter_id, receiver) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

            if let Some(worker) = state
                .workers
                .iter()
                .find(|w| w.in_flight() < self.config.max_concurrent_per_worker)
            {
                worker.in_flight.fetch_add(1, Ordering::SeqCst);
                return Ok(Arc::clone(worker));
            }

            if state.workers.len() < self.config.max_workers {
                let worker = Arc::new(PoolWorker {
                    id: state.workers.len(),
                    transport: PythonTransport::new(self.config.transport.clone()),
                    in_flight: AtomicUsize::new(1),
                });
                state.workers.push(Arc::clone(&worker));
                debug!(worker = worker.id, total = state.workers.len(), "created pool worker");
                return Ok(worker);
            }

            let waiter_id = self.next_waiter.fetch_add(1, Ordering::SeqCst);
            let (sender, receiver) = oneshot::channel();
            state.queue.push_back((waiter_id, sender));
            (waiter_id, receiver)
        };

        let mut receiver = receiver;
        match tokio::time::timeout(self.config.queue_timeout, &mut receiver).await {
            Ok(Ok(worker)) => Ok(worker),
            Ok(Err(_)) => Err(BridgeError::execution(
                "PoolDisposedError",
                "worker pool was disposed while waiting for a worker",
                None,
            )),
            Err(_) => {
                // Leave the queue under the lock; handoffs happen under the
                // same lock, so no further send can race past this point.
                {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.queue.retain(|(id, _)| *id != waiter_id);
                }
                // A worker handed off in the same instant goes straight
                // back, or its in-flight slot would leak.
                if let Ok(worker) = receiver.try_recv() {
                    self.release(&worker);
                }
                Err(BridgeError::timeout(format!(
                    "no worker became available within {} ms",
                    self.config.queue_timeout.as_millis()
                )))
            }
        }
    }

    /// Returns a worker. If waiters are queued and the worker has capacity
    /// again, it is handed to the next waiter without a gap.
    pub fn release(&self, worker: &Arc<PoolWorker>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let previous = worker.in_flight.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "release without a matching acquire");

        while worker.in_flight() < self.config.max_concurrent_per_worker {
            let Some((_, waiter)) = state.queue.pop_front() else {
                break;
            };
            worker.in_flight.fetch_add(1, Ordering::SeqCst);
            if waiter.send(Arc::clone(worker)).is_err() {
                // The waiter gave up (queue timeout); undo and try the next.
                worker.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Acquires a worker, runs `f` with it, and releases it on every path.
    pub async fn with_worker<T, F, Fut>(&self, f: F) -> BridgeResult<T>
    where
        F: FnOnce(Arc<PoolWorker>) -> Fut,
        Fut: std::future::Future<Output = BridgeResult<T>>,
    {
        let worker = self.acquire().await?;
        let result = f(Arc::clone(&worker)).await;
        self.release(&worker);
        result
    }

    /// Rejects all waiters, then disposes workers sequentially, aggregating
    /// failures.
    pub async fn dispose(&self) -> BridgeResult<()> {
        self.ctx
            .dispose(|| async {
                let (waiters, workers) = {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    let waiters: Vec<Waiter> = state.queue.drain(..).collect();
                    let workers = std::mem::take(&mut state.workers);
                    (waiters, workers)
                };
                // Dropping the senders rejects every queued acquire.
                drop(waiters);

                let mut failures = Vec::new();
                for worker in workers {
                    if let Err(err) = worker.transport.dispose().await {
                        warn!(worker = worker.id, error = %err, "worker disposal failed");
                        failures.push(format!("worker {}: {err}", worker.id));
                    }
                }
                if failures.is_empty() {
                    Ok(())
                } else {
                    anyhow::bail!(
                        "{} workers failed to dispose: {}",
                        failures.len(),
                        failures.join("; ")
                    )
                }
            })
            .await
    }
}
