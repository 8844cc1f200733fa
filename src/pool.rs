// src/pool.rs
// Bounded pool executing blocking jobs with a fixed concurrency ceiling

use log::{debug, error};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::error::AppError;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    queue: VecDeque<Job>,
    max_concurrency: usize,
    /// Permits still to be retired after the ceiling was lowered while busy
    surplus: usize,
}

struct PoolInner {
    state: Mutex<PoolState>,
    /// One permit per free execution slot
    slots: Arc<Semaphore>,
    /// Queued plus running jobs
    outstanding: watch::Sender<usize>,
    runtime: Handle,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }
}

/// FIFO worker pool running jobs on the runtime's blocking threads.
///
/// At most `max_concurrency` jobs execute at once; the rest wait in the
/// queue. Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool; must be called from within a tokio runtime
    pub fn new(max_concurrency: usize) -> Result<Self, AppError> {
        let runtime = Handle::try_current().map_err(|e| {
            AppError::General(format!("Worker pool requires a tokio runtime: {}", e))
        })?;
        let max_concurrency = max_concurrency.max(1);
        let (outstanding, _) = watch::channel(0);

        Ok(Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    max_concurrency,
                    surplus: 0,
                }),
                slots: Arc::new(Semaphore::new(max_concurrency)),
                outstanding,
                runtime,
            }),
        })
    }

    /// Enqueue a job; it starts as soon as a slot is free
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.inner.lock();
            state.queue.push_back(Box::new(job));
            self.inner.outstanding.send_modify(|count| *count += 1);
        }
        pump(&self.inner);
    }

    /// Drop every job that has not started yet and return how many were removed.
    /// Running jobs are not affected.
    pub fn clear_pending(&self) -> usize {
        let mut state = self.inner.lock();
        let removed = state.queue.len();
        state.queue.clear();
        self.inner
            .outstanding
            .send_modify(|count| *count = count.saturating_sub(removed));
        if removed > 0 {
            debug!("Cleared {} pending job(s) from the worker pool", removed);
        }
        removed
    }

    /// Change the ceiling; lowering it never interrupts running jobs
    pub fn set_max_concurrency(&self, max_concurrency: usize) {
        {
            let mut state = self.inner.lock();
            let max = max_concurrency.max(1);
            let current = state.max_concurrency;

            if max > current {
                let grow = max - current;
                let absorbed = grow.min(state.surplus);
                state.surplus -= absorbed;
                self.inner.slots.add_permits(grow - absorbed);
            } else if max < current {
                let shrink = current - max;
                let forgotten = self.inner.slots.forget_permits(shrink);
                state.surplus += shrink - forgotten;
            }

            if max != current {
                debug!(
                    "Worker pool concurrency changed from {} to {}",
                    current, max
                );
                state.max_concurrency = max;
            }
        }
        pump(&self.inner);
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.lock().max_concurrency
    }

    /// Jobs currently executing
    pub fn active_count(&self) -> usize {
        let state = self.inner.lock();
        self.inner.outstanding().saturating_sub(state.queue.len())
    }

    /// Jobs waiting for a slot
    pub fn pending_count(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Wait until the queue is empty and nothing is running.
    ///
    /// Returns `false` if `timeout` elapsed first; `None` waits indefinitely.
    pub async fn await_all_complete(&self, timeout: Option<Duration>) -> bool {
        let idle = drained(self.inner.outstanding.subscribe());

        match timeout {
            Some(limit) => tokio::time::timeout(limit, idle).await.unwrap_or(false),
            None => idle.await,
        }
    }
}

async fn drained(mut outstanding: watch::Receiver<usize>) -> bool {
    outstanding.wait_for(|count| *count == 0).await.is_ok()
}

/// Start queued jobs while permits are available
fn pump(inner: &Arc<PoolInner>) {
    let mut state = inner.lock();
    while !state.queue.is_empty() {
        let permit = match Arc::clone(&inner.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let Some(job) = state.queue.pop_front() else {
            break;
        };

        let pool = Arc::clone(inner);
        inner.runtime.spawn_blocking(move || {
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!("Worker pool job panicked");
            }
            finish(&pool, permit);
        });
    }
}

fn finish(inner: &Arc<PoolInner>, permit: OwnedSemaphorePermit) {
    {
        let mut state = inner.lock();
        if state.surplus > 0 {
            state.surplus -= 1;
            permit.forget();
        } else {
            drop(permit);
        }
        inner
            .outstanding
            .send_modify(|count| *count = count.saturating_sub(1));
    }
    pump(inner);
}
