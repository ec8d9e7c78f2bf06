use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};
use tokio::sync::{oneshot, Semaphore};

use crate::error::WorkerError;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Bounded pool of OS threads for blocking work (file I/O, SQLite writes,
/// EVTX decoding). Async callers submit closures with [`WorkerPool::run`]
/// and await the result without blocking the scheduler.
///
/// Cloning shares the same threads. The threads are stopped and joined
/// when the last clone is dropped.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    job_sender: Sender<Task>,
    /// One permit per queue slot, so a send never blocks the async caller.
    permits: Arc<Semaphore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let capacity = worker_count * 2;
        let (job_sender, job_receiver) = bounded::<Task>(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);

            let handle = thread::Builder::new()
                .name(format!("evlo-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, shutdown_flag))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            inner: Arc::new(PoolInner {
                job_sender,
                permits: Arc::new(Semaphore::new(capacity)),
                workers: Mutex::new(workers),
                shutdown,
                worker_count,
            }),
        })
    }

    /// Runs `f` on a worker thread and waits for its result.
    ///
    /// A panic inside `f` is caught and reported as [`WorkerError::JobFailed`].
    pub async fn run<F, T>(&self, f: F) -> Result<T, WorkerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }

        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;

        let (result_tx, result_rx) = oneshot::channel();
        let task: Task = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(f));
            let _ = result_tx.send(result);
            drop(permit);
        });

        match self.inner.job_sender.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Disconnected(_)) => return Err(WorkerError::ChannelClosed),
            Err(TrySendError::Full(_)) => {
                return Err(WorkerError::JobFailed("worker queue is full".to_string()))
            }
        }

        match result_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic)) => Err(WorkerError::JobFailed(panic_message(panic.as_ref()))),
            Err(_) => Err(WorkerError::JobFailed(
                "job was dropped before completion".to_string(),
            )),
        }
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.inner.shutdown.store(true, Ordering::Relaxed);
        self.inner.permits.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.permits.close();

        let workers = match self.workers.get_mut() {
            Ok(workers) => std::mem::take(workers),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        let current = thread::current().id();

        for (i, worker) in workers.into_iter().enumerate() {
            // The last clone can be released by a job running on a worker.
            if worker.thread().id() == current {
                continue;
            }
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(worker_id: usize, job_receiver: Receiver<Task>, shutdown: Arc<AtomicBool>) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => task(),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("job panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("job panicked: {}", s)
    } else {
        "job panicked".to_string()
    }
}
