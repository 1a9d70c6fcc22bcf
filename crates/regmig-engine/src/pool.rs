//! # Bounded Worker Pool
//!
//! A fixed number of workers drain a shared queue of tasks. A task is a
//! `Future<Output = ()>`: it handles and records its own errors, the pool
//! never sees them.
//!
//! The queue is a channel of capacity 1, so [`WorkerPool::add_task`] waits
//! once every worker is busy. That is the only backpressure. Each task runs
//! in its own spawned tokio task, so a panicking task is logged and still
//! counted as finished, and [`WorkerPool::wait`] cannot hang on it.
//!
//! One pool is created per phase and closed when the phase is done.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

use regmig_core::CoreError;

/// A unit of work.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Shared {
    pending: AtomicUsize,
    idle: Notify,
}

impl Shared {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Fixed-concurrency executor with a drain barrier.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Task>>,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` workers.
    pub fn new(workers: usize) -> Result<Self, CoreError> {
        if workers == 0 {
            return Err(CoreError::InvalidArgument {
                name: "workers",
                reason: "worker pool needs at least one worker".into(),
            });
        }

        let (sender, receiver) = mpsc::channel::<Task>(1);
        let receiver = Arc::new(Mutex::new(receiver));
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let handles = (0..workers)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(task) = next else { break };
                        if let Err(e) = tokio::spawn(task).await {
                            tracing::error!(worker, "task aborted: {e}");
                        }
                        shared.finish_one();
                    }
                })
            })
            .collect();

        Ok(Self {
            sender: Some(sender),
            shared,
            workers: handles,
        })
    }

    /// Queue `task`, waiting while every worker is busy.
    pub async fn add_task<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(sender) = &self.sender else { return };
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(Box::pin(task)).await.is_err() {
            tracing::error!("worker pool closed, task dropped");
            self.shared.finish_one();
        }
    }

    /// Number of queued or running tasks.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Wait until every queued task has finished.
    pub async fn wait(&self) {
        loop {
            let idle = self.shared.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Wait for outstanding work, then stop the workers.
    pub async fn close(mut self) {
        self.wait().await;
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
