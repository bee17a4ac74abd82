//! Background workers for the non-blocking operation forms.
//!
//! A non-blocking call submits the same synchronous body to a fixed pool of
//! threads and hands back a `Pending` result. The body still takes the pooled
//! connection's guard itself, so ordering semantics match the blocking form.

use crate::core::{OrmError, Result};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::thread;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads fed through a channel.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    size: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("size", &self.size).finish()
    }
}

impl WorkerPool {
    /// Starts `size` worker threads (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("liteorm-worker-{}", id))
                    .spawn(move || loop {
                        let job = {
                            let guard = match receiver.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            guard.recv()
                        };
                        match job {
                            Ok(job) => job(),
                            Err(_) => {
                                debug!("Worker {} shutting down", id);
                                break;
                            }
                        }
                    })
                    .map_err(|e| error!("Failed to spawn worker {}: {}", id, e))
                    .ok()
            })
            .flatten()
            .collect();

        WorkerPool {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Schedules `body` on a worker and returns its pending result.
    ///
    /// A body that panics completes with `OrmError::Worker`.
    pub fn submit<T, F>(&self, body: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (pending, sender) = Pending::new();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|_| {
                Err(OrmError::Worker("scheduled operation panicked".to_string()))
            });
            // The caller may have dropped its `Pending`; nobody is left to tell.
            let _ = sender.send(outcome);
        });

        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        match sender.as_ref() {
            Some(sender) => {
                if let Err(mpsc::SendError(job)) = sender.send(job) {
                    // Every worker has exited; dropping the job closes its channel.
                    drop(job);
                }
            }
            None => drop(job),
        }
        pending
    }

    /// Stops accepting work and joins the worker threads after the queue drains.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
        drop(sender);
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|p| p.into_inner()));
        for worker in workers {
            if worker.thread().id() == thread::current().id() {
                continue;
            }
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Result of an operation scheduled on a worker.
///
/// Block on it with `wait`, poll it with `try_take`, or `.await` it from any
/// executor. The worker side holds the sending half of a oneshot channel; a
/// job dropped without running (pool shut down) closes the channel, which
/// resolves the result with `OrmError::Worker`.
pub struct Pending<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

fn shut_down() -> OrmError {
    OrmError::Worker("worker pool is shut down".to_string())
}

impl<T> Pending<T> {
    fn new() -> (Pending<T>, oneshot::Sender<Result<T>>) {
        let (sender, receiver) = oneshot::channel();
        (Pending { receiver }, sender)
    }

    /// Blocks the calling thread until the operation finishes.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime; `.await` the
    /// `Pending` there instead.
    pub fn wait(self) -> Result<T> {
        self.receiver.blocking_recv().unwrap_or_else(|_| Err(shut_down()))
    }

    /// Takes the result if the operation has finished.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(shut_down())),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(shut_down())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_submit_and_wait() {
        let pool = WorkerPool::new(2);
        let pending = pool.submit(|| Ok(21 * 2));
        assert_eq!(pending.wait().unwrap(), 42);
    }

    #[test]
    fn test_pending_is_a_future() {
        let pool = WorkerPool::new(1);
        let pending = pool.submit(|| {
            thread::sleep(Duration::from_millis(20));
            Ok("done".to_string())
        });
        assert_eq!(block_on(pending).unwrap(), "done");
    }

    #[test]
    fn test_awaiting_many_results() {
        let pool = WorkerPool::new(3);
        let pendings: Vec<Pending<usize>> = (0..10).map(|i| pool.submit(move || Ok(i * i))).collect();
        let results: Vec<usize> = block_on(join_all(pendings))
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, (0..10).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn test_try_take_before_and_after_completion() {
        let pool = WorkerPool::new(1);
        let (release, gate) = mpsc::channel::<()>();
        let mut pending = pool.submit(move || {
            let _ = gate.recv();
            Ok(7)
        });
        assert!(pending.try_take().is_none());
        release.send(()).unwrap();

        let mut taken = None;
        for _ in 0..500 {
            taken = pending.try_take();
            if taken.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(taken.unwrap().unwrap(), 7);
    }

    #[test]
    fn test_errors_and_panics_are_reported() {
        let pool = WorkerPool::new(1);
        let failed: Pending<()> = pool.submit(|| Err(OrmError::Mapping("boom".to_string())));
        assert!(matches!(failed.wait(), Err(OrmError::Mapping(_))));

        let panicked: Pending<()> = pool.submit(|| panic!("worker body panicked"));
        assert!(matches!(panicked.wait(), Err(OrmError::Worker(_))));

        // The worker survives the panic.
        assert_eq!(pool.submit(|| Ok(1)).wait().unwrap(), 1);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = WorkerPool::new(1);
        pool.shutdown();
        let pending = pool.submit(|| Ok(1));
        assert!(matches!(pending.wait(), Err(OrmError::Worker(_))));
        assert!(matches!(block_on(pool.submit(|| Ok(2))), Err(OrmError::Worker(_))));
    }

    #[test]
    fn test_all_jobs_run() {
        let pool = WorkerPool::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let pendings: Vec<_> = (0..20)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        for pending in pendings {
            pending.wait().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }
}
