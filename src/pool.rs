//! Bounded work queue with a fixed set of worker threads.
//!
//! Both pipeline stages run on this abstraction: items are submitted onto a
//! bounded channel, a fixed number of workers drain it, and `join` provides
//! the completion barrier. Shutdown is graceful: dropping the sender closes
//! the channel and idle workers exit when it runs dry. Per-item failures
//! (including panics) are caught at the worker boundary, logged, and
//! counted; they never stop the pool.

use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error, info};

use crate::error::{MailsieveError, Result};

/// Queue slots per worker before `submit` applies backpressure.
const QUEUE_DEPTH_PER_WORKER: usize = 16;

/// Outcome of a drained pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Items whose handler returned success
    pub processed: usize,
    /// Items whose handler failed or panicked
    pub failed: usize,
}

impl PoolStats {
    /// Total items seen by the pool.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.processed + self.failed
    }
}

/// Fixed-size worker pool over a bounded work queue.
pub struct WorkerPool<T: Send + 'static> {
    tx: Option<Sender<T>>,
    handles: Vec<JoinHandle<()>>,
    processed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl<T: Send + Debug + 'static> WorkerPool<T> {
    /// Start `workers` threads running `handler` over submitted items.
    ///
    /// The handler is shared read-only across workers; all mutable
    /// cross-item state must live behind its own synchronization (in
    /// practice, the persistence layer's connection pool).
    pub fn start<F>(workers: usize, handler: F) -> Result<Self>
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(MailsieveError::InvalidConfig(
                "worker count must be greater than 0".to_string(),
            ));
        }

        let (tx, rx) = bounded::<T>(workers * QUEUE_DEPTH_PER_WORKER);
        let handler = Arc::new(handler);
        let processed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx = rx.clone();
            let handler = Arc::clone(&handler);
            let processed = Arc::clone(&processed);
            let failed = Arc::clone(&failed);

            let handle = thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || {
                    // Closed-channel shutdown: recv fails once the sender
                    // is dropped and the queue is drained.
                    while let Ok(item) = rx.recv() {
                        match catch_unwind(AssertUnwindSafe(|| handler(&item))) {
                            Ok(Ok(())) => {
                                processed.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Err(e)) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                error!(item = ?item, error = %e, "Item failed, continuing");
                            }
                            Err(_) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                error!(item = ?item, "Item handler panicked, continuing");
                            }
                        }
                    }
                    debug!("Worker exiting, queue closed");
                })?;
            handles.push(handle);
        }

        info!(workers, "Worker pool started");
        Ok(Self {
            tx: Some(tx),
            handles,
            processed,
            failed,
        })
    }

    /// Enqueue one item, blocking when the queue is full.
    pub fn submit(&self, item: T) -> Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(item)
                .map_err(|_| MailsieveError::Other("worker pool already shut down".to_string())),
            None => Err(MailsieveError::Other(
                "worker pool already shut down".to_string(),
            )),
        }
    }

    /// Drain the queue and join every worker.
    ///
    /// This is the completion barrier: it returns only after all submitted
    /// items have been handled.
    pub fn join(mut self) -> PoolStats {
        self.tx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread terminated abnormally");
            }
        }
        let stats = PoolStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        };
        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Worker pool drained"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_items_processed() {
        let pool = WorkerPool::start(4, |_item: &u32| Ok(())).expect("start pool");
        for i in 0..100u32 {
            pool.submit(i).expect("submit");
        }
        let stats = pool.join();
        assert_eq!(stats.processed, 100);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_failures_are_isolated() {
        let pool = WorkerPool::start(2, |item: &u32| {
            if *item == 7 {
                Err(MailsieveError::Other("bad item".to_string()))
            } else {
                Ok(())
            }
        })
        .expect("start pool");

        for i in 0..10u32 {
            pool.submit(i).expect("submit");
        }
        let stats = pool.join();
        assert_eq!(stats.processed, 9);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 10);
    }

    #[test]
    fn test_panic_does_not_kill_pool() {
        let pool = WorkerPool::start(2, |item: &u32| {
            assert!(*item != 3, "boom");
            Ok(())
        })
        .expect("start pool");

        for i in 0..10u32 {
            pool.submit(i).expect("submit");
        }
        let stats = pool.join();
        assert_eq!(stats.processed, 9);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(WorkerPool::<u32>::start(0, |_| Ok(())).is_err());
    }

    #[test]
    fn test_join_with_no_items() {
        let pool = WorkerPool::start(3, |_item: &u32| Ok(())).expect("start pool");
        let stats = pool.join();
        assert_eq!(stats.total(), 0);
    }
}
