use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::memdb::{MemCore, TimeId};

/// One coalescing unit: all writes accumulated under a single TimeId. At
/// most one non-empty tiny batch per TimeId ever reaches the log.
pub(crate) struct TinyBatch {
    time_id: AtomicI64,
    count: AtomicU32,
    /// Managed batches belong to a user [`Batch`](crate::batch::Batch);
    /// their TimeId is released by the owner, not by the commit path.
    pub managed: bool,
    done: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

impl TinyBatch {
    pub fn new(time_id: TimeId, managed: bool) -> Arc<Self> {
        Arc::new(Self {
            time_id: AtomicI64::new(time_id),
            count: AtomicU32::new(0),
            managed,
            done: Mutex::new(None),
        })
    }

    /// Creates a batch carrying a completion signal that fires once the
    /// batch is durably committed (or fails).
    pub fn with_signal(
        time_id: TimeId,
        managed: bool,
    ) -> (Arc<Self>, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let tb = Arc::new(Self {
            time_id: AtomicI64::new(time_id),
            count: AtomicU32::new(0),
            managed,
            done: Mutex::new(Some(tx)),
        });
        (tb, rx)
    }

    pub fn time_id(&self) -> TimeId {
        self.time_id.load(Ordering::Acquire)
    }

    pub fn incount(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn len(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Fires the completion signal, if any.
    pub fn complete(&self, result: Result<()>) {
        if let Ok(mut done) = self.done.lock() {
            if let Some(tx) = done.take() {
                let _ = tx.send(result);
            }
        }
    }
}

/// Bounded worker pool committing tiny batches. A dispatcher task drains
/// the write queue and fans batches out to at most `max_batches` concurrent
/// workers; actual log writes still serialize on the memdb write latch, so
/// the pool bounds in-flight batches rather than I/O parallelism.
pub(crate) struct BatchPool {
    write_tx: Mutex<Option<mpsc::UnboundedSender<Arc<TinyBatch>>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    semaphore: Arc<Semaphore>,
    max_batches: usize,
}

impl BatchPool {
    pub fn new(core: Weak<MemCore>, max_batches: usize) -> Self {
        // There must be at least one batch worker.
        let max_batches = max_batches.max(1);
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Arc<TinyBatch>>();
        let semaphore = Arc::new(Semaphore::new(max_batches));

        let sem = semaphore.clone();
        let dispatcher = tokio::spawn(async move {
            while let Some(tb) = write_rx.recv().await {
                let Some(core) = core.upgrade() else { break };
                let permit = match sem.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    let result = core.tiny_commit(&tb);
                    if let Err(ref e) = result {
                        tracing::error!(
                            time_id = tb.time_id(),
                            error = %e,
                            "tiny batch commit failed"
                        );
                    }
                    tb.complete(result);
                    drop(permit);
                });
            }
        });

        Self {
            write_tx: Mutex::new(Some(write_tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            semaphore,
            max_batches,
        }
    }

    /// Queues a tiny batch for commit.
    pub fn write(&self, tb: Arc<TinyBatch>) -> Result<()> {
        let tx = self.write_tx.lock()?;
        match tx.as_ref() {
            Some(tx) => tx.send(tb).map_err(|_| Error::Closed),
            None => Err(Error::Closed),
        }
    }

    /// Closes the queue, drains the dispatcher and waits for every worker
    /// to finish.
    pub async fn stop_wait(&self) -> Result<()> {
        let handle = {
            // Dropping the sender ends the dispatcher loop.
            self.write_tx.lock()?.take();
            self.dispatcher.lock()?.take()
        };
        if let Some(handle) = handle {
            handle.await?;
        }
        // All permits back means all workers have completed.
        let _all = self
            .semaphore
            .acquire_many(self.max_batches as u32)
            .await
            .map_err(|_| Error::Closed)?;
        Ok(())
    }
}
