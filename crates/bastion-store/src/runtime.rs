//! The store runtime: the global lock, the background write worker, and
//! the error sink.
//!
//! # Concurrency model
//!
//! ```text
//! caller task ── acquire StoreLock ──> read (overlay, then container)
//!                                  └──> enqueue write ──> [queue] ──> worker ──> container
//! ```
//!
//! - **One lock.** Every property read-then-write and every ledger transfer
//!   runs under the single [`StoreLock`] of a runtime. There are no
//!   per-key locks, so there is no lock ordering to get wrong.
//! - **Fire-and-forget writes.** Writes are pushed onto an unbounded queue
//!   while the lock is held and applied by one worker task. Queue order is
//!   lock order, so writes to a key land in the order their lock
//!   acquisitions succeeded.
//! - **Read-your-writes.** Until the worker applies a write, it sits in a
//!   pending overlay that reads consult before the container.
//! - **No cancellation.** A queued write completes even if the caller that
//!   issued it is gone. Failures go to the [`ErrorSink`]; a caller that
//!   wants to observe its own write can await the [`WriteHandle`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bastion_types::{EntityId, PropertyKey, RawValue};
use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard};

use crate::container::BackingContainer;
use crate::error::StoreError;

/// Callback receiving every store failure.
///
/// Invoked from the worker task for write failures and from the caller's
/// task for read failures. Must not block.
pub type ErrorSink = Arc<dyn Fn(&StoreError) + Send + Sync>;

/// An [`ErrorSink`] that logs each failure at `error` level.
pub fn logging_sink() -> ErrorSink {
    Arc::new(|err: &StoreError| {
        tracing::error!(error = %err, io = err.is_io(), "property store failure");
    })
}

// ---------------------------------------------------------------------------
// Lock
// ---------------------------------------------------------------------------

/// The mutual-exclusion lock serializing all property and ledger access of
/// one runtime.
#[derive(Debug, Default)]
pub struct StoreLock {
    inner: Mutex<()>,
}

impl StoreLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock.
    pub async fn acquire(&self) -> StoreGuard<'_> {
        StoreGuard {
            lock: self,
            _held: self.inner.lock().await,
        }
    }
}

/// Proof that a [`StoreLock`] is held. Released on drop.
#[derive(Debug)]
pub struct StoreGuard<'a> {
    lock: &'a StoreLock,
    _held: MutexGuard<'a, ()>,
}

impl StoreGuard<'_> {
    /// Whether this guard holds `lock`.
    pub fn belongs_to(&self, lock: &StoreLock) -> bool {
        std::ptr::eq(self.lock, lock)
    }
}

// ---------------------------------------------------------------------------
// Write handle
// ---------------------------------------------------------------------------

/// Completion of one queued write. Dropping it does not cancel the write.
#[derive(Debug)]
pub struct WriteHandle {
    done: oneshot::Receiver<Result<(), StoreError>>,
}

impl WriteHandle {
    /// Wait until the worker has applied the write.
    ///
    /// The same failure has already been delivered to the error sink.
    pub async fn wait(self) -> Result<(), StoreError> {
        self.done.await.unwrap_or(Err(StoreError::WorkerStopped))
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// A write that has been queued but not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingOp {
    /// Replace the stored value.
    Set(RawValue),
    /// Delete the stored value.
    Remove,
}

/// Overlay entry; `seq` identifies the newest queued write for the key.
#[derive(Debug)]
struct Pending {
    seq: u64,
    op: PendingOp,
}

/// One unit of work for the background worker.
enum Job {
    Write(WriteJob),
    Flush(oneshot::Sender<()>),
}

struct WriteJob {
    entity: EntityId,
    key: PropertyKey,
    container: Arc<dyn BackingContainer>,
    op: PendingOp,
    seq: u64,
    done: oneshot::Sender<Result<(), StoreError>>,
}

/// State shared between the runtime handles and the worker.
struct Shared {
    pending: Mutex<HashMap<(EntityId, PropertyKey), Pending>>,
    sink: ErrorSink,
}

impl Shared {
    /// Drop the overlay entry for a key if `seq` is still its newest write.
    async fn settle(&self, entity: EntityId, key: &PropertyKey, seq: u64) {
        let mut pending = self.pending.lock().await;
        let slot = (entity, key.clone());
        if pending.get(&slot).is_some_and(|p| p.seq == seq) {
            pending.remove(&slot);
        }
    }
}

/// Cheap-to-clone handle onto one serialization domain.
///
/// Every store, property, and ledger built from the same runtime shares
/// its lock, worker, and error sink. Independent runtimes share nothing,
/// which keeps tests isolated.
#[derive(Clone)]
pub struct StoreRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    lock: StoreLock,
    jobs: mpsc::UnboundedSender<Job>,
    next_seq: AtomicU64,
    shared: Arc<Shared>,
}

impl core::fmt::Debug for StoreRuntime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoreRuntime")
            .field("lock", &self.inner.lock)
            .field("next_seq", &self.inner.next_seq)
            .finish_non_exhaustive()
    }
}

impl StoreRuntime {
    /// Start a runtime whose failures go to `sink`.
    ///
    /// Spawns the write worker, so this must be called from within a Tokio
    /// runtime. The worker exits once every clone of the returned handle
    /// has been dropped and the queue is drained.
    pub fn start(sink: ErrorSink) -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            sink,
        });
        tokio::spawn(run_worker(queue, Arc::clone(&shared)));
        tracing::debug!("store write worker started");

        Self {
            inner: Arc::new(RuntimeInner {
                lock: StoreLock::new(),
                jobs,
                next_seq: AtomicU64::new(0),
                shared,
            }),
        }
    }

    /// Start a runtime that logs failures via [`logging_sink`].
    pub fn with_logging() -> Self {
        Self::start(logging_sink())
    }

    /// The lock serializing this runtime.
    pub fn lock(&self) -> &StoreLock {
        &self.inner.lock
    }

    /// Whether `other` is a handle onto the same runtime.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Deliver `err` to the error sink.
    pub fn report(&self, err: &StoreError) {
        (self.inner.shared.sink)(err);
    }

    /// Wait until every write queued before this call has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.jobs.send(Job::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// The newest queued-but-unapplied write for a key, if any.
    pub(crate) async fn pending(&self, entity: EntityId, key: &PropertyKey) -> Option<PendingOp> {
        self.inner
            .shared
            .pending
            .lock()
            .await
            .get(&(entity, key.clone()))
            .map(|p| p.op.clone())
    }

    /// Queue a write. The caller must hold this runtime's lock.
    pub(crate) async fn enqueue(
        &self,
        guard: &StoreGuard<'_>,
        entity: EntityId,
        key: &PropertyKey,
        container: Arc<dyn BackingContainer>,
        op: PendingOp,
    ) -> Result<WriteHandle, StoreError> {
        if !guard.belongs_to(self.lock()) {
            return Err(StoreError::ForeignLock);
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.shared.pending.lock().await.insert(
            (entity, key.clone()),
            Pending {
                seq,
                op: op.clone(),
            },
        );

        let (done, rx) = oneshot::channel();
        let job = Job::Write(WriteJob {
            entity,
            key: key.clone(),
            container,
            op,
            seq,
            done,
        });
        if self.inner.jobs.send(job).is_err() {
            self.inner.shared.settle(entity, key, seq).await;
            self.report(&StoreError::WorkerStopped);
        } else {
            tracing::debug!(%entity, %key, seq, "write queued");
        }
        Ok(WriteHandle { done: rx })
    }
}

/// Apply queued jobs one at a time until every sender is gone.
async fn run_worker(mut queue: mpsc::UnboundedReceiver<Job>, shared: Arc<Shared>) {
    while let Some(job) = queue.recv().await {
        match job {
            Job::Write(write) => apply(write, &shared).await,
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("store write worker stopped");
}

async fn apply(write: WriteJob, shared: &Shared) {
    let WriteJob {
        entity,
        key,
        container,
        op,
        seq,
        done,
    } = write;

    let result = match op {
        PendingOp::Set(value) => container.set(&key, value).await,
        PendingOp::Remove => container.remove(&key).await,
    };
    shared.settle(entity, &key, seq).await;

    match &result {
        Ok(()) => tracing::debug!(%entity, %key, seq, "write applied"),
        Err(err) => {
            tracing::warn!(%entity, %key, seq, error = %err, "write failed");
            (shared.sink)(err);
        }
    }
    let _ = done.send(result);
}
