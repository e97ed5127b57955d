//! Dispatch of auxiliary work onto the secondary core.
//!
//! The board has one spare core that runs at most one task at a time.
//! [`SingleFlightExecutor`] keeps the handle of the last task it started in an
//! [`ExecutorSlot`]. Starting a new task forgets the old handle; it never
//! cancels or joins the old task, so the previous task may still be running
//! when the next one is dispatched.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::LaunchError;

pub type TaskId = u64;

/// A named callable run on the secondary core. Never joined, no result.
#[derive(Clone)]
pub struct SignalTask {
    name: &'static str,
    job: Arc<dyn Fn() + Send + Sync>,
}

impl SignalTask {
    pub fn new<F>(name: &'static str, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name,
            job: Arc::new(job),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn run(&self) {
        (self.job)()
    }
}

impl fmt::Debug for SignalTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTask").field("name", &self.name).finish()
    }
}

/// Reference to a dispatched task. Clones share the completion flag.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    name: &'static str,
    finished: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn new(id: TaskId, name: &'static str) -> Self {
        Self {
            id,
            name,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Set by the execution unit once the task body has returned.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Something that can run a [`SignalTask`] off the calling thread.
pub trait ExecutionUnit: Send + Sync {
    fn launch(&self, id: TaskId, task: &SignalTask) -> Result<TaskHandle, LaunchError>;
}

impl<U: ExecutionUnit + ?Sized> ExecutionUnit for Arc<U> {
    fn launch(&self, id: TaskId, task: &SignalTask) -> Result<TaskHandle, LaunchError> {
        (**self).launch(id, task)
    }
}

/// The spare core, modelled as one detached OS thread at a time.
#[derive(Debug, Clone, Default)]
pub struct SecondaryCore {
    occupied: Arc<AtomicBool>,
}

/// Frees the core when the task body returns or unwinds.
struct CoreRelease(Arc<AtomicBool>);

impl Drop for CoreRelease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SecondaryCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }
}

impl ExecutionUnit for SecondaryCore {
    fn launch(&self, id: TaskId, task: &SignalTask) -> Result<TaskHandle, LaunchError> {
        if self
            .occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LaunchError::Busy);
        }

        let handle = TaskHandle::new(id, task.name());
        let finished = handle.clone();
        let release = CoreRelease(self.occupied.clone());
        let task = task.clone();

        let spawned = thread::Builder::new()
            .name("core1".into())
            .spawn(move || {
                {
                    let _release = release;
                    task.run();
                }
                finished.finish();
            });

        match spawned {
            // Dropping the join handle detaches the thread.
            Ok(_) => Ok(handle),
            Err(e) => {
                // The closure (and its CoreRelease) is dropped on spawn failure.
                Err(LaunchError::Spawn(e))
            }
        }
    }
}

/// Holder of the one outstanding task handle.
#[derive(Debug, Default)]
pub struct ExecutorSlot {
    handle: Mutex<Option<TaskHandle>>,
}

impl ExecutorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<TaskHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle currently stored, read under the lock.
    pub fn current(&self) -> Option<TaskHandle> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

/// Result of a successful [`SingleFlightExecutor::start`].
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub handle: TaskHandle,
    /// Number of fixed-delay waits before the unit accepted the task.
    pub backoffs: u32,
}

/// Starts tasks on an [`ExecutionUnit`], retrying while it refuses.
pub struct SingleFlightExecutor<U> {
    unit: U,
    slot: Arc<ExecutorSlot>,
    backoff: Duration,
    next_id: AtomicU64,
}

impl<U: ExecutionUnit> SingleFlightExecutor<U> {
    pub fn new(unit: U, slot: Arc<ExecutorSlot>, backoff: Duration) -> Self {
        Self {
            unit,
            slot,
            backoff,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn slot(&self) -> &Arc<ExecutorSlot> {
        &self.slot
    }

    pub fn unit(&self) -> &U {
        &self.unit
    }

    /// Start `task`, replacing whatever handle the slot held.
    ///
    /// Blocks until the unit accepts the task. Every refusal, busy or not,
    /// waits the fixed backoff and tries again; the lock is not held while
    /// waiting.
    pub fn start(&self, task: SignalTask) -> Dispatch {
        let mut backoffs = 0;

        loop {
            {
                let mut slot = self.slot.lock();
                if let Some(previous) = slot.take() {
                    debug!(
                        task = previous.name(),
                        id = previous.id(),
                        finished = previous.is_finished(),
                        "forgetting previous task handle"
                    );
                }

                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                match self.unit.launch(id, &task) {
                    Ok(handle) => {
                        debug!(task = task.name(), id, backoffs, "task started on secondary core");
                        *slot = Some(handle.clone());
                        return Dispatch { handle, backoffs };
                    }
                    Err(LaunchError::Busy) => {
                        warn!(task = task.name(), "secondary core is still in use, retrying");
                    }
                    Err(e) => {
                        error!(task = task.name(), error = %e, "failed to start task, retrying");
                    }
                }
            }

            thread::sleep(self.backoff);
            backoffs += 1;
        }
    }

    /// Forget the stored handle. Running work is not affected.
    pub fn stop(&self) {
        let mut slot = self.slot.lock();
        if let Some(handle) = slot.take() {
            debug!(task = handle.name(), id = handle.id(), "task handle cleared");
        }
    }
}
