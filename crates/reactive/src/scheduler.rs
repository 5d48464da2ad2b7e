//! Delivery schedulers.
//!
//! Every item a query stream emits is handed to one `Scheduler`, so the initial item and
//! all triggered items share a single ordering domain.

use brook_core::{Error, Result};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

/// A unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks in the order they are scheduled.
pub trait Scheduler: Send + Sync + 'static {
    /// Queues a task.
    fn schedule(&self, task: Task);
}

thread_local! {
    static TRAMPOLINE: RefCell<Option<VecDeque<Task>>> = const { RefCell::new(None) };
}

struct TrampolineReset;

impl Drop for TrampolineReset {
    fn drop(&mut self) {
        TRAMPOLINE.with(|queue| *queue.borrow_mut() = None);
    }
}

/// Runs tasks on the scheduling thread.
///
/// A task scheduled while another task is running on the same thread is queued and
/// runs after the current one returns, so delivery never re-enters an observer.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateScheduler;

impl ImmediateScheduler {
    /// Creates an immediate scheduler.
    pub fn new() -> Self {
        ImmediateScheduler
    }
}

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) {
        let first = TRAMPOLINE.with(|queue| {
            let mut queue = queue.borrow_mut();
            match queue.as_mut() {
                Some(pending) => {
                    pending.push_back(task);
                    None
                }
                None => {
                    *queue = Some(VecDeque::new());
                    Some(task)
                }
            }
        });
        let Some(first) = first else {
            return;
        };

        let _reset = TrampolineReset;
        let mut next = Some(first);
        while let Some(task) = next {
            task();
            next = TRAMPOLINE.with(|queue| queue.borrow_mut().as_mut().and_then(VecDeque::pop_front));
        }
    }
}

/// Runs tasks on one dedicated thread, in FIFO order.
///
/// Dropping the scheduler lets the worker finish the queued tasks and stop.
pub struct WorkerScheduler {
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl WorkerScheduler {
    /// Spawns the worker thread.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Task>();
        let worker = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                for task in rx {
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::error!(target: "brook::reactive", "scheduled task panicked");
                    }
                }
                tracing::debug!(target: "brook::reactive", "worker scheduler stopped");
            })
            .map_err(|e| Error::configuration(format!("cannot spawn scheduler thread: {}", e)))?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Returns true if called from the worker thread.
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Scheduler for WorkerScheduler {
    fn schedule(&self, task: Task) {
        match self.sender.lock().as_ref() {
            Some(tx) => {
                if tx.send(task).is_err() {
                    tracing::warn!(target: "brook::reactive", "worker scheduler gone, task dropped");
                }
            }
            None => tracing::warn!(target: "brook::reactive", "worker scheduler shut down, task dropped"),
        }
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if thread::current().id() != self.worker_id && worker.join().is_err() {
                tracing::error!(target: "brook::reactive", "worker scheduler thread panicked");
            }
        }
    }
}
