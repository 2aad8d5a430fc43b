//! Callback Executors
//!
//! Each listener picks where its callbacks run. The poller only submits work
//! and never waits for it.

use std::thread::JoinHandle;
use crossbeam_channel::{unbounded, Sender};
use tracing::{debug, warn};

/// A unit of fire-and-forget work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a task, now or later, on some thread
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs tasks immediately on the submitting thread
///
/// With this executor callbacks run on the poller thread, in dispatch order,
/// before the cycle moves on.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Runs tasks in submission order on one dedicated thread
pub struct WorkerExecutor {
    sender: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
}

impl WorkerExecutor {
    /// Spawn the worker thread
    pub fn new(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<Task>();
        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for task in receiver.iter() {
                    task();
                }
            })?;

        debug!("Started worker executor {}", name);
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl Executor for WorkerExecutor {
    fn execute(&self, task: Task) {
        let delivered = self.sender
            .as_ref()
            .map(|s| s.send(task).is_ok())
            .unwrap_or(false);
        if !delivered {
            warn!("Worker executor is shut down, dropping task");
        }
    }
}

impl Drop for WorkerExecutor {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued tasks and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            // A task holding the last reference may drop us on the worker itself.
            if worker.thread().id() != std::thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

/// Spawns each task as a blocking job on a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        self.handle.spawn_blocking(task);
    }
}
