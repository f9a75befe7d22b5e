//! Serial dispatch queues.
//!
//! A [`SerialQueue`] owns one dedicated thread and runs submitted closures
//! strictly one at a time, in submission order. It is the ordering domain for
//! anything that must never observe torn state: every mutation routed through
//! the same queue is serialized against every other one, no matter which
//! thread submitted it.
//!
//! # Example
//!
//! ```
//! use crossplay_core::dispatch::SerialQueue;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let queue = SerialQueue::new("example-queue").unwrap();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! let c = counter.clone();
//! queue.submit(move || { c.fetch_add(1, Ordering::SeqCst); }).unwrap();
//!
//! // Blocks until the task above (and this one) have run.
//! let seen = queue.submit_sync({
//!     let c = counter.clone();
//!     move || c.load(Ordering::SeqCst)
//! }).unwrap();
//! assert_eq!(seen, 1);
//!
//! queue.stop_and_join();
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;

use crate::error::{CoreError, Result};

use crate::logging::targets::DISPATCH as TARGET;

/// Configuration for a [`SerialQueue`].
#[derive(Debug, Clone)]
pub struct SerialQueueConfig {
    /// Name given to the queue thread.
    pub name: String,
    /// Stack size for the queue thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
}

impl Default for SerialQueueConfig {
    fn default() -> Self {
        Self {
            name: "crossplay-dispatch".to_string(),
            stack_size: None,
        }
    }
}

impl SerialQueueConfig {
    /// Configuration with the given thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Builder for queues with custom configuration.
#[derive(Debug, Default)]
pub struct SerialQueueBuilder {
    config: SerialQueueConfig,
}

impl SerialQueueBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the thread stack size.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Spawn the queue thread.
    pub fn build(self) -> Result<SerialQueue> {
        SerialQueue::with_config(self.config)
    }
}

enum QueueTask {
    Run(Box<dyn FnOnce() + Send>),
    Shutdown,
}

struct QueueState {
    running: AtomicBool,
    pending: AtomicUsize,
}

/// A dedicated thread that runs closures one at a time, in FIFO order.
///
/// `SerialQueue` is `Send + Sync`; any number of threads may submit to it.
/// Dropping the queue requests shutdown without blocking; call
/// [`stop_and_join`](Self::stop_and_join) to wait for queued work to drain.
pub struct SerialQueue {
    sender: Sender<QueueTask>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    name: String,
    state: Arc<QueueState>,
}

impl SerialQueue {
    /// Spawn a queue with the given thread name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_config(SerialQueueConfig::with_name(name))
    }

    /// Spawn a queue from a configuration.
    pub fn with_config(config: SerialQueueConfig) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let state = Arc::new(QueueState {
            running: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
        });

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread_state = state.clone();
        let handle = builder
            .spawn(move || {
                queue_loop(receiver, &thread_state);
                thread_state.running.store(false, Ordering::Release);
            })
            .map_err(|e| CoreError::SpawnFailed(e.to_string()))?;

        tracing::debug!(target: TARGET, name = %config.name, "dispatch queue started");

        Ok(Self {
            sender,
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
            name: config.name,
            state,
        })
    }

    /// The queue thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the queue still accepts work.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Tasks submitted but not yet started.
    pub fn pending_tasks(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Whether the caller is running on this queue's thread.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue `task` for execution and return immediately.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_running() {
            return Err(CoreError::QueueStopped);
        }

        self.state.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(QueueTask::Run(Box::new(task))).is_err() {
            self.state.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(CoreError::QueueDisconnected);
        }
        Ok(())
    }

    /// Queue `task` and block until it has run, returning its result.
    ///
    /// Called from the queue's own thread, the task runs inline instead of
    /// deadlocking behind itself.
    pub fn submit_sync<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current_thread() {
            return Ok(task());
        }

        let (result_sender, result_receiver) = bounded(1);
        self.submit(move || {
            let _ = result_sender.send(task());
        })?;
        result_receiver
            .recv()
            .map_err(|_| CoreError::QueueDisconnected)
    }

    /// Stop accepting work. Already queued tasks still run.
    pub fn stop(&self) {
        if self.state.running.swap(false, Ordering::AcqRel) {
            let _ = self.sender.send(QueueTask::Shutdown);
            tracing::debug!(target: TARGET, name = %self.name, "dispatch queue stopping");
        }
    }

    /// Wait for the queue thread to exit.
    ///
    /// Returns `false` if already joined, if the thread panicked, or if called
    /// from the queue thread itself.
    pub fn join(&self) -> bool {
        if self.is_current_thread() {
            return false;
        }
        match self.handle.lock().take() {
            Some(handle) => handle.join().is_ok(),
            None => false,
        }
    }

    /// [`stop`](Self::stop) followed by [`join`](Self::join).
    pub fn stop_and_join(&self) -> bool {
        self.stop();
        self.join()
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn queue_loop(receiver: Receiver<QueueTask>, state: &QueueState) {
    while let Ok(task) = receiver.recv() {
        match task {
            QueueTask::Run(task) => run_task(task, state),
            QueueTask::Shutdown => {
                // Anything that raced past the running check still runs.
                while let Ok(QueueTask::Run(task)) = receiver.try_recv() {
                    run_task(task, state);
                }
                break;
            }
        }
    }
}

fn run_task(task: Box<dyn FnOnce() + Send>, state: &QueueState) {
    // Counted out before running, so work a task submits is always visible
    // to a caller that waited on that task.
    state.pending.fetch_sub(1, Ordering::AcqRel);
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!(target: TARGET, "dispatched task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_queue_creation() {
        let queue = SerialQueue::new("test-queue").unwrap();
        assert!(queue.is_running());
        assert_eq!(queue.pending_tasks(), 0);
        assert_eq!(queue.name(), "test-queue");
        assert!(!queue.is_current_thread());
        assert!(queue.stop_and_join());
        assert!(!queue.is_running());
    }

    #[test]
    fn test_builder() {
        let queue = SerialQueueBuilder::new()
            .name("built-queue")
            .stack_size(256 * 1024)
            .build()
            .unwrap();
        assert_eq!(queue.name(), "built-queue");
        queue.stop_and_join();
    }

    #[test]
    fn test_sequential_processing() {
        let queue = SerialQueue::new("ordered").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20 {
            let order_clone = order.clone();
            queue
                .submit(move || {
                    if i % 3 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                    order_clone.lock().push(i);
                })
                .unwrap();
        }
        queue.submit_sync(|| ()).unwrap();

        assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
        queue.stop_and_join();
    }

    #[test]
    fn test_submit_sync_returns_value() {
        let queue = SerialQueue::new("sync").unwrap();
        let value = queue.submit_sync(|| 6 * 7).unwrap();
        assert_eq!(value, 42);
        queue.stop_and_join();
    }

    #[test]
    fn test_submit_sync_from_queue_thread_runs_inline() {
        let queue = Arc::new(SerialQueue::new("reentrant").unwrap());
        let inner = queue.clone();
        let value = queue
            .submit_sync(move || inner.submit_sync(|| 5).unwrap())
            .unwrap();
        assert_eq!(value, 5);
        queue.stop_and_join();
    }

    #[test]
    fn test_submit_after_stop() {
        let queue = SerialQueue::new("stopped").unwrap();
        queue.stop();
        assert_eq!(queue.submit(|| {}), Err(CoreError::QueueStopped));
        assert_eq!(queue.submit_sync(|| 1), Err(CoreError::QueueStopped));
        queue.join();
    }

    #[test]
    fn test_graceful_shutdown_drains_queue() {
        let queue = SerialQueue::new("drain").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let c = counter.clone();
            queue
                .submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        queue.stop_and_join();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_panicking_task_does_not_kill_queue() {
        let queue = SerialQueue::new("panics").unwrap();
        queue.submit(|| panic!("boom")).unwrap();
        assert_eq!(queue.submit_sync(|| "still alive").unwrap(), "still alive");
        assert_eq!(queue.pending_tasks(), 0);
        queue.stop_and_join();
    }

    #[test]
    fn test_multiple_submitters() {
        let queue = Arc::new(SerialQueue::new("many").unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let q = queue.clone();
                let c = counter.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        let c2 = c.clone();
                        q.submit(move || {
                            c2.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        queue.submit_sync(|| ()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        queue.stop_and_join();
    }
}
