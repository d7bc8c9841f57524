//! Background task runner
//!
//! Runs one operation on a worker thread. The worker reports through two
//! channels: zero-payload progress pings (may be coalesced, consumers
//! re-read shared state) and exactly one result. The consumer side polls
//! from a single thread, the way a GUI timeout loop would.
//!
//! ```rust,ignore
//! let mut handle = TaskRunner::spawn("approach", move |ctx| {
//!     while !ctx.is_cancelled() {
//!         do_one_cut()?;
//!         ctx.notify_progress();
//!     }
//!     Ok(())
//! })?;
//! loop {
//!     match handle.poll() {
//!         TaskPoll::Pending { progressed: true } => refresh_view(),
//!         TaskPoll::Finished(result) => break show_result(result),
//!         _ => std::thread::sleep(POLL_INTERVAL),
//!     }
//! }
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use thiserror::Error;

/// Failure of the task machinery itself (not of the operation)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// The operation panicked
    #[error("Background task panicked: {0}")]
    Panicked(String),

    /// The worker exited without sending a result
    #[error("Background task ended without a result")]
    Disconnected,

    /// The result was already handed out
    #[error("Background task result was already delivered")]
    AlreadyDelivered,

    /// The worker thread could not be started
    #[error("Failed to start background task: {0}")]
    Spawn(String),
}

/// Cooperative cancellation flag shared by a handle and its worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Always accepted; takes effect at the next
    /// check by the worker.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Worker-side view of a running task
#[derive(Debug)]
pub struct TaskContext {
    progress_tx: Sender<()>,
    cancel: CancelToken,
}

impl TaskContext {
    /// Tell the consumer that shared state changed.
    pub fn notify_progress(&self) {
        // The consumer may already be gone; nothing to do then.
        let _ = self.progress_tx.send(());
    }

    /// Whether the consumer asked the task to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The task's cancellation token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Result of one [`TaskHandle::poll`]
#[derive(Debug)]
pub enum TaskPoll<T> {
    /// Still running; `progressed` is set if any progress ping arrived.
    Pending {
        /// Whether progress was reported since the last poll.
        progressed: bool,
    },
    /// The task finished and this is its result (delivered once).
    Finished(Result<T, TaskError>),
    /// The result was delivered earlier, or passed to the completion
    /// callback during this poll.
    Done,
}

type CompletionCallback<T> = Box<dyn FnOnce(Result<T, TaskError>)>;

/// Consumer-side handle of a background task
///
/// Not `Send`: the handle is bound to the thread that polls it, and the
/// completion callback runs on that thread.
pub struct TaskHandle<T> {
    name: String,
    progress_rx: Receiver<()>,
    result_rx: Receiver<Result<T, TaskError>>,
    cancel: CancelToken,
    on_complete: Option<CompletionCallback<T>>,
    delivered: bool,
    _not_send: std::marker::PhantomData<*const ()>,
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("delivered", &self.delivered)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<T> TaskHandle<T> {
    /// Register the callback that receives the result.
    ///
    /// The callback runs inside a later [`poll`](Self::poll) (or
    /// [`wait`](Self::wait)), on the polling thread, exactly once.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce(Result<T, TaskError>) + 'static,
    {
        self.on_complete = Some(Box::new(callback));
    }

    /// Check for progress and completion without blocking.
    pub fn poll(&mut self) -> TaskPoll<T> {
        if self.delivered {
            return TaskPoll::Done;
        }
        let progressed = self.progress_rx.try_iter().count() > 0;
        match self.result_rx.try_recv() {
            Ok(result) => self.deliver(result),
            Err(TryRecvError::Empty) => TaskPoll::Pending { progressed },
            Err(TryRecvError::Disconnected) => self.deliver(Err(TaskError::Disconnected)),
        }
    }

    /// Block until the task finishes.
    ///
    /// Returns the result, or `Err(AlreadyDelivered)` when it was already
    /// handed out (including to the completion callback).
    pub fn wait(&mut self) -> Result<T, TaskError> {
        if self.delivered {
            return Err(TaskError::AlreadyDelivered);
        }
        let result = self
            .result_rx
            .recv()
            .unwrap_or(Err(TaskError::Disconnected));
        match self.deliver(result) {
            TaskPoll::Finished(result) => result,
            _ => Err(TaskError::AlreadyDelivered),
        }
    }

    /// Ask the worker to stop at its next safe point.
    pub fn cancel(&self) {
        tracing::debug!("Cancel requested for task '{}'", self.name);
        self.cancel.cancel();
    }

    /// Whether the result has been delivered.
    pub fn is_finished(&self) -> bool {
        self.delivered
    }

    /// Task name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, result: Result<T, TaskError>) -> TaskPoll<T> {
        self.delivered = true;
        // Drain late pings so they are not mistaken for a new run.
        self.progress_rx.try_iter().for_each(drop);
        match self.on_complete.take() {
            Some(callback) => {
                callback(result);
                TaskPoll::Done
            }
            None => TaskPoll::Finished(result),
        }
    }
}

/// Spawns background tasks
pub struct TaskRunner;

impl TaskRunner {
    /// Run `operation` on a new worker thread.
    ///
    /// A panic inside `operation` is caught and delivered as
    /// [`TaskError::Panicked`].
    pub fn spawn<T, F>(name: &str, operation: F) -> Result<TaskHandle<T>, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> T + Send + 'static,
    {
        let (progress_tx, progress_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let ctx = TaskContext {
            progress_tx,
            cancel: cancel.clone(),
        };

        let task_name = name.to_string();
        std::thread::Builder::new()
            .name(format!("task-{}", name))
            .spawn(move || {
                tracing::debug!("Task '{}' started", task_name);
                let result = panic::catch_unwind(AssertUnwindSafe(|| operation(&ctx)))
                    .map_err(|payload| TaskError::Panicked(panic_message(payload)));
                if let Err(e) = &result {
                    tracing::error!("Task '{}' failed: {}", task_name, e);
                } else {
                    tracing::debug!("Task '{}' finished", task_name);
                }
                let _ = result_tx.send(result);
            })
            .map_err(|e| TaskError::Spawn(e.to_string()))?;

        Ok(TaskHandle {
            name: name.to_string(),
            progress_rx,
            result_rx,
            cancel,
            on_complete: None,
            delivered: false,
            _not_send: std::marker::PhantomData,
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_for<T>(handle: &mut TaskHandle<T>) -> TaskPoll<T> {
        loop {
            match handle.poll() {
                TaskPoll::Pending { .. } => std::thread::sleep(Duration::from_millis(2)),
                other => return other,
            }
        }
    }

    #[test]
    fn test_result_delivered_once() {
        let mut handle = TaskRunner::spawn("sum", |_| 2 + 2).expect("spawn");
        match wait_for(&mut handle) {
            TaskPoll::Finished(Ok(v)) => assert_eq!(v, 4),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(handle.poll(), TaskPoll::Done));
        assert_eq!(handle.wait(), Err(TaskError::AlreadyDelivered));
    }

    #[test]
    fn test_panic_is_captured() {
        let mut handle = TaskRunner::spawn("boom", |_| -> u32 { panic!("stage exploded") })
            .expect("spawn");
        assert_eq!(
            handle.wait(),
            Err(TaskError::Panicked("stage exploded".to_string()))
        );
    }

    #[test]
    fn test_cancellation_is_cooperative() {
        let mut handle = TaskRunner::spawn("loop", |ctx| {
            let mut steps = 0u32;
            while !ctx.is_cancelled() {
                steps += 1;
                ctx.notify_progress();
                std::thread::sleep(Duration::from_millis(1));
            }
            steps
        })
        .expect("spawn");
        std::thread::sleep(Duration::from_millis(10));
        handle.cancel();
        assert!(handle.wait().expect("result") > 0);
    }
}
