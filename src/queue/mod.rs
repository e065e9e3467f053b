//! Single-lane, rate-limited task queue.
//!
//! The platform API tolerates roughly three requests per second, so every
//! request in this crate goes through one [`Queue`]. The queue wakes up once per
//! configured period, starts at most one task per tick, and never starts a task
//! while another one is still running or backing off.
//!
//! All queue state lives in a single actor task (see `actor.rs`). A [`Queue`] is
//! a cheap, cloneable handle that talks to the actor over a channel; the actor
//! exits when the last handle is dropped or [`Queue::shutdown`] is called.
//!
//! # Example
//!
//! ```no_run
//! use osnova_likes::config::QueueConfig;
//! use osnova_likes::queue::{Queue, TaskResponse};
//!
//! # async fn example() -> osnova_likes::Result<()> {
//! let queue = Queue::new(QueueConfig::default());
//! let value = queue
//!     .add_task(|| async {
//!         Ok::<_, osnova_likes::Error>(TaskResponse::ok_json(&serde_json::json!({"ok": true})))
//!     })
//!     .await?;
//! assert_eq!(value["ok"], true);
//! # Ok(())
//! # }
//! ```

mod actor;
mod task;


pub use task::{Task, TaskResponse};

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Scheduler state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Nothing has happened yet (or the queue was just cleared)
    #[default]
    None,
    /// A task is running, or the queue is ready to start the next one
    Loading,
    /// The running task failed and is waiting out its backoff delay
    Retrying,
    /// The last tick found no pending tasks
    WaitingTasks,
}

/// Point-in-time view of the queue
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Scheduler state
    pub state: QueueState,
    /// Tasks enqueued but not yet started
    pub pending: usize,
    /// Whether a task is currently executing (including its backoff)
    pub in_flight: bool,
    /// Whether the tick timer is running
    pub timer_armed: bool,
}

/// A task together with the channel its result is delivered on
pub(crate) struct QueueEntry {
    pub(crate) task: Box<dyn Task>,
    pub(crate) reply: oneshot::Sender<Result<Value>>,
}

pub(crate) enum Command {
    Add(QueueEntry),
    Start,
    Stop,
    Clear,
    Resume { force: bool },
}

/// Handle to the queue actor
#[derive(Clone)]
pub struct Queue {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<QueueStatus>,
    shutdown: CancellationToken,
}

impl Queue {
    /// Spawn the queue actor with its timer armed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: QueueConfig) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(QueueStatus::default());
        let shutdown = CancellationToken::new();

        let actor = actor::QueueActor::new(config, commands_rx, status_tx, shutdown.clone());
        tokio::spawn(actor.run());

        Self {
            commands,
            status,
            shutdown,
        }
    }

    /// Enqueue a task.
    ///
    /// The task joins the back of the queue immediately; the returned handle
    /// resolves once the task succeeds, fails for good, or is discarded.
    /// Exactly one outcome is delivered per task.
    pub fn add_task<T>(&self, task: T) -> TaskHandle
    where
        T: Task + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let entry = QueueEntry {
            task: Box::new(task),
            reply,
        };
        let closed = self.commands.send(Command::Add(entry)).is_err();
        TaskHandle { rx, closed }
    }

    /// Arm the tick timer, restarting it if it is already running.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Stop the tick timer. Pending tasks stay queued.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Stop the timer and discard every pending and running task.
    ///
    /// Handles of discarded tasks resolve to [`Error::Cancelled`].
    pub fn clear(&self) {
        self.send(Command::Clear);
    }

    /// Re-arm the timer if it is stopped; with `force`, restart it regardless.
    pub fn resume(&self, force: bool) {
        self.send(Command::Resume { force });
    }

    /// Current queue status.
    pub fn status(&self) -> QueueStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<QueueStatus> {
        self.status.clone()
    }

    /// Stop the actor. Pending and running tasks are cancelled.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether the actor has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Queue command ignored, actor has stopped");
        }
    }
}

/// Future resolving to the JSON result of an enqueued task
#[must_use = "a task result is only observable through its handle"]
pub struct TaskHandle {
    rx: oneshot::Receiver<Result<Value>>,
    closed: bool,
}

impl Future for TaskHandle {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let closed = self.closed;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) if closed => Poll::Ready(Err(Error::QueueClosed)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
