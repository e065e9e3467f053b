//! The queue actor: sole owner of pending tasks, scheduler state and the timer.

use super::{Command, QueueEntry, QueueState, QueueStatus, Task};
use crate::config::{QueueConfig, RetryConfig};
use crate::error::Result;
use crate::retry::run_with_retry;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Progress reported by a running execution back to the actor
enum Report {
    Retrying { generation: u64 },
    Finished { generation: u64 },
}

enum Wake {
    Shutdown,
    Command(Option<Command>),
    Report(Report),
    Tick,
}

struct InFlight {
    generation: u64,
    handle: JoinHandle<()>,
}

pub(super) struct QueueActor {
    config: QueueConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    reports_tx: mpsc::UnboundedSender<Report>,
    reports: mpsc::UnboundedReceiver<Report>,
    status_tx: watch::Sender<QueueStatus>,
    shutdown: CancellationToken,
    tasks: VecDeque<QueueEntry>,
    state: QueueState,
    timer: Option<Interval>,
    in_flight: Option<InFlight>,
    next_generation: u64,
}

impl QueueActor {
    pub(super) fn new(
        config: QueueConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        status_tx: watch::Sender<QueueStatus>,
        shutdown: CancellationToken,
    ) -> Self {
        let (reports_tx, reports) = mpsc::unbounded_channel();
        let mut actor = Self {
            config,
            commands,
            reports_tx,
            reports,
            status_tx,
            shutdown,
            tasks: VecDeque::new(),
            state: QueueState::None,
            timer: None,
            in_flight: None,
            next_generation: 0,
        };
        actor.arm_timer();
        actor.publish();
        actor
    }

    pub(super) async fn run(mut self) {
        tracing::debug!(
            period_ms = self.config.period.as_millis() as u64,
            "Queue started"
        );

        loop {
            let wake = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                Some(report) = self.reports.recv() => Wake::Report(report),
                command = self.commands.recv() => Wake::Command(command),
                _ = next_tick(&mut self.timer) => Wake::Tick,
            };

            match wake {
                Wake::Shutdown | Wake::Command(None) => break,
                Wake::Command(Some(command)) => self.handle_command(command),
                Wake::Report(report) => self.handle_report(report),
                Wake::Tick => self.tick(),
            }
            self.publish();
        }

        self.discard_all();
        self.publish();
        tracing::debug!("Queue stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Add(entry) => {
                self.tasks.push_back(entry);
                tracing::trace!(pending = self.tasks.len(), "Task enqueued");
            }
            Command::Start => self.arm_timer(),
            Command::Stop => self.timer = None,
            Command::Clear => {
                let discarded = self.tasks.len() + usize::from(self.in_flight.is_some());
                self.discard_all();
                tracing::debug!(discarded, "Queue cleared");
            }
            Command::Resume { force } => {
                if self.timer.is_none() || force {
                    self.arm_timer();
                }
            }
        }
    }

    fn handle_report(&mut self, report: Report) {
        let current = self.in_flight.as_ref().map(|f| f.generation);
        match report {
            Report::Retrying { generation } if current == Some(generation) => {
                self.state = QueueState::Retrying;
            }
            Report::Finished { generation } if current == Some(generation) => {
                self.in_flight = None;
                if self.state == QueueState::Retrying {
                    self.state = QueueState::Loading;
                }
            }
            // Late report from an execution aborted by `clear()`
            _ => {}
        }
    }

    fn tick(&mut self) {
        // One lane: a running or backing-off task blocks the next one
        if self.in_flight.is_some() {
            return;
        }

        let Some(entry) = self.tasks.pop_front() else {
            self.state = QueueState::WaitingTasks;
            return;
        };

        if matches!(self.state, QueueState::WaitingTasks | QueueState::None) {
            self.state = QueueState::Loading;
        }
        self.launch(entry);
    }

    fn launch(&mut self, entry: QueueEntry) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let retry = self.config.retry.clone();
        let reports = self.reports_tx.clone();
        let handle = tokio::spawn(execute(entry, retry, generation, reports));

        tracing::trace!(generation, pending = self.tasks.len(), "Task started");
        self.in_flight = Some(InFlight { generation, handle });
    }

    fn arm_timer(&mut self) {
        let period = self.config.period;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }

    /// Drops pending entries and aborts the running one; their handles resolve
    /// to `Cancelled` once the reply senders are dropped.
    fn discard_all(&mut self) {
        self.timer = None;
        self.tasks.clear();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }
        self.state = QueueState::None;
    }

    fn publish(&self) {
        self.status_tx.send_replace(QueueStatus {
            state: self.state,
            pending: self.tasks.len(),
            in_flight: self.in_flight.is_some(),
            timer_armed: self.timer.is_some(),
        });
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn execute(
    entry: QueueEntry,
    retry: RetryConfig,
    generation: u64,
    reports: mpsc::UnboundedSender<Report>,
) {
    let QueueEntry { task, reply } = entry;
    let task: &dyn Task = task.as_ref();

    let result = run_with_retry(
        &retry,
        || attempt(task),
        |_, _| {
            let _ = reports.send(Report::Retrying { generation });
        },
    )
    .await;

    if reply.send(result).is_err() {
        tracing::trace!(generation, "Task settled after its handle was dropped");
    }
    let _ = reports.send(Report::Finished { generation });
}

async fn attempt(task: &dyn Task) -> Result<Value> {
    task.run().await?.into_json()
}
