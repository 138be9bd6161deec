//! Run lock and per-run progress logs.
//!
//! Each run owns an append-only event log. Events are numbered and published
//! to the live channel under the log's lock, so a subscriber that snapshots
//! the backlog and subscribes under the same lock never misses or reorders
//! an event. Finished logs stay readable for the grace period.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use moka::sync::Cache;
use pulse_models::config::ProgressConfig;
use pulse_models::progress::{ProgressEvent, RunState, Step, StepStatus};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;

/// Stream of a run's events, ending after the terminal event.
pub type ProgressStream = BoxStream<'static, ProgressEvent>;

const MAX_RETAINED_RUNS: u64 = 32;

struct LogInner {
    events: Vec<ProgressEvent>,
    sender: broadcast::Sender<ProgressEvent>,
    finished: bool,
}

struct RunLog {
    run_id: Uuid,
    inner: Mutex<LogInner>,
}

impl RunLog {
    fn new(run_id: Uuid, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            run_id,
            inner: Mutex::new(LogInner {
                events: Vec::new(),
                sender,
                finished: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        // A poisoned log still holds valid events; keep serving them.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append and publish the next event. Ignored once the log is finished.
    fn push(&self, step: Step, status: StepStatus, detail: String) -> Option<ProgressEvent> {
        let mut inner = self.lock();
        if inner.finished {
            return None;
        }
        let event = ProgressEvent {
            run_id: self.run_id,
            seq: inner.events.len() as u64 + 1,
            step,
            status,
            detail,
            at: Utc::now(),
        };
        if event.is_terminal() {
            inner.finished = true;
        }
        inner.events.push(event.clone());
        // No receivers is fine.
        let _ = inner.sender.send(event.clone());
        Some(event)
    }

    fn events_from(&self, from_seq: u64) -> Vec<ProgressEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.seq >= from_seq)
            .cloned()
            .collect()
    }

    /// Backlog from `from_seq` plus a live receiver, or no receiver if finished.
    fn attach(&self, from_seq: u64) -> (Vec<ProgressEvent>, Option<broadcast::Receiver<ProgressEvent>>) {
        let inner = self.lock();
        let backlog = inner
            .events
            .iter()
            .filter(|e| e.seq >= from_seq)
            .cloned()
            .collect();
        let receiver = (!inner.finished).then(|| inner.sender.subscribe());
        (backlog, receiver)
    }
}

struct Slot {
    state: RunState,
    active: Option<Arc<RunLog>>,
    last_run: Option<Uuid>,
}

/// Owns the single run slot and the progress logs.
pub struct ProgressHub {
    slot: Mutex<Slot>,
    finished: Cache<Uuid, Arc<RunLog>>,
    channel_capacity: usize,
}

impl ProgressHub {
    pub fn new(config: &ProgressConfig) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                state: RunState::Idle,
                active: None,
                last_run: None,
            }),
            finished: Cache::builder()
                .max_capacity(MAX_RETAINED_RUNS)
                .time_to_live(Duration::from_secs(config.grace_seconds))
                .build(),
            channel_capacity: config.channel_capacity,
        })
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically move from any non-running state to running.
    pub fn try_begin(self: &Arc<Self>) -> Result<RunTracker, PipelineError> {
        let mut slot = self.lock_slot();
        if slot.state == RunState::Running {
            return Err(PipelineError::RunAlreadyInProgress);
        }
        let run_id = Uuid::new_v4();
        let log = Arc::new(RunLog::new(run_id, self.channel_capacity));
        slot.state = RunState::Running;
        slot.active = Some(Arc::clone(&log));
        slot.last_run = Some(run_id);
        drop(slot);

        info!(run_id = %run_id, "Run started");
        Ok(RunTracker {
            hub: Arc::clone(self),
            log,
            done: false,
        })
    }

    pub fn state(&self) -> RunState {
        self.lock_slot().state
    }

    /// The running run, or else the most recent one.
    pub fn current_run(&self) -> Option<Uuid> {
        self.lock_slot().last_run
    }

    fn find(&self, run_id: Uuid) -> Option<Arc<RunLog>> {
        let slot = self.lock_slot();
        if let Some(active) = slot.active.as_ref().filter(|log| log.run_id == run_id) {
            return Some(Arc::clone(active));
        }
        self.finished.get(&run_id)
    }

    /// Events recorded so far for a run.
    pub fn events(&self, run_id: Uuid) -> Result<Vec<ProgressEvent>, PipelineError> {
        self.find(run_id)
            .map(|log| log.events_from(0))
            .ok_or(PipelineError::UnknownRun(run_id))
    }

    /// All events with `seq >= from_seq`, then the live tail, ending after
    /// the terminal event.
    pub fn subscribe(&self, run_id: Uuid, from_seq: u64) -> Result<ProgressStream, PipelineError> {
        let log = self.find(run_id).ok_or(PipelineError::UnknownRun(run_id))?;
        let (backlog, receiver) = log.attach(from_seq);

        let state = Subscription {
            log,
            backlog: backlog.into(),
            receiver,
            next_seq: from_seq.max(1),
            done: false,
        };
        Ok(stream::unfold(state, Subscription::next).boxed())
    }

    fn finish(&self, log: &Arc<RunLog>, state: RunState, detail: String) {
        let mut slot = self.lock_slot();
        let status = if state == RunState::Completed {
            StepStatus::Ok
        } else {
            StepStatus::Failed
        };
        log.push(Step::Run, status, detail);
        self.finished.insert(log.run_id, Arc::clone(log));
        if slot.active.as_ref().is_some_and(|a| a.run_id == log.run_id) {
            slot.active = None;
            slot.state = state;
        }
    }
}

struct Subscription {
    log: Arc<RunLog>,
    backlog: VecDeque<ProgressEvent>,
    receiver: Option<broadcast::Receiver<ProgressEvent>>,
    next_seq: u64,
    done: bool,
}

impl Subscription {
    async fn next(mut self) -> Option<(ProgressEvent, Self)> {
        loop {
            if self.done {
                return None;
            }
            if let Some(event) = self.backlog.pop_front() {
                if event.seq < self.next_seq {
                    // A terminal event behind the resume point still ends the stream.
                    if event.is_terminal() {
                        self.done = true;
                    }
                    continue;
                }
                self.next_seq = event.seq + 1;
                self.done = event.is_terminal();
                return Some((event, self));
            }
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) => self.backlog.push_back(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(run_id = %self.log.run_id, skipped, "Subscriber lagged; catching up from log");
                    let missed = self.log.events_from(self.next_seq);
                    self.backlog.extend(missed);
                }
                Err(RecvError::Closed) => {
                    let rest = self.log.events_from(self.next_seq);
                    self.backlog.extend(rest);
                    self.receiver = None;
                }
            }
        }
    }
}

/// Handle for emitting a run's events. Finishing consumes it; dropping it
/// unfinished marks the run failed.
pub struct RunTracker {
    hub: Arc<ProgressHub>,
    log: Arc<RunLog>,
    done: bool,
}

impl RunTracker {
    pub fn run_id(&self) -> Uuid {
        self.log.run_id
    }

    pub fn emit(&self, step: Step, status: StepStatus, detail: impl Into<String>) {
        let detail = detail.into();
        if let Some(event) = self.log.push(step, status, detail) {
            match status {
                StepStatus::Warning => {
                    warn!(run_id = %event.run_id, seq = event.seq, step = %step, "{}", event.detail)
                }
                _ => info!(
                    run_id = %event.run_id,
                    seq = event.seq,
                    step = %step,
                    status = ?status,
                    "{}",
                    event.detail
                ),
            }
        }
    }

    pub fn started(&self, step: Step, detail: impl Into<String>) {
        self.emit(step, StepStatus::Started, detail);
    }

    pub fn ok(&self, step: Step, detail: impl Into<String>) {
        self.emit(step, StepStatus::Ok, detail);
    }

    pub fn warning(&self, step: Step, detail: impl Into<String>) {
        self.emit(step, StepStatus::Warning, detail);
    }

    pub fn failed(&self, step: Step, detail: impl Into<String>) {
        self.emit(step, StepStatus::Failed, detail);
    }

    /// Stage exit: `warning` if the stage degraded, else `ok`.
    pub fn finish_step(&self, step: Step, warnings: usize, detail: impl Into<String>) {
        if warnings == 0 {
            self.ok(step, detail);
        } else {
            let detail = format!("{} ({warnings} warnings)", detail.into());
            self.emit(step, StepStatus::Warning, detail);
        }
    }

    pub fn complete(mut self, detail: impl Into<String>) {
        self.done = true;
        info!(run_id = %self.log.run_id, "Run completed");
        self.hub.finish(&self.log, RunState::Completed, detail.into());
    }

    pub fn fail(mut self, step: Step, reason: impl std::fmt::Display) {
        self.done = true;
        warn!(run_id = %self.log.run_id, step = %step, error = %reason, "Run failed");
        self.hub
            .finish(&self.log, RunState::Failed, format!("{step}: {reason}"));
    }
}

impl Drop for RunTracker {
    fn drop(&mut self) {
        if !self.done {
            warn!(run_id = %self.log.run_id, "Run tracker dropped before finishing");
            self.hub
                .finish(&self.log, RunState::Failed, "run aborted".to_string());
        }
    }
}
