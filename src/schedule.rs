//! Clock and cancelable one-shot timers.
//!
//! Timers never call into the tracker directly. A fired timer posts its
//! [`TimerId`] back to the owning loop, which hands it to the tracker on the
//! same logical thread that performs every other mutation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Source of server time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and offline simulation. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, t: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = t;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// One-shot delayed callbacks, identified by id and cancelable
pub trait Scheduler: Send {
    fn schedule(&mut self, delay: Duration) -> TimerId;
    fn cancel(&mut self, id: TimerId);
}

/// Scheduler backed by tokio tasks. Fired ids arrive on the receiver
/// returned from [`TokioScheduler::new`].
pub struct TokioScheduler {
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
    fired_tx: mpsc::UnboundedSender<TimerId>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerId>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            next_id: 0,
            tasks: HashMap::new(),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    pub fn pending(&self) -> usize {
        self.tasks.values().filter(|h| !h.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        self.tasks.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let tx = self.fired_tx.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(id);
        });
        self.tasks.insert(id, handle);

        debug!("Armed timer {:?} for {:?}", id, delay);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.tasks.remove(&id) {
            handle.abort();
            debug!("Cancelled timer {:?}", id);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

#[derive(Debug, Default)]
struct ManualSchedulerState {
    next_id: u64,
    armed: Vec<(TimerId, Duration)>,
    cancelled: Vec<TimerId>,
}

/// Scheduler that only records what was armed and cancelled.
/// Clones share the same record.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualSchedulerState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every timer ever armed, in order
    pub fn armed(&self) -> Vec<(TimerId, Duration)> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).armed.clone()
    }

    pub fn cancelled(&self) -> Vec<TimerId> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).cancelled.clone()
    }

    /// Timers armed and not yet cancelled
    pub fn active(&self) -> Vec<(TimerId, Duration)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .armed
            .iter()
            .filter(|(id, _)| !state.cancelled.contains(id))
            .copied()
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_id += 1;
        let id = TimerId(state.next_id);
        state.armed.push((id, delay));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.cancelled.contains(&id) {
            state.cancelled.push(id);
        }
    }
}
