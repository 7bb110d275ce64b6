use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, warn};
use warden_core_types::EntityKey;

use crate::error::SchedulerError;
use crate::lane::{Admitted, Lane};
use crate::metrics;
use crate::model::{EnforcementTask, LaneState};

/// Serializes enforcement tasks per [`EntityKey`]. Distinct keys never wait
/// on each other.
///
/// Every admitted task runs on its own tokio task. Lanes are created on first
/// submit and dropped as soon as they are idle.
#[derive(Clone, Default)]
pub struct EnforcementScheduler {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    lanes: DashMap<EntityKey, Mutex<Lane>>,
    seq: AtomicU64,
    idle: Notify,
}

impl EnforcementScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `task`; never blocks. Must be called within a tokio runtime.
    pub fn submit(&self, task: EnforcementTask) {
        let key = task.key().clone();
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        metrics::record_submitted();
        debug!(key = %key, seq, label = task.label(), invalidates = task.invalidates_cache(), "task submitted");
        let admitted = {
            let lane = self.inner.lanes.entry(key.clone()).or_default();
            let mut lane = lane.lock();
            lane.push(seq, task);
            lane.admit()
        };
        self.inner.spawn_all(&key, admitted);
    }

    pub fn lane_state(&self, key: &EntityKey) -> LaneState {
        self.inner
            .lanes
            .get(key)
            .map(|lane| lane.lock().state())
            .unwrap_or(LaneState::Idle)
    }

    /// Tasks queued or running for `key`.
    pub fn pending(&self, key: &EntityKey) -> usize {
        self.inner
            .lanes
            .get(key)
            .map(|lane| lane.lock().pending())
            .unwrap_or(0)
    }

    pub fn active_keys(&self) -> usize {
        self.inner.lanes.len()
    }

    /// Resolves once no lane holds work.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.lanes.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn spawn_all(self: &Arc<Self>, key: &EntityKey, admitted: Vec<Admitted>) {
        for next in admitted {
            let inner = Arc::clone(self);
            let key = key.clone();
            tokio::spawn(async move { inner.drive(key, next).await });
        }
    }

    async fn drive(self: Arc<Self>, key: EntityKey, admitted: Admitted) {
        let Admitted { seq, task, turn } = admitted;
        let label = task.label();
        metrics::record_started();

        let prepared = AssertUnwindSafe(task.into_prepare()).catch_unwind().await;
        // A closed channel means the lane is gone; nothing left to wait for.
        let _ = turn.await;

        let outcome = match prepared {
            Ok(Ok(commit)) => {
                if let Some(lane) = self.lanes.get(&key) {
                    lane.lock().mark_committing(seq);
                }
                match AssertUnwindSafe(commit).catch_unwind().await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(SchedulerError::TaskFailed(err)),
                    Err(panic) => Err(SchedulerError::TaskPanicked(panic_message(panic))),
                }
            }
            Ok(Err(err)) => Err(SchedulerError::TaskFailed(err)),
            Err(panic) => Err(SchedulerError::TaskPanicked(panic_message(panic))),
        };

        match &outcome {
            Ok(()) => {
                metrics::record_completed();
                debug!(key = %key, seq, label, "task completed");
            }
            Err(SchedulerError::TaskFailed(err)) => {
                metrics::record_failed();
                warn!(key = %key, seq, label, error = %err, "task failed");
            }
            Err(SchedulerError::TaskPanicked(msg)) => {
                metrics::record_panicked();
                error!(key = %key, seq, label, panic = %msg, "task panicked");
            }
        }

        self.complete(&key, seq);
    }

    fn complete(self: &Arc<Self>, key: &EntityKey, seq: u64) {
        let admitted = match self.lanes.get(key) {
            Some(lane) => {
                let mut lane = lane.lock();
                lane.complete(seq);
                lane.admit()
            }
            None => Vec::new(),
        };
        self.lanes.remove_if(key, |_, lane| lane.lock().is_idle());
        if self.lanes.is_empty() {
            self.idle.notify_waiters();
        }
        self.spawn_all(key, admitted);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
