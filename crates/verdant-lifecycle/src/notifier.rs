//! Progress notification for long-running lifecycle operations.
//!
//! Every lifecycle transition takes a `Notifier`. Synchronous callers pass
//! the no-op sink; async callers get a tracker-backed sink keyed by task id
//! and poll the tracker for phase progress, the terminal result, or the
//! terminal error.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

/// A sink for operation progress.
pub trait Notifier: Send + Sync {
    /// A named phase began.
    fn start(&self, phase: &str);

    /// The current phase finished.
    fn completed(&self);

    /// Free-form progress detail (e.g. schema publication counters).
    fn info(&self, message: &str);

    /// Terminal success payload.
    fn result(&self, value: serde_json::Value);

    /// Terminal failure.
    fn error(&self, message: &str);
}

/// No-op sink for synchronous callers; phases surface only in the log.
pub struct EmptyNotifier;

impl Notifier for EmptyNotifier {
    fn start(&self, phase: &str) {
        debug!(phase = %phase, "lifecycle phase started");
    }

    fn completed(&self) {}

    fn info(&self, message: &str) {
        debug!(detail = %message, "lifecycle progress");
    }

    fn result(&self, _value: serde_json::Value) {}

    fn error(&self, message: &str) {
        debug!(error = %message, "lifecycle operation failed");
    }
}

/// One phase of a tracked task.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PhaseState {
    pub name: String,
    pub completed: bool,
}

/// Observable state of one async lifecycle task.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaskStatus {
    pub phases: Vec<PhaseState>,
    pub info: Vec<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub finished: bool,
}

/// Registry of async lifecycle tasks, keyed by task id.
#[derive(Default)]
pub struct TaskTracker {
    tasks: RwLock<HashMap<Uuid, TaskStatus>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task and return its id plus the notifier feeding it.
    pub fn begin(self: &Arc<Self>) -> (Uuid, TrackerNotifier) {
        let task_id = Uuid::new_v4();
        self.tasks.write().insert(task_id, TaskStatus::default());
        (
            task_id,
            TrackerNotifier {
                task_id,
                tracker: Arc::clone(self),
            },
        )
    }

    pub fn status(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.tasks.read().get(&task_id).cloned()
    }

    fn update(&self, task_id: Uuid, apply: impl FnOnce(&mut TaskStatus)) {
        if let Some(status) = self.tasks.write().get_mut(&task_id) {
            apply(status);
        }
    }
}

/// Tracker-backed notifier handed to spawned lifecycle tasks.
pub struct TrackerNotifier {
    task_id: Uuid,
    tracker: Arc<TaskTracker>,
}

impl Notifier for TrackerNotifier {
    fn start(&self, phase: &str) {
        let phase = phase.to_string();
        self.tracker.update(self.task_id, |status| {
            status.phases.push(PhaseState {
                name: phase,
                completed: false,
            });
        });
    }

    fn completed(&self) {
        self.tracker.update(self.task_id, |status| {
            if let Some(phase) = status.phases.last_mut() {
                phase.completed = true;
            }
        });
    }

    fn info(&self, message: &str) {
        let message = message.to_string();
        self.tracker
            .update(self.task_id, |status| status.info.push(message));
    }

    fn result(&self, value: serde_json::Value) {
        self.tracker.update(self.task_id, |status| {
            status.result = Some(value);
            status.finished = true;
        });
    }

    fn error(&self, message: &str) {
        let message = message.to_string();
        self.tracker.update(self.task_id, |status| {
            status.error = Some(message);
            status.finished = true;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tracker_records_phases_in_order() {
        let tracker = Arc::new(TaskTracker::new());
        let (task_id, notifier) = tracker.begin();

        notifier.start("Resolve ledger account");
        notifier.completed();
        notifier.start("Create topic");
        notifier.info("system schemas published: 4");
        notifier.completed();
        notifier.result(json!({ "policyId": "p-1" }));

        let status = tracker.status(task_id).unwrap();
        assert_eq!(status.phases.len(), 2);
        assert!(status.phases.iter().all(|p| p.completed));
        assert_eq!(status.info, vec!["system schemas published: 4"]);
        assert!(status.finished);
        assert!(status.error.is_none());
    }

    #[test]
    fn terminal_error_finishes_the_task() {
        let tracker = Arc::new(TaskTracker::new());
        let (task_id, notifier) = tracker.begin();

        notifier.start("Publish policy");
        notifier.error("ledger transport failure: send refused");

        let status = tracker.status(task_id).unwrap();
        assert!(status.finished);
        assert_eq!(
            status.error.as_deref(),
            Some("ledger transport failure: send refused")
        );
    }

    #[test]
    fn unknown_task_has_no_status() {
        let tracker = Arc::new(TaskTracker::new());
        assert!(tracker.status(Uuid::new_v4()).is_none());
    }
}
