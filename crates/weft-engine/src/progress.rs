//! Bus-fed progress counters
//!
//! The tracker subscribes to engine events and exposes a read-only
//! snapshot; it never influences execution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use weft_bus::EventBus;
use weft_core::EventKind;

/// Read-only run progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub phase: String,
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub retries: usize,
    pub checkpoints: usize,
}

/// Counts engine events into a snapshot
#[derive(Default)]
pub struct ProgressTracker {
    phase: Mutex<String>,
    total_tasks: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    retries: AtomicUsize,
    checkpoints: AtomicUsize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this tracker to a bus
    pub fn attach(self: Arc<Self>, bus: &EventBus) {
        let tracker = Arc::clone(&self);
        bus.on(EventKind::EngineStart, move |event| {
            let tracker = Arc::clone(&tracker);
            async move {
                if let Some(count) = event.data_i64("taskCount") {
                    tracker.total_tasks.store(count as usize, Ordering::SeqCst);
                }
                Ok(())
            }
        });

        let tracker = Arc::clone(&self);
        bus.on(EventKind::PhaseStart, move |event| {
            let tracker = Arc::clone(&tracker);
            async move {
                if let Some(phase) = event.data_str("phase") {
                    *tracker.phase.lock().expect("progress lock poisoned") = phase.to_string();
                }
                Ok(())
            }
        });

        let tracker = Arc::clone(&self);
        bus.on(EventKind::TaskComplete, move |_| {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let tracker = Arc::clone(&self);
        bus.on(EventKind::TaskFailed, move |_| {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.failed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let tracker = Arc::clone(&self);
        bus.on(EventKind::TaskRetry, move |_| {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.retries.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let tracker = Arc::clone(&self);
        bus.on(EventKind::CheckpointSaved, move |_| {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.checkpoints.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: self.phase.lock().expect("progress lock poisoned").clone(),
            total_tasks: self.total_tasks.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
            checkpoints: self.checkpoints.load(Ordering::SeqCst),
        }
    }
}
