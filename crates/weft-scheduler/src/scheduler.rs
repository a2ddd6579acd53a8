//! DAG task scheduler
//!
//! Executes a dependency graph with bounded concurrency, per-task retries
//! and timeouts, cascading skip on failure, and priority tie-breaking.
//! The scheduler owns every task field; callers read snapshots through
//! [`TaskScheduler::status`] and [`TaskScheduler::task_result`].
//!
//! Concurrency model: one FIFO-fair semaphore caps simultaneous
//! executions. A retry releases its permit, sleeps, and re-acquires, so a
//! retry never bypasses the cap. Completion is signaled on a condition
//! (`Notify`) by every terminal transition; `run` returns exactly when no
//! task is in a non-terminal state.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::graph::DependencyGraph;
use weft_bus::EventBus;
use weft_core::{EngineEvent, EventKind, Result, Task, TaskStatus, WeftError};

/// Scheduler options
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum tasks executing at once
    pub max_concurrency: usize,
    /// Attempt budget applied to tasks that do not declare their own
    pub default_max_attempts: u32,
    /// Per-attempt execution timeout
    pub task_timeout: Duration,
    /// Sleep between a failed attempt and its retry
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            default_max_attempts: 3,
            task_timeout: Duration::from_millis(300_000),
            retry_delay: Duration::from_millis(1_000),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_default_max_attempts(mut self, attempts: u32) -> Self {
        self.default_max_attempts = attempts;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Executes one task attempt
///
/// `deps` maps each dependency id to the parent's completed result; every
/// parent has returned successfully before a child executor starts.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, deps: &HashMap<String, String>) -> Result<String>;
}

/// Status counts snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub pending: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Snapshot of the scheduler's view of the plan
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub tasks: Vec<Task>,
    pub summary: StatusSummary,
}

enum Verdict {
    Done,
    Retry,
    Failed,
}

struct SchedulerState {
    tasks: HashMap<String, Task>,
    graph: DependencyGraph,
    /// Failed and skipped ids, in the order recorded
    failed: Vec<String>,
}

struct SchedulerCore {
    executor: Arc<dyn TaskExecutor>,
    bus: Arc<EventBus>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    semaphore: Arc<Semaphore>,
    /// Notified on every terminal transition
    drained: Notify,
}

/// Bounded-concurrency scheduler over a task DAG
pub struct TaskScheduler {
    core: Arc<SchedulerCore>,
}

impl TaskScheduler {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        bus: Arc<EventBus>,
        config: SchedulerConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            core: Arc::new(SchedulerCore {
                executor,
                bus,
                config,
                state: Mutex::new(SchedulerState {
                    tasks: HashMap::new(),
                    graph: DependencyGraph::new(),
                    failed: Vec::new(),
                }),
                semaphore,
                drained: Notify::new(),
            }),
        }
    }

    /// Load a plan, resetting any previous state
    ///
    /// Every task starts PENDING with zero attempts. A dependency naming
    /// an id absent from the plan is logged and dropped: the dependent is
    /// not blocked by a parent that does not exist.
    pub fn load_plan(&self, tasks: Vec<Task>) {
        let mut state = self.core.state.lock().expect("scheduler lock poisoned");
        state.tasks.clear();
        state.graph = DependencyGraph::new();
        state.failed.clear();

        for mut task in tasks {
            task.status = TaskStatus::Pending;
            task.attempts = 0;
            if task.max_attempts == 0 {
                task.max_attempts = self.core.config.default_max_attempts;
            }
            state.graph.insert_node(&task.id);
            state.tasks.insert(task.id.clone(), task);
        }

        let ids: Vec<String> = state.graph.order().to_vec();
        for id in &ids {
            let deps = state
                .tasks
                .get(id)
                .map(|t| t.dependencies.clone())
                .unwrap_or_default();
            for dep in deps {
                if state.graph.contains(&dep) {
                    state.graph.add_edge(&dep, id);
                } else {
                    warn!(
                        "Task {} depends on unknown task {}; dropping the edge",
                        id, dep
                    );
                }
            }
        }
    }

    /// Mark previously completed tasks and release their children
    ///
    /// Call before [`TaskScheduler::run`]; children whose parents are all
    /// satisfied become ready.
    pub fn resume_from(&self, completed: &[String], results: &HashMap<String, String>) {
        let mut state = self.core.state.lock().expect("scheduler lock poisoned");
        for id in completed {
            if let Some(task) = state.tasks.get_mut(id) {
                task.status = TaskStatus::Completed;
                if let Some(result) = results.get(id) {
                    task.result = Some(result.clone());
                }
                if task.completed_at.is_none() {
                    task.completed_at = Some(Utc::now());
                }
            } else {
                warn!("Resume names unknown task {}; ignoring", id);
                continue;
            }
            let children = state.graph.children(id).to_vec();
            for child in children {
                state.graph.decrement(&child);
            }
        }
    }

    /// Execute the loaded plan to completion
    ///
    /// Returns when every task is terminal; errors if the graph has a
    /// cycle, nothing is ready, or any task finished FAILED/SKIPPED.
    pub async fn run(&self) -> Result<()> {
        let core = &self.core;

        let (task_count, ready) = {
            let state = core.state.lock().expect("scheduler lock poisoned");
            if let Some(cycle) = state.graph.find_cycle() {
                return Err(WeftError::CyclicDependency(cycle.join(" -> ")));
            }
            (state.tasks.len(), core.ready_tasks(&state))
        };

        core.bus
            .publish(
                EngineEvent::new(EventKind::EngineStart).with("taskCount", task_count as i64),
            )
            .await;
        info!("Scheduler starting with {} task(s)", task_count);

        if task_count == 0 {
            core.bus
                .publish(
                    EngineEvent::new(EventKind::EngineComplete)
                        .with("completed", 0)
                        .with("failed", 0),
                )
                .await;
            return Ok(());
        }

        if ready.is_empty() {
            return Err(WeftError::NoReadyTask);
        }

        for id in ready {
            SchedulerCore::spawn(core, id);
        }

        loop {
            let notified = core.drained.notified();
            if core.is_drained() {
                break;
            }
            notified.await;
        }

        let (failed, completed) = {
            let state = core.state.lock().expect("scheduler lock poisoned");
            (
                state.failed.clone(),
                state
                    .tasks
                    .values()
                    .filter(|t| t.status == TaskStatus::Completed)
                    .count(),
            )
        };

        if !failed.is_empty() {
            return Err(WeftError::tasks_failed(&failed));
        }

        core.bus
            .publish(
                EngineEvent::new(EventKind::EngineComplete)
                    .with("completed", completed as i64)
                    .with("failed", 0),
            )
            .await;
        info!("Scheduler complete: {} task(s)", completed);
        Ok(())
    }

    /// Completed result for one task
    pub fn task_result(&self, id: &str) -> Option<String> {
        let state = self.core.state.lock().expect("scheduler lock poisoned");
        state.tasks.get(id).and_then(|t| t.result.clone())
    }

    /// All completed results keyed by task id
    pub fn all_results(&self) -> HashMap<String, String> {
        let state = self.core.state.lock().expect("scheduler lock poisoned");
        state
            .tasks
            .values()
            .filter_map(|t| t.result.clone().map(|r| (t.id.clone(), r)))
            .collect()
    }

    /// Snapshot of every task plus status counts
    pub fn status(&self) -> SchedulerStatus {
        let state = self.core.state.lock().expect("scheduler lock poisoned");
        let mut summary = StatusSummary::default();
        let mut tasks: Vec<Task> = Vec::with_capacity(state.tasks.len());

        for id in state.graph.order() {
            if let Some(task) = state.tasks.get(id) {
                match task.status {
                    TaskStatus::Pending => summary.pending += 1,
                    TaskStatus::Queued => summary.queued += 1,
                    TaskStatus::Running => summary.running += 1,
                    TaskStatus::Completed => summary.completed += 1,
                    TaskStatus::Failed => summary.failed += 1,
                    TaskStatus::Skipped => summary.skipped += 1,
                }
                tasks.push(task.clone());
            }
        }

        SchedulerStatus { tasks, summary }
    }
}

impl SchedulerCore {
    /// PENDING tasks with indegree 0, highest priority first; insertion
    /// order breaks ties (stable sort)
    fn ready_tasks(&self, state: &SchedulerState) -> Vec<String> {
        let mut ready: Vec<(i32, String)> = Vec::new();
        for id in state.graph.order() {
            if state.graph.indegree(id) != 0 {
                continue;
            }
            if let Some(task) = state.tasks.get(id) {
                if task.status == TaskStatus::Pending {
                    ready.push((task.priority, id.clone()));
                }
            }
        }
        ready.sort_by_key(|(priority, _)| std::cmp::Reverse(*priority));
        ready.into_iter().map(|(_, id)| id).collect()
    }

    /// Launch a task's scheduling loop; fire-and-forget so siblings run
    /// in parallel
    fn spawn(core: &Arc<SchedulerCore>, id: String) {
        let core = Arc::clone(core);
        tokio::spawn(async move {
            SchedulerCore::run_task(core, id).await;
        });
    }

    async fn run_task(core: Arc<SchedulerCore>, id: String) {
        loop {
            if !core.mark_queued(&id) {
                break;
            }
            let permit = match Arc::clone(&core.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let verdict = SchedulerCore::execute_task(&core, &id).await;
            // Permit released before any retry sleep: the slot frees for
            // other work and the retry re-acquires below
            drop(permit);

            match verdict {
                Verdict::Retry => {
                    tokio::time::sleep(core.config.retry_delay).await;
                    continue;
                }
                Verdict::Done | Verdict::Failed => break,
            }
        }
        core.drained.notify_waiters();
    }

    async fn execute_task(core: &Arc<SchedulerCore>, id: &str) -> Verdict {
        let (task, deps, attempt) = {
            let mut state = core.state.lock().expect("scheduler lock poisoned");
            let snapshot = match state.tasks.get_mut(id) {
                Some(task) if !task.status.is_terminal() => {
                    task.status = TaskStatus::Running;
                    task.started_at = Some(Utc::now());
                    task.attempts += 1;
                    task.clone()
                }
                _ => return Verdict::Done,
            };
            let deps: HashMap<String, String> = snapshot
                .dependencies
                .iter()
                .filter_map(|dep| {
                    state
                        .tasks
                        .get(dep)
                        .and_then(|p| p.result.clone())
                        .map(|r| (dep.clone(), r))
                })
                .collect();
            let attempt = snapshot.attempts;
            (snapshot, deps, attempt)
        };

        core.bus
            .publish(
                EngineEvent::new(EventKind::TaskStart)
                    .with("taskId", id)
                    .with("filePath", task.file_path.clone())
                    .with("attempt", attempt as i64),
            )
            .await;
        debug!("Task {} attempt {} starting", id, attempt);

        let outcome =
            tokio::time::timeout(core.config.task_timeout, core.executor.execute(&task, &deps))
                .await;
        let result: std::result::Result<String, String> = match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(WeftError::TaskTimeout {
                id: id.to_string(),
                millis: core.config.task_timeout.as_millis(),
            }
            .to_string()),
        };

        match result {
            Ok(output) => {
                let duration_ms = {
                    let mut state = core.state.lock().expect("scheduler lock poisoned");
                    if let Some(task) = state.tasks.get_mut(id) {
                        task.status = TaskStatus::Completed;
                        task.result = Some(output);
                        task.completed_at = Some(Utc::now());
                        task.error = None;
                        task.started_at
                            .map(|s| (Utc::now() - s).num_milliseconds())
                            .unwrap_or(0)
                    } else {
                        0
                    }
                };

                core.bus
                    .publish(
                        EngineEvent::new(EventKind::TaskComplete)
                            .with("taskId", id)
                            .with("duration", duration_ms),
                    )
                    .await;
                info!("Task {} completed in {}ms", id, duration_ms);

                SchedulerCore::on_task_completed(core, id);
                Verdict::Done
            }
            Err(error) => {
                let (attempts, max_attempts) = {
                    let state = core.state.lock().expect("scheduler lock poisoned");
                    state
                        .tasks
                        .get(id)
                        .map(|t| (t.attempts, t.max_attempts))
                        .unwrap_or((0, 0))
                };

                if attempts < max_attempts {
                    warn!(
                        "Task {} attempt {}/{} failed: {}",
                        id, attempts, max_attempts, error
                    );
                    {
                        let mut state = core.state.lock().expect("scheduler lock poisoned");
                        if let Some(task) = state.tasks.get_mut(id) {
                            task.status = TaskStatus::Pending;
                            task.error = Some(error.clone());
                        }
                    }
                    core.bus
                        .publish(
                            EngineEvent::new(EventKind::TaskRetry)
                                .with("taskId", id)
                                .with("attempt", attempts as i64)
                                .with("error", error),
                        )
                        .await;
                    Verdict::Retry
                } else {
                    warn!("Task {} failed after {} attempt(s): {}", id, attempts, error);
                    {
                        let mut state = core.state.lock().expect("scheduler lock poisoned");
                        if let Some(task) = state.tasks.get_mut(id) {
                            task.status = TaskStatus::Failed;
                            task.error = Some(error.clone());
                            task.completed_at = Some(Utc::now());
                        }
                        state.failed.push(id.to_string());
                    }
                    core.bus
                        .publish(
                            EngineEvent::new(EventKind::TaskFailed)
                                .with("taskId", id)
                                .with("error", error)
                                .with("attempts", attempts as i64),
                        )
                        .await;
                    core.skip_dependents(id);
                    Verdict::Failed
                }
            }
        }
    }

    /// Release children whose last dependency just finished
    fn on_task_completed(core: &Arc<SchedulerCore>, parent_id: &str) {
        let to_spawn: Vec<String> = {
            let mut state = core.state.lock().expect("scheduler lock poisoned");
            let children = state.graph.children(parent_id).to_vec();
            children
                .into_iter()
                .filter(|child| {
                    let released = state.graph.decrement(child) == 0;
                    released
                        && state
                            .tasks
                            .get(child)
                            .map(|t| t.status == TaskStatus::Pending)
                            .unwrap_or(false)
                })
                .collect()
        };

        for child in to_spawn {
            debug!("Releasing task {} (all dependencies satisfied)", child);
            SchedulerCore::spawn(core, child);
        }
    }

    /// BFS over dependents: every transitive descendant of a failed task
    /// is terminal-skipped and surfaces as a failure of the run
    fn skip_dependents(&self, failed_id: &str) {
        let mut state = self.state.lock().expect("scheduler lock poisoned");
        let mut queue: VecDeque<String> = state.graph.children(failed_id).to_vec().into();
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(child) = queue.pop_front() {
            if !visited.insert(child.clone()) {
                continue;
            }
            if let Some(task) = state.tasks.get_mut(&child) {
                if !task.status.is_terminal() {
                    task.status = TaskStatus::Skipped;
                    task.error = Some(format!("Skipped due to failed dependency: {}", failed_id));
                    task.completed_at = Some(Utc::now());
                    state.failed.push(child.clone());
                    warn!("Task {} skipped (failed ancestor {})", child, failed_id);
                }
            }
            queue.extend(state.graph.children(&child).iter().cloned());
        }
    }

    fn mark_queued(&self, id: &str) -> bool {
        let mut state = self.state.lock().expect("scheduler lock poisoned");
        match state.tasks.get_mut(id) {
            Some(task) if !task.status.is_terminal() => {
                task.status = TaskStatus::Queued;
                true
            }
            _ => false,
        }
    }

    fn is_drained(&self) -> bool {
        let state = self.state.lock().expect("scheduler lock poisoned");
        state.tasks.values().all(|t| t.status.is_terminal())
    }
}
