//! End-to-end scheduler scenarios: dependency ordering, cycle rejection,
//! retry budgets, cascading skip, the concurrency cap, and resume.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use weft_bus::EventBus;
use weft_core::{EventKind, Result, Task, TaskStatus, WeftError};
use weft_scheduler::{SchedulerConfig, TaskExecutor, TaskScheduler};

/// Executor that records entry order and echoes `result-<id>`
#[derive(Default)]
struct RecordingExecutor {
    entries: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    async fn execute(&self, task: &Task, _deps: &HashMap<String, String>) -> Result<String> {
        self.entries.lock().unwrap().push(task.id.clone());
        Ok(format!("result-{}", task.id))
    }
}

fn task(id: &str, deps: &[&str]) -> Task {
    Task::new(id, format!("src/{}.ts", id))
        .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
}

fn index_of(entries: &[String], id: &str) -> usize {
    entries.iter().position(|e| e == id).unwrap()
}

// Diamond DAG respects edge ordering and surfaces results
#[tokio::test]
async fn diamond_dag_orders_and_collects_results() {
    let executor = Arc::new(RecordingExecutor::default());
    let scheduler = TaskScheduler::new(
        executor.clone(),
        Arc::new(EventBus::new()),
        SchedulerConfig::default().with_max_concurrency(2),
    );

    scheduler.load_plan(vec![
        task("a", &[]),
        task("b", &["a"]),
        task("c", &["a"]),
        task("d", &["b", "c"]),
    ]);
    scheduler.run().await.unwrap();

    let entries = executor.entries();
    assert_eq!(entries.len(), 4);
    assert!(index_of(&entries, "a") < index_of(&entries, "b"));
    assert!(index_of(&entries, "a") < index_of(&entries, "c"));
    assert!(index_of(&entries, "d") > index_of(&entries, "b"));
    assert!(index_of(&entries, "d") > index_of(&entries, "c"));

    assert_eq!(scheduler.task_result("d").as_deref(), Some("result-d"));
    assert_eq!(scheduler.status().summary.completed, 4);
}

/// Executor that must never run
struct ForbiddenExecutor {
    called: AtomicBool,
}

#[async_trait]
impl TaskExecutor for ForbiddenExecutor {
    async fn execute(&self, _task: &Task, _deps: &HashMap<String, String>) -> Result<String> {
        self.called.store(true, Ordering::SeqCst);
        Ok(String::new())
    }
}

// A cycle fails the run before any executor is invoked
#[tokio::test]
async fn cycle_is_rejected_before_execution() {
    let executor = Arc::new(ForbiddenExecutor {
        called: AtomicBool::new(false),
    });
    let scheduler = TaskScheduler::new(
        executor.clone(),
        Arc::new(EventBus::new()),
        SchedulerConfig::default(),
    );

    scheduler.load_plan(vec![task("x", &["y"]), task("y", &["x"])]);
    let err = scheduler.run().await.unwrap_err();

    assert!(err.to_string().contains("Circular dependency"));
    assert!(!executor.called.load(Ordering::SeqCst));
}

/// Executor failing a fixed number of leading attempts
struct FlakyExecutor {
    calls: AtomicU32,
    failures: u32,
}

#[async_trait]
impl TaskExecutor for FlakyExecutor {
    async fn execute(&self, _task: &Task, _deps: &HashMap<String, String>) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(WeftError::TaskExecutor(format!("flaky attempt {}", call)))
        } else {
            Ok("ok".to_string())
        }
    }
}

// Two failures then success, within a budget of three attempts
#[tokio::test]
async fn retry_then_succeed() {
    let executor = Arc::new(FlakyExecutor {
        calls: AtomicU32::new(0),
        failures: 2,
    });
    let bus = Arc::new(EventBus::new());
    let scheduler = TaskScheduler::new(
        executor.clone(),
        bus.clone(),
        SchedulerConfig::default()
            .with_default_max_attempts(3)
            .with_retry_delay(Duration::from_millis(10)),
    );

    scheduler.load_plan(vec![task("only", &[])]);
    scheduler.run().await.unwrap();

    assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    assert_eq!(scheduler.task_result("only").as_deref(), Some("ok"));

    let retries = bus.history(Some(EventKind::TaskRetry));
    assert_eq!(retries.len(), 2);
    assert_eq!(retries[0].data_i64("attempt"), Some(1));
    assert_eq!(retries[1].data_i64("attempt"), Some(2));
}

/// Executor where one task id always fails
struct FailOneExecutor {
    failing_id: String,
}

#[async_trait]
impl TaskExecutor for FailOneExecutor {
    async fn execute(&self, task: &Task, _deps: &HashMap<String, String>) -> Result<String> {
        if task.id == self.failing_id {
            Err(WeftError::TaskExecutor("broken".to_string()))
        } else {
            Ok(format!("result-{}", task.id))
        }
    }
}

// A failed parent skips its whole descendant chain
#[tokio::test]
async fn cascading_skip_on_failure() {
    let scheduler = TaskScheduler::new(
        Arc::new(FailOneExecutor {
            failing_id: "p".to_string(),
        }),
        Arc::new(EventBus::new()),
        SchedulerConfig::default()
            .with_default_max_attempts(1)
            .with_retry_delay(Duration::from_millis(5)),
    );

    scheduler.load_plan(vec![task("p", &[]), task("c", &["p"]), task("g", &["c"])]);
    let err = scheduler.run().await.unwrap_err();
    assert!(err.to_string().contains("task(s) failed"));

    let status = scheduler.status();
    assert_eq!(status.summary.failed, 1);
    assert_eq!(status.summary.skipped, 2);
    assert_eq!(status.summary.completed, 0);

    let c = status.tasks.iter().find(|t| t.id == "c").unwrap();
    assert_eq!(c.status, TaskStatus::Skipped);
    assert!(c
        .error
        .as_deref()
        .unwrap()
        .contains("Skipped due to failed dependency: p"));

    let g = status.tasks.iter().find(|t| t.id == "g").unwrap();
    assert_eq!(g.status, TaskStatus::Skipped);
}

/// Executor tracking how many run at once
struct GaugeExecutor {
    current: AtomicI32,
    max_seen: AtomicI32,
}

#[async_trait]
impl TaskExecutor for GaugeExecutor {
    async fn execute(&self, task: &Task, _deps: &HashMap<String, String>) -> Result<String> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("result-{}", task.id))
    }
}

// Five independent tasks never exceed the concurrency cap
#[tokio::test]
async fn concurrency_cap_is_honored() {
    let executor = Arc::new(GaugeExecutor {
        current: AtomicI32::new(0),
        max_seen: AtomicI32::new(0),
    });
    let scheduler = TaskScheduler::new(
        executor.clone(),
        Arc::new(EventBus::new()),
        SchedulerConfig::default().with_max_concurrency(2),
    );

    scheduler.load_plan((0..5).map(|i| task(&format!("t{}", i), &[])).collect());
    scheduler.run().await.unwrap();

    assert!(executor.max_seen.load(Ordering::SeqCst) <= 2);
    assert_eq!(scheduler.status().summary.completed, 5);
}

/// Executor recording the dependency context each task receives
#[derive(Default)]
struct DepsExecutor {
    seen: Mutex<Vec<(String, HashMap<String, String>)>>,
}

#[async_trait]
impl TaskExecutor for DepsExecutor {
    async fn execute(&self, task: &Task, deps: &HashMap<String, String>) -> Result<String> {
        self.seen
            .lock()
            .unwrap()
            .push((task.id.clone(), deps.clone()));
        Ok(format!("result-{}", task.id))
    }
}

// Resume skips completed work and feeds its results to dependents
#[tokio::test]
async fn resume_skips_completed_and_passes_results() {
    let executor = Arc::new(DepsExecutor::default());
    let scheduler = TaskScheduler::new(
        executor.clone(),
        Arc::new(EventBus::new()),
        SchedulerConfig::default(),
    );

    scheduler.load_plan(vec![task("a", &[]), task("b", &["a"])]);

    let mut results = HashMap::new();
    results.insert("a".to_string(), "A".to_string());
    scheduler.resume_from(&["a".to_string()], &results);

    scheduler.run().await.unwrap();

    let seen = executor.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1, "only b's executor runs");
    assert_eq!(seen[0].0, "b");
    assert_eq!(seen[0].1.get("a").map(String::as_str), Some("A"));

    assert_eq!(scheduler.task_result("a").as_deref(), Some("A"));
    assert_eq!(scheduler.task_result("b").as_deref(), Some("result-b"));
}

/// Executor that never finishes in time
struct SlowExecutor;

#[async_trait]
impl TaskExecutor for SlowExecutor {
    async fn execute(&self, _task: &Task, _deps: &HashMap<String, String>) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(String::new())
    }
}

#[tokio::test]
async fn timeout_fails_the_task() {
    let scheduler = TaskScheduler::new(
        Arc::new(SlowExecutor),
        Arc::new(EventBus::new()),
        SchedulerConfig::default()
            .with_default_max_attempts(1)
            .with_task_timeout(Duration::from_millis(50)),
    );

    scheduler.load_plan(vec![task("slow", &[])]);
    let err = scheduler.run().await.unwrap_err();
    assert!(err.to_string().contains("task(s) failed"));

    let status = scheduler.status();
    let slow = status.tasks.iter().find(|t| t.id == "slow").unwrap();
    assert_eq!(slow.status, TaskStatus::Failed);
    assert!(slow.error.as_deref().unwrap().contains("timed out after 50ms"));
}

#[tokio::test]
async fn attempts_never_exceed_budget() {
    let executor = Arc::new(FlakyExecutor {
        calls: AtomicU32::new(0),
        failures: u32::MAX,
    });
    let scheduler = TaskScheduler::new(
        executor.clone(),
        Arc::new(EventBus::new()),
        SchedulerConfig::default()
            .with_default_max_attempts(3)
            .with_retry_delay(Duration::from_millis(5)),
    );

    scheduler.load_plan(vec![task("doomed", &[])]);
    scheduler.run().await.unwrap_err();

    assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    let status = scheduler.status();
    assert_eq!(status.tasks[0].attempts, 3);
}

#[tokio::test]
async fn priority_orders_independent_tasks() {
    let executor = Arc::new(RecordingExecutor::default());
    let scheduler = TaskScheduler::new(
        executor.clone(),
        Arc::new(EventBus::new()),
        SchedulerConfig::default().with_max_concurrency(1),
    );

    scheduler.load_plan(vec![
        Task::new("plain", "p.ts"),
        Task::new("urgent", "u.ts").with_priority(5),
        Task::new("later", "l.ts").with_priority(-5),
    ]);
    scheduler.run().await.unwrap();

    let entries = executor.entries();
    assert_eq!(entries, vec!["urgent", "plain", "later"]);
}

#[tokio::test]
async fn engine_events_are_published() {
    let bus = Arc::new(EventBus::new());
    let scheduler = TaskScheduler::new(
        Arc::new(RecordingExecutor::default()),
        bus.clone(),
        SchedulerConfig::default(),
    );

    scheduler.load_plan(vec![task("a", &[])]);
    scheduler.run().await.unwrap();

    let starts = bus.history(Some(EventKind::EngineStart));
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].data_i64("taskCount"), Some(1));

    let completes = bus.history(Some(EventKind::EngineComplete));
    assert_eq!(completes.len(), 1);
    assert_eq!(completes[0].data_i64("completed"), Some(1));

    let task_starts = bus.history(Some(EventKind::TaskStart));
    assert_eq!(task_starts.len(), 1);
    assert_eq!(task_starts[0].data_str("taskId"), Some("a"));
    assert_eq!(task_starts[0].data_i64("attempt"), Some(1));

    assert_eq!(bus.history(Some(EventKind::TaskComplete)).len(), 1);
}
