//! Phase orchestrator
//!
//! Drives planning -> executing -> documenting -> completed, with an
//! absorbing failed state. Every phase change and every task transition
//! is checkpointed, so a crashed run resumes from the last committed
//! snapshot and skips completed work.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::context::{gather_context, ContextLimits, NO_CODEBASE};
use crate::progress::ProgressTracker;
use crate::prompt::{architect_user, scribe_user, strip_code_fences, ARCHITECT_SYSTEM, SCRIBE_SYSTEM};
use crate::verify::{VerifyConfig, VerifyingExecutor};
use weft_bus::EventBus;
use weft_core::{
    EngineEvent, EventKind, ExecutionPhase, ExecutionState, Plan, Result, TaskStatus, WeftConfig,
    WeftError,
};
use weft_env::{GenerateRequest, ModelProvider, RunnerKind, Shell, Workspace};
use weft_scheduler::{SchedulerConfig, TaskScheduler};
use weft_store::{is_complete, plan_id, StateStore};

const COST_PER_1K_TOKENS: f64 = 0.01;
const PLANNING_OVERHEAD_TOKENS: u64 = 2_000;
const TOKENS_PER_TASK: u64 = 6_000;

/// Engine options; CLI flags override file-loaded values
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub verify_retries: u32,
    pub task_timeout: Duration,
    pub retry_delay: Duration,
    pub state_dir: PathBuf,
    pub context: ContextLimits,
    pub source_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&WeftConfig::default())
    }
}

impl EngineConfig {
    /// Derive engine options from repo-level configuration
    pub fn from_config(config: &WeftConfig) -> Self {
        Self {
            max_concurrency: config.scheduler.max_concurrency,
            max_attempts: config.scheduler.max_attempts,
            verify_retries: config.verification.max_retries,
            task_timeout: Duration::from_millis(config.scheduler.task_timeout_ms),
            retry_delay: Duration::from_millis(config.scheduler.retry_delay_ms),
            state_dir: PathBuf::from(&config.state_dir),
            context: ContextLimits::default(),
            source_extensions: config.verification.source_extensions.clone(),
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }
}

/// Library entry context
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub goal: String,
    pub repo_path: Option<String>,
    pub resume: bool,
}

/// Library entry outcome
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub success: bool,
    pub output: Option<String>,
    pub artifacts: Vec<String>,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Up-front token and cost heuristic
#[derive(Debug, Clone, Copy)]
pub struct CostEstimate {
    pub tokens: u64,
    pub cost: f64,
}

/// LLM-driven build orchestrator
pub struct Engine {
    workspace: Arc<dyn Workspace>,
    shell: Arc<dyn Shell>,
    model: Arc<dyn ModelProvider>,
    store: StateStore,
    bus: Arc<EventBus>,
    progress: Arc<ProgressTracker>,
    runner_kind: RunnerKind,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        shell: Arc<dyn Shell>,
        model: Arc<dyn ModelProvider>,
        runner_kind: RunnerKind,
        config: EngineConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let progress = Arc::new(ProgressTracker::new());
        Arc::clone(&progress).attach(&bus);
        let store = StateStore::new(config.state_dir.clone());

        Self {
            workspace,
            shell,
            model,
            store,
            bus,
            progress,
            runner_kind,
            config,
        }
    }

    /// Read-only event bus access
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Read-only progress access
    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Run a goal end to end
    ///
    /// With `resume`, a non-complete checkpoint for the same goal is
    /// continued instead of starting over; completed tasks are skipped
    /// and their results feed dependents.
    pub async fn run(
        &self,
        goal: &str,
        repo_path: Option<&str>,
        resume: bool,
    ) -> Result<ExecutionState> {
        if resume {
            if let Some(state) = self.store.find_latest_for_goal(goal).await? {
                if !is_complete(&state) {
                    info!("Resuming {} from phase {}", state.plan_id, state.phase);
                    self.bus
                        .publish(
                            EngineEvent::new(EventKind::CheckpointRestored)
                                .with("planId", state.plan_id.clone()),
                        )
                        .await;
                    return self.drive_checked(state, repo_path, true).await;
                }
            }
        }

        let mut state = ExecutionState::new(plan_id(goal), goal);
        info!("Starting run {} for goal: {}", state.plan_id, goal);
        self.checkpoint(&mut state).await?;
        self.drive_checked(state, repo_path, false).await
    }

    /// Library surface: validate, run, and map to an outcome
    pub async fn execute(&self, ctx: &ExecutionContext) -> EngineOutcome {
        let problems = self.validate(ctx);
        if !problems.is_empty() {
            return EngineOutcome {
                success: false,
                output: None,
                artifacts: Vec::new(),
                error: Some(problems.join("; ")),
                metadata: None,
            };
        }

        match self.run(&ctx.goal, ctx.repo_path.as_deref(), ctx.resume).await {
            Ok(state) => {
                let artifacts: Vec<String> = state
                    .tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Completed)
                    .map(|t| t.file_path.clone())
                    .collect();
                EngineOutcome {
                    success: true,
                    output: Some(format!("{} task(s) completed", artifacts.len())),
                    artifacts,
                    error: None,
                    metadata: Some(serde_json::json!({
                        "planId": state.plan_id,
                        "phase": state.phase.to_string(),
                    })),
                }
            }
            Err(e) => EngineOutcome {
                success: false,
                output: None,
                artifacts: Vec::new(),
                error: Some(e.to_string()),
                metadata: None,
            },
        }
    }

    /// Pre-flight checks; empty means runnable
    pub fn validate(&self, ctx: &ExecutionContext) -> Vec<String> {
        let mut problems = Vec::new();
        let goal = ctx.goal.trim();
        if goal.is_empty() {
            problems.push("goal must not be empty".to_string());
        } else if goal.len() < 8 {
            problems.push("goal is too short to plan from".to_string());
        }
        if self.config.max_concurrency == 0 {
            problems.push("maxConcurrency must be at least 1".to_string());
        }
        if self.config.max_attempts == 0 {
            problems.push("maxAttempts must be at least 1".to_string());
        }
        if self.config.verify_retries == 0 {
            problems.push("verification retries must be at least 1".to_string());
        }
        problems
    }

    /// Rough token and cost estimate for a goal
    pub fn estimate_cost(&self, ctx: &ExecutionContext) -> CostEstimate {
        let goal_tokens = (ctx.goal.len() as u64) / 4;
        let estimated_tasks = ((ctx.goal.split_whitespace().count() as u64) / 3).clamp(3, 12);
        let tokens = PLANNING_OVERHEAD_TOKENS + goal_tokens + estimated_tasks * TOKENS_PER_TASK;
        CostEstimate {
            tokens,
            cost: (tokens as f64 / 1000.0) * COST_PER_1K_TOKENS,
        }
    }

    async fn drive_checked(
        &self,
        mut state: ExecutionState,
        repo_path: Option<&str>,
        resuming: bool,
    ) -> Result<ExecutionState> {
        match self.drive(&mut state, repo_path, resuming).await {
            Ok(()) => Ok(state),
            Err(e) => {
                state.phase = ExecutionPhase::Failed;
                if let Err(save_err) = self.checkpoint(&mut state).await {
                    warn!("Could not checkpoint failed state: {}", save_err);
                }
                self.bus
                    .publish(
                        EngineEvent::new(EventKind::EngineError).with("error", e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        state: &mut ExecutionState,
        repo_path: Option<&str>,
        resuming: bool,
    ) -> Result<()> {
        if state.phase == ExecutionPhase::Planning {
            self.phase_start(ExecutionPhase::Planning).await;
            let context = match repo_path {
                Some(dir) => gather_context(&self.workspace, dir, &self.config.context).await,
                None => NO_CODEBASE.to_string(),
            };
            let plan = self.plan(&state.goal, &context).await?;
            state.architecture_reasoning = plan.architecture_reasoning;
            state.tasks = plan.tasks;
            state.phase = ExecutionPhase::Executing;
            self.checkpoint(state).await?;
            self.phase_complete(ExecutionPhase::Planning).await;
        }

        if state.phase == ExecutionPhase::Executing {
            self.phase_start(ExecutionPhase::Executing).await;
            self.execute_tasks(state, resuming).await?;
            state.phase = ExecutionPhase::Documenting;
            self.checkpoint(state).await?;
            self.phase_complete(ExecutionPhase::Executing).await;
        }

        if state.phase == ExecutionPhase::Documenting {
            self.phase_start(ExecutionPhase::Documenting).await;
            self.document(state).await?;
            state.phase = ExecutionPhase::Completed;
            self.checkpoint(state).await?;
            self.phase_complete(ExecutionPhase::Documenting).await;
        }

        Ok(())
    }

    async fn plan(&self, goal: &str, context: &str) -> Result<Plan> {
        let request =
            GenerateRequest::new(ARCHITECT_SYSTEM, architect_user(goal, context)).json();

        self.bus
            .publish(EngineEvent::new(EventKind::LlmRequest).with("role", "architect"))
            .await;
        let raw = self.model.generate(&request).await?;
        self.bus
            .publish(
                EngineEvent::new(EventKind::LlmResponse)
                    .with("role", "architect")
                    .with("chars", raw.len() as i64),
            )
            .await;

        let cleaned = strip_code_fences(&raw);
        let plan: Plan = serde_json::from_str(&cleaned).map_err(|e| {
            WeftError::PlanInvalid(format!("{}; response prefix: {}", e, prefix(&cleaned, 200)))
        })?;

        if plan.tasks.is_empty() {
            return Err(WeftError::PlanInvalid("plan contains no tasks".to_string()));
        }

        // Distinct target files are the Architect's contract; two tasks
        // writing one path would race
        let mut seen = std::collections::HashSet::new();
        for task in &plan.tasks {
            if !seen.insert(task.file_path.clone()) {
                warn!("Plan assigns {} to more than one task", task.file_path);
            }
        }

        info!("Planned {} task(s)", plan.tasks.len());
        Ok(plan)
    }

    async fn execute_tasks(&self, state: &mut ExecutionState, resuming: bool) -> Result<()> {
        let executor = Arc::new(VerifyingExecutor::new(
            Arc::clone(&self.workspace),
            Arc::clone(&self.shell),
            Arc::clone(&self.model),
            Arc::clone(&self.bus),
            self.runner_kind,
            VerifyConfig {
                max_retries: self.config.verify_retries,
                source_extensions: self.config.source_extensions.clone(),
                test_timeout: self.config.task_timeout,
            },
        ));

        let scheduler = Arc::new(TaskScheduler::new(
            executor,
            Arc::clone(&self.bus),
            SchedulerConfig::default()
                .with_max_concurrency(self.config.max_concurrency)
                .with_default_max_attempts(self.config.max_attempts)
                .with_task_timeout(self.config.task_timeout)
                .with_retry_delay(self.config.retry_delay),
        ));

        scheduler.load_plan(state.tasks.clone());

        if resuming {
            let mut completed = Vec::new();
            let mut results = HashMap::new();
            for task in &state.tasks {
                if task.status == TaskStatus::Completed {
                    if let Some(result) = &task.result {
                        if !result.is_empty() {
                            completed.push(task.id.clone());
                            results.insert(task.id.clone(), result.clone());
                        }
                    }
                }
            }
            info!("Resume: {} task(s) already complete", completed.len());
            scheduler.resume_from(&completed, &results);
        }

        // Checkpoint on every task transition; handlers read the
        // scheduler's snapshot so the document on disk always reflects
        // the most recent terminal states
        let shared = Arc::new(tokio::sync::Mutex::new(state.clone()));
        let mut handler_ids = Vec::new();
        for kind in [EventKind::TaskComplete, EventKind::TaskFailed] {
            let shared = Arc::clone(&shared);
            let store = self.store.clone();
            let bus = Arc::clone(&self.bus);
            let scheduler_ref = Arc::clone(&scheduler);
            let id = self.bus.on(kind, move |_event| {
                let shared = Arc::clone(&shared);
                let store = store.clone();
                let bus = Arc::clone(&bus);
                let scheduler = Arc::clone(&scheduler_ref);
                async move {
                    let mut snapshot = shared.lock().await;
                    snapshot.tasks = scheduler.status().tasks;
                    store.save(&mut snapshot).await?;
                    let plan_id = snapshot.plan_id.clone();
                    drop(snapshot);
                    bus.publish(
                        EngineEvent::new(EventKind::CheckpointSaved).with("planId", plan_id),
                    )
                    .await;
                    Ok(())
                }
            });
            handler_ids.push(id);
        }

        let run_result = scheduler.run().await;

        for id in handler_ids {
            self.bus.off(id);
        }

        state.tasks = scheduler.status().tasks;
        state.last_checkpoint = shared.lock().await.last_checkpoint;

        run_result
    }

    async fn document(&self, state: &mut ExecutionState) -> Result<()> {
        let request = GenerateRequest::new(
            SCRIBE_SYSTEM,
            scribe_user(&state.goal, &state.architecture_reasoning, &state.tasks),
        );

        self.bus
            .publish(EngineEvent::new(EventKind::LlmRequest).with("role", "scribe"))
            .await;
        let readme = self.model.generate(&request).await?;
        self.bus
            .publish(
                EngineEvent::new(EventKind::LlmResponse)
                    .with("role", "scribe")
                    .with("chars", readme.len() as i64),
            )
            .await;

        self.workspace
            .write("README.md", strip_code_fences(&readme).as_bytes())
            .await?;
        info!("Documentation written to README.md");
        Ok(())
    }

    async fn checkpoint(&self, state: &mut ExecutionState) -> Result<()> {
        self.store.save(state).await?;
        self.bus
            .publish(
                EngineEvent::new(EventKind::CheckpointSaved)
                    .with("planId", state.plan_id.clone()),
            )
            .await;
        Ok(())
    }

    async fn phase_start(&self, phase: ExecutionPhase) {
        info!("Phase starting: {}", phase);
        self.bus
            .publish(EngineEvent::new(EventKind::PhaseStart).with("phase", phase.to_string()))
            .await;
    }

    async fn phase_complete(&self, phase: ExecutionPhase) {
        self.bus
            .publish(EngineEvent::new(EventKind::PhaseComplete).with("phase", phase.to_string()))
            .await;
    }
}

fn prefix(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
