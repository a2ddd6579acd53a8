//! Verification loop: the executor callback the scheduler drives
//!
//! Per code task: generate the artifact, generate a test file for it, run
//! the tests, classify any failure, and regenerate the artifact under a
//! category-specific repair prompt. The loop rewrites only the source
//! file; a hard attempt bound turns exhaustion into a task failure the
//! scheduler retries or skips on.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::prompt::{
    auditor_user, builder_user, fixer_user, is_source_file, is_test_file, strip_code_fences,
    test_path_for, AUDITOR_SYSTEM, BUILDER_SYSTEM, FIXER_SYSTEM,
};
use weft_bus::EventBus;
use weft_classify::classifier;
use weft_core::{EngineEvent, EventKind, Result, Task, TaskKind, WeftError};
use weft_digest::{digest, DigestOptions};
use weft_env::{GenerateRequest, ModelProvider, RunnerKind, Shell, TestRunner, Workspace};
use weft_scheduler::TaskExecutor;

/// Verification loop options
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Generate-test-fix cycles before giving up
    pub max_retries: u32,
    /// Extensions treated as verifiable source
    pub source_extensions: Vec<String>,
    /// Timeout for one test run
    pub test_timeout: Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            source_extensions: vec![
                "ts".to_string(),
                "tsx".to_string(),
                "js".to_string(),
                "jsx".to_string(),
                "mjs".to_string(),
                "cjs".to_string(),
            ],
            test_timeout: Duration::from_millis(300_000),
        }
    }
}

/// Task executor that generates, verifies, and self-heals one artifact
pub struct VerifyingExecutor {
    workspace: Arc<dyn Workspace>,
    shell: Arc<dyn Shell>,
    model: Arc<dyn ModelProvider>,
    bus: Arc<EventBus>,
    runner_kind: RunnerKind,
    config: VerifyConfig,
}

impl VerifyingExecutor {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        shell: Arc<dyn Shell>,
        model: Arc<dyn ModelProvider>,
        bus: Arc<EventBus>,
        runner_kind: RunnerKind,
        config: VerifyConfig,
    ) -> Self {
        Self {
            workspace,
            shell,
            model,
            bus,
            runner_kind,
            config,
        }
    }

    /// Digest each completed dependency result, in declaration order
    ///
    /// This is the only context a Build/Fix prompt sees from sibling
    /// tasks: full artifacts would waste tokens and leak implementation
    /// detail the model might imitate.
    fn dependency_context(&self, task: &Task, deps: &HashMap<String, String>) -> String {
        let mut context = String::new();
        for dep in &task.dependencies {
            if let Some(result) = deps.get(dep) {
                context.push_str(&format!("// From {}:\n", dep));
                context.push_str(&digest(result, &DigestOptions::default()));
                context.push('\n');
            }
        }
        context
    }

    fn should_verify(&self, task: &Task) -> bool {
        task.kind == TaskKind::Code
            && is_source_file(&task.file_path, &self.config.source_extensions)
            && !is_test_file(&task.file_path)
    }

    async fn generate(&self, request: GenerateRequest, role: &str) -> Result<String> {
        self.bus
            .publish(EngineEvent::new(EventKind::LlmRequest).with("role", role))
            .await;
        let reply = self.model.generate_with_meta(&request).await?;
        let mut event =
            EngineEvent::new(EventKind::LlmResponse).with("role", role).with(
                "chars",
                reply.content.len() as i64,
            );
        if let Some(usage) = reply.usage {
            event = event
                .with("inputTokens", usage.input_tokens as i64)
                .with("outputTokens", usage.output_tokens as i64);
        }
        self.bus.publish(event).await;
        Ok(strip_code_fences(&reply.content))
    }
}

#[async_trait]
impl TaskExecutor for VerifyingExecutor {
    async fn execute(&self, task: &Task, deps: &HashMap<String, String>) -> Result<String> {
        let context = self.dependency_context(task, deps);

        let mut source = self
            .generate(
                GenerateRequest::new(BUILDER_SYSTEM, builder_user(task, &context)),
                "builder",
            )
            .await?;
        self.workspace
            .write(&task.file_path, source.as_bytes())
            .await?;
        info!("Generated {} ({} bytes)", task.file_path, source.len());

        if !self.should_verify(task) {
            debug!("Skipping verification for {} ({})", task.file_path, task.kind);
            return Ok(source);
        }

        let test_path = test_path_for(&task.file_path);
        let runner = TestRunner::new(self.runner_kind, Arc::clone(&self.shell));

        for attempt in 1..=self.config.max_retries {
            let test_source = self
                .generate(
                    GenerateRequest::new(
                        AUDITOR_SYSTEM,
                        auditor_user(task, &source, self.runner_kind.name()),
                    ),
                    "auditor",
                )
                .await?;
            self.workspace
                .write(&test_path, test_source.as_bytes())
                .await?;

            let result = runner.run(&test_path, Some(self.config.test_timeout)).await?;
            if result.passed {
                info!(
                    "Task {} verified on attempt {} ({} passed)",
                    task.id, attempt, result.num_passed
                );
                return Ok(source);
            }

            let error = classifier().classify(&result.raw_output, 1);
            warn!(
                "Task {} verification attempt {}/{} failed ({}): {}",
                task.id, attempt, self.config.max_retries, error.category, error.message
            );
            self.bus
                .publish(
                    EngineEvent::new(EventKind::TaskProgress)
                        .with("taskId", task.id.clone())
                        .with("verifyAttempt", attempt as i64)
                        .with("category", error.category.to_string()),
                )
                .await;

            // The last failed cycle has no further run to test a repair
            if attempt == self.config.max_retries {
                break;
            }

            let strategy = classifier().fix_strategy(error.category);
            source = self
                .generate(
                    GenerateRequest::new(
                        FIXER_SYSTEM,
                        fixer_user(task, &source, &error, strategy),
                    ),
                    "fixer",
                )
                .await?;
            self.workspace
                .write(&task.file_path, source.as_bytes())
                .await?;
        }

        Err(WeftError::VerificationExhausted {
            attempts: self.config.max_retries,
            detail: format!("{} still fails its tests", task.file_path),
        })
    }
}
