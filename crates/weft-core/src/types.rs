//! Core type definitions for weft orchestration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of artifact a task produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Code,
    Test,
    Config,
    Docs,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Test => write!(f, "test"),
            Self::Config => write!(f, "config"),
            Self::Docs => write!(f, "docs"),
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "test" => Ok(Self::Test),
            "config" => Ok(Self::Config),
            "docs" => Ok(Self::Docs),
            _ => Err(format!("Invalid task kind: {}", s)),
        }
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// A terminal status never transitions again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Queued => write!(f, "QUEUED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "SKIPPED" => Ok(Self::Skipped),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// A unit of work producing one artifact at a declared path
///
/// The runtime fields (`status`, `attempts`, timestamps, `result`, `error`)
/// default to empty so a task can be deserialized straight from the
/// Architect's plan JSON, which only carries the descriptor fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique within a plan
    pub id: String,
    /// Relative path of the artifact this task produces
    pub file_path: String,
    /// Human-readable description of what to build
    pub description: String,
    /// Artifact kind
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    /// Higher runs first among ready tasks
    #[serde(default)]
    pub priority: i32,
    /// Parent task ids that must complete first
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: u32,
    /// 0 means "use the scheduler default"
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Produced artifact text, set on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_path: file_path.into(),
            description: String::new(),
            kind: TaskKind::Code,
            priority: 0,
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: 0,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// A plan produced by the Architect: tasks plus free-form reasoning
///
/// Immutable after load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub architecture_reasoning: String,
}

/// Phase of an orchestrated run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    #[default]
    Planning,
    Executing,
    Documenting,
    Completed,
    Failed,
}

impl ExecutionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Executing => write!(f, "executing"),
            Self::Documenting => write!(f, "documenting"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ExecutionPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planning" => Ok(Self::Planning),
            "executing" => Ok(Self::Executing),
            "documenting" => Ok(Self::Documenting),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid execution phase: {}", s)),
        }
    }
}

/// Durable snapshot of a run; the unit of checkpoint and resume
///
/// Serialized as pretty-printed camelCase JSON, one document per plan id.
/// Timestamps are ISO-8601 UTC on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub plan_id: String,
    pub goal: String,
    pub phase: ExecutionPhase,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub architecture_reasoning: String,
    pub started_at: DateTime<Utc>,
    pub last_checkpoint: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ExecutionState {
    pub fn new(plan_id: impl Into<String>, goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            plan_id: plan_id.into(),
            goal: goal.into(),
            phase: ExecutionPhase::Planning,
            tasks: Vec::new(),
            architecture_reasoning: String::new(),
            started_at: now,
            last_checkpoint: now,
            metadata: None,
        }
    }

    /// Find a task by id
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Count tasks with the given status
    pub fn count_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_parsing() {
        let kind: TaskKind = "code".parse().unwrap();
        assert_eq!(kind, TaskKind::Code);
        assert_eq!(kind.to_string(), "code");
        assert!("widget".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_task_deserializes_from_plan_json() {
        let raw = r#"{
            "id": "a",
            "filePath": "src/index.ts",
            "description": "Entry point",
            "type": "code",
            "dependencies": ["b"]
        }"#;

        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.id, "a");
        assert_eq!(task.file_path, "src/index.ts");
        assert_eq!(task.kind, TaskKind::Code);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.priority, 0);
        assert_eq!(task.dependencies, vec!["b".to_string()]);
    }

    #[test]
    fn test_task_status_wire_format() {
        let task = Task::new("t1", "src/a.ts");
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"PENDING\""));
        assert!(json.contains("\"filePath\""));
        assert!(json.contains("\"type\":\"code\""));
    }

    #[test]
    fn test_execution_state_roundtrip() {
        let mut state = ExecutionState::new("plan-abc123-xyz", "build a widget");
        state.tasks.push(
            Task::new("a", "src/a.ts").with_description("module a"),
        );
        state.phase = ExecutionPhase::Executing;

        let json = serde_json::to_string_pretty(&state).unwrap();
        assert!(json.contains("\"planId\""));
        assert!(json.contains("\"executing\""));

        let back: ExecutionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.plan_id, state.plan_id);
        assert_eq!(back.phase, ExecutionPhase::Executing);
        assert_eq!(back.tasks.len(), 1);
        assert_eq!(back.started_at, state.started_at);
    }

    #[test]
    fn test_count_status() {
        let mut state = ExecutionState::new("p", "g");
        let mut done = Task::new("a", "a.ts");
        done.status = TaskStatus::Completed;
        state.tasks.push(done);
        state.tasks.push(Task::new("b", "b.ts"));

        assert_eq!(state.count_status(TaskStatus::Completed), 1);
        assert_eq!(state.count_status(TaskStatus::Pending), 1);
        assert_eq!(state.count_status(TaskStatus::Failed), 0);
    }
}
