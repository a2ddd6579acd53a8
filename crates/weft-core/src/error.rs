//! Unified error types for weft

use thiserror::Error;

/// Unified error type for all weft operations
#[derive(Error, Debug)]
pub enum WeftError {
    // Planning errors
    #[error("Invalid plan: {0}")]
    PlanInvalid(String),

    // Scheduler errors
    #[error("Circular dependency detected: {0}")]
    CyclicDependency(String),

    #[error("No tasks are ready to execute")]
    NoReadyTask,

    #[error("{count} task(s) failed: {ids}")]
    TasksFailed { count: usize, ids: String },

    #[error("Task {id} timed out after {millis}ms")]
    TaskTimeout { id: String, millis: u128 },

    #[error("Task executor failed: {0}")]
    TaskExecutor(String),

    // Verification errors
    #[error("Verification exhausted after {attempts} attempt(s): {detail}")]
    VerificationExhausted { attempts: u32, detail: String },

    // Port errors
    #[error("Model API error: {0}")]
    ModelApi(String),

    #[error("Shell error: {0}")]
    Shell(String),

    #[error("Path validation error: {0}")]
    PathValidation(String),

    // State store errors
    #[error("State store error: {0}")]
    Store(String),

    // Event bus errors
    #[error("Timed out waiting for event: {0}")]
    EventWait(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl WeftError {
    /// Build the failure summary raised when `run()` finishes with failed
    /// or skipped tasks
    pub fn tasks_failed(ids: &[String]) -> Self {
        Self::TasksFailed {
            count: ids.len(),
            ids: ids.join(", "),
        }
    }
}

/// Result type alias using WeftError
pub type Result<T> = std::result::Result<T, WeftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_failed_message() {
        let err = WeftError::tasks_failed(&["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "2 task(s) failed: a, b");
    }

    #[test]
    fn test_timeout_message() {
        let err = WeftError::TaskTimeout {
            id: "t1".to_string(),
            millis: 300000,
        };
        assert_eq!(err.to_string(), "Task t1 timed out after 300000ms");
    }

    #[test]
    fn test_cycle_message_phrase() {
        let err = WeftError::CyclicDependency("x -> y -> x".to_string());
        assert!(err.to_string().contains("Circular dependency"));
    }
}
