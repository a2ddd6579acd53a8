//! Scripted test doubles for the ports
//!
//! Replies are consumed in order, so a test reads as the conversation it
//! expects: script the Builder reply, then the Auditor reply, then run.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::model::{GenerateRequest, ModelProvider, ModelReply};
use crate::shell::{ExecOptions, ExecResult, Shell};
use weft_core::{Result, WeftError};

/// Model provider returning scripted replies in order
#[derive(Default)]
pub struct MockModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.replies
            .lock()
            .expect("mock lock poisoned")
            .push_back(reply.into());
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .expect("mock lock poisoned")
            .push_back(reply.into());
    }

    /// Requests seen so far, for prompt assertions
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl ModelProvider for MockModel {
    async fn generate_with_meta(&self, request: &GenerateRequest) -> Result<ModelReply> {
        self.requests
            .lock()
            .expect("mock lock poisoned")
            .push(request.clone());
        let reply = self
            .replies
            .lock()
            .expect("mock lock poisoned")
            .pop_front()
            .ok_or_else(|| WeftError::ModelApi("No scripted reply left".to_string()))?;
        Ok(ModelReply {
            content: reply,
            ..Default::default()
        })
    }
}

/// Shell returning scripted results in order
#[derive(Default)]
pub struct MockShell {
    results: Mutex<VecDeque<ExecResult>>,
    commands: Mutex<Vec<String>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, result: ExecResult) -> Self {
        self.results
            .lock()
            .expect("mock lock poisoned")
            .push_back(result);
        self
    }

    /// Convenience: a passing run with the given stdout
    pub fn with_success(self, stdout: impl Into<String>) -> Self {
        self.with_result(ExecResult {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            timed_out: false,
        })
    }

    /// Convenience: a failing run with the given stderr
    pub fn with_failure(self, stderr: impl Into<String>) -> Self {
        self.with_result(ExecResult {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: 1,
            timed_out: false,
        })
    }

    /// Commands seen so far
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl Shell for MockShell {
    async fn exec(&self, command: &str, _options: &ExecOptions) -> Result<ExecResult> {
        self.commands
            .lock()
            .expect("mock lock poisoned")
            .push(command.to_string());
        self.results
            .lock()
            .expect("mock lock poisoned")
            .pop_front()
            .ok_or_else(|| WeftError::Shell(format!("No scripted result for: {}", command)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_model_replies_in_order() {
        let model = MockModel::new().with_reply("first").with_reply("second");

        let request = GenerateRequest::new("s", "u");
        assert_eq!(model.generate(&request).await.unwrap(), "first");
        assert_eq!(model.generate(&request).await.unwrap(), "second");
        assert!(model.generate(&request).await.is_err());
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_shell_scripted_results() {
        let shell = MockShell::new()
            .with_success("ok")
            .with_failure("boom");

        let first = shell.exec("run tests", &ExecOptions::default()).await.unwrap();
        assert!(first.success());

        let second = shell.exec("run tests", &ExecOptions::default()).await.unwrap();
        assert_eq!(second.exit_code, 1);
        assert_eq!(second.stderr, "boom");

        assert_eq!(shell.commands().len(), 2);
    }
}
