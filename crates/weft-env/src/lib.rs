//! # weft-env
//!
//! The narrow capability surfaces the core consumes: file system, shell,
//! test runner, and model provider. The core depends only on the traits;
//! the concrete implementations here are adapters that can be swapped
//! for the scripted doubles in [`mock`].
//!
//! Logging is the fourth port of the set and is realized by the `tracing`
//! facade: leveled, structured, and substitutable via subscribers.

mod fs;
mod mock;
mod model;
mod openai;
mod shell;
mod test_runner;

pub use fs::{FileStat, ListOptions, LocalWorkspace, Workspace};
pub use mock::{MockModel, MockShell};
pub use model::{GenerateRequest, ModelProvider, ModelReply, ResponseFormat, ToolCall, Usage};
pub use openai::{api_key_from_env, OpenAiClient, API_KEY_VARS};
pub use shell::{ExecOptions, ExecResult, Shell, SystemShell};
pub use test_runner::{
    detect_runner, parse_test_output, RunnerKind, TestFailure, TestResult, TestRunner,
};
