//! Test runner discovery and result parsing
//!
//! Probes the conventional binary directory for a known runner and falls
//! back to `node --test`. Counts are parsed from the runner's summary
//! lines; when no summary is recognized, the exit code alone decides
//! pass/fail.

use regex::Regex;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::shell::{ExecOptions, ExecResult, Shell};
use weft_core::Result;

/// Known test runners, probed in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    Jest,
    Vitest,
    Mocha,
    /// Fallback: node's built-in runner
    NodeTest,
}

impl RunnerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jest => "jest",
            Self::Vitest => "vitest",
            Self::Mocha => "mocha",
            Self::NodeTest => "node-test",
        }
    }

    fn command(&self, test_path: &str) -> String {
        match self {
            Self::Jest => format!("node_modules/.bin/jest --colors=false {}", test_path),
            Self::Vitest => format!("node_modules/.bin/vitest run {}", test_path),
            Self::Mocha => format!("node_modules/.bin/mocha {}", test_path),
            Self::NodeTest => format!("node --test {}", test_path),
        }
    }
}

/// Probe `node_modules/.bin` for a known runner
pub fn detect_runner(base: &Path) -> RunnerKind {
    let bin = base.join("node_modules/.bin");
    for (name, kind) in [
        ("jest", RunnerKind::Jest),
        ("vitest", RunnerKind::Vitest),
        ("mocha", RunnerKind::Mocha),
    ] {
        if bin.join(name).exists() {
            tracing::debug!("Detected test runner: {}", name);
            return kind;
        }
    }
    RunnerKind::NodeTest
}

/// A single failed test
#[derive(Debug, Clone)]
pub struct TestFailure {
    pub name: String,
    pub message: String,
}

/// Parsed outcome of a test run
#[derive(Debug, Clone)]
pub struct TestResult {
    pub passed: bool,
    pub num_passed: u32,
    pub num_failed: u32,
    pub num_skipped: u32,
    pub failures: Vec<TestFailure>,
    pub duration: Duration,
    pub raw_output: String,
}

/// Runs a test file through the detected runner
pub struct TestRunner {
    kind: RunnerKind,
    shell: Arc<dyn Shell>,
}

impl TestRunner {
    pub fn new(kind: RunnerKind, shell: Arc<dyn Shell>) -> Self {
        Self { kind, shell }
    }

    pub fn kind(&self) -> RunnerKind {
        self.kind
    }

    /// Execute one test file and parse the outcome
    pub async fn run(&self, test_path: &str, timeout: Option<Duration>) -> Result<TestResult> {
        let command = self.kind.command(test_path);
        let mut options = ExecOptions::default();
        options.timeout = timeout;

        let started = Instant::now();
        let exec = self.shell.exec(&command, &options).await?;
        let duration = started.elapsed();

        Ok(parse_test_output(&exec, duration))
    }
}

fn passed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+(?:passed|passing|pass)\b").unwrap())
}

fn failed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+(?:failed|failing|fail)\b").unwrap())
}

fn skipped_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+(?:skipped|pending|todo)\b").unwrap())
}

fn failure_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:✕|✗|×|●)\s+(.+)$").unwrap())
}

/// Build a [`TestResult`] from raw runner output
pub fn parse_test_output(exec: &ExecResult, duration: Duration) -> TestResult {
    let raw_output = exec.combined_output();

    let count = |re: &Regex| -> u32 {
        re.captures(&raw_output)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0)
    };

    let mut failures: Vec<TestFailure> = Vec::new();
    for caps in failure_line_re().captures_iter(&raw_output) {
        let name = caps[1].trim().to_string();
        if !failures.iter().any(|f| f.name == name) {
            failures.push(TestFailure {
                name,
                message: String::new(),
            });
        }
    }

    TestResult {
        passed: exec.success(),
        num_passed: count(passed_re()),
        num_failed: count(failed_re()),
        num_skipped: count(skipped_re()),
        failures,
        duration,
        raw_output,
    }
}
