//! # weft-classify
//!
//! Maps raw tool output to a tagged error category, a source location,
//! and a repair hint. The category selects which Fixer prompt the
//! verification loop uses, so a misclassification wastes a repair
//! attempt but never produces an invalid one.
//!
//! Rules are scanned in declared order and the first match wins. The
//! order codifies the specificity hierarchy: a message starting with
//! `TypeError:` must be tagged `type` even though a later runtime
//! pattern would also match the same text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Error category driving repair prompt selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Type,
    Import,
    Runtime,
    Assertion,
    Timeout,
    Permission,
    Resource,
    Network,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Syntax => "syntax",
            Self::Type => "type",
            Self::Import => "import",
            Self::Runtime => "runtime",
            Self::Assertion => "assertion",
            Self::Timeout => "timeout",
            Self::Permission => "permission",
            Self::Resource => "resource",
            Self::Network => "network",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// A classified tool failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub original_error: String,
}

struct Rule {
    category: ErrorCategory,
    patterns: Vec<Regex>,
}

/// Ordered-rule classifier over stderr text
pub struct ErrorClassifier {
    rules: Vec<Rule>,
    location_patterns: Vec<Regex>,
    expected_pattern: Regex,
    received_pattern: Regex,
    missing_module_pattern: Regex,
    error_start: Regex,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        let rule = |category, patterns: &[&str]| Rule {
            category,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("invalid classifier pattern"))
                .collect(),
        };

        // Scan order is the specificity hierarchy; do not reorder.
        let rules = vec![
            rule(
                ErrorCategory::Syntax,
                &[
                    r"SyntaxError",
                    r"Unexpected token",
                    r"Unexpected end of input",
                    r"Parsing error",
                    r"Unterminated string",
                ],
            ),
            rule(
                ErrorCategory::Type,
                &[
                    r"TypeError:",
                    r"error TS\d+",
                    r"is not assignable to",
                    r"Property '[^']+' does not exist",
                    r"Type '[^']+' is not",
                ],
            ),
            rule(
                ErrorCategory::Import,
                &[
                    r"Cannot find module",
                    r"Module not found",
                    r"ERR_MODULE_NOT_FOUND",
                    r"Cannot resolve module",
                    r"Failed to resolve import",
                ],
            ),
            rule(
                ErrorCategory::Runtime,
                &[
                    r"ReferenceError",
                    r"RangeError",
                    r"is not defined",
                    r"is not a function",
                    r"Cannot read propert",
                    r"undefined is not",
                    r"null is not",
                ],
            ),
            rule(
                ErrorCategory::Assertion,
                &[
                    r"AssertionError",
                    r"(?m)^\s*Expected[:\s]",
                    r"(?m)^\s*Received[:\s]",
                    r"expect\(",
                    r"toBe\(",
                    r"toEqual\(",
                    r"(?i)assertion failed",
                ],
            ),
            rule(
                ErrorCategory::Timeout,
                &[
                    r"(?i)timed out",
                    r"ETIMEDOUT",
                    r"Exceeded timeout",
                    r"(?i)timeout .* exceeded",
                ],
            ),
            rule(
                ErrorCategory::Permission,
                &[r"EACCES", r"EPERM", r"(?i)permission denied", r"(?i)operation not permitted"],
            ),
            rule(
                ErrorCategory::Resource,
                &[
                    r"ENOSPC",
                    r"EMFILE",
                    r"ENFILE",
                    r"ENOMEM",
                    r"(?i)out of memory",
                    r"heap limit",
                ],
            ),
            rule(
                ErrorCategory::Network,
                &[
                    r"ECONNREFUSED",
                    r"ECONNRESET",
                    r"ENOTFOUND",
                    r"EAI_AGAIN",
                    r"EHOSTUNREACH",
                    r"(?i)fetch failed",
                    r"socket hang up",
                ],
            ),
        ];

        // Common location formats: `at X (path:line:col)`, bare
        // `path:line:col`, and `path(line,col)` as tsc prints them.
        let location_patterns = vec![
            Regex::new(r"at\s+\S[^\n]*?\(([^():\s]+):(\d+):(\d+)\)").unwrap(),
            Regex::new(r"([A-Za-z0-9_@./\\-]+\.[A-Za-z]{1,4}):(\d+):(\d+)").unwrap(),
            Regex::new(r"([A-Za-z0-9_@./\\-]+\.[A-Za-z]{1,4})\((\d+),(\d+)\)").unwrap(),
        ];

        Self {
            rules,
            location_patterns,
            expected_pattern: Regex::new(r"(?m)^\s*Expected:?\s+(.+)$").unwrap(),
            received_pattern: Regex::new(r"(?m)^\s*Received:?\s+(.+)$").unwrap(),
            missing_module_pattern: Regex::new(r"(?:Cannot find module|Module not found[^'\n]*|Cannot resolve module)\s*'([^']+)'").unwrap(),
            error_start: Regex::new(r"(?m)^\s*(?:[A-Za-z]+Error:|Error:|error TS\d+:)").unwrap(),
        }
    }

    /// Classify a tool failure
    ///
    /// The category is determined solely by the stderr text, so
    /// classification is deterministic. The exit code only shapes the
    /// fallback message when stderr is empty.
    pub fn classify(&self, stderr: &str, exit_code: i32) -> ClassifiedError {
        let trimmed = stderr.trim();
        if trimmed.is_empty() {
            return ClassifiedError {
                category: ErrorCategory::Unknown,
                message: format!("process exited with code {}", exit_code),
                file: None,
                line: None,
                column: None,
                expected: None,
                actual: None,
                suggestion: None,
                original_error: stderr.to_string(),
            };
        }

        let category = self
            .rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| p.is_match(stderr)))
            .map(|rule| rule.category)
            .unwrap_or(ErrorCategory::Unknown);

        let (file, line, column) = self.extract_location(stderr);
        let (expected, actual) = if category == ErrorCategory::Assertion {
            (
                self.expected_pattern
                    .captures(stderr)
                    .map(|c| c[1].trim().to_string()),
                self.received_pattern
                    .captures(stderr)
                    .map(|c| c[1].trim().to_string()),
            )
        } else {
            (None, None)
        };

        ClassifiedError {
            category,
            message: first_line(trimmed),
            file,
            line,
            column,
            expected,
            actual,
            suggestion: self.suggestion_for(category, stderr),
            original_error: stderr.to_string(),
        }
    }

    /// Partition stderr into error blocks and classify each independently
    ///
    /// A block starts at any line matching the error-start shape. When no
    /// line matches, the whole blob is classified as a single error.
    pub fn analyze_multiple(&self, stderr: &str, exit_code: i32) -> Vec<ClassifiedError> {
        let starts: Vec<usize> = self.error_start.find_iter(stderr).map(|m| m.start()).collect();
        if starts.len() < 2 {
            return vec![self.classify(stderr, exit_code)];
        }

        let mut blocks = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(stderr.len());
            blocks.push(self.classify(&stderr[start..end], exit_code));
        }
        blocks
    }

    /// Category-specific repair instruction injected into the Fixer prompt
    pub fn fix_strategy(&self, category: ErrorCategory) -> &'static str {
        match category {
            ErrorCategory::Syntax => {
                "The failure is a syntax error. Re-emit the complete file with valid syntax; \
                 check unbalanced braces, brackets, parentheses, and unterminated strings."
            }
            ErrorCategory::Type => {
                "The failure is a type error. Align the value shapes and annotations with how \
                 the code is used; adjust signatures rather than silencing the checker."
            }
            ErrorCategory::Import => {
                "The failure is an unresolved import. Correct the module path, or inline the \
                 needed functionality instead of depending on a module that does not exist."
            }
            ErrorCategory::Runtime => {
                "The failure happens at runtime. Guard against undefined and null values, verify \
                 call targets exist, and check argument order at the failing location."
            }
            ErrorCategory::Assertion => {
                "A test assertion failed. Compare the expected and received values and fix the \
                 implementation so the documented behavior holds. If the test itself asserts the \
                 wrong behavior, emit an implementation matching the task description anyway."
            }
            ErrorCategory::Timeout => {
                "The run timed out. Remove unbounded loops, unresolved promises, and long sleeps; \
                 every async path must settle."
            }
            ErrorCategory::Permission => {
                "The process was denied access. Write only within the project directory and avoid \
                 privileged operations."
            }
            ErrorCategory::Resource => {
                "The process exhausted a system resource. Close handles, bound buffer growth, and \
                 avoid loading large data wholesale."
            }
            ErrorCategory::Network => {
                "The code reached for the network. Tests must run offline; stub remote calls or \
                 drop the network dependency."
            }
            ErrorCategory::Unknown => {
                "The failure did not match a known pattern. Read the raw output below carefully \
                 and fix the first reported problem."
            }
        }
    }

    fn extract_location(&self, stderr: &str) -> (Option<String>, Option<u32>, Option<u32>) {
        for pattern in &self.location_patterns {
            if let Some(caps) = pattern.captures(stderr) {
                let file = caps.get(1).map(|m| m.as_str().to_string());
                let line = caps.get(2).and_then(|m| m.as_str().parse().ok());
                let column = caps.get(3).and_then(|m| m.as_str().parse().ok());
                return (file, line, column);
            }
        }
        (None, None, None)
    }

    fn suggestion_for(&self, category: ErrorCategory, stderr: &str) -> Option<String> {
        match category {
            ErrorCategory::Import => self
                .missing_module_pattern
                .captures(stderr)
                .map(|c| format!("Module '{}' could not be resolved; fix the import path or create it", &c[1])),
            ErrorCategory::Timeout => {
                Some("Look for an await that never settles or a loop without an exit".to_string())
            }
            ErrorCategory::Network => {
                Some("Remove or stub outbound network calls in the generated code".to_string())
            }
            _ => None,
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

// Shared classifier - rules never mutate after construction
static CLASSIFIER: OnceLock<ErrorClassifier> = OnceLock::new();

/// Shared classifier instance
pub fn classifier() -> &'static ErrorClassifier {
    CLASSIFIER.get_or_init(ErrorClassifier::new)
}

fn first_line(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.chars().count() > 500 {
        let head: String = line.chars().take(500).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}
