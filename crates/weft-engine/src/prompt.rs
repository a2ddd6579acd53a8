//! Prompt builders for the five model roles
//!
//! Architect plans, Builder generates source, Auditor generates tests,
//! Fixer repairs classified failures, Scribe documents. Every builder
//! returns plain text; reply post-processing (fence stripping) lives here
//! too so the roles stay symmetrical.

use weft_classify::ClassifiedError;
use weft_core::Task;

pub const ARCHITECT_SYSTEM: &str = "You are a software architect. Given a goal, you produce a \
    JSON plan of file-level tasks. Respond with a single JSON object of the shape \
    {\"tasks\": [{\"id\", \"filePath\", \"description\", \"type\", \"priority\", \
    \"dependencies\"}], \"architectureReasoning\": \"...\"}. Task type is one of \
    code, test, config, docs. Dependencies reference other task ids in the same plan. \
    Every task must target a distinct filePath. Keep tasks small and independently buildable.";

/// User prompt for the planning phase
pub fn architect_user(goal: &str, repo_context: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("## GOAL\n\n");
    prompt.push_str(goal);
    prompt.push_str("\n\n## EXISTING CODEBASE\n\n");
    prompt.push_str(repo_context);
    prompt.push_str("\n\n## INSTRUCTIONS\n\n");
    prompt.push_str("Plan the file-level tasks needed to achieve the goal. ");
    prompt.push_str("Order dependencies so shared types and utilities come first. ");
    prompt.push_str("Respond with JSON only.\n");
    prompt
}

pub const BUILDER_SYSTEM: &str = "You are a senior engineer. You write one complete, production \
    quality source file per request. Respond with the raw file contents only: no code fences, \
    no commentary, no placeholders.";

/// User prompt for generating a task's artifact
pub fn builder_user(task: &Task, dependency_context: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("## TASK\n\n");
    prompt.push_str(&task.description);
    prompt.push_str(&format!("\n\nTarget file: {}\n", task.file_path));

    if !dependency_context.is_empty() {
        prompt.push_str("\n## INTERFACES FROM DEPENDENCIES\n\n");
        prompt.push_str("These modules are already built. Import from them as declared; do not \
            redefine their types.\n\n");
        prompt.push_str(dependency_context);
    }

    prompt.push_str("\n## OUTPUT\n\nEmit the complete contents of the target file.\n");
    prompt
}

pub const AUDITOR_SYSTEM: &str = "You are a test engineer. You write one complete test file for \
    the source file you are shown. Tests must be deterministic, run offline, and cover the \
    public surface. Respond with the raw test file contents only: no code fences, no commentary.";

/// User prompt for generating a task's test file
pub fn auditor_user(task: &Task, source: &str, runner_name: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("## MODULE UNDER TEST\n\n");
    prompt.push_str(&format!("Path: {}\n", task.file_path));
    prompt.push_str(&format!("Purpose: {}\n", task.description));
    prompt.push_str(&format!("Test runner: {}\n", runner_name));
    prompt.push_str("\n## SOURCE\n\n");
    prompt.push_str(source);
    prompt.push_str("\n\n## OUTPUT\n\nEmit the complete test file.\n");
    prompt
}

pub const FIXER_SYSTEM: &str = "You are a senior engineer repairing a file that fails its tests. \
    Fix the implementation. If you judge the test itself to be wrong, still emit a corrected \
    implementation that honors the task description. Respond with the raw file contents only: \
    no code fences, no commentary.";

/// User prompt for repairing a failing artifact
pub fn fixer_user(
    task: &Task,
    source: &str,
    error: &ClassifiedError,
    strategy: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("## TASK\n\n");
    prompt.push_str(&task.description);
    prompt.push_str(&format!("\n\nTarget file: {}\n", task.file_path));

    prompt.push_str("\n## FAILURE\n\n");
    prompt.push_str(&format!("Category: {}\n", error.category));
    prompt.push_str(&format!("Message: {}\n", error.message));
    if let Some(file) = &error.file {
        let line = error.line.map(|l| l.to_string()).unwrap_or_default();
        prompt.push_str(&format!("Location: {}:{}\n", file, line));
    }
    if let (Some(expected), Some(actual)) = (&error.expected, &error.actual) {
        prompt.push_str(&format!("Expected: {}\nReceived: {}\n", expected, actual));
    }
    if let Some(suggestion) = &error.suggestion {
        prompt.push_str(&format!("Hint: {}\n", suggestion));
    }

    prompt.push_str("\n## REPAIR STRATEGY\n\n");
    prompt.push_str(strategy);
    prompt.push('\n');

    prompt.push_str("\n## RAW OUTPUT\n\n```\n");
    prompt.push_str(&error.original_error);
    prompt.push_str("\n```\n");

    prompt.push_str("\n## CURRENT SOURCE\n\n");
    prompt.push_str(source);
    prompt.push_str("\n\n## OUTPUT\n\nEmit the complete corrected file.\n");
    prompt
}

pub const SCRIBE_SYSTEM: &str = "You are a technical writer. You produce a README for a newly \
    generated project. Respond with raw markdown only.";

/// User prompt for the documentation phase
pub fn scribe_user(goal: &str, architecture_reasoning: &str, tasks: &[Task]) -> String {
    let mut prompt = String::new();
    prompt.push_str("## PROJECT GOAL\n\n");
    prompt.push_str(goal);
    prompt.push_str("\n\n## ARCHITECTURE\n\n");
    prompt.push_str(architecture_reasoning);
    prompt.push_str("\n\n## FILES\n\n");
    for task in tasks {
        prompt.push_str(&format!("- {} ({}): {}\n", task.file_path, task.kind, task.description));
    }
    prompt.push_str("\nWrite a README.md covering purpose, layout, and usage.\n");
    prompt
}

/// Remove a wrapping code fence, if the reply arrived in one
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    // Drop the opening fence (possibly tagged: ```json, ```typescript)
    lines.remove(0);
    if let Some(last) = lines.last() {
        if last.trim().starts_with("```") {
            lines.pop();
        }
    }
    lines.join("\n").trim().to_string()
}

/// Derive a test file path by inserting `.test` before the extension
pub fn test_path_for(file_path: &str) -> String {
    match file_path.rsplit_once('.') {
        Some((stem, ext)) => format!("{}.test.{}", stem, ext),
        None => format!("{}.test", file_path),
    }
}

/// True when the path names a test artifact itself
pub fn is_test_file(file_path: &str) -> bool {
    file_path.contains(".test.") || file_path.contains(".spec.")
}

/// True when the extension marks verifiable source
pub fn is_source_file(file_path: &str, source_extensions: &[String]) -> bool {
    file_path
        .rsplit_once('.')
        .map(|(_, ext)| source_extensions.iter().any(|e| e == ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_classify::{classifier, ErrorCategory};

    #[test]
    fn test_strip_code_fences_plain_text_untouched() {
        assert_eq!(strip_code_fences("const a = 1;"), "const a = 1;");
    }

    #[test]
    fn test_strip_code_fences_tagged() {
        let fenced = "```typescript\nconst a = 1;\n```";
        assert_eq!(strip_code_fences(fenced), "const a = 1;");
    }

    #[test]
    fn test_strip_code_fences_json() {
        let fenced = "```json\n{\"tasks\": []}\n```\n";
        assert_eq!(strip_code_fences(fenced), "{\"tasks\": []}");
    }

    #[test]
    fn test_strip_code_fences_unterminated() {
        let fenced = "```\nbody without closing fence";
        assert_eq!(strip_code_fences(fenced), "body without closing fence");
    }

    #[test]
    fn test_test_path_for() {
        assert_eq!(test_path_for("src/util.ts"), "src/util.test.ts");
        assert_eq!(test_path_for("a/b/mod.tsx"), "a/b/mod.test.tsx");
        assert_eq!(test_path_for("Makefile"), "Makefile.test");
    }

    #[test]
    fn test_is_test_file() {
        assert!(is_test_file("src/util.test.ts"));
        assert!(is_test_file("src/util.spec.js"));
        assert!(!is_test_file("src/util.ts"));
    }

    #[test]
    fn test_is_source_file() {
        let exts = vec!["ts".to_string(), "js".to_string()];
        assert!(is_source_file("src/a.ts", &exts));
        assert!(!is_source_file("README.md", &exts));
        assert!(!is_source_file("LICENSE", &exts));
    }

    #[test]
    fn test_architect_prompt_carries_goal_and_context() {
        let prompt = architect_user("build a cli", "### src/index.ts\n// Types");
        assert!(prompt.contains("build a cli"));
        assert!(prompt.contains("src/index.ts"));
        assert!(prompt.contains("JSON"));
    }

    #[test]
    fn test_builder_prompt_includes_dependency_interfaces() {
        let task = Task::new("a", "src/a.ts").with_description("module a");
        let prompt = builder_user(&task, "// From util:\nexport function pad(): string;");
        assert!(prompt.contains("src/a.ts"));
        assert!(prompt.contains("export function pad"));
        assert!(prompt.contains("do not"));
    }

    #[test]
    fn test_builder_prompt_without_dependencies() {
        let task = Task::new("a", "src/a.ts").with_description("module a");
        let prompt = builder_user(&task, "");
        assert!(!prompt.contains("INTERFACES FROM DEPENDENCIES"));
    }

    #[test]
    fn test_fixer_prompt_carries_classification() {
        let task = Task::new("a", "src/a.ts").with_description("module a");
        let error = classifier().classify("TypeError: x is not a function\n  at f (src/a.ts:3:5)", 1);
        assert_eq!(error.category, ErrorCategory::Type);

        let strategy = classifier().fix_strategy(error.category);
        let prompt = fixer_user(&task, "export const x = 1;", &error, strategy);

        assert!(prompt.contains("Category: type"));
        assert!(prompt.contains("src/a.ts:3"));
        assert!(prompt.contains(strategy));
        assert!(prompt.contains("export const x = 1;"));
    }

    #[test]
    fn test_scribe_prompt_lists_files() {
        let tasks = vec![
            Task::new("a", "src/a.ts").with_description("module a"),
            Task::new("b", "src/b.ts").with_description("module b"),
        ];
        let prompt = scribe_user("a goal", "layered", &tasks);
        assert!(prompt.contains("src/a.ts"));
        assert!(prompt.contains("src/b.ts"));
        assert!(prompt.contains("README.md"));
    }
}
