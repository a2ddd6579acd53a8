//! Repository context gathering for the planning phase
//!
//! Best effort: lists source files under a bounded depth and count,
//! digests each, and concatenates. Any failure degrades to "no existing
//! codebase" rather than aborting the run.

use std::sync::Arc;
use tracing::debug;

use weft_digest::{digest, DigestOptions};
use weft_env::{ListOptions, Workspace};

/// Placeholder used when nothing could be read
pub const NO_CODEBASE: &str = "No existing codebase found";

/// Bounds on how much of a repository feeds the Architect
#[derive(Debug, Clone)]
pub struct ContextLimits {
    pub max_files: usize,
    pub max_depth: usize,
    pub source_extensions: Vec<String>,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_files: 30,
            max_depth: 5,
            source_extensions: vec![
                "ts".to_string(),
                "tsx".to_string(),
                "js".to_string(),
                "jsx".to_string(),
            ],
        }
    }
}

/// Digest the source files under `dir` into one planning context blob
pub async fn gather_context(
    workspace: &Arc<dyn Workspace>,
    dir: &str,
    limits: &ContextLimits,
) -> String {
    let options = ListOptions::recursive()
        .with_include(
            limits
                .source_extensions
                .iter()
                .map(|e| format!("*.{}", e))
                .collect(),
        )
        .with_exclude(vec![
            "node_modules".to_string(),
            "dist".to_string(),
            ".git".to_string(),
        ])
        .with_max_depth(limits.max_depth);

    let files = match workspace.list(dir, &options).await {
        Ok(files) => files,
        Err(e) => {
            debug!("Context listing failed ({}); continuing without it", e);
            return NO_CODEBASE.to_string();
        }
    };

    if files.is_empty() {
        return NO_CODEBASE.to_string();
    }

    let mut context = String::new();
    for path in files.iter().take(limits.max_files) {
        let bytes = match workspace.read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Skipping unreadable {}: {}", path, e);
                continue;
            }
        };
        let source = String::from_utf8_lossy(&bytes);
        context.push_str(&format!("### {}\n", path));
        context.push_str(&digest(&source, &DigestOptions::default()));
        context.push('\n');
    }

    if context.is_empty() {
        NO_CODEBASE.to_string()
    } else {
        context
    }
}
