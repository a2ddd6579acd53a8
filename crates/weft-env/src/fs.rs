//! File system port
//!
//! All paths are resolved against a base directory bound at construction.
//! Absolute paths and traversal outside the base are rejected before any
//! I/O happens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use weft_core::{Result, WeftError};

/// Options for [`Workspace::list`]
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub recursive: bool,
    /// Keep only paths matching one of these patterns (all, when empty).
    /// `*.ext` matches by extension; anything else matches as a substring.
    pub include: Vec<String>,
    /// Drop paths matching one of these patterns
    pub exclude: Vec<String>,
    pub max_depth: Option<usize>,
}

impl ListOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Default::default()
        }
    }

    pub fn with_include(mut self, patterns: Vec<String>) -> Self {
        self.include = patterns;
        self
    }

    pub fn with_exclude(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    fn matches(&self, relative: &str) -> bool {
        if self.exclude.iter().any(|p| pattern_matches(p, relative)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| pattern_matches(p, relative))
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    if let Some(ext) = pattern.strip_prefix("*.") {
        return Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == ext)
            .unwrap_or(false);
    }
    path.contains(pattern)
}

/// Metadata for a workspace entry
#[derive(Debug, Clone)]
pub struct FileStat {
    pub size: u64,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// Narrow file system capability consumed by the core
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    /// Write a file, creating parent directories as needed
    async fn write(&self, path: &str, contents: &[u8]) -> Result<()>;
    async fn exists(&self, path: &str) -> bool;
    async fn mkdir(&self, path: &str) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    /// List entries under a directory, returned base-relative
    async fn list(&self, dir: &str, options: &ListOptions) -> Result<Vec<String>>;
    async fn stat(&self, path: &str) -> Result<FileStat>;
}

/// Workspace rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    base: PathBuf,
}

impl LocalWorkspace {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a base-relative path, rejecting escapes
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Err(WeftError::PathValidation(format!(
                "Absolute paths not allowed: {}",
                path
            )));
        }
        for component in candidate.components() {
            if matches!(component, Component::ParentDir) {
                return Err(WeftError::PathValidation(format!(
                    "Path traversal not allowed: {}",
                    path
                )));
            }
        }
        Ok(self.base.join(candidate))
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        Ok(fs::read(&full).await?)
    }

    async fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, contents).await?;
        tracing::debug!("Wrote {} ({} bytes)", full.display(), contents.len());
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => full.exists(),
            Err(_) => false,
        }
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        let meta = match fs::metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&full).await?;
        } else {
            fs::remove_file(&full).await?;
        }
        Ok(())
    }

    async fn list(&self, dir: &str, options: &ListOptions) -> Result<Vec<String>> {
        let root = self.resolve(dir)?;
        let mut found = Vec::new();
        let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
        queue.push_back((root, 0));

        while let Some((current, depth)) = queue.pop_front() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    let descend = options.recursive
                        && options.max_depth.map(|max| depth < max).unwrap_or(true);
                    if descend {
                        queue.push_back((path, depth + 1));
                    }
                    continue;
                }

                let relative = path
                    .strip_prefix(&self.base)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .to_string();
                if options.matches(&relative) {
                    found.push(relative);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).await?;
        Ok(FileStat {
            size: meta.len(),
            is_dir: meta.is_dir(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}
