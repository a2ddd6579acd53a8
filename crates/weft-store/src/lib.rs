//! # weft-store
//!
//! Durable, JSON-encoded execution state: one pretty-printed document per
//! plan id under the state directory. A corrupted checkpoint never crashes
//! the engine; `load` treats it as absent and a fresh run begins.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use weft_core::{ExecutionPhase, ExecutionState, Result, TaskStatus};

/// Default state directory relative to the working directory
pub const DEFAULT_STATE_DIR: &str = ".weft/state";

/// File-backed checkpoint store
#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Store rooted at the conventional hidden directory
    pub fn default_location() -> Self {
        Self::new(DEFAULT_STATE_DIR)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Persist a checkpoint
    ///
    /// `lastCheckpoint` is rewritten to now before serializing, so
    /// "latest for goal" ranks by most recent save rather than original
    /// generation.
    pub async fn save(&self, state: &mut ExecutionState) -> Result<()> {
        state.last_checkpoint = Utc::now();

        fs::create_dir_all(&self.state_dir).await?;
        let json = serde_json::to_string_pretty(state)?;
        let path = self.checkpoint_path(&state.plan_id);
        fs::write(&path, json).await?;

        debug!("Checkpoint saved: {}", path.display());
        Ok(())
    }

    /// Load a checkpoint, or None when it is absent or unreadable
    pub async fn load(&self, plan_id: &str) -> Result<Option<ExecutionState>> {
        let path = self.checkpoint_path(plan_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!("Checkpoint {} is corrupt, ignoring: {}", plan_id, e);
                Ok(None)
            }
        }
    }

    /// Enumerate checkpoint ids (file stems of `.json` entries)
    ///
    /// Contents are not parsed here: a corrupt checkpoint still lists,
    /// and loading it returns None.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match fs::read_dir(&self.state_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    pub async fn delete(&self, plan_id: &str) -> Result<()> {
        match fs::remove_file(self.checkpoint_path(plan_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, plan_id: &str) -> bool {
        self.checkpoint_path(plan_id).exists()
    }

    /// Most recently saved checkpoint for a goal
    pub async fn find_latest_for_goal(&self, goal: &str) -> Result<Option<ExecutionState>> {
        let mut latest: Option<ExecutionState> = None;

        for id in self.list().await? {
            // Unparseable entries are skipped; they cannot be ranked
            if let Some(state) = self.load(&id).await? {
                if state.goal != goal {
                    continue;
                }
                let newer = latest
                    .as_ref()
                    .map(|l| state.last_checkpoint > l.last_checkpoint)
                    .unwrap_or(true);
                if newer {
                    latest = Some(state);
                }
            }
        }

        Ok(latest)
    }

    /// Keep the N newest checkpoints by `lastCheckpoint`, delete the rest
    ///
    /// Returns how many were deleted. Unparseable entries are left alone.
    pub async fn cleanup(&self, keep: usize) -> Result<usize> {
        let mut ranked = Vec::new();
        for id in self.list().await? {
            if let Some(state) = self.load(&id).await? {
                ranked.push((id, state.last_checkpoint));
            }
        }

        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let mut deleted = 0;
        for (id, _) in ranked.into_iter().skip(keep) {
            self.delete(&id).await?;
            deleted += 1;
        }

        Ok(deleted)
    }

    fn checkpoint_path(&self, plan_id: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", plan_id))
    }
}

/// A run is complete when its phase is terminal-successful or every task
/// finished. An empty task list counts as complete: a crash before
/// planning produced tasks restarts fresh rather than resuming.
pub fn is_complete(state: &ExecutionState) -> bool {
    state.phase == ExecutionPhase::Completed
        || state
            .tasks
            .iter()
            .all(|t| t.status == TaskStatus::Completed)
}

/// A run is fatally failed when the phase is failed and some task burned
/// its whole attempt budget
pub fn is_fatally_failed(state: &ExecutionState) -> bool {
    state.phase == ExecutionPhase::Failed
        && state
            .tasks
            .iter()
            .any(|t| t.status == TaskStatus::Failed && t.attempts >= 3)
}

/// Derive a plan id from a goal: `plan-<8-hex-of-sha256(goal)>-<base36 ms>`
///
/// The timestamp salt keeps repeated runs of the same goal distinct while
/// the hash prefix keeps ids greppable by goal.
pub fn plan_id(goal: &str) -> String {
    let digest = Sha256::digest(goal.as_bytes());
    let hex: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    format!("plan-{}-{}", hex, to_base36(millis))
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use weft_core::Task;

    fn sample_state(plan_id: &str, goal: &str) -> ExecutionState {
        let mut state = ExecutionState::new(plan_id, goal);
        state.tasks.push(
            Task::new("a", "src/a.ts").with_description("module a"),
        );
        state
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = sample_state("plan-test-1", "build a parser");
        state.phase = ExecutionPhase::Executing;
        let before_save = state.last_checkpoint;
        store.save(&mut state).await.unwrap();

        let loaded = store.load("plan-test-1").await.unwrap().unwrap();
        assert_eq!(loaded.plan_id, state.plan_id);
        assert_eq!(loaded.goal, state.goal);
        assert_eq!(loaded.phase, ExecutionPhase::Executing);
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.started_at, state.started_at);
        // lastCheckpoint is refreshed on save
        assert!(loaded.last_checkpoint >= before_save);
    }

    #[tokio::test]
    async fn test_save_creates_state_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("deep/state");
        let store = StateStore::new(&nested);

        let mut state = sample_state("plan-nested", "goal");
        store.save(&mut state).await.unwrap();
        assert!(nested.join("plan-nested.json").exists());
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load("plan-none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_loads_as_none_but_lists() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        std::fs::write(dir.path().join("plan-corrupt.json"), "not-json").unwrap();

        assert!(store.load("plan-corrupt").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap(), vec!["plan-corrupt".to_string()]);
    }

    #[tokio::test]
    async fn test_list_ignores_non_json() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = sample_state("plan-a", "goal");
        store.save(&mut state).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["plan-a".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = sample_state("plan-del", "goal");
        store.save(&mut state).await.unwrap();
        assert!(store.exists("plan-del").await);

        store.delete("plan-del").await.unwrap();
        assert!(!store.exists("plan-del").await);
        store.delete("plan-del").await.unwrap();
    }

    #[tokio::test]
    async fn test_find_latest_for_goal_ranks_by_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        let mut older = sample_state("plan-older", "shared goal");
        store.save(&mut older).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let mut newer = sample_state("plan-newer", "shared goal");
        store.save(&mut newer).await.unwrap();
        let mut other = sample_state("plan-other", "different goal");
        store.save(&mut other).await.unwrap();

        let latest = store
            .find_latest_for_goal("shared goal")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.plan_id, "plan-newer");

        assert!(store
            .find_latest_for_goal("never seen")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        for i in 0..5 {
            let mut state = sample_state(&format!("plan-{}", i), "goal");
            store.save(&mut state).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let deleted = store.cleanup(2).await.unwrap();
        assert_eq!(deleted, 3);

        let remaining = store.list().await.unwrap();
        assert_eq!(remaining.len(), 2);
        // The two newest saves survive
        assert!(remaining.contains(&"plan-3".to_string()));
        assert!(remaining.contains(&"plan-4".to_string()));
    }

    #[tokio::test]
    async fn test_cleanup_with_large_keep_deletes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = sample_state("plan-keep", "goal");
        store.save(&mut state).await.unwrap();

        assert_eq!(store.cleanup(10).await.unwrap(), 0);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_plan_id_format() {
        let id = plan_id("build a web scraper");
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "plan");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!parts[2].is_empty());
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));

        // Same goal, same hash prefix
        let other = plan_id("build a web scraper");
        let other_parts: Vec<&str> = other.splitn(3, '-').collect();
        assert_eq!(parts[1], other_parts[1]);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1296), "100");
    }

    #[test]
    fn test_is_complete() {
        let mut state = sample_state("p", "g");
        assert!(!is_complete(&state));

        state.tasks[0].status = TaskStatus::Completed;
        assert!(is_complete(&state));

        state.tasks[0].status = TaskStatus::Failed;
        state.phase = ExecutionPhase::Completed;
        assert!(is_complete(&state));
    }

    #[test]
    fn test_is_fatally_failed() {
        let mut state = sample_state("p", "g");
        assert!(!is_fatally_failed(&state));

        state.phase = ExecutionPhase::Failed;
        assert!(!is_fatally_failed(&state));

        state.tasks[0].status = TaskStatus::Failed;
        state.tasks[0].attempts = 3;
        assert!(is_fatally_failed(&state));

        state.tasks[0].attempts = 1;
        assert!(!is_fatally_failed(&state));
    }
}
