//! Repository workspace preparation
//!
//! Shallow clones under one work dir, keyed `owner__name`. Clones of the
//! same repository are serialized with a per-repo async lock so concurrent
//! workers never race on the same checkout; distinct repos clone in
//! parallel. Git runs as a subprocess, off the async runtime.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const CLONE_TIMEOUT: Duration = Duration::from_secs(180);
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Cache of prepared checkouts.
pub struct RepoCache {
    root: PathBuf,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RepoCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root, locks: std::sync::Mutex::new(HashMap::new()) }
    }

    fn lock_for(&self, repo: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(repo.to_string()).or_default().clone()
    }

    /// Path a repository would be checked out at.
    pub fn checkout_path(&self, repo: &str) -> PathBuf {
        self.root.join(repo.replace('/', "__"))
    }

    /// Ensure `repo` is cloned and checked out at `base_commit`, returning
    /// the checkout path. Already-present checkouts are reused as-is.
    pub async fn ensure(&self, repo: &str, base_commit: &str) -> Result<PathBuf> {
        let path = self.checkout_path(repo);
        let lock = self.lock_for(repo);
        let _guard = lock.lock().await;

        if path.join(".git").is_dir() {
            return Ok(path);
        }

        let repo = repo.to_string();
        let base_commit = base_commit.to_string();
        let path_for_clone = path.clone();
        tokio::task::spawn_blocking(move || clone_and_checkout(&repo, &base_commit, &path_for_clone))
            .await
            .map_err(|e| anyhow!("clone task failed: {}", e))??;

        Ok(path)
    }
}

fn clone_and_checkout(repo: &str, base_commit: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create work dir {}", parent.display()))?;
    }

    let clone_url = format!("https://github.com/{}.git", repo);
    tracing::info!(repo, "Cloning");

    let mut clone = Command::new("git");
    clone.args(["clone", "--depth=1", &clone_url]).arg(path);
    let outcome = run_with_timeout(&mut clone, CLONE_TIMEOUT)?;
    if !outcome.success() {
        // A concurrent or earlier run may have left a usable checkout.
        if path.join(".git").is_dir() {
            return Ok(());
        }
        return Err(anyhow!(
            "Failed to clone {}: {}",
            repo,
            crate::util::truncate(&outcome.stderr, 300)
        ));
    }

    if !base_commit.is_empty() {
        // Best-effort: a missing commit leaves the shallow default head,
        // which is still useful context for the model.
        let mut fetch = Command::new("git");
        fetch
            .args(["fetch", "--depth=1", "origin", base_commit])
            .current_dir(path);
        let _ = run_with_timeout(&mut fetch, FETCH_TIMEOUT);

        let mut checkout = Command::new("git");
        checkout.args(["checkout", base_commit]).current_dir(path);
        if let Ok(outcome) = run_with_timeout(&mut checkout, CHECKOUT_TIMEOUT) {
            if !outcome.success() {
                tracing::warn!(repo, base_commit, "Checkout failed, using default head");
            }
        }
    }

    Ok(())
}

struct CommandOutcome {
    status: Option<ExitStatus>,
    stderr: String,
    timed_out: bool,
}

impl CommandOutcome {
    fn success(&self) -> bool {
        !self.timed_out && self.status.map(|s| s.success()).unwrap_or(false)
    }
}

/// Run a command with a hard timeout, draining output on reader threads so
/// the child never blocks on a full pipe.
fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<CommandOutcome> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to start git")?;

    let stdout = child.stdout.take().ok_or_else(|| anyhow!("Failed to capture stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow!("Failed to capture stderr"))?;

    let stdout_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = BufReader::new(stdout).read_to_end(&mut buf);
        buf
    });
    let stderr_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = BufReader::new(stderr).read_to_end(&mut buf);
        buf
    });

    let start = Instant::now();
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    timed_out = true;
                    let _ = child.kill();
                    break child.wait().ok();
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(anyhow!("Failed to wait for git: {}", e)),
        }
    };

    let _ = stdout_handle.join();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutcome {
        status,
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_path_keys_by_owner_and_name() {
        let cache = RepoCache::new(PathBuf::from("/tmp/work"));
        assert_eq!(
            cache.checkout_path("django/django"),
            PathBuf::from("/tmp/work/django__django")
        );
    }

    #[tokio::test]
    async fn test_ensure_reuses_existing_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RepoCache::new(dir.path().to_path_buf());
        let checkout = cache.checkout_path("owner/name");
        std::fs::create_dir_all(checkout.join(".git")).unwrap();

        let path = cache.ensure("owner/name", "abc123").await.unwrap();
        assert_eq!(path, checkout);
    }

    #[test]
    fn test_locks_are_shared_per_repo() {
        let cache = RepoCache::new(PathBuf::from("/tmp/work"));
        let a = cache.lock_for("x/y");
        let b = cache.lock_for("x/y");
        let c = cache.lock_for("x/z");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
