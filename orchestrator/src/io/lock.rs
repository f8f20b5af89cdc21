//! Per-issue run lock (`<locks_dir>/issue-<N>.lock`).
//!
//! `acquire` creates the file with `create_new`, so of two concurrent runs on
//! the same issue exactly one wins. The file is removed when the guard drops.
//! A lock whose recorded pid is no longer alive is reclaimed; its contents
//! name the holder.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("issue #{issue_id} is already being processed (lock {path}: {holder})")]
    Held {
        issue_id: u64,
        path: PathBuf,
        holder: String,
    },
    #[error("lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct IssueLock {
    path: PathBuf,
}

impl IssueLock {
    pub fn acquire(locks_dir: &Path, issue_id: u64) -> Result<Self, LockError> {
        let path = locks_dir.join(format!("issue-{issue_id}.lock"));
        fs::create_dir_all(locks_dir).map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;

        // One retry after removing a stale lock; a second conflict is a live holder.
        let mut reclaimed = false;
        loop {
            match try_create(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "issue lock acquired");
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(&path)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|_| "unknown holder".to_string());
                    let stale = holder_pid(&holder).is_some_and(|pid| !pid_alive(pid));
                    if !stale || reclaimed {
                        return Err(LockError::Held {
                            issue_id,
                            path,
                            holder,
                        });
                    }
                    info!(path = %path.display(), %holder, "removing stale issue lock");
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                        Err(source) => return Err(LockError::Io { path, source }),
                    }
                    reclaimed = true;
                }
                Err(source) => return Err(LockError::Io { path, source }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Create the lock file and record this process as holder. A file that was
/// created but could not be written is removed again.
fn try_create(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let holder = format!(
        "pid={} started_at={}\n",
        std::process::id(),
        chrono::Utc::now().to_rfc3339()
    );
    if let Err(err) = file.write_all(holder.as_bytes()) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            warn!(path = %path.display(), err = %cleanup, "failed to remove unwritten issue lock");
        }
        return Err(err);
    }
    Ok(())
}

fn holder_pid(holder: &str) -> Option<u32> {
    holder
        .split_whitespace()
        .find_map(|field| field.strip_prefix("pid="))
        .and_then(|pid| pid.parse().ok())
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use std::process::{Command, Stdio};

    let proc_root = Path::new("/proc");
    if proc_root.join("self").exists() {
        return proc_root.join(pid.to_string()).exists();
    }
    // No procfs: ask `kill -0`, and treat a failed check as alive.
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_or(true, |status| status.success())
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

impl Drop for IssueLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), err = %err, "failed to release issue lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = IssueLock::acquire(temp.path(), 9).expect("first");
        assert!(first.path().exists());

        let err = IssueLock::acquire(temp.path(), 9).unwrap_err();
        assert!(matches!(err, LockError::Held { issue_id: 9, .. }));
        assert!(err.to_string().contains("pid="));

        drop(first);
        IssueLock::acquire(temp.path(), 9).expect("reacquire");
    }

    #[test]
    fn lock_of_dead_process_is_reclaimed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("issue-3.lock");
        fs::write(&path, "pid=4000000 started_at=2026-01-01T00:00:00+00:00\n").expect("write");

        let lock = IssueLock::acquire(temp.path(), 3).expect("reclaim");
        let contents = fs::read_to_string(lock.path()).expect("read");
        assert!(contents.starts_with(&format!("pid={} ", std::process::id())));
    }

    #[test]
    fn lock_without_pid_is_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("issue-3.lock"), "").expect("write");
        let err = IssueLock::acquire(temp.path(), 3).unwrap_err();
        assert!(matches!(err, LockError::Held { issue_id: 3, .. }));
    }

    #[test]
    fn holder_pid_parses_first_field() {
        assert_eq!(holder_pid("pid=42 started_at=x"), Some(42));
        assert_eq!(holder_pid("started_at=x"), None);
        assert_eq!(holder_pid("pid=abc"), None);
    }

    #[test]
    fn different_issues_do_not_conflict() {
        let temp = tempfile::tempdir().expect("tempdir");
        let _a = IssueLock::acquire(temp.path(), 1).expect("a");
        let _b = IssueLock::acquire(temp.path(), 2).expect("b");
    }
}
