//! Tracing setup for the orchestrator CLI.
//!
//! Logs go to stderr (compact) and are appended to a per-day file
//! `<logs_dir>/agent-YYYY-MM-DD.log`. `RUST_LOG` overrides the CLI level.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber.
///
/// # Example
/// ```bash
/// RUST_LOG=orchestrator=debug orchestrator run --issue 42
/// ```
pub fn init(level: &str, logs_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (file, file_err) = match logs_dir.map(open_daily_log).transpose() {
        Ok(file) => (file, None),
        Err(err) => (None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file.map(|file| {
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .compact()
        }))
        .init();

    if let Some(err) = file_err {
        tracing::warn!(err = %format!("{err:#}"), "file logging disabled");
    }
}

/// `<logs_dir>/agent-YYYY-MM-DD.log` for today (local date).
pub fn daily_log_path(logs_dir: &Path) -> PathBuf {
    let date = chrono::Local::now().format("%Y-%m-%d");
    logs_dir.join(format!("agent-{date}.log"))
}

fn open_daily_log(logs_dir: &Path) -> Result<File> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("create logs dir {}", logs_dir.display()))?;
    let path = daily_log_path(logs_dir);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_log_name_has_date() {
        let path = daily_log_path(Path::new("/tmp/logs"));
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("agent-"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "agent-YYYY-MM-DD.log".len());
    }

    #[test]
    fn opens_log_in_missing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("nested/logs");
        open_daily_log(&dir).expect("open");
        assert!(daily_log_path(&dir).exists());
    }
}
