//! Helpers for running child processes with bounded output and an optional timeout.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Exit code 0 and not killed by the timeout.
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Stdout as text, with a truncation notice appended when bytes were dropped.
    pub fn stdout_text(&self) -> String {
        render_stream(&self.stdout, self.stdout_truncated, "stdout")
    }

    /// Stderr as text, with a truncation notice appended when bytes were dropped.
    pub fn stderr_text(&self) -> String {
        render_stream(&self.stderr, self.stderr_truncated, "stderr")
    }
}

fn render_stream(buf: &[u8], truncated: usize, label: &str) -> String {
    let mut text = String::from_utf8_lossy(buf).into_owned();
    if truncated > 0 {
        text.push_str(&format!("\n[{label} truncated {truncated} bytes]\n"));
    }
    text
}

/// How long output readers may keep draining after a timed-out child is killed.
///
/// Grandchildren can inherit the pipes and keep them open past the kill; their
/// readers are detached once this elapses.
pub const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Run a command and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// With `timeout == None` the call blocks until the child exits and both streams close. After a
/// timeout the child is killed and the call returns within [`DRAIN_GRACE`] with whatever output
/// was captured so far.
///
/// A spawn failure is returned as an error; a non-zero exit is not.
#[instrument(
    skip_all,
    fields(
        program = ?cmd.get_program(),
        timeout_secs = timeout.map(|t| t.as_secs()),
        output_limit_bytes
    )
)]
pub fn run_command(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_reader = StreamReader::spawn(stdout, output_limit_bytes);
    let stderr_reader = StreamReader::spawn(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().context("wait for command")?,
        Some(limit) => match child.wait_timeout(limit).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        },
    };

    let drain_deadline = timed_out.then(|| Instant::now() + DRAIN_GRACE);
    let (stdout, stdout_truncated) = stdout_reader
        .finish(drain_deadline, "stdout")
        .context("join stdout")?;
    let (stderr, stderr_truncated) = stderr_reader
        .finish(drain_deadline, "stderr")
        .context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

#[derive(Debug, Default)]
struct Capture {
    buf: Vec<u8>,
    truncated: usize,
}

/// Background reader for one child stream; the capture is shared so a detached
/// reader still leaves its partial output behind.
struct StreamReader {
    capture: Arc<Mutex<Capture>>,
    done: mpsc::Receiver<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(stream: R, limit: usize) -> Self {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&capture);
        thread::spawn(move || {
            // The receiver is gone once the reader has been detached.
            let _ = tx.send(read_stream_limited(stream, limit, &shared));
        });
        Self { capture, done }
    }

    /// Wait for the stream to close, or only until `deadline` when one is given.
    fn finish(self, deadline: Option<Instant>, label: &str) -> Result<(Vec<u8>, usize)> {
        let outcome = match deadline {
            None => self
                .done
                .recv()
                .map_err(|_| anyhow!("{label} reader thread panicked"))?,
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match self.done.recv_timeout(wait) {
                    Ok(outcome) => outcome,
                    Err(RecvTimeoutError::Timeout) => {
                        warn!(stream = label, "stream still open after kill, detaching reader");
                        Ok(())
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        Err(anyhow!("{label} reader thread panicked"))
                    }
                }
            }
        };
        outcome?;

        let mut capture = self
            .capture
            .lock()
            .map_err(|_| anyhow!("{label} capture lock poisoned"))?;
        Ok((std::mem::take(&mut capture.buf), capture.truncated))
    }
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    capture: &Mutex<Capture>,
) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut capture = capture.lock().map_err(|_| anyhow!("capture lock poisoned"))?;
        let remaining = limit.saturating_sub(capture.buf.len());
        let keep = n.min(remaining);
        capture.buf.extend_from_slice(&chunk[..keep]);
        capture.truncated += n - keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_both_streams() {
        let out = run_command(sh("echo out; echo err >&2"), None, 1024).expect("run");
        assert!(out.success());
        assert_eq!(out.stdout_text(), "out\n");
        assert_eq!(out.stderr_text(), "err\n");
    }

    #[test]
    fn non_zero_exit_is_not_an_error() {
        let out = run_command(sh("exit 3"), None, 1024).expect("run");
        assert!(!out.success());
        assert_eq!(out.status.code(), Some(3));
    }

    #[test]
    fn output_beyond_limit_is_truncated() {
        let out = run_command(sh("printf 'abcdef'"), None, 4).expect("run");
        assert_eq!(out.stdout, b"abcd");
        assert_eq!(out.stdout_truncated, 2);
        assert!(out.stdout_text().contains("[stdout truncated 2 bytes]"));
    }

    #[test]
    fn timeout_kills_child() {
        let out = run_command(sh("sleep 5"), Some(Duration::from_millis(100)), 1024).expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn timeout_does_not_wait_for_grandchildren() {
        let started = Instant::now();
        let out = run_command(
            sh("echo early; sleep 4; echo done"),
            Some(Duration::from_millis(200)),
            1024,
        )
        .expect("run");
        assert!(out.timed_out);
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
        assert_eq!(out.stdout_text(), "early\n");
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let err = run_command(
            Command::new("definitely-not-a-real-binary-xyz"),
            None,
            1024,
        )
        .unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
