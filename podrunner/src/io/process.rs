//! Helpers for running child processes with timeouts and bounded output.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

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
    fn timed_out(status: ExitStatus) -> Self {
        Self {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: 0,
            stderr_truncated: 0,
            timed_out: true,
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run a command with an optional timeout and capture stdout/stderr without risking pipe
/// deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
///
/// With `timeout: None` the call waits for the child and its output indefinitely. Otherwise the
/// deadline covers both the child's exit and draining its pipes: a background process that
/// inherited stdout can keep the pipe open after the shell exits. When the deadline passes the
/// child is killed and the result is returned right away with empty output; reader threads still
/// blocked on a pipe are left to finish on their own.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command_with_timeout(
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
    let deadline = timeout.map(|timeout| Instant::now() + timeout);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, rx) = mpsc::channel();
    spawn_reader(Stream::Stdout, stdout, output_limit_bytes, tx.clone());
    spawn_reader(Stream::Stderr, stderr, output_limit_bytes, tx);

    let waited = match deadline {
        Some(deadline) => child
            .wait_timeout(remaining(deadline))
            .context("wait for command")?,
        None => Some(child.wait().context("wait for command")?),
    };
    let Some(status) = waited else {
        warn!(
            timeout_secs = timeout.map(|t| t.as_secs()),
            "command timed out, killing"
        );
        child.kill().context("kill command")?;
        let status = child.wait().context("wait command after kill")?;
        return Ok(CommandOutput::timed_out(status));
    };

    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        let received = match deadline {
            Some(deadline) => match rx.recv_timeout(remaining(deadline)) {
                Ok(received) => received,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        timeout_secs = timeout.map(|t| t.as_secs()),
                        "command exited but its output stayed open past the timeout"
                    );
                    return Ok(CommandOutput::timed_out(status));
                }
                Err(RecvTimeoutError::Disconnected) => bail!("output reader thread panicked"),
            },
            None => rx
                .recv()
                .map_err(|_| anyhow!("output reader thread panicked"))?,
        };
        match received {
            (Stream::Stdout, result) => stdout = Some(result.context("read stdout")?),
            (Stream::Stderr, result) => stderr = Some(result.context("read stderr")?),
        }
    }
    let ((stdout, stdout_truncated), (stderr, stderr_truncated)) =
        (stdout.unwrap_or_default(), stderr.unwrap_or_default());

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out: false,
    })
}

/// Run a command to completion and return its stdout, failing on a non-zero exit.
pub fn run_checked(cmd: Command, output_limit_bytes: usize) -> Result<String> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let output = run_command_with_timeout(cmd, None, output_limit_bytes)?;
    if !output.status.success() {
        bail!(
            "{} exited with {:?}: {}",
            program,
            output.status.code(),
            output.stderr_lossy().trim()
        );
    }
    Ok(output.stdout_lossy())
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type StreamResult = Result<(Vec<u8>, usize)>;

fn spawn_reader<R: Read + Send + 'static>(
    stream: Stream,
    reader: R,
    limit: usize,
    tx: Sender<(Stream, StreamResult)>,
) {
    thread::spawn(move || {
        // The receiver is gone once the caller has given up on the deadline.
        let _ = tx.send((stream, read_stream_limited(reader, limit)));
    });
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
