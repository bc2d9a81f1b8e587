//! A running encoder process
//!
//! Progress is read from `-progress pipe:1` on stdout and published on a watch
//! channel. Stderr is forwarded to tracing under the `opentube::ffmpeg` target
//! and its last lines are kept for error reporting. Both pipes are drained on
//! their own tasks so a chatty encoder never stalls on a full pipe.

use crate::error::ProcessingError;
use crate::toolkit::TranscodeOutcome;
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const STDERR_TAIL_LINES: usize = 20;

pub struct EncodeTask {
    label: String,
    child: Child,
    progress: watch::Receiver<Duration>,
    stdout_reader: JoinHandle<()>,
    stderr_reader: JoinHandle<VecDeque<String>>,
}

/// Parse one `key=value` line of ffmpeg's progress output into an elapsed
/// output time.
pub fn parse_progress_line(line: &str) -> Option<Duration> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // Both keys carry microseconds.
        "out_time_us" | "out_time_ms" => value
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_micros),
        _ => None,
    }
}

async fn read_progress<R>(stream: R, label: String, sender: watch::Sender<Duration>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(elapsed) = parse_progress_line(&line) {
                    sender.send_replace(elapsed);
                    tracing::debug!(
                        task = %label,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Encode progress"
                    );
                } else if line.trim() == "progress=end" {
                    tracing::debug!(task = %label, "Encoder reported end of progress");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(task = %label, error = %e, "Progress stream closed");
                break;
            }
        }
    }
}

async fn read_stderr<R>(stream: R, label: String) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        tracing::info!(target: "opentube::ffmpeg", task = %label, "{}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

impl EncodeTask {
    /// Start `program` with `args`. The child is killed if the task is dropped.
    pub fn spawn(
        program: &str,
        args: &[String],
        label: impl Into<String>,
    ) -> Result<Self, ProcessingError> {
        let label = label.into();

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessingError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ProcessingError::Io(std::io::Error::other("encoder stdout not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ProcessingError::Io(std::io::Error::other("encoder stderr not captured"))
        })?;

        let (sender, progress) = watch::channel(Duration::ZERO);
        let stdout_reader = tokio::spawn(read_progress(stdout, label.clone(), sender));
        let stderr_reader = tokio::spawn(read_stderr(stderr, label.clone()));

        tracing::debug!(task = %label, program = %program, pid = ?child.id(), "Encoder started");

        Ok(Self {
            label,
            child,
            progress,
            stdout_reader,
            stderr_reader,
        })
    }

    /// Subscribe to encode progress (elapsed output time).
    pub fn progress(&self) -> watch::Receiver<Duration> {
        self.progress.clone()
    }

    /// Wait for the process to exit, or kill it when `cancel` fires first.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<TranscodeOutcome, ProcessingError> {
        let start = std::time::Instant::now();

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            status = self.child.wait() => Some(status?),
        };

        let Some(status) = status else {
            if let Err(e) = self.child.kill().await {
                tracing::warn!(task = %self.label, error = %e, "Failed to kill encoder");
            }
            self.stdout_reader.abort();
            self.stderr_reader.abort();
            tracing::info!(
                task = %self.label,
                duration_ms = start.elapsed().as_millis() as u64,
                "Encoder canceled"
            );
            return Ok(TranscodeOutcome::Canceled);
        };

        let _ = self.stdout_reader.await;
        let tail = self.stderr_reader.await.unwrap_or_default();

        if status.success() {
            tracing::info!(
                task = %self.label,
                duration_ms = start.elapsed().as_millis() as u64,
                output_time_ms = self.progress.borrow().as_millis() as u64,
                "Encoder finished"
            );
            Ok(TranscodeOutcome::Completed)
        } else {
            let stderr_tail = Vec::from(tail).join("\n");
            tracing::error!(task = %self.label, status = %status, "Encoder failed");
            Err(ProcessingError::EncoderFailed {
                status,
                stderr_tail,
            })
        }
    }
}
