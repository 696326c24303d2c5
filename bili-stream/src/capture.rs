//! Audio capture through an ffmpeg child process
//!
//! ffmpeg reads the live FLV stream and writes raw PCM to its stdout, which
//! is exposed as a [`ByteStream`]. ffmpeg must be installed and on `PATH`
//! (or configured with [`FfmpegOpener::with_program`]).

use std::ffi::OsString;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bili_api::{REFERER, USER_AGENT};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::CaptureConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::CaptureError;
use crate::sources::{ByteStream, StreamOpener};

/// Upper bound on the stderr kept for diagnostics.
const STDERR_LIMIT: u64 = 64 * 1024;

const LOCATOR_LOG_LENGTH: usize = 80;

/// Shorten a stream URL for logging; signed URLs are long and carry tokens.
pub fn truncate_locator(locator: &str) -> String {
    match locator.char_indices().nth(LOCATOR_LOG_LENGTH) {
        Some((cut, _)) => format!("{}...", &locator[..cut]),
        None => locator.to_string(),
    }
}

/// [`StreamOpener`] that spawns ffmpeg.
pub struct FfmpegOpener {
    program: OsString,
    sink: Arc<dyn DiagnosticSink>,
}

impl FfmpegOpener {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            program: OsString::from("ffmpeg"),
            sink,
        }
    }

    /// Use another ffmpeg binary.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Command line arguments for capturing `locator` as raw PCM on stdout.
    pub fn build_args(locator: &str, config: &CaptureConfig) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            // Low-latency input: minimal probing and buffering for live streams
            "-fflags".to_string(),
            "nobuffer".to_string(),
            "-flags".to_string(),
            "low_delay".to_string(),
            "-analyzeduration".to_string(),
            "500000".to_string(),
            "-probesize".to_string(),
            "500000".to_string(),
            "-user_agent".to_string(),
            USER_AGENT.to_string(),
            "-headers".to_string(),
            format!("Referer: {}\r\n", REFERER),
            "-i".to_string(),
            locator.to_string(),
            "-vn".to_string(),
            "-acodec".to_string(),
            config.format.codec(),
            "-ar".to_string(),
            config.sample_rate.to_string(),
            "-ac".to_string(),
            config.channels.to_string(),
            "-f".to_string(),
            config.format.muxer().to_string(),
            "pipe:1".to_string(),
        ]
    }
}

#[async_trait]
impl StreamOpener for FfmpegOpener {
    async fn open(
        &self,
        locator: &str,
        config: &CaptureConfig,
        cancel: CancellationToken,
    ) -> Result<Box<dyn ByteStream>, CaptureError> {
        let mut child = Command::new(&self.program)
            .args(Self::build_args(locator, config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CaptureError::Spawn)?;

        let stdout = child.stdout.take().ok_or(CaptureError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().map(|stderr| tokio::spawn(collect_stderr(stderr)));

        self.sink.record(&Diagnostic::FfmpegStarted {
            locator: &truncate_locator(locator),
        });

        Ok(Box::new(FfmpegStream::start(
            child,
            stdout,
            stderr,
            cancel,
            Arc::clone(&self.sink),
        )))
    }
}

async fn collect_stderr(mut stderr: ChildStderr) -> String {
    let mut buffer = Vec::new();
    let _ = (&mut stderr).take(STDERR_LIMIT).read_to_end(&mut buffer).await;
    // Keep draining so ffmpeg never blocks on a full pipe.
    let _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
    String::from_utf8_lossy(&buffer).trim().to_string()
}

/// PCM output of a running ffmpeg process.
///
/// [`ByteStream::close`] stops and reaps the process. Cancelling the token
/// the stream was opened with kills the process as well; dropping the
/// stream without closing it does the same.
pub struct FfmpegStream {
    stdout: Option<ChildStdout>,
    child: Arc<Mutex<Child>>,
    stderr: Option<JoinHandle<String>>,
    /// Cancellation of the capture as a whole
    cancel: CancellationToken,
    /// Fired on cancel, close or drop; wakes the kill watcher
    guard: CancellationToken,
    sink: Arc<dyn DiagnosticSink>,
    closed: bool,
}

impl FfmpegStream {
    fn start(
        child: Child,
        stdout: ChildStdout,
        stderr: Option<JoinHandle<String>>,
        cancel: CancellationToken,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let child = Arc::new(Mutex::new(child));
        let guard = cancel.child_token();

        let watched = Arc::clone(&child);
        let fired = guard.clone();
        tokio::spawn(async move {
            fired.cancelled().await;
            // Already reaped children refuse the kill; nothing to do then.
            let _ = watched.lock().await.start_kill();
        });

        Self {
            stdout: Some(stdout),
            child,
            stderr,
            cancel,
            guard,
            sink,
            closed: false,
        }
    }

    async fn stderr_output(&mut self) -> String {
        match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

impl AsyncRead for FfmpegStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut().stdout.as_mut() {
            Some(stdout) => Pin::new(stdout).poll_read(cx, buf),
            // Closed streams read as EOF.
            None => Poll::Ready(Ok(())),
        }
    }
}

#[async_trait]
impl ByteStream for FfmpegStream {
    async fn close(&mut self) -> Result<(), CaptureError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stdout = None;

        let exited = {
            let mut child = self.child.lock().await;
            match child.try_wait()? {
                Some(status) => Some(status),
                None => {
                    let _ = child.start_kill();
                    child.wait().await?;
                    None
                }
            }
        };
        self.guard.cancel();

        match exited {
            Some(status) if !status.success() && !self.cancel.is_cancelled() => {
                let status = status.to_string();
                let stderr = self.stderr_output().await;
                self.sink.record(&Diagnostic::FfmpegFailed {
                    status: &status,
                    stderr: &stderr,
                });
                Err(CaptureError::Exited { status, stderr })
            }
            _ => Ok(()),
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.guard.cancel();
    }
}
