//! Structured diagnostics emitted by the monitor and stream client
//!
//! Components never log directly. Each one is handed an
//! `Arc<dyn DiagnosticSink>` at construction and reports what happened as a
//! [`Diagnostic`]. [`TracingSink`] forwards everything to `tracing`; tests
//! plug in a sink that records occurrences instead.

use bili_api::RoomId;
use tracing::Level;

use crate::error::{AcquireError, CaptureError, SourceError};

/// Something worth knowing about that happened inside the crate.
#[derive(Debug)]
pub enum Diagnostic<'a> {
    /// A polling task started for a room
    WatchStarted { room_id: RoomId },

    /// A polling task ended (room removed or watch scope ended)
    WatchStopped { room_id: RoomId },

    /// A status probe failed; the tick was skipped
    ProbeFailed { room_id: RoomId, error: &'a SourceError },

    /// A room went live
    WentLive { room_id: RoomId, title: &'a str },

    /// A room went offline
    WentOffline { room_id: RoomId },

    /// A subscriber's channel was full and an event was dropped for it
    EventDropped {
        origin: &'static str,
        room_id: RoomId,
        kind: &'static str,
    },

    /// A new capture task replaced a running one for the same room
    CaptureSuperseded { room_id: RoomId },

    /// A capture task stopped because it was cancelled
    CaptureCancelled { room_id: RoomId },

    /// One capture attempt failed
    AcquireFailed {
        room_id: RoomId,
        attempt: u32,
        error: &'a AcquireError,
    },

    /// A capture task gave up after its last attempt
    RetriesExhausted { room_id: RoomId, attempts: u32 },

    /// Audio capture is running for a room
    CaptureStarted { room_id: RoomId },

    /// A stream opened after its capture was cancelled failed to close
    CloseFailed {
        room_id: RoomId,
        error: &'a CaptureError,
    },

    /// An ffmpeg process was spawned
    FfmpegStarted { locator: &'a str },

    /// An ffmpeg process exited with an error that nobody asked for
    FfmpegFailed { status: &'a str, stderr: &'a str },

    /// A watch scope ended and its subscriber channels were closed
    StreamsClosed { origin: &'static str },
}

impl Diagnostic<'_> {
    /// Stable snake_case name of the occurrence.
    pub fn name(&self) -> &'static str {
        match self {
            Diagnostic::WatchStarted { .. } => "watch_started",
            Diagnostic::WatchStopped { .. } => "watch_stopped",
            Diagnostic::ProbeFailed { .. } => "probe_failed",
            Diagnostic::WentLive { .. } => "went_live",
            Diagnostic::WentOffline { .. } => "went_offline",
            Diagnostic::EventDropped { .. } => "event_dropped",
            Diagnostic::CaptureSuperseded { .. } => "capture_superseded",
            Diagnostic::CaptureCancelled { .. } => "capture_cancelled",
            Diagnostic::AcquireFailed { .. } => "acquire_failed",
            Diagnostic::RetriesExhausted { .. } => "retries_exhausted",
            Diagnostic::CaptureStarted { .. } => "capture_started",
            Diagnostic::CloseFailed { .. } => "close_failed",
            Diagnostic::FfmpegStarted { .. } => "ffmpeg_started",
            Diagnostic::FfmpegFailed { .. } => "ffmpeg_failed",
            Diagnostic::StreamsClosed { .. } => "streams_closed",
        }
    }

    /// Room the occurrence is about, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Diagnostic::WatchStarted { room_id }
            | Diagnostic::WatchStopped { room_id }
            | Diagnostic::ProbeFailed { room_id, .. }
            | Diagnostic::WentLive { room_id, .. }
            | Diagnostic::WentOffline { room_id }
            | Diagnostic::EventDropped { room_id, .. }
            | Diagnostic::CaptureSuperseded { room_id }
            | Diagnostic::CaptureCancelled { room_id }
            | Diagnostic::AcquireFailed { room_id, .. }
            | Diagnostic::RetriesExhausted { room_id, .. }
            | Diagnostic::CaptureStarted { room_id }
            | Diagnostic::CloseFailed { room_id, .. } => Some(*room_id),
            Diagnostic::FfmpegStarted { .. }
            | Diagnostic::FfmpegFailed { .. }
            | Diagnostic::StreamsClosed { .. } => None,
        }
    }

    /// Severity the occurrence is logged at.
    pub fn level(&self) -> Level {
        match self {
            Diagnostic::ProbeFailed { .. }
            | Diagnostic::EventDropped { .. }
            | Diagnostic::AcquireFailed { .. } => Level::WARN,
            Diagnostic::RetriesExhausted { .. } | Diagnostic::FfmpegFailed { .. } => Level::ERROR,
            Diagnostic::CaptureSuperseded { .. }
            | Diagnostic::CaptureCancelled { .. }
            | Diagnostic::CloseFailed { .. }
            | Diagnostic::StreamsClosed { .. } => Level::DEBUG,
            _ => Level::INFO,
        }
    }
}

/// Receiver of [`Diagnostic`]s.
///
/// Called from polling and capture tasks; implementations must be cheap and
/// must not block.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: &Diagnostic<'_>);
}

/// Sink that forwards diagnostics to `tracing` with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: &Diagnostic<'_>) {
        match diagnostic {
            Diagnostic::WatchStarted { room_id } => {
                tracing::info!(room_id = room_id.as_i64(), "monitor: watching room");
            }
            Diagnostic::WatchStopped { room_id } => {
                tracing::info!(room_id = room_id.as_i64(), "monitor: stopped watching room");
            }
            Diagnostic::ProbeFailed { room_id, error } => {
                tracing::warn!(room_id = room_id.as_i64(), error = %error, "monitor: failed to get room info");
            }
            Diagnostic::WentLive { room_id, title } => {
                tracing::info!(room_id = room_id.as_i64(), title = %title, "monitor: room went live");
            }
            Diagnostic::WentOffline { room_id } => {
                tracing::info!(room_id = room_id.as_i64(), "monitor: room went offline");
            }
            Diagnostic::EventDropped { origin, room_id, kind } => {
                tracing::warn!(
                    room_id = room_id.as_i64(),
                    kind = %kind,
                    "{}: subscriber channel full, dropping event",
                    origin
                );
            }
            Diagnostic::CaptureSuperseded { room_id } => {
                tracing::debug!(room_id = room_id.as_i64(), "client: replacing running capture");
            }
            Diagnostic::CaptureCancelled { room_id } => {
                tracing::debug!(room_id = room_id.as_i64(), "client: capture cancelled");
            }
            Diagnostic::AcquireFailed { room_id, attempt, error } => {
                tracing::warn!(
                    room_id = room_id.as_i64(),
                    attempt = *attempt,
                    error = %error,
                    "client: capture attempt failed"
                );
            }
            Diagnostic::RetriesExhausted { room_id, attempts } => {
                tracing::error!(
                    room_id = room_id.as_i64(),
                    attempts = *attempts,
                    "client: exhausted capture retries"
                );
            }
            Diagnostic::CaptureStarted { room_id } => {
                tracing::info!(room_id = room_id.as_i64(), "client: audio capture started");
            }
            Diagnostic::CloseFailed { room_id, error } => {
                tracing::debug!(
                    room_id = room_id.as_i64(),
                    error = %error,
                    "client: failed to close abandoned stream"
                );
            }
            Diagnostic::FfmpegStarted { locator } => {
                tracing::info!(stream_url_prefix = %locator, "capture: ffmpeg started");
            }
            Diagnostic::FfmpegFailed { status, stderr } => {
                tracing::error!(status = %status, stderr = %stderr, "capture: ffmpeg exited with error");
            }
            Diagnostic::StreamsClosed { origin } => {
                tracing::debug!("{}: subscriber channels closed", origin);
            }
        }
    }
}
