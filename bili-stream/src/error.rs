//! Error types for the bili-stream crate.

use bili_api::{ApiError, RoomId};

/// Errors returned synchronously by [`crate::Monitor`] and
/// [`crate::StreamClient`] when a watch cannot be set up.
///
/// Failures of individual rooms never surface here; they are reported as
/// [`crate::StreamEvent::Error`] events or diagnostics instead.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Invalid configuration provided, or an event stream could not be allocated
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `watch`/`subscribe` was already called on this instance
    #[error("Watch already started on this instance")]
    AlreadyStarted,

    /// The watch scope has ended and no more subscribers can be attached
    #[error("Event stream already closed")]
    Closed,

    /// The default API client could not be created
    #[error("API client error: {0}")]
    Api(#[from] ApiError),
}

/// Errors from the room status and stream URL collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The web API call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The source could not answer for another reason
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Errors from starting or closing an audio capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The capture process could not be started
    #[error("Failed to start ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    /// The capture process did not expose the expected pipe
    #[error("ffmpeg {0} pipe unavailable")]
    MissingPipe(&'static str),

    /// The capture process exited with a failure status
    #[error("ffmpeg exited with {status}: {stderr}")]
    Exited {
        /// Exit status as reported by the OS
        status: String,
        /// Captured standard error output
        stderr: String,
    },

    /// I/O error while talking to the capture process
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The opener could not produce a stream for another reason
    #[error("Capture unavailable: {0}")]
    Unavailable(String),
}

/// A failed attempt to acquire audio for a live room.
///
/// This is what subscribers see in [`crate::StreamEvent::Error`].
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// The stream URL could not be resolved
    #[error("Failed to get stream URL for room {room_id}: {source}")]
    Resolve {
        room_id: RoomId,
        #[source]
        source: SourceError,
    },

    /// The audio capture could not be started
    #[error("Failed to start capture for room {room_id}: {source}")]
    Capture {
        room_id: RoomId,
        #[source]
        source: CaptureError,
    },
}

impl AcquireError {
    /// Room the failed attempt belonged to.
    pub fn room_id(&self) -> RoomId {
        match self {
            AcquireError::Resolve { room_id, .. } | AcquireError::Capture { room_id, .. } => *room_id,
        }
    }
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;
