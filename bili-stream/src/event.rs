//! Events published by the stream client.

use std::sync::Arc;

use bili_api::RoomId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::broadcast::Broadcast;
use crate::error::AcquireError;
use crate::sources::ByteStream;
use crate::types::RoomEvent;

/// Kind of a [`StreamEvent`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EventKind {
    Live,
    Offline,
    AudioReady,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Live => "live",
            EventKind::Offline => "offline",
            EventKind::AudioReady => "audio_ready",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the [`crate::StreamClient`].
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Room went live.
    Live { room_id: RoomId, title: String },

    /// Room went offline. Any capture for it has been cancelled.
    Offline { room_id: RoomId, title: String },

    /// Audio capture started for a live room.
    AudioReady {
        room_id: RoomId,
        title: String,
        audio: AudioStream,
    },

    /// A capture attempt failed. More attempts may follow.
    Error {
        room_id: RoomId,
        title: String,
        error: Arc<AcquireError>,
    },
}

impl StreamEvent {
    pub fn room_id(&self) -> RoomId {
        match self {
            StreamEvent::Live { room_id, .. }
            | StreamEvent::Offline { room_id, .. }
            | StreamEvent::AudioReady { room_id, .. }
            | StreamEvent::Error { room_id, .. } => *room_id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            StreamEvent::Live { title, .. }
            | StreamEvent::Offline { title, .. }
            | StreamEvent::AudioReady { title, .. }
            | StreamEvent::Error { title, .. } => title.as_str(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Live { .. } => EventKind::Live,
            StreamEvent::Offline { .. } => EventKind::Offline,
            StreamEvent::AudioReady { .. } => EventKind::AudioReady,
            StreamEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Audio handle of an `AudioReady` event.
    pub fn audio(&self) -> Option<&AudioStream> {
        match self {
            StreamEvent::AudioReady { audio, .. } => Some(audio),
            _ => None,
        }
    }

    /// Error of an `Error` event.
    pub fn error(&self) -> Option<&AcquireError> {
        match self {
            StreamEvent::Error { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl Broadcast for StreamEvent {
    fn room_id(&self) -> RoomId {
        StreamEvent::room_id(self)
    }

    fn kind(&self) -> &'static str {
        StreamEvent::kind(self).as_str()
    }
}

impl Broadcast for RoomEvent {
    fn room_id(&self) -> RoomId {
        self.room_id
    }

    fn kind(&self) -> &'static str {
        if self.live {
            "room_live"
        } else {
            "room_offline"
        }
    }
}

/// Handle to a running audio capture.
///
/// Every subscriber receives a clone of the same handle; the byte stream
/// itself can be taken by exactly one of them with [`AudioStream::take_reader`].
/// Whoever takes it is responsible for closing it. Cancelling the handle
/// (or the room going offline, or the watch scope ending) stops the capture
/// process regardless.
#[derive(Clone)]
pub struct AudioStream {
    room_id: RoomId,
    reader: Arc<Mutex<Option<Box<dyn ByteStream>>>>,
    cancel: CancellationToken,
}

impl AudioStream {
    pub fn new(room_id: RoomId, reader: Box<dyn ByteStream>, cancel: CancellationToken) -> Self {
        Self {
            room_id,
            reader: Arc::new(Mutex::new(Some(reader))),
            cancel,
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Claim the PCM byte stream. Returns `None` if it was already claimed.
    pub fn take_reader(&self) -> Option<Box<dyn ByteStream>> {
        self.reader.lock().take()
    }

    /// Stop the capture and release its process.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("room_id", &self.room_id)
            .field("claimed", &self.reader.lock().is_none())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
