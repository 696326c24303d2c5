//! Collaborator traits for room status, stream URLs and audio capture
//!
//! The monitor and stream client only talk to the outside world through
//! these traits. [`bili_api::LiveApiClient`] implements the first two and
//! [`crate::FfmpegOpener`] the third; tests substitute scripted versions.

use async_trait::async_trait;
use bili_api::{ApiError, LiveApiClient, RoomId};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::config::CaptureConfig;
use crate::error::{CaptureError, SourceError};
use crate::types::RoomStatus;

/// Reports the current status of a room.
///
/// Must be safe to call concurrently for different rooms. Errors are treated
/// as transient.
#[async_trait]
pub trait RoomProber: Send + Sync {
    async fn probe(&self, room_id: RoomId) -> Result<RoomStatus, SourceError>;
}

/// Resolves a playable stream URL for a live room.
#[async_trait]
pub trait LocatorResolver: Send + Sync {
    async fn resolve(&self, room_id: RoomId) -> Result<String, SourceError>;
}

/// Opens a PCM byte stream for a stream URL.
#[async_trait]
pub trait StreamOpener: Send + Sync {
    /// Start decoding `locator` into PCM.
    ///
    /// Cancelling `cancel` must force the returned stream's underlying
    /// process (if any) to stop.
    async fn open(
        &self,
        locator: &str,
        config: &CaptureConfig,
        cancel: CancellationToken,
    ) -> Result<Box<dyn ByteStream>, CaptureError>;
}

/// Sequentially readable audio stream with an explicit close.
#[async_trait]
pub trait ByteStream: AsyncRead + Send + Unpin {
    /// Release the stream and anything backing it.
    ///
    /// Calling it again after the first time does nothing.
    async fn close(&mut self) -> Result<(), CaptureError>;
}

#[async_trait]
impl RoomProber for LiveApiClient {
    async fn probe(&self, room_id: RoomId) -> Result<RoomStatus, SourceError> {
        let info = self.get_room_info(room_id).await?;
        Ok(RoomStatus {
            live: info.is_live(),
            title: info.title,
        })
    }
}

#[async_trait]
impl LocatorResolver for LiveApiClient {
    async fn resolve(&self, room_id: RoomId) -> Result<String, SourceError> {
        Ok(self.get_stream_url(room_id).await?)
    }
}

/// Web API client carrying the configured SESSDATA cookie, if any.
pub(crate) fn api_client(cookie: Option<&str>) -> Result<LiveApiClient, ApiError> {
    let builder = LiveApiClient::builder();
    match cookie {
        Some(cookie) => builder.with_cookie(cookie).build(),
        None => builder.build(),
    }
}
