//! # bili-stream
//!
//! Watches Bilibili live rooms for offline/live transitions and, when a room
//! goes live, starts an ffmpeg audio capture for it with retry and backoff.
//!
//! The crate has two layers:
//!
//! - [`Monitor`] runs one polling task per room and publishes a [`RoomEvent`]
//!   whenever a room's live status changes.
//! - [`StreamClient`] sits on top of a monitor, turns room events into
//!   [`StreamEvent`]s and manages one supervised capture task per live room.
//!
//! Both publish to any number of bounded subscriber streams. Delivery never
//! blocks: a subscriber whose buffer is full misses that event.
//!
//! ```rust,ignore
//! use bili_stream::{ClientConfig, RoomId, StreamClient, StreamEvent};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = StreamClient::new(ClientConfig::default())?;
//! let scope = CancellationToken::new();
//! let mut events = client.subscribe(&scope, [RoomId::new(21452505)])?;
//!
//! while let Some(event) = events.recv().await {
//!     if let StreamEvent::AudioReady { audio, .. } = event {
//!         let reader = audio.take_reader();
//!         // read PCM from reader
//!     }
//! }
//! ```

mod broadcast;
mod capture;
mod client;
mod config;
mod diagnostics;
mod error;
mod event;
pub mod logging;
mod monitor;
mod retry;
mod sources;
mod supervisor;
mod types;

pub use broadcast::{Broadcast, Broadcaster, Delivery, EventStream};
pub use capture::{truncate_locator, FfmpegOpener, FfmpegStream};
pub use client::{StreamClient, StreamClientBuilder};
pub use config::{CaptureConfig, ClientConfig, MonitorConfig, SampleFormat};
pub use diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
pub use error::{AcquireError, CaptureError, Result, SourceError, StreamError};
pub use event::{AudioStream, EventKind, StreamEvent};
pub use monitor::Monitor;
pub use retry::RetryPolicy;
pub use sources::{ByteStream, LocatorResolver, RoomProber, StreamOpener};
pub use supervisor::{TaskSupervisor, TaskTicket};
pub use types::{LiveState, RoomEvent, RoomStatus};

pub use bili_api::RoomId;
