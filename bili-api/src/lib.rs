//! # bili-api
//!
//! A small async client for the public Bilibili live-room endpoints.
//!
//! Only the three calls needed to watch a room are covered: resolving a short
//! room id, fetching room metadata (including the live status) and fetching
//! a playable stream URL for a room that is currently live.
//!
//! ```rust,ignore
//! use bili_api::LiveApiClient;
//!
//! let client = LiveApiClient::new()?;
//! let room_id = client.resolve_room_id(21452505).await?;
//! let info = client.get_room_info(room_id).await?;
//! println!("{} live={}", info.title, info.is_live());
//! ```

mod client;
mod error;
mod types;

pub use client::{LiveApiClient, LiveApiClientBuilder, DEFAULT_BASE_URL, REFERER, USER_AGENT};
pub use error::{ApiError, Result};
pub use types::{LiveStatus, RoomId, RoomInfo};
