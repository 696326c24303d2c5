//! HTTP client for the live-room endpoints

use std::time::Duration;

use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ApiError, Result};
use crate::types::{LiveStatus, RoomId, RoomInfo};

/// Desktop browser user agent; the API rejects obviously scripted clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Referer sent with every request and with stream downloads.
pub const REFERER: &str = "https://live.bilibili.com/";

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://api.live.bilibili.com";

const ROOM_INIT_PATH: &str = "/room/v1/Room/room_init";
const ROOM_INFO_PATH: &str = "/room/v1/Room/get_info";
const PLAY_URL_PATH: &str = "/room/v1/Room/playUrl";

/// Common envelope wrapping every API response.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RoomInitData {
    room_id: i64,
}

#[derive(Debug, Deserialize)]
struct RoomInfoData {
    room_id: i64,
    #[serde(default)]
    short_id: i64,
    #[serde(default)]
    uid: i64,
    live_status: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    live_time: String,
}

#[derive(Debug, Deserialize)]
struct PlayUrlData {
    #[serde(default)]
    durl: Vec<PlayUrlEntry>,
}

#[derive(Debug, Deserialize)]
struct PlayUrlEntry {
    url: String,
}

/// Async client for the live-room API.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct LiveApiClient {
    http: reqwest::Client,
    base_url: String,
    cookie: Option<String>,
}

impl LiveApiClient {
    /// Create a client against the production API with default settings.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Start configuring a client.
    pub fn builder() -> LiveApiClientBuilder {
        LiveApiClientBuilder::default()
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert a short room id to the real (long) room id.
    ///
    /// Real ids are returned unchanged by the API.
    pub async fn resolve_room_id(&self, short_id: i64) -> Result<RoomId> {
        let data: RoomInitData = self
            .get_data(ROOM_INIT_PATH, &[("id", short_id.to_string())])
            .await?;
        Ok(RoomId::new(data.room_id))
    }

    /// Fetch metadata, including the live status, for a room.
    pub async fn get_room_info(&self, room_id: RoomId) -> Result<RoomInfo> {
        let data: RoomInfoData = self
            .get_data(ROOM_INFO_PATH, &[("room_id", room_id.to_string())])
            .await?;

        Ok(RoomInfo {
            room_id: RoomId::new(data.room_id),
            short_id: data.short_id,
            uid: data.uid,
            live_status: LiveStatus::from(data.live_status),
            title: data.title,
            live_time: data.live_time,
        })
    }

    /// Fetch the FLV stream URL of a live room.
    ///
    /// Fails with [`ApiError::NoStreamUrl`] when the room is not live.
    pub async fn get_stream_url(&self, room_id: RoomId) -> Result<String> {
        let data: PlayUrlData = self
            .get_data(
                PLAY_URL_PATH,
                &[
                    ("cid", room_id.to_string()),
                    ("quality", "4".to_string()),
                    ("platform", "web".to_string()),
                ],
            )
            .await?;

        data.durl
            .into_iter()
            .next()
            .map(|entry| entry.url)
            .ok_or(ApiError::NoStreamUrl)
    }

    /// Perform a GET request and decode the `data` field of the envelope.
    async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .http
            .get(&url)
            .query(query)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::REFERER, REFERER);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, format!("SESSDATA={}", cookie));
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!("GET {} answered {}", path, status);
            return Err(ApiError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let envelope: Envelope = serde_json::from_slice(&body)?;
        if envelope.code != 0 {
            return Err(ApiError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }

        Ok(serde_json::from_value(envelope.data)?)
    }
}

/// Builder for [`LiveApiClient`].
#[derive(Debug, Clone)]
pub struct LiveApiClientBuilder {
    base_url: String,
    cookie: Option<String>,
    timeout: Duration,
}

impl Default for LiveApiClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cookie: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl LiveApiClientBuilder {
    /// Send requests to another host (used by tests against a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Authenticate requests with a SESSDATA cookie.
    ///
    /// An empty string leaves requests anonymous.
    pub fn with_cookie(mut self, sessdata: impl Into<String>) -> Self {
        let sessdata = sessdata.into();
        self.cookie = (!sessdata.is_empty()).then_some(sessdata);
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<LiveApiClient> {
        let http = reqwest::Client::builder().timeout(self.timeout).build()?;
        Ok(LiveApiClient {
            http,
            base_url: self.base_url,
            cookie: self.cookie,
        })
    }
}
