//! Core types for the bili-api crate.

use serde::{Deserialize, Serialize};

/// Identifier of a live room.
///
/// Rooms have a short (vanity) id and a real (long) id; the API accepts both
/// for [`crate::LiveApiClient::resolve_room_id`] but the other calls expect
/// the real one.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl RoomId {
    /// Create a new room id.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RoomId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broadcast status reported by the room info endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LiveStatus {
    /// Not broadcasting
    Offline,
    /// Broadcasting live
    Live,
    /// Replaying recorded videos in a loop
    Rotation,
    /// A status code this client does not know about
    Other(i64),
}

impl From<i64> for LiveStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => LiveStatus::Offline,
            1 => LiveStatus::Live,
            2 => LiveStatus::Rotation,
            other => LiveStatus::Other(other),
        }
    }
}

/// Metadata of a live room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub short_id: i64,
    pub uid: i64,
    pub live_status: LiveStatus,
    pub title: String,
    /// Start time of the current broadcast as formatted by the API
    pub live_time: String,
}

impl RoomInfo {
    /// Whether the room is broadcasting live right now.
    ///
    /// A room in rotation is not considered live.
    pub fn is_live(&self) -> bool {
        self.live_status == LiveStatus::Live
    }
}
