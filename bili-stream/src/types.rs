//! Core types for the bili-stream crate.

use bili_api::RoomId;

/// Result of probing a room's status.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RoomStatus {
    /// Whether the room is broadcasting live
    pub live: bool,
    /// Current room title
    pub title: String,
}

impl RoomStatus {
    pub fn live(title: impl Into<String>) -> Self {
        Self {
            live: true,
            title: title.into(),
        }
    }

    pub fn offline(title: impl Into<String>) -> Self {
        Self {
            live: false,
            title: title.into(),
        }
    }
}

/// A live/offline transition detected by the [`crate::Monitor`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RoomEvent {
    pub room_id: RoomId,
    /// true = went live, false = went offline
    pub live: bool,
    /// Room title at the time of the transition
    pub title: String,
}

/// Last known state of a watched room.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum LiveState {
    /// No successful probe yet
    #[default]
    Unknown,
    Offline,
    Live,
}

impl LiveState {
    /// Record a probe result and report whether it is a transition worth
    /// publishing.
    ///
    /// Steady state is never reported. A first observation is reported only
    /// when the room is already live; a room found offline on the first probe
    /// just sets the baseline.
    pub fn observe(&mut self, live: bool) -> bool {
        let next = if live { LiveState::Live } else { LiveState::Offline };
        let changed = match *self {
            LiveState::Unknown => live,
            previous => previous != next,
        };
        *self = next;
        changed
    }

    /// `None` until the first successful probe.
    pub fn is_live(&self) -> Option<bool> {
        match self {
            LiveState::Unknown => None,
            LiveState::Offline => Some(false),
            LiveState::Live => Some(true),
        }
    }
}
