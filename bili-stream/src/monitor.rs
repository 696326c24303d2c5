//! Live/offline transition monitor
//!
//! One polling task per watched room probes its status right away and then
//! every [`MonitorConfig::interval`]. Each task keeps the room's last known
//! [`LiveState`] to itself and publishes a [`RoomEvent`] only when that state
//! changes.

use std::sync::Arc;

use bili_api::RoomId;
use parking_lot::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::broadcast::{Broadcaster, EventStream};
use crate::config::MonitorConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::{Result, StreamError};
use crate::sources::{api_client, RoomProber};
use crate::supervisor::{TaskSupervisor, TaskTicket};
use crate::types::{LiveState, RoomEvent};

enum Lifecycle {
    /// `watch` not called yet; rooms added so far
    Idle { pending: Vec<RoomId> },
    /// Polling under the given scope
    Watching { scope: CancellationToken },
}

struct MonitorShared {
    config: MonitorConfig,
    prober: Arc<dyn RoomProber>,
    sink: Arc<dyn DiagnosticSink>,
    rooms: TaskSupervisor,
    broadcaster: Broadcaster<RoomEvent>,
    lifecycle: Mutex<Lifecycle>,
}

/// Watches rooms for live/offline transitions.
///
/// Cheap to clone; clones share the same rooms and subscribers.
#[derive(Clone)]
pub struct Monitor {
    shared: Arc<MonitorShared>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        prober: Arc<dyn RoomProber>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            shared: Arc::new(MonitorShared {
                broadcaster: Broadcaster::new("monitor", Arc::clone(&sink)),
                config,
                prober,
                sink,
                rooms: TaskSupervisor::new(),
                lifecycle: Mutex::new(Lifecycle::Idle {
                    pending: Vec::new(),
                }),
            }),
        }
    }

    /// Monitor backed by the Bilibili web API, logging through `tracing`.
    pub fn from_config(config: MonitorConfig) -> Result<Self> {
        let prober = api_client(config.cookie.as_deref())?;
        Ok(Self::new(config, Arc::new(prober), Arc::new(TracingSink)))
    }

    /// Start polling `rooms` (and any rooms added earlier) until `scope` is
    /// cancelled.
    ///
    /// The returned stream ends shortly after the scope is cancelled. Can be
    /// called once per monitor; later calls fail with
    /// [`StreamError::AlreadyStarted`]. Use [`Monitor::listen`] for more
    /// subscribers.
    pub fn watch(
        &self,
        scope: &CancellationToken,
        rooms: impl IntoIterator<Item = RoomId>,
    ) -> Result<EventStream<RoomEvent>> {
        self.shared.config.validate()?;

        let mut lifecycle = self.shared.lifecycle.lock();
        let Lifecycle::Idle { pending } = &mut *lifecycle else {
            return Err(StreamError::AlreadyStarted);
        };

        let events = self
            .shared
            .broadcaster
            .subscribe(self.shared.config.event_buffer_size)?;

        let mut pending = std::mem::take(pending);
        pending.extend(rooms);
        *lifecycle = Lifecycle::Watching {
            scope: scope.clone(),
        };
        for room_id in pending {
            self.shared.start_room(room_id, scope);
        }
        drop(lifecycle);

        let shared = Arc::clone(&self.shared);
        let scope = scope.clone();
        tokio::spawn(async move {
            scope.cancelled().await;
            shared.rooms.cancel_all();

            // Let a last in-flight tick publish before the channels close.
            tokio::time::sleep(shared.config.shutdown_grace).await;
            shared.broadcaster.close();
            shared.sink.record(&Diagnostic::StreamsClosed { origin: "monitor" });
        });

        Ok(events)
    }

    /// Attach another subscriber. It closes together with the watch scope.
    pub fn listen(&self) -> Result<EventStream<RoomEvent>> {
        self.shared
            .broadcaster
            .subscribe(self.shared.config.event_buffer_size)
    }

    /// Start watching a room. Already watched rooms are ignored.
    ///
    /// Before [`Monitor::watch`] the room is queued; afterwards its polling
    /// task starts right away under the watch scope.
    pub fn add_room(&self, room_id: RoomId) {
        let mut lifecycle = self.shared.lifecycle.lock();
        match &mut *lifecycle {
            Lifecycle::Idle { pending } => {
                if !pending.contains(&room_id) {
                    pending.push(room_id);
                }
            }
            Lifecycle::Watching { scope } => {
                if !scope.is_cancelled() {
                    self.shared.start_room(room_id, scope);
                }
            }
        }
    }

    /// Stop watching a room and forget its last known state.
    ///
    /// Unknown rooms are ignored.
    pub fn remove_room(&self, room_id: RoomId) {
        let mut lifecycle = self.shared.lifecycle.lock();
        if let Lifecycle::Idle { pending } = &mut *lifecycle {
            pending.retain(|queued| *queued != room_id);
        }
        drop(lifecycle);

        self.shared.rooms.cancel(room_id);
    }

    /// Rooms with a running polling task, in ascending order.
    pub fn watched_rooms(&self) -> Vec<RoomId> {
        self.shared.rooms.rooms()
    }

    pub fn is_watching(&self, room_id: RoomId) -> bool {
        self.shared.rooms.contains(room_id)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }
}

impl MonitorShared {
    fn start_room(self: &Arc<Self>, room_id: RoomId, scope: &CancellationToken) {
        if let Some(ticket) = self.rooms.start_if_absent(room_id, scope) {
            tokio::spawn(Arc::clone(self).poll_room(ticket));
        }
    }

    async fn poll_room(self: Arc<Self>, ticket: TaskTicket) {
        let room_id = ticket.room_id;
        self.sink.record(&Diagnostic::WatchStarted { room_id });

        let mut state = LiveState::default();
        self.check_room(room_id, &mut state, &ticket.token).await;

        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticket.token.cancelled() => break,
                _ = ticker.tick() => self.check_room(room_id, &mut state, &ticket.token).await,
            }
        }

        self.rooms.release(room_id, ticket.generation);
        self.sink.record(&Diagnostic::WatchStopped { room_id });
    }

    async fn check_room(&self, room_id: RoomId, state: &mut LiveState, cancel: &CancellationToken) {
        let probed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            probed = self.prober.probe(room_id) => probed,
        };

        let status = match probed {
            Ok(status) => status,
            Err(error) => {
                if !cancel.is_cancelled() {
                    self.sink.record(&Diagnostic::ProbeFailed {
                        room_id,
                        error: &error,
                    });
                }
                return;
            }
        };

        if !state.observe(status.live) {
            return;
        }

        if status.live {
            self.sink.record(&Diagnostic::WentLive {
                room_id,
                title: &status.title,
            });
        } else {
            self.sink.record(&Diagnostic::WentOffline { room_id });
        }

        self.broadcaster.publish(RoomEvent {
            room_id,
            live: status.live,
            title: status.title,
        });
    }
}
