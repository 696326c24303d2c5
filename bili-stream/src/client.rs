//! Stream client: room transitions plus supervised audio capture
//!
//! The client subscribes to its [`Monitor`], republishes every transition as
//! a [`StreamEvent`] and, when a room goes live, runs a capture task that
//! resolves the stream URL and opens the audio stream with bounded retries.
//! At most one capture task exists per room.

use std::sync::Arc;

use bili_api::RoomId;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{Broadcaster, EventStream};
use crate::capture::FfmpegOpener;
use crate::config::ClientConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::{AcquireError, Result};
use crate::event::{AudioStream, StreamEvent};
use crate::monitor::Monitor;
use crate::sources::{api_client, ByteStream, LocatorResolver, RoomProber, StreamOpener};
use crate::supervisor::{TaskSupervisor, TaskTicket};
use crate::types::RoomEvent;

struct ClientShared {
    config: ClientConfig,
    monitor: Monitor,
    resolver: Arc<dyn LocatorResolver>,
    opener: Arc<dyn StreamOpener>,
    sink: Arc<dyn DiagnosticSink>,
    captures: TaskSupervisor,
    broadcaster: Broadcaster<StreamEvent>,
}

/// How a capture task ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum CaptureOutcome {
    Ready,
    Cancelled,
    Exhausted,
}

/// Monitors rooms and captures their audio while they are live.
///
/// Cheap to clone; clones share the same monitor, captures and subscribers.
///
/// ```rust,ignore
/// let client = StreamClient::builder()
///     .with_config(ClientConfig::default().with_interval(Duration::from_secs(15)))
///     .build()?;
/// let mut events = client.subscribe(&scope, [RoomId::new(21452505)])?;
/// ```
#[derive(Clone)]
pub struct StreamClient {
    shared: Arc<ClientShared>,
}

impl StreamClient {
    /// Client backed by the Bilibili web API and ffmpeg.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder().with_config(config).build()
    }

    pub fn builder() -> StreamClientBuilder {
        StreamClientBuilder::default()
    }

    /// Start watching `rooms` until `scope` is cancelled.
    ///
    /// The returned stream ends shortly after the scope is cancelled. Like
    /// [`Monitor::watch`], this can be called once per client.
    pub fn subscribe(
        &self,
        scope: &CancellationToken,
        rooms: impl IntoIterator<Item = RoomId>,
    ) -> Result<EventStream<StreamEvent>> {
        let shared = &self.shared;
        shared.config.validate()?;

        let room_events = shared.monitor.watch(scope, rooms)?;
        let events = shared
            .broadcaster
            .subscribe(shared.config.monitor.event_buffer_size)?;

        tokio::spawn(Arc::clone(shared).dispatch(scope.clone(), room_events));

        let closer = Arc::clone(shared);
        let scope = scope.clone();
        tokio::spawn(async move {
            scope.cancelled().await;
            closer.captures.cancel_all();

            tokio::time::sleep(closer.config.monitor.shutdown_grace).await;
            closer.broadcaster.close();
            closer.sink.record(&Diagnostic::StreamsClosed { origin: "client" });
        });

        Ok(events)
    }

    /// Attach another subscriber. It closes together with the watch scope.
    pub fn listen(&self) -> Result<EventStream<StreamEvent>> {
        self.shared
            .broadcaster
            .subscribe(self.shared.config.monitor.event_buffer_size)
    }

    /// Start watching a room; see [`Monitor::add_room`].
    pub fn add_room(&self, room_id: RoomId) {
        self.shared.monitor.add_room(room_id);
    }

    /// Stop watching a room and cancel its capture, if any.
    pub fn remove_room(&self, room_id: RoomId) {
        self.shared.monitor.remove_room(room_id);
        self.shared.captures.cancel(room_id);
    }

    /// Rooms whose capture token is still registered.
    ///
    /// This covers tasks that are still retrying and captures that delivered
    /// a stream, even if the receiver has since closed or dropped it. The
    /// entry goes away when the room goes offline or is removed, or when the
    /// scope ends.
    pub fn active_captures(&self) -> Vec<RoomId> {
        self.shared.captures.rooms()
    }

    pub fn monitor(&self) -> &Monitor {
        &self.shared.monitor
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}

impl ClientShared {
    async fn dispatch(self: Arc<Self>, scope: CancellationToken, mut room_events: EventStream<RoomEvent>) {
        loop {
            let event = tokio::select! {
                _ = scope.cancelled() => break,
                event = room_events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            self.handle_room_event(&scope, event);
        }
    }

    fn handle_room_event(self: &Arc<Self>, scope: &CancellationToken, event: RoomEvent) {
        let RoomEvent { room_id, live, title } = event;

        if live {
            self.broadcaster.publish(StreamEvent::Live {
                room_id,
                title: title.clone(),
            });

            if self.config.auto_capture {
                self.start_capture(scope, room_id, title);
            }
        } else {
            self.captures.cancel(room_id);
            self.broadcaster.publish(StreamEvent::Offline { room_id, title });
        }
    }

    fn start_capture(self: &Arc<Self>, scope: &CancellationToken, room_id: RoomId, title: String) {
        if scope.is_cancelled() {
            return;
        }

        let (ticket, superseded) = self.captures.replace(room_id, scope);
        if superseded {
            self.sink.record(&Diagnostic::CaptureSuperseded { room_id });
        }

        tokio::spawn(Arc::clone(self).run_capture(ticket, title));
    }

    async fn run_capture(self: Arc<Self>, ticket: TaskTicket, title: String) {
        let room_id = ticket.room_id;

        match self.acquire_with_retry(&ticket, &title).await {
            // The token stays registered: it owns the running stream.
            CaptureOutcome::Ready => {}
            CaptureOutcome::Cancelled => {
                self.sink.record(&Diagnostic::CaptureCancelled { room_id });
                self.captures.release(room_id, ticket.generation);
            }
            CaptureOutcome::Exhausted => {
                self.sink.record(&Diagnostic::RetriesExhausted {
                    room_id,
                    attempts: self.config.retry.max_attempts,
                });
                self.captures.release(room_id, ticket.generation);
            }
        }
    }

    async fn acquire_with_retry(&self, ticket: &TaskTicket, title: &str) -> CaptureOutcome {
        let room_id = ticket.room_id;
        let token = &ticket.token;
        let retry = &self.config.retry;

        for attempt in 0..retry.max_attempts {
            let acquired = tokio::select! {
                biased;
                _ = token.cancelled() => return CaptureOutcome::Cancelled,
                acquired = self.acquire(room_id, token) => acquired,
            };

            match acquired {
                Ok(mut reader) => {
                    if token.is_cancelled() {
                        if let Err(error) = reader.close().await {
                            self.sink.record(&Diagnostic::CloseFailed {
                                room_id,
                                error: &error,
                            });
                        }
                        return CaptureOutcome::Cancelled;
                    }

                    self.sink.record(&Diagnostic::CaptureStarted { room_id });
                    self.broadcaster.publish(StreamEvent::AudioReady {
                        room_id,
                        title: title.to_string(),
                        audio: AudioStream::new(room_id, reader, token.clone()),
                    });
                    return CaptureOutcome::Ready;
                }
                Err(error) => {
                    if token.is_cancelled() {
                        return CaptureOutcome::Cancelled;
                    }

                    self.sink.record(&Diagnostic::AcquireFailed {
                        room_id,
                        attempt: attempt + 1,
                        error: &error,
                    });
                    self.broadcaster.publish(StreamEvent::Error {
                        room_id,
                        title: title.to_string(),
                        error: Arc::new(error),
                    });
                }
            }

            if attempt + 1 == retry.max_attempts {
                break;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return CaptureOutcome::Cancelled,
                _ = tokio::time::sleep(retry.delay_for(attempt)) => {}
            }
        }

        CaptureOutcome::Exhausted
    }

    async fn acquire(
        &self,
        room_id: RoomId,
        token: &CancellationToken,
    ) -> std::result::Result<Box<dyn ByteStream>, AcquireError> {
        let locator = self
            .resolver
            .resolve(room_id)
            .await
            .map_err(|source| AcquireError::Resolve { room_id, source })?;

        self.opener
            .open(&locator, &self.config.capture, token.clone())
            .await
            .map_err(|source| AcquireError::Capture { room_id, source })
    }
}

/// Builder for [`StreamClient`] with replaceable collaborators.
///
/// Collaborators that are not set default to a [`bili_api::LiveApiClient`]
/// (carrying the configured cookie), an [`FfmpegOpener`] and a
/// [`TracingSink`].
#[derive(Default)]
pub struct StreamClientBuilder {
    config: ClientConfig,
    prober: Option<Arc<dyn RoomProber>>,
    resolver: Option<Arc<dyn LocatorResolver>>,
    opener: Option<Arc<dyn StreamOpener>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl StreamClientBuilder {
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn RoomProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn LocatorResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn StreamOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<StreamClient> {
        self.config.validate()?;

        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));

        let (prober, resolver) = match (self.prober, self.resolver) {
            (Some(prober), Some(resolver)) => (prober, resolver),
            (prober, resolver) => {
                let api = Arc::new(api_client(self.config.monitor.cookie.as_deref())?);
                (
                    prober.unwrap_or_else(|| api.clone() as Arc<dyn RoomProber>),
                    resolver.unwrap_or_else(|| api.clone() as Arc<dyn LocatorResolver>),
                )
            }
        };

        let opener = self
            .opener
            .unwrap_or_else(|| Arc::new(FfmpegOpener::new(Arc::clone(&sink))));

        let monitor = Monitor::new(self.config.monitor.clone(), prober, Arc::clone(&sink));

        Ok(StreamClient {
            shared: Arc::new(ClientShared {
                broadcaster: Broadcaster::new("client", Arc::clone(&sink)),
                config: self.config,
                monitor,
                resolver,
                opener,
                sink,
                captures: TaskSupervisor::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::error::{CaptureError, SourceError, StreamError};
    use crate::types::RoomStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NeverLive;

    #[async_trait]
    impl RoomProber for NeverLive {
        async fn probe(&self, _room_id: RoomId) -> std::result::Result<RoomStatus, SourceError> {
            Ok(RoomStatus::offline(""))
        }
    }

    /// Resolver whose calls never complete.
    #[derive(Default)]
    struct Stalled {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LocatorResolver for Stalled {
        async fn resolve(&self, _room_id: RoomId) -> std::result::Result<String, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    struct NoOpener;

    #[async_trait]
    impl StreamOpener for NoOpener {
        async fn open(
            &self,
            _locator: &str,
            _config: &CaptureConfig,
            _cancel: CancellationToken,
        ) -> std::result::Result<Box<dyn ByteStream>, CaptureError> {
            Err(CaptureError::Unavailable("no opener in this test".to_string()))
        }
    }

    fn client(resolver: Arc<Stalled>) -> StreamClient {
        StreamClient::builder()
            .with_prober(Arc::new(NeverLive))
            .with_resolver(resolver)
            .with_opener(Arc::new(NoOpener))
            .build()
            .unwrap()
    }

    fn went_live(room_id: i64) -> RoomEvent {
        RoomEvent {
            room_id: RoomId::new(room_id),
            live: true,
            title: "Demo".to_string(),
        }
    }

    #[tokio::test]
    async fn test_second_live_event_supersedes_capture() {
        let resolver = Arc::new(Stalled::default());
        let client = client(resolver.clone());
        let scope = CancellationToken::new();
        let shared = &client.shared;

        shared.handle_room_event(&scope, went_live(7));
        let first = shared.captures.rooms();
        shared.handle_room_event(&scope, went_live(7));

        assert_eq!(first, vec![RoomId::new(7)]);
        assert_eq!(client.active_captures(), vec![RoomId::new(7)]);

        for _ in 0..10 {
            if resolver.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        // The superseded task stops before reaching the resolver.
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.active_captures(), vec![RoomId::new(7)]);

        scope.cancel();
    }

    #[tokio::test]
    async fn test_offline_event_cancels_capture() {
        let client = client(Arc::new(Stalled::default()));
        let scope = CancellationToken::new();
        let shared = &client.shared;

        shared.handle_room_event(&scope, went_live(8));
        assert_eq!(client.active_captures(), vec![RoomId::new(8)]);

        shared.handle_room_event(
            &scope,
            RoomEvent {
                room_id: RoomId::new(8),
                live: false,
                title: "Demo".to_string(),
            },
        );
        assert!(client.active_captures().is_empty());

        scope.cancel();
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = StreamClient::builder()
            .with_config(ClientConfig::default().with_buffer_size(0))
            .with_prober(Arc::new(NeverLive))
            .with_resolver(Arc::new(Stalled::default()))
            .with_opener(Arc::new(NoOpener))
            .build();

        assert!(matches!(result, Err(StreamError::Configuration(_))));
    }
}
