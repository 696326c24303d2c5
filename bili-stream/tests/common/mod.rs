//! Scripted collaborators for integration testing.
//!
//! - `ScriptedProber` replays a per-room list of probe results
//! - `ScriptedResolver` replays stream URL results
//! - `MockOpener` hands out in-memory PCM streams, optionally failing first
//! - `RecordingSink` keeps the name of every diagnostic
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bili_stream::{
    ByteStream, CaptureConfig, CaptureError, ClientConfig, Diagnostic, DiagnosticSink,
    LocatorResolver, MonitorConfig, RoomId, RoomProber, RoomStatus, SourceError, StreamClient,
    StreamOpener,
};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

pub const INTERVAL: Duration = Duration::from_secs(10);

/// One scripted probe result.
#[derive(Debug, Clone)]
pub enum Probe {
    Live(&'static str),
    Offline,
    Fail,
}

struct RoomScript {
    steps: VecDeque<Probe>,
    last: RoomStatus,
}

/// Prober that replays scripted results per room.
///
/// Once a room's script runs out, the last successful status repeats.
/// Unscripted rooms are offline.
#[derive(Default)]
pub struct ScriptedProber {
    rooms: Mutex<HashMap<RoomId, RoomScript>>,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, room_id: i64, steps: impl IntoIterator<Item = Probe>) -> Self {
        self.rooms.lock().insert(
            RoomId::new(room_id),
            RoomScript {
                steps: steps.into_iter().collect(),
                last: RoomStatus::offline(""),
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoomProber for ScriptedProber {
    async fn probe(&self, room_id: RoomId) -> Result<RoomStatus, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut rooms = self.rooms.lock();
        let Some(script) = rooms.get_mut(&room_id) else {
            return Ok(RoomStatus::offline(""));
        };

        match script.steps.pop_front() {
            Some(Probe::Live(title)) => script.last = RoomStatus::live(title),
            Some(Probe::Offline) => script.last = RoomStatus::offline(script.last.title.clone()),
            Some(Probe::Fail) => {
                return Err(SourceError::Unavailable("scripted probe failure".to_string()))
            }
            None => {}
        }
        Ok(script.last.clone())
    }
}

/// Resolver that fails a fixed number of times, then succeeds.
pub struct ScriptedResolver {
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    pub fn failing(times: usize) -> Self {
        Self {
            failures: AtomicUsize::new(times),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocatorResolver for ScriptedResolver {
    async fn resolve(&self, room_id: RoomId) -> Result<String, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SourceError::Unavailable(format!("room {} not ready", room_id)));
        }
        Ok(format!("https://cdn.test/live/{}.flv", room_id))
    }
}

/// Opener producing in-memory streams of a fixed payload.
#[derive(Default)]
pub struct MockOpener {
    opened: Mutex<Vec<String>>,
    tokens: Mutex<Vec<CancellationToken>>,
    closed: Arc<AtomicUsize>,
    failures: AtomicUsize,
    cancel_on_open: bool,
    fail_close: bool,
}

pub const PCM: &[u8] = &[1, 0, 2, 0, 3, 0, 4, 0];

impl MockOpener {
    /// Fails the first `times` opens, then succeeds.
    pub fn failing(times: usize) -> Self {
        Self {
            failures: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    /// Cancels the token it is handed, then returns a stream anyway.
    pub fn cancelling() -> Self {
        Self {
            cancel_on_open: true,
            ..Self::default()
        }
    }

    /// Streams report an error when closed.
    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Cancellation tokens handed to `open`, in call order.
    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().clone()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamOpener for MockOpener {
    async fn open(
        &self,
        locator: &str,
        _config: &CaptureConfig,
        cancel: CancellationToken,
    ) -> Result<Box<dyn ByteStream>, CaptureError> {
        self.opened.lock().push(locator.to_string());
        self.tokens.lock().push(cancel.clone());

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CaptureError::Unavailable(format!("{} refused", locator)));
        }

        if self.cancel_on_open {
            cancel.cancel();
        }

        Ok(Box::new(MockByteStream {
            data: Cursor::new(PCM.to_vec()),
            closed: Arc::clone(&self.closed),
            is_closed: false,
            fail_close: self.fail_close,
        }))
    }
}

pub struct MockByteStream {
    data: Cursor<Vec<u8>>,
    closed: Arc<AtomicUsize>,
    is_closed: bool,
    fail_close: bool,
}

impl AsyncRead for MockByteStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}

#[async_trait]
impl ByteStream for MockByteStream {
    async fn close(&mut self) -> Result<(), CaptureError> {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(CaptureError::Unavailable("broken pipe".to_string()));
            }
        }
        Ok(())
    }
}

/// Sink remembering the name of every diagnostic.
#[derive(Default)]
pub struct RecordingSink {
    names: Mutex<Vec<&'static str>>,
}

impl RecordingSink {
    pub fn count(&self, name: &str) -> usize {
        self.names.lock().iter().filter(|n| **n == name).count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, diagnostic: &Diagnostic<'_>) {
        self.names.lock().push(diagnostic.name());
    }
}

pub fn monitor_config() -> MonitorConfig {
    MonitorConfig::new().with_interval(INTERVAL)
}

pub fn client_config() -> ClientConfig {
    ClientConfig::new().with_interval(INTERVAL)
}

/// Client wired to scripted collaborators.
pub fn client(
    config: ClientConfig,
    prober: ScriptedProber,
    resolver: Arc<ScriptedResolver>,
    opener: Arc<MockOpener>,
    sink: Arc<RecordingSink>,
) -> StreamClient {
    StreamClient::builder()
        .with_config(config)
        .with_prober(Arc::new(prober))
        .with_resolver(resolver)
        .with_opener(opener)
        .with_sink(sink)
        .build()
        .expect("client with scripted collaborators")
}
