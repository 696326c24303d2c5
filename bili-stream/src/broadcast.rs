//! Non-blocking fan-out to bounded subscriber channels
//!
//! A [`Broadcaster`] owns a growable list of bounded outboxes. Publishing
//! writes to each outbox with `try_send`: a full outbox drops that event for
//! that subscriber only and reports it to the diagnostic sink. The producer
//! never waits on a subscriber.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bili_api::RoomId;
use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::StreamError;

/// Events that can be fanned out by a [`Broadcaster`].
pub trait Broadcast: Clone + Send + 'static {
    /// Room the event is about (for drop diagnostics).
    fn room_id(&self) -> RoomId;

    /// Short event kind name (for drop diagnostics).
    fn kind(&self) -> &'static str;
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct Delivery {
    /// Subscribers that received the event
    pub delivered: usize,
    /// Subscribers whose channel was full
    pub dropped: usize,
    /// Subscribers that had already gone away
    pub disconnected: usize,
}

struct Outboxes<T> {
    senders: Vec<mpsc::Sender<T>>,
    closed: bool,
}

/// Fan-out of events to any number of bounded subscriber channels.
pub struct Broadcaster<T> {
    /// Name of the owning component, used in diagnostics
    origin: &'static str,
    outboxes: RwLock<Outboxes<T>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl<T: Broadcast> Broadcaster<T> {
    pub fn new(origin: &'static str, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            origin,
            outboxes: RwLock::new(Outboxes {
                senders: Vec::new(),
                closed: false,
            }),
            sink,
        }
    }

    /// Attach a new subscriber with the given channel capacity.
    ///
    /// Fails when the capacity is zero or the broadcaster was closed.
    pub fn subscribe(&self, capacity: usize) -> Result<EventStream<T>, StreamError> {
        if capacity == 0 {
            return Err(StreamError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        let mut outboxes = self.outboxes.write();
        if outboxes.closed {
            return Err(StreamError::Closed);
        }

        // Subscribers that dropped their stream are pruned here rather than on publish.
        outboxes.senders.retain(|sender| !sender.is_closed());

        let (sender, receiver) = mpsc::channel(capacity);
        outboxes.senders.push(sender);
        Ok(EventStream::new(receiver))
    }

    /// Deliver an event to every subscriber without waiting.
    pub fn publish(&self, event: T) -> Delivery {
        let outboxes = self.outboxes.read();
        let mut delivery = Delivery::default();

        for sender in &outboxes.senders {
            match sender.try_send(event.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(dropped)) => {
                    delivery.dropped += 1;
                    self.sink.record(&Diagnostic::EventDropped {
                        origin: self.origin,
                        room_id: dropped.room_id(),
                        kind: dropped.kind(),
                    });
                }
                Err(TrySendError::Closed(_)) => delivery.disconnected += 1,
            }
        }

        delivery
    }

    /// Close every subscriber channel.
    ///
    /// Subscribers still receive what is already buffered, then the end of
    /// the stream. Later subscribe calls fail with [`StreamError::Closed`].
    pub fn close(&self) {
        let mut outboxes = self.outboxes.write();
        outboxes.closed = true;
        outboxes.senders.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.outboxes.read().closed
    }

    /// Number of attached subscribers, including ones that went away since
    /// the last subscribe.
    pub fn subscriber_count(&self) -> usize {
        self.outboxes.read().senders.len()
    }
}

/// Read side of a subscription.
///
/// Ends once the owning component closes it (the watch scope ended).
/// Implements [`futures::Stream`] for use with stream combinators.
#[derive(Debug)]
pub struct EventStream<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> EventStream<T> {
    fn new(receiver: mpsc::Receiver<T>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event; `None` once the stream is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn into_inner(self) -> mpsc::Receiver<T> {
        self.receiver
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
