//! Per-room task bookkeeping with cancellation
//!
//! Both the monitor's polling tasks and the client's capture tasks are
//! tracked here: one control record per room, holding the task's
//! cancellation token. Every structural change goes through one mutex; the
//! tasks themselves run outside of it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bili_api::RoomId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Control record kept for a running task.
#[derive(Debug)]
struct TaskControl {
    token: CancellationToken,
    generation: u64,
}

/// Handed to a newly registered task.
#[derive(Debug, Clone)]
pub struct TaskTicket {
    pub room_id: RoomId,
    /// Cancelled when the task must stop
    pub token: CancellationToken,
    /// Distinguishes this task from earlier or later ones for the same room
    pub generation: u64,
}

/// Registry of at most one cancellable task per room.
#[derive(Debug, Default)]
pub struct TaskSupervisor {
    tasks: Mutex<HashMap<RoomId, TaskControl>>,
    next_generation: AtomicU64,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task for `room_id` unless one is already registered.
    ///
    /// The task's token is a child of `scope`, so ending the scope cancels it.
    pub fn start_if_absent(&self, room_id: RoomId, scope: &CancellationToken) -> Option<TaskTicket> {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&room_id) {
            return None;
        }

        let ticket = self.issue(room_id, scope);
        tasks.insert(room_id, ticket.control());
        Some(ticket)
    }

    /// Register a task for `room_id`, cancelling any task already registered.
    ///
    /// Returns the new ticket and whether a previous task was superseded.
    pub fn replace(&self, room_id: RoomId, scope: &CancellationToken) -> (TaskTicket, bool) {
        let mut tasks = self.tasks.lock();
        let ticket = self.issue(room_id, scope);

        let superseded = match tasks.insert(room_id, ticket.control()) {
            Some(previous) => {
                previous.token.cancel();
                true
            }
            None => false,
        };

        (ticket, superseded)
    }

    /// Cancel and forget the task for `room_id`. Unknown rooms are ignored.
    pub fn cancel(&self, room_id: RoomId) -> bool {
        match self.tasks.lock().remove(&room_id) {
            Some(control) => {
                control.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a finished task without cancelling anything.
    ///
    /// Only removes the record if it still belongs to the given generation,
    /// so a task that was superseded cannot evict its successor.
    pub fn release(&self, room_id: RoomId, generation: u64) -> bool {
        let mut tasks = self.tasks.lock();
        match tasks.get(&room_id) {
            Some(control) if control.generation == generation => {
                tasks.remove(&room_id);
                true
            }
            _ => false,
        }
    }

    /// Cancel and forget every task. Returns how many were registered.
    pub fn cancel_all(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let count = tasks.len();
        for (_, control) in tasks.drain() {
            control.token.cancel();
        }
        count
    }

    pub fn contains(&self, room_id: RoomId) -> bool {
        self.tasks.lock().contains_key(&room_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Rooms with a registered task, in ascending order.
    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.tasks.lock().keys().copied().collect();
        rooms.sort();
        rooms
    }

    fn issue(&self, room_id: RoomId, scope: &CancellationToken) -> TaskTicket {
        TaskTicket {
            room_id,
            token: scope.child_token(),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl TaskTicket {
    fn control(&self) -> TaskControl {
        TaskControl {
            token: self.token.clone(),
            generation: self.generation,
        }
    }
}
