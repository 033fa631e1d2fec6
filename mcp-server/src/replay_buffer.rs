//! Bounded per-session ring of serialized SSE events.
//!
//! Event IDs are strictly monotonic within a session. When the ring is
//! full the oldest entry is dropped; a reconnect asking for anything older
//! than the retained range is a lost session (the stream answers 404 and
//! the client must reinitialize).

use std::collections::VecDeque;

pub struct ReplayBuffer {
    events: VecDeque<(u64, String)>,
    capacity: usize,
    next_id: u64,
    /// Highest event ID already evicted from the head; 0 when none.
    evicted_through: u64,
}

pub enum Replay {
    /// Buffered events with ID greater than the requested watermark.
    Events(Vec<(u64, String)>),
    /// The watermark predates the retained range.
    Lost,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            next_id: 1,
            evicted_through: 0,
        }
    }

    /// Append one serialized envelope, assigning its event ID.
    pub fn push(&mut self, payload: String) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if self.events.len() == self.capacity
            && let Some((evicted_id, _)) = self.events.pop_front()
        {
            self.evicted_through = evicted_id;
        }
        self.events.push_back((id, payload));
        id
    }

    /// Everything after `last_event_id`, in order, or `Lost` when eviction
    /// already ate part of the requested range.
    pub fn since(&self, last_event_id: u64) -> Replay {
        if last_event_id < self.evicted_through {
            return Replay::Lost;
        }
        Replay::Events(
            self.events
                .iter()
                .filter(|(id, _)| *id > last_event_id)
                .cloned()
                .collect(),
        )
    }

    pub fn last_id(&self) -> u64 {
        self.next_id - 1
    }
}
