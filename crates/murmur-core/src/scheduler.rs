//! Time-ordered queue of pending messages.
//!
//! Every [`ScheduledEvent`] targets one outlet of one unit and carries the
//! absolute time at which it leaves that outlet. The queue keeps events sorted
//! by timestamp; events sharing a timestamp stay in insertion order.
//!
//! Insertion is a linear scan from the back. Typical queues hold a handful of
//! events, so this beats a heap in practice. A binary heap keyed on
//! `(timestamp, sequence)` would keep the same contract if deep queues ever
//! show up.

use std::collections::VecDeque;
use std::fmt;

use crate::message::Message;
use crate::unit::UnitId;

/// Identity of a scheduled event, used to cancel it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId(u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// A message waiting to leave `outlet` of `target`.
#[derive(Clone, Debug)]
pub struct ScheduledEvent {
    /// Identity assigned at insertion.
    pub id: EventId,
    /// Unit whose outlet emits the message.
    pub target: UnitId,
    /// Outlet index on `target`.
    pub outlet: usize,
    /// Payload; its timestamp orders the queue.
    pub message: Message,
}

impl ScheduledEvent {
    /// Delivery time in milliseconds.
    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.message.timestamp()
    }
}

/// Stable, timestamp-ordered event queue.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<ScheduledEvent>,
    next_id: u64,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty queue with room for `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            next_id: 0,
        }
    }

    /// Inserts `message` for `target`'s `outlet`, after every event with an
    /// equal or earlier timestamp.
    ///
    /// A NaN timestamp is restamped to negative infinity, so the event is due
    /// in the next block and delivered at its start.
    pub fn insert(&mut self, target: UnitId, outlet: usize, mut message: Message) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        if message.timestamp().is_nan() {
            message.set_timestamp(f64::NEG_INFINITY);
        }
        let timestamp = message.timestamp();
        let pos = self
            .events
            .iter()
            .rposition(|e| e.timestamp() <= timestamp)
            .map_or(0, |i| i + 1);
        self.events.insert(
            pos,
            ScheduledEvent {
                id,
                target,
                outlet,
                message,
            },
        );
        id
    }

    /// Removes the event with identity `id`, if it is still pending for
    /// `target`'s `outlet`.
    pub fn remove(&mut self, target: UnitId, outlet: usize, id: EventId) -> Option<ScheduledEvent> {
        let pos = self
            .events
            .iter()
            .position(|e| e.id == id && e.target == target && e.outlet == outlet)?;
        self.events.remove(pos)
    }

    /// Drops every event aimed at `target`. Returns how many were dropped.
    pub fn remove_unit(&mut self, target: UnitId) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.target != target);
        before - self.events.len()
    }

    /// The earliest pending event.
    pub fn peek(&self) -> Option<&ScheduledEvent> {
        self.events.front()
    }

    /// Removes and returns the earliest pending event.
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.events.pop_front()
    }

    /// Removes and returns the earliest event if it is due before `end`.
    pub fn pop_before(&mut self, end: f64) -> Option<ScheduledEvent> {
        if self.peek()?.timestamp() < end {
            self.pop()
        } else {
            None
        }
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops every pending event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Iterates pending events in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.events.iter()
    }
}
