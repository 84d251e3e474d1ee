//! Cycle-paced event scheduling for the emulator.
//!
//! The CPU core reports how many cycles each `cycle()` call consumed; the
//! machine advances an [`EventQueue`] by that amount and drains due events
//! (timer ticks, channel completions). Payloads are an enum owned by the
//! caller, dispatched in a pump loop.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// Identifier returned by [`EventQueue::schedule`], usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<T> {
    pub deadline: u64,
    pub payload: T,
    pub id: EventId,
}

#[derive(Debug)]
pub struct EventQueue<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    cancelled: HashSet<EventId>,
    now: u64,
    next_id: u64,
}

#[derive(Debug)]
struct Entry<T> {
    deadline: u64,
    id: EventId,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.id).cmp(&(other.deadline, other.id))
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            now: 0,
            next_id: 0,
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Move simulated time forward by `cycles`.
    pub fn advance(&mut self, cycles: u64) {
        self.now += cycles;
    }

    /// Arm an event `delay` cycles from now.
    pub fn schedule(&mut self, delay: u64, payload: T) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.heap.push(Reverse(Entry {
            deadline: self.now + delay,
            id,
            payload,
        }));
        id
    }

    /// Cancel a previously scheduled event. Harmless if already fired.
    pub fn cancel(&mut self, id: EventId) {
        self.cancelled.insert(id);
    }

    /// Pop the next event whose deadline has passed, if any.
    pub fn pop_due(&mut self) -> Option<Event<T>> {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.deadline > self.now {
                return None;
            }
            let Reverse(entry) = self.heap.pop()?;
            if self.cancelled.remove(&entry.id) {
                continue;
            }
            return Some(Event {
                deadline: entry.deadline,
                payload: entry.payload,
                id: entry.id,
            });
        }
        None
    }
}
