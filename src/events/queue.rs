//! Per-process event queue: a bounded ring plus a kind filter (§3).

use alloc::vec::Vec;

use crate::config::EVENT_QUEUE_CAPACITY;
use crate::events::event::{Event, EventFilter, EventKind};

#[derive(Clone)]
pub struct EventQueue {
    pub id: u64,
    filter: EventFilter,
    ring: Vec<Option<Event>>,
    head: usize,
    count: usize,
}

impl EventQueue {
    pub fn new(id: u64, filter: EventFilter) -> Self {
        EventQueue {
            id,
            filter,
            ring: alloc::vec![None; EVENT_QUEUE_CAPACITY],
            head: 0,
            count: 0,
        }
    }

    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> EventFilter {
        self.filter
    }

    pub fn accepts(&self, kind: EventKind) -> bool {
        self.filter.contains(kind.filter_bit())
    }

    /// Pushes an event onto the tail. Returns `false` (event dropped) if the
    /// ring is already full — a slow consumer loses the oldest-available
    /// slot's worth of notifications rather than blocking the notifier.
    pub fn push(&mut self, event: Event) -> bool {
        if self.count == self.ring.len() {
            return false;
        }
        let tail = (self.head + self.count) % self.ring.len();
        self.ring[tail] = Some(event);
        self.count += 1;
        true
    }

    pub fn pop(&mut self) -> Option<Event> {
        if self.count == 0 {
            return None;
        }
        let event = self.ring[self.head].take();
        self.head = (self.head + 1) % self.ring.len();
        self.count -= 1;
        event
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_fifo() {
        let mut q = EventQueue::new(1, EventFilter::READY_TO_READ);
        q.push(Event::ReadyToRead { bytes_available: 1, system_fd: 0, process_fd: 0 });
        q.push(Event::ReadyToRead { bytes_available: 2, system_fd: 0, process_fd: 0 });
        assert_eq!(q.pop(), Some(Event::ReadyToRead { bytes_available: 1, system_fd: 0, process_fd: 0 }));
        assert_eq!(q.pop(), Some(Event::ReadyToRead { bytes_available: 2, system_fd: 0, process_fd: 0 }));
        assert!(q.pop().is_none());
    }

    #[test]
    fn filter_rejects_unregistered_kinds() {
        let q = EventQueue::new(1, EventFilter::READY_TO_READ);
        assert!(q.accepts(EventKind::ReadyToRead));
        assert!(!q.accepts(EventKind::ReadyToWrite));
    }

    #[test]
    fn push_past_capacity_is_dropped_not_overwritten() {
        let mut q = EventQueue::new(1, EventFilter::READY_TO_READ);
        for _ in 0..EVENT_QUEUE_CAPACITY {
            assert!(q.push(Event::ReadyToRead { bytes_available: 0, system_fd: 0, process_fd: 0 }));
        }
        assert!(!q.push(Event::ReadyToRead { bytes_available: 99, system_fd: 0, process_fd: 0 }));
    }
}
