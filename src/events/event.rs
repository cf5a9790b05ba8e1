//! The event tagged union and the per-queue kind filter (§3, §4.7).

use bitflags::bitflags;

use crate::proc::fd_table::{ProcessFd, SystemFd};

bitflags! {
    /// Which event kinds a queue currently accepts, set by `register_listener`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventFilter: u8 {
        const READY_TO_READ = 0b01;
        const READY_TO_WRITE = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ReadyToRead,
    ReadyToWrite,
}

impl EventKind {
    pub(crate) const fn filter_bit(self) -> EventFilter {
        match self {
            EventKind::ReadyToRead => EventFilter::READY_TO_READ,
            EventKind::ReadyToWrite => EventFilter::READY_TO_WRITE,
        }
    }
}

/// An event delivered into a process's queue. `INVALID` from the source's
/// tagged union is modeled as the absence of an `Event` (an empty slot),
/// rather than as a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ReadyToRead { bytes_available: u64, system_fd: SystemFd, process_fd: ProcessFd },
    ReadyToWrite { bytes_available: u64, system_fd: SystemFd, process_fd: ProcessFd },
}

impl Event {
    pub const fn kind(&self) -> EventKind {
        match self {
            Event::ReadyToRead { .. } => EventKind::ReadyToRead,
            Event::ReadyToWrite { .. } => EventKind::ReadyToWrite,
        }
    }

    pub const fn system_fd(&self) -> SystemFd {
        match self {
            Event::ReadyToRead { system_fd, .. } | Event::ReadyToWrite { system_fd, .. } => *system_fd,
        }
    }

    /// Returns a copy of this event with `process_fd` replaced, used when
    /// delivering the same underlying event to several subscribed processes.
    pub const fn with_process_fd(self, process_fd: ProcessFd) -> Self {
        match self {
            Event::ReadyToRead { bytes_available, system_fd, .. } => {
                Event::ReadyToRead { bytes_available, system_fd, process_fd }
            }
            Event::ReadyToWrite { bytes_available, system_fd, .. } => {
                Event::ReadyToWrite { bytes_available, system_fd, process_fd }
            }
        }
    }
}
