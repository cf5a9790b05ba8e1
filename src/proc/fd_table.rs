//! Per-process file descriptor table: process FD → system FD.
//!
//! A dense array of small integers, matching the source's `ProcessFileDescriptor`
//! domain. FDs 0/1/2 are populated by the scheduler at process creation with
//! stdin/stdout/stderr; everything past that is handed out lowest-free-slot.

use crate::config::MAX_FDS;

/// A process-local file descriptor.
pub type ProcessFd = u32;

/// An index into the kernel-global open-file table.
pub type SystemFd = usize;

#[derive(Clone, Copy)]
pub struct ProcessFdTable {
    slots: [Option<SystemFd>; MAX_FDS],
}

impl ProcessFdTable {
    pub const fn new() -> Self {
        ProcessFdTable { slots: [None; MAX_FDS] }
    }

    /// Installs `system_fd` at the lowest free process FD, or `None` if the
    /// table is full.
    pub fn install(&mut self, system_fd: SystemFd) -> Option<ProcessFd> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(system_fd);
                return Some(i as ProcessFd);
            }
        }
        None
    }

    /// Installs `system_fd` at an explicit process FD, failing if already occupied.
    /// Used at process creation to pin stdin/stdout/stderr to FDs 0/1/2.
    pub fn install_at(&mut self, process_fd: ProcessFd, system_fd: SystemFd) -> bool {
        match self.slots.get_mut(process_fd as usize) {
            Some(slot @ None) => {
                *slot = Some(system_fd);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, process_fd: ProcessFd) -> Option<SystemFd> {
        self.slots.get(process_fd as usize).copied().flatten()
    }

    /// Clears the slot, returning the system FD that had occupied it (the
    /// caller is responsible for dropping the corresponding open-file-table
    /// reference count).
    pub fn remove(&mut self, process_fd: ProcessFd) -> Option<SystemFd> {
        self.slots.get_mut(process_fd as usize)?.take()
    }

    /// Linear scan for the process FD currently backed by `system_fd`, used
    /// by the event manager to rewrite an event's `process_fd` per recipient.
    pub fn sysfd_to_procfd(&self, system_fd: SystemFd) -> Option<ProcessFd> {
        self.slots
            .iter()
            .position(|slot| *slot == Some(system_fd))
            .map(|i| i as ProcessFd)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcessFd, SystemFd)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|sysfd| (i as ProcessFd, sysfd)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_picks_lowest_free_slot() {
        let mut table = ProcessFdTable::new();
        assert_eq!(table.install(10), Some(0));
        assert_eq!(table.install(11), Some(1));
        table.remove(0);
        assert_eq!(table.install(12), Some(0));
    }

    #[test]
    fn install_at_rejects_occupied_slot() {
        let mut table = ProcessFdTable::new();
        assert!(table.install_at(1, 99));
        assert!(!table.install_at(1, 100));
        assert_eq!(table.get(1), Some(99));
    }

    #[test]
    fn sysfd_to_procfd_finds_matching_entry() {
        let mut table = ProcessFdTable::new();
        table.install_at(0, 5);
        table.install_at(3, 7);
        assert_eq!(table.sysfd_to_procfd(7), Some(3));
        assert_eq!(table.sysfd_to_procfd(42), None);
    }
}
