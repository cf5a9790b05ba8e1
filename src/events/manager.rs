//! Event fan-out (§4.7). Purely bookkeeping: `notify` does not itself wake
//! any process (the driver that produced the event already did that via
//! `scheduler::wake_all`); it only delivers a record of what happened to
//! whichever queues asked to hear about it.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::events::event::{Event, EventKind};
use crate::proc::fd_table::SystemFd;
use crate::sync::SpinLock;

/// `EventKind` itself isn't `Ord`; key the map on its discriminant instead of
/// pulling in a derive that would ripple into `Event`'s public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKindKey(u8);

impl From<EventKind> for EventKindKey {
    fn from(kind: EventKind) -> Self {
        EventKindKey(match kind {
            EventKind::ReadyToRead => 0,
            EventKind::ReadyToWrite => 1,
        })
    }
}

pub struct EventManager {
    listeners: BTreeMap<EventKindKey, Vec<u64>>,
}

impl EventManager {
    pub const fn new() -> Self {
        EventManager { listeners: BTreeMap::new() }
    }

    pub fn register_listener(&mut self, kind: EventKind, pid: u64) {
        let pids = self.listeners.entry(kind.into()).or_insert_with(Vec::new);
        if !pids.contains(&pid) {
            pids.push(pid);
        }
    }

    pub fn unregister_listener(&mut self, kind: EventKind, pid: u64) {
        if let Some(pids) = self.listeners.get_mut(&EventKindKey::from(kind)) {
            pids.retain(|&p| p != pid);
        }
    }

    fn subscribers(&self, kind: EventKind) -> Vec<u64> {
        self.listeners.get(&EventKindKey::from(kind)).cloned().unwrap_or_default()
    }

    fn prune(&mut self, kind: EventKind, stale: &[u64]) {
        if let Some(pids) = self.listeners.get_mut(&EventKindKey::from(kind)) {
            pids.retain(|p| !stale.contains(p));
        }
    }

    /// Delivers `event` to every process subscribed to its kind, via
    /// `deliver(pid, event) -> bool` (did some queue of that process accept
    /// it). A subscriber for which `deliver` returns `false` is pruned.
    pub fn notify(&mut self, event: Event, mut deliver: impl FnMut(u64, Event) -> bool) {
        let kind = event.kind();
        let candidates = self.subscribers(kind);
        if candidates.is_empty() {
            return;
        }

        let mut stale = Vec::new();
        for pid in candidates {
            if !deliver(pid, event) {
                stale.push(pid);
            }
        }
        if !stale.is_empty() {
            self.prune(kind, &stale);
        }
    }
}

static MANAGER: SpinLock<EventManager> = SpinLock::new(EventManager::new());

pub fn register_listener(kind: EventKind, pid: u64) {
    MANAGER.lock().register_listener(kind, pid);
}

pub fn unregister_listener(kind: EventKind, pid: u64) {
    MANAGER.lock().unregister_listener(kind, pid);
}

/// Delivers `event` to every process subscribed to its kind. For each
/// recipient, the event's `process_fd` is rewritten from `system_fd` at the
/// moment of delivery (each process has its own FD for the same system FD).
///
/// A recipient is considered to have accepted the event (and so stays a
/// subscriber) as long as it has at least one queue with this kind enabled,
/// regardless of whether *this* event's `system_fd` happens to be one of
/// its own open FDs — registration is global per event kind (§4.7), not
/// per-resource, so a process subscribed to `READY_TO_READ` on one pipe must
/// not be pruned just because some other pipe's writer fired the event
/// first. A recipient with no FD for `system_fd` gets `process_fd =
/// u32::MAX` instead of a skipped delivery.
pub fn notify(event: Event) {
    MANAGER.lock().notify(event, |pid, event| {
        crate::proc::scheduler::with_process(pid, |process| {
            let process_fd = process.sysfd_to_procfd(event.system_fd()).unwrap_or(u32::MAX);
            let rewritten = event.with_process_fd(process_fd);
            let mut any = false;
            for queue in process.event_queues.iter_mut() {
                if queue.accepts(event.kind()) {
                    queue.push(rewritten);
                    any = true;
                }
            }
            any
        })
        .unwrap_or(false)
    });
}

/// Notifies every distinct system FD among `waiters` (pid, system_fd pairs
/// taken off a resource's waiter list) that it's now ready for `kind`.
/// Deduplicated by system FD, not by PID: PIDs that share one system FD
/// (siblings after `fork`, both still mapping the same open file) collapse
/// to a single `notify` call, since `notify` itself already fans that one
/// event out to every subscribed queue that can resolve the FD — one call
/// per PID here would double-deliver to them (§8 S6: one write, one event
/// per subscribed queue).
pub fn notify_ready(kind: EventKind, bytes_available: u64, waiters: &[(u64, SystemFd)]) {
    let mut notified: Vec<SystemFd> = Vec::new();
    for &(_, system_fd) in waiters {
        if notified.contains(&system_fd) {
            continue;
        }
        notified.push(system_fd);
        let event = match kind {
            EventKind::ReadyToRead => Event::ReadyToRead { bytes_available, system_fd, process_fd: 0 },
            EventKind::ReadyToWrite => Event::ReadyToWrite { bytes_available, system_fd, process_fd: 0 },
        };
        notify(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregister_removes_listener() {
        let mut manager = EventManager::new();
        manager.register_listener(EventKind::ReadyToRead, 42);
        manager.unregister_listener(EventKind::ReadyToRead, 42);
        assert!(manager.subscribers(EventKind::ReadyToRead).is_empty());
    }

    #[test]
    fn register_is_idempotent() {
        let mut manager = EventManager::new();
        manager.register_listener(EventKind::ReadyToWrite, 7);
        manager.register_listener(EventKind::ReadyToWrite, 7);
        assert_eq!(manager.subscribers(EventKind::ReadyToWrite), alloc::vec![7]);
    }

    #[test]
    fn notify_prunes_subscribers_that_do_not_accept_it() {
        let mut manager = EventManager::new();
        manager.register_listener(EventKind::ReadyToRead, 1);
        manager.register_listener(EventKind::ReadyToRead, 2);

        let event = Event::ReadyToRead { bytes_available: 4, system_fd: 9, process_fd: 0 };
        manager.notify(event, |pid, _| pid == 1);

        assert_eq!(manager.subscribers(EventKind::ReadyToRead), alloc::vec![1]);
    }

    #[test]
    fn notify_on_kind_with_no_subscribers_is_a_no_op() {
        let mut manager = EventManager::new();
        let event = Event::ReadyToWrite { bytes_available: 0, system_fd: 0, process_fd: 0 };
        manager.notify(event, |_, _| panic!("deliver should not be called"));
    }
}
