//! The global scheduler: process table, run queue, block/unblock, fork/exit.
//!
//! Adapted from the source's `SchedState`/`TASK_TABLE` pair: a fixed-capacity
//! circular run queue of PIDs (`RunQueue`, directly modeled on `TaskQueue`)
//! plus a process table. Unlike the source's raw-pointer `TaskPtr` array, the
//! table is a `Vec<Option<Process>>` guarded by a spinlock, matching the
//! free-list-of-`Option<T>` idiom already used for pipe and socket buffers
//! elsewhere in this crate — there is no hard reason to avoid the heap here
//! since, unlike the source, this kernel always has one online before any
//! process exists.
//!
//! Real context switching (saving/restoring `CpuContext`, the naked-asm
//! trampoline) is arch plumbing out of scope here (§1); this module models
//! only the data-structure half of scheduling — which PID is current, which
//! are ready, which are blocked and why.

use alloc::string::String;
use alloc::vec::Vec;

use crate::config::MAX_PROCESSES;
use crate::proc::process::{BlockReason, Process, ProcessState};
use crate::sync::SpinLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    TooManyProcesses,
    InvalidPid,
    RunQueueFull,
    NotBlocked,
}

/// Circular queue of ready PIDs, adapted from the source's `TaskQueue`.
struct RunQueue {
    pids: [u64; MAX_PROCESSES],
    head: usize,
    tail: usize,
    count: usize,
}

impl RunQueue {
    const fn new() -> Self {
        RunQueue { pids: [0; MAX_PROCESSES], head: 0, tail: 0, count: 0 }
    }

    fn push_back(&mut self, pid: u64) -> Result<(), SchedulerError> {
        if self.count >= MAX_PROCESSES {
            return Err(SchedulerError::RunQueueFull);
        }
        self.pids[self.tail] = pid;
        self.tail = (self.tail + 1) % MAX_PROCESSES;
        self.count += 1;
        Ok(())
    }

    fn pop_front(&mut self) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        let pid = self.pids[self.head];
        self.head = (self.head + 1) % MAX_PROCESSES;
        self.count -= 1;
        Some(pid)
    }

    fn remove(&mut self, target: u64) {
        let mut remaining = Vec::with_capacity(self.count);
        while let Some(pid) = self.pop_front() {
            if pid != target {
                remaining.push(pid);
            }
        }
        for pid in remaining {
            let _ = self.push_back(pid);
        }
    }
}

struct Scheduler {
    processes: Vec<Option<Process>>,
    run_queue: RunQueue,
    current: Option<u64>,
    next_pid: u64,
    tick: u64,
}

impl Scheduler {
    const fn new() -> Self {
        Scheduler { processes: Vec::new(), run_queue: RunQueue::new(), current: None, next_pid: 1, tick: 0 }
    }

    fn live_count(&self) -> usize {
        self.processes.iter().filter(|p| p.is_some()).count()
    }

    fn find_mut(&mut self, pid: u64) -> Option<&mut Process> {
        self.processes.iter_mut().flatten().find(|p| p.pid == pid)
    }

    fn find(&self, pid: u64) -> Option<&Process> {
        self.processes.iter().flatten().find(|p| p.pid == pid)
    }

    fn insert(&mut self, process: Process) {
        if let Some(slot) = self.processes.iter_mut().find(|p| p.is_none()) {
            *slot = Some(process);
        } else {
            self.processes.push(Some(process));
        }
    }
}

static SCHEDULER: SpinLock<Scheduler> = SpinLock::new(Scheduler::new());

/// Creates a new process with stdin/stdout/stderr pre-installed at FDs 0/1/2
/// and enqueues it as Ready. Returns its PID.
pub fn spawn(name: &str, parent: Option<u64>, stdio: [usize; 3]) -> Result<u64, SchedulerError> {
    let mut sched = SCHEDULER.lock();
    if sched.live_count() >= MAX_PROCESSES {
        return Err(SchedulerError::TooManyProcesses);
    }
    let pid = sched.next_pid;
    sched.next_pid += 1;

    let mut process = Process::new(pid, parent, String::from(name));
    for (fd, sysfd) in stdio.into_iter().enumerate() {
        process.fd_table.install_at(fd as u32, sysfd);
    }
    sched.insert(process);
    sched.run_queue.push_back(pid)?;
    Ok(pid)
}

/// Clones the parent's FD table, memory regions, and event-queue
/// registrations into a freshly enqueued child. Callers are responsible for
/// bumping the open-file table's refcounts for every FD the child inherits
/// (the scheduler has no knowledge of the VFS).
pub fn fork(parent_pid: u64) -> Result<u64, SchedulerError> {
    let mut sched = SCHEDULER.lock();
    if sched.live_count() >= MAX_PROCESSES {
        return Err(SchedulerError::TooManyProcesses);
    }
    let parent = sched.find(parent_pid).ok_or(SchedulerError::InvalidPid)?;
    let mut child = Process::new(sched.next_pid, Some(parent_pid), parent.name.clone());
    child.fd_table = parent.fd_table;
    child.memory_regions = parent.memory_regions.clone();
    child.event_queues = parent.event_queues.clone();
    child.cwd = parent.cwd.clone();

    let child_pid = child.pid;
    sched.next_pid += 1;
    sched.insert(child);
    sched.run_queue.push_back(child_pid)?;
    Ok(child_pid)
}

/// Returns the child's inherited FD table, for the caller to walk and bump
/// open-file-table refcounts against (see `fork` above).
pub fn fd_table_of(pid: u64) -> Option<crate::proc::fd_table::ProcessFdTable> {
    SCHEDULER.lock().find(pid).map(|p| p.fd_table)
}

pub fn current_pid() -> Option<u64> {
    SCHEDULER.lock().current
}

/// The PIT tick count observed so far, for computing a `Sleeping{wake_tick}`
/// target from a `sleep(ticks)` syscall.
pub fn current_tick() -> u64 {
    SCHEDULER.lock().tick
}

/// Alias used by `log`/`panic`, which don't otherwise depend on scheduler internals.
pub fn current_pid_for_log() -> Option<u64> {
    current_pid()
}

/// Runs `f` against the process record for `pid`, if it still exists.
pub fn with_process<R>(pid: u64, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
    let mut sched = SCHEDULER.lock();
    sched.find_mut(pid).map(f)
}

/// Moves the currently-running process to Blocked (or Sleeping, for
/// `BlockReason::Sleeping`) and records why. Returns the blocked PID.
pub fn block_current(reason: BlockReason) -> Result<u64, SchedulerError> {
    let mut sched = SCHEDULER.lock();
    let pid = sched.current.ok_or(SchedulerError::InvalidPid)?;
    let sleeping = matches!(reason, BlockReason::Sleeping { .. });
    let process = sched.find_mut(pid).ok_or(SchedulerError::InvalidPid)?;
    process.state = if sleeping { ProcessState::Sleeping } else { ProcessState::Blocked };
    process.block_reason = Some(reason);
    if sched.current == Some(pid) {
        sched.current = None;
    }
    Ok(pid)
}

/// Transitions `pid` from Blocked/Sleeping back to Ready and stashes `value`
/// (see `Process::last_wake_value`). A no-op if the process is already
/// Ready/Running/Dead — wakes can race a process that already resumed.
pub fn unblock(pid: u64, value: i64) -> Result<(), SchedulerError> {
    let mut sched = SCHEDULER.lock();
    let process = sched.find_mut(pid).ok_or(SchedulerError::InvalidPid)?;
    if !matches!(process.state, ProcessState::Blocked | ProcessState::Sleeping) {
        return Ok(());
    }
    process.state = ProcessState::Ready;
    process.block_reason = None;
    process.last_wake_value = value;
    sched.run_queue.push_back(pid)
}

/// Wakes every PID in `pids`, ignoring ones that no longer exist or were
/// never blocked. Callers pass `-2` as the wake value since these are all
/// driver-mediated wakes (the retried syscall recomputes the real result).
pub fn wake_all(pids: &[u64]) {
    for &pid in pids {
        let _ = unblock(pid, -2);
    }
}

/// PIT tick: advances the tick counter, wakes any sleeper whose wake-tick has
/// arrived, and round-robins the current process out for the next Ready one.
pub fn tick() -> Option<u64> {
    let mut sched = SCHEDULER.lock();
    sched.tick += 1;
    let now = sched.tick;

    let due: Vec<u64> = sched
        .processes
        .iter()
        .flatten()
        .filter(|p| matches!(p.block_reason, Some(BlockReason::Sleeping { wake_tick }) if wake_tick <= now))
        .map(|p| p.pid)
        .collect();
    drop(sched);
    for pid in due {
        let _ = unblock(pid, 0);
    }

    schedule()
}

/// Cooperative yield: same as a preemption tick but without advancing time.
pub fn yield_now() -> Option<u64> {
    schedule()
}

fn schedule() -> Option<u64> {
    let mut sched = SCHEDULER.lock();
    if let Some(current) = sched.current.take() {
        if let Some(process) = sched.find_mut(current) {
            if process.state == ProcessState::Running {
                process.state = ProcessState::Ready;
                let _ = sched.run_queue.push_back(current);
            }
        }
    }

    loop {
        match sched.run_queue.pop_front() {
            Some(pid) => {
                let alive = match sched.find_mut(pid) {
                    Some(process) if process.state != ProcessState::Dead => {
                        process.state = ProcessState::Running;
                        true
                    }
                    _ => false,
                };
                if alive {
                    sched.current = Some(pid);
                    return Some(pid);
                }
            }
            None => return None,
        }
    }
}

/// Marks `pid` Dead, records its exit status, and wakes any process blocked
/// in `waitpid` on it. The process record (and its FD table) is kept around
/// as a zombie until `remove_process` reaps it, per §3's "a Dead process is
/// reaped before its PID is reused".
pub fn exit(pid: u64, status: i64) -> Result<(), SchedulerError> {
    let mut sched = SCHEDULER.lock();
    {
        let process = sched.find_mut(pid).ok_or(SchedulerError::InvalidPid)?;
        process.state = ProcessState::Dead;
        process.block_reason = None;
        process.exit_status = Some(status);
    }
    sched.run_queue.remove(pid);
    if sched.current == Some(pid) {
        sched.current = None;
    }

    let waiters: Vec<u64> = sched
        .processes
        .iter()
        .flatten()
        .filter(|p| p.block_reason == Some(BlockReason::WaitingForChild { pid }))
        .map(|p| p.pid)
        .collect();
    drop(sched);
    for waiter in waiters {
        let _ = unblock(waiter, status);
    }
    Ok(())
}

/// Reaps a zombie: frees its process-table slot so the PID's resources (not
/// the PID itself, which is never reused) are fully released.
pub fn remove_process(pid: u64) -> Result<(), SchedulerError> {
    let mut sched = SCHEDULER.lock();
    let slot = sched
        .processes
        .iter_mut()
        .find(|p| matches!(p, Some(process) if process.pid == pid))
        .ok_or(SchedulerError::InvalidPid)?;
    *slot = None;
    Ok(())
}

pub fn exit_status(pid: u64) -> Option<i64> {
    SCHEDULER.lock().find(pid).and_then(|p| p.exit_status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset() {
        *SCHEDULER.lock() = Scheduler::new();
    }

    #[test]
    fn spawn_installs_stdio_and_enqueues() {
        reset();
        let pid = spawn("init", None, [0, 1, 2]).unwrap();
        assert_eq!(with_process(pid, |p| p.fd_table.get(0)), Some(Some(0)));
        assert_eq!(schedule(), Some(pid));
    }

    #[test]
    fn block_then_unblock_round_trips_through_run_queue() {
        reset();
        let pid = spawn("a", None, [0, 1, 2]).unwrap();
        assert_eq!(schedule(), Some(pid));
        block_current(BlockReason::WaitingForRead { fd: 0 }).unwrap();
        assert_eq!(with_process(pid, |p| p.state), Some(ProcessState::Blocked));

        unblock(pid, -2).unwrap();
        assert_eq!(with_process(pid, |p| p.state), Some(ProcessState::Ready));
        assert_eq!(schedule(), Some(pid));
    }

    #[test]
    fn wake_all_is_a_no_op_for_processes_not_blocked() {
        reset();
        let pid = spawn("a", None, [0, 1, 2]).unwrap();
        wake_all(&[pid]);
        assert_eq!(with_process(pid, |p| p.state), Some(ProcessState::Ready));
    }

    #[test]
    fn sleeping_process_wakes_once_tick_reaches_target() {
        reset();
        let pid = spawn("a", None, [0, 1, 2]).unwrap();
        assert_eq!(schedule(), Some(pid));
        block_current(BlockReason::Sleeping { wake_tick: 3 }).unwrap();
        assert_eq!(with_process(pid, |p| p.state), Some(ProcessState::Sleeping));

        tick();
        tick();
        assert_eq!(with_process(pid, |p| p.state), Some(ProcessState::Sleeping));
        tick();
        // The tick that wakes it also immediately redispatches it, since it's the only Ready process.
        assert_eq!(with_process(pid, |p| p.state), Some(ProcessState::Running));
    }

    #[test]
    fn exit_wakes_waitpid_blocked_parent() {
        reset();
        let parent = spawn("parent", None, [0, 1, 2]).unwrap();
        let child = fork(parent).unwrap();
        assert_eq!(schedule(), Some(parent));
        block_current(BlockReason::WaitingForChild { pid: child }).unwrap();

        exit(child, 7).unwrap();
        assert_eq!(with_process(parent, |p| p.state), Some(ProcessState::Ready));
        assert_eq!(exit_status(child), Some(7));

        remove_process(child).unwrap();
        assert!(with_process(child, |p| p.pid).is_none());
    }

    #[test]
    fn fork_clones_parent_fd_table() {
        reset();
        let parent = spawn("parent", None, [0, 1, 2]).unwrap();
        let child = fork(parent).unwrap();
        assert_eq!(with_process(child, |p| p.fd_table.get(1)), Some(Some(1)));
    }
}
