//! The process record (§3): identity, FD table, event queues, saved
//! register state, and the memory regions mapped in on `exec`.

use alloc::string::String;
use alloc::vec::Vec;

use crate::events::EventQueue;
use crate::mm::PhysAddr;
use crate::proc::fd_table::ProcessFdTable;

/// Callee-saved register state, opaque to everything but the (out-of-scope)
/// context-switch trampoline. Layout mirrors the source's `CpuContext`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CpuContext {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub rsp: u64,
}

impl CpuContext {
    pub const fn new() -> Self {
        CpuContext { r15: 0, r14: 0, r13: 0, r12: 0, rbp: 0, rbx: 0, rsp: 0 }
    }
}

/// One `PT_LOAD` segment mapped into a process's address space by `exec`
/// (§4.6, §6). Page-table programming itself is out of scope; this is the
/// data record `boot::elf::load_elf` populates.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    pub vaddr_start: u64,
    pub len: u64,
    pub frames: Vec<PhysAddr>,
    pub writable: bool,
    pub executable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Ready,
    Blocked,
    Sleeping,
    Dead,
}

/// Why a process is currently Blocked or Sleeping. Recorded so the resource
/// that eventually satisfies it knows what value to hand `unblock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    WaitingForRead { fd: u32 },
    WaitingForWrite { fd: u32 },
    WaitingForAccept { fd: u32 },
    Sleeping { wake_tick: u64 },
    WaitingForChild { pid: u64 },
}

pub struct Process {
    pub pid: u64,
    pub parent: Option<u64>,
    pub name: String,
    pub state: ProcessState,
    pub block_reason: Option<BlockReason>,
    /// Bookkeeping value stashed by the most recent `unblock`. For
    /// driver-mediated blocks (`WaitingForRead/Write/Accept`) this is purely
    /// diagnostic — the retried syscall recomputes the real return value by
    /// calling the driver again. For `Sleeping`/`WaitingForChild`, where there
    /// is no driver to re-consult, this is the value the resuming syscall uses.
    pub last_wake_value: i64,
    pub fd_table: ProcessFdTable,
    pub event_queues: Vec<EventQueue>,
    pub context: CpuContext,
    pub memory_regions: Vec<MemoryRegion>,
    pub exit_status: Option<i64>,
    /// Backing store for the `pwd` syscall. Every process starts rooted at `/`;
    /// there is no `chdir` in the fixed syscall table (§4.8) to change it.
    pub cwd: String,
}

impl Process {
    pub fn new(pid: u64, parent: Option<u64>, name: String) -> Self {
        Process {
            pid,
            parent,
            name,
            state: ProcessState::Ready,
            block_reason: None,
            last_wake_value: 0,
            fd_table: ProcessFdTable::new(),
            event_queues: Vec::new(),
            context: CpuContext::new(),
            memory_regions: Vec::new(),
            exit_status: None,
            cwd: String::from("/"),
        }
    }

    /// Resolves the process FD currently pointing at `system_fd`, used by the
    /// event manager to rewrite `process_fd` per recipient at delivery time.
    pub fn sysfd_to_procfd(&self, system_fd: usize) -> Option<u32> {
        self.fd_table.sysfd_to_procfd(system_fd)
    }
}
