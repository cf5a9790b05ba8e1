//! Process records and the scheduler (§3, §4.6): PIDs, FD tables, event
//! queues, and the block/unblock machinery that backs every blocking driver
//! call in `storage::*`.

pub mod fd_table;
pub mod process;
pub mod scheduler;

pub use process::{BlockReason, CpuContext, MemoryRegion, Process, ProcessState};
