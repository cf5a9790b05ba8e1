//! Compile-time kernel configuration constants.

/// PIT tick rate. Drives scheduler preemption and `Sleeping{wake_tick}` resolution.
pub const SCHED_HZ: u64 = 1000;

/// Size of a pipe/input byte buffer, in bytes. The source uses 512; we keep one
/// page so a buffer occupies exactly one physical frame.
pub const STREAM_BUFFER_CAPACITY: usize = 4096;

/// Per-process event queue ring capacity.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Maximum open process FDs, matching the dense small-integer FD table.
pub const MAX_FDS: usize = 256;

/// Maximum number of simultaneously live processes.
pub const MAX_PROCESSES: usize = 256;

/// Total syscall table slot count (external contract, ABI-fixed numbers 0-5).
pub const NUM_SYSCALLS: usize = 32;

/// Socket address opaque payload length.
pub const SOCKET_ADDR_LEN: usize = 16;

/// Maximum pending connections queued on a listening socket before `accept`.
pub const SOCKET_BACKLOG_MAX: usize = 32;
