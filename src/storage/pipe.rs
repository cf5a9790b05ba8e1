//! Pipe driver: named byte FIFOs with one reader, one writer, blocking
//! semantics.
//!
//! The driver maintains a table of named buffers plus a free list of
//! reclaimed ones. Two entry points mint metadata: `open_named` for
//! `pipe:NAME` paths (read or write end selected by the caller's open
//! flags) and `lay_pipe` for an anonymous pair with a synthesised name.
//!
//! Partial writes: the source truncates a write that would overflow the
//! buffer, which silently drops bytes and contradicts FIFO ordering
//! (scenario S5 in the testable-properties list). This driver blocks until
//! space is available instead, treating a write as all-or-block, never
//! all-or-truncated.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::config::STREAM_BUFFER_CAPACITY;
use crate::events::{self, EventKind};
use crate::proc::fd_table::SystemFd;
use crate::storage::errors::{DriverError, DriverResult, DriverStatus};
use crate::storage::metadata::{DriverKind, FileMetadata, FileType};
use crate::sync::SpinLock;

/// One pipe's storage: a byte FIFO plus the waiter bookkeeping a blocking
/// read/write protocol needs. Waiters are recorded as `(pid, system_fd)` so
/// that once the resource they blocked on changes state, the pipe can tell
/// the event manager exactly which system FD became ready for each of them
/// (§4.7 rewrites `process_fd` from this per recipient).
struct PipeBuffer {
    data: [u8; STREAM_BUFFER_CAPACITY],
    offset: usize,
    read_closed: bool,
    write_closed: bool,
    readers_waiting: Vec<(u64, SystemFd)>,
    writers_waiting: Vec<(u64, SystemFd)>,
}

impl PipeBuffer {
    fn new() -> Self {
        PipeBuffer {
            data: [0u8; STREAM_BUFFER_CAPACITY],
            offset: 0,
            read_closed: false,
            write_closed: false,
            readers_waiting: Vec::new(),
            writers_waiting: Vec::new(),
        }
    }

    /// Reset to a pristine state for reuse from the free list.
    fn clear(&mut self) {
        self.data = [0u8; STREAM_BUFFER_CAPACITY];
        self.offset = 0;
        self.read_closed = false;
        self.write_closed = false;
        self.readers_waiting.clear();
        self.writers_waiting.clear();
    }

    fn both_ends_closed(&self) -> bool {
        self.read_closed && self.write_closed
    }
}

/// Which end of a pipe a given open FD represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEnd {
    Read,
    Write,
}

/// Pack a buffer index and end into the opaque `driver_data` payload.
fn pack(index: usize, end: PipeEnd) -> u64 {
    ((index as u64) << 1) | matches!(end, PipeEnd::Write) as u64
}

fn unpack(driver_data: u64) -> (usize, PipeEnd) {
    let index = (driver_data >> 1) as usize;
    let end = if driver_data & 1 == 0 { PipeEnd::Read } else { PipeEnd::Write };
    (index, end)
}

pub struct PipeDriver {
    /// name -> buffer table index, for `pipe:NAME` paths.
    named: SpinLock<BTreeMap<String, usize>>,
    buffers: SpinLock<Vec<Option<PipeBuffer>>>,
    free_list: SpinLock<Vec<usize>>,
    anon_counter: core::sync::atomic::AtomicU64,
}

pub static PIPE_DRIVER: PipeDriver = PipeDriver::new();

impl PipeDriver {
    pub const fn new() -> Self {
        PipeDriver {
            named: SpinLock::new(BTreeMap::new()),
            buffers: SpinLock::new(Vec::new()),
            free_list: SpinLock::new(Vec::new()),
            anon_counter: core::sync::atomic::AtomicU64::new(0),
        }
    }

    fn alloc_buffer(&self) -> usize {
        if let Some(index) = self.free_list.lock().pop() {
            let mut buffers = self.buffers.lock();
            buffers[index] = Some(PipeBuffer::new());
            return index;
        }
        let mut buffers = self.buffers.lock();
        buffers.push(Some(PipeBuffer::new()));
        buffers.len() - 1
    }

    fn metadata_for(&self, name: String, index: usize, end: PipeEnd) -> FileMetadata {
        FileMetadata::new(FileType::CharDevice, name, 0, DriverKind::Pipe, pack(index, end))
    }

    /// `pipe:NAME` open. `readable` selects which end this FD represents;
    /// both ends of a given name share one buffer, created on first open.
    pub fn open_named(&self, name: &str, readable: bool) -> Result<FileMetadata, DriverError> {
        let index = {
            let mut named = self.named.lock();
            if let Some(&index) = named.get(name) {
                index
            } else {
                let index = self.alloc_buffer();
                named.insert(name.to_string(), index);
                index
            }
        };
        let end = if readable { PipeEnd::Read } else { PipeEnd::Write };
        Ok(self.metadata_for(name.to_string(), index, end))
    }

    /// Mint a fresh anonymous pipe, returning `(read_metadata, write_metadata)`.
    pub fn lay_pipe(&self) -> (FileMetadata, FileMetadata) {
        let index = self.alloc_buffer();
        let n = self.anon_counter.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        let mut name = String::from("p");
        name.push_str(&itoa(n));
        (
            self.metadata_for(name.clone(), index, PipeEnd::Read),
            self.metadata_for(name, index, PipeEnd::Write),
        )
    }

    pub fn close(&self, meta: &FileMetadata) {
        let (index, end) = unpack(meta.driver_data);
        let mut buffers = self.buffers.lock();
        let should_free = if let Some(Some(buf)) = buffers.get_mut(index) {
            match end {
                PipeEnd::Read => buf.read_closed = true,
                PipeEnd::Write => buf.write_closed = true,
            }
            buf.both_ends_closed()
        } else {
            false
        };

        if should_free {
            if let Some(slot) = buffers.get_mut(index) {
                if let Some(buf) = slot.as_mut() {
                    buf.clear();
                }
                *slot = None;
            }
            drop(buffers);
            self.named.lock().retain(|_, &mut v| v != index);
            self.free_list.lock().push(index);
        }
    }

    /// Read protocol: EOF if write end closed and buffer empty; `WouldBlock`
    /// (registering `caller_pid`/`caller_sysfd`) if empty and write end still
    /// open; otherwise pop up to `out.len()` bytes FIFO-style, wake every
    /// blocked writer and post it a `ReadyToWrite` event for the space this
    /// read just freed.
    pub fn read(&self, meta: &FileMetadata, caller_pid: u64, caller_sysfd: SystemFd, out: &mut [u8]) -> DriverResult {
        let (index, _end) = unpack(meta.driver_data);
        let mut buffers = self.buffers.lock();
        let buf = buffers
            .get_mut(index)
            .and_then(|s| s.as_mut())
            .ok_or(DriverStatus::Error(DriverError::BadFd))?;

        if buf.offset == 0 {
            if buf.write_closed {
                return Ok(0);
            }
            if !buf.readers_waiting.iter().any(|(pid, _)| *pid == caller_pid) {
                buf.readers_waiting.push((caller_pid, caller_sysfd));
            }
            return Err(DriverStatus::WouldBlock);
        }

        let n = core::cmp::min(out.len(), buf.offset);
        out[..n].copy_from_slice(&buf.data[..n]);
        buf.data.copy_within(n..buf.offset, 0);
        buf.offset -= n;
        let bytes_free = (STREAM_BUFFER_CAPACITY - buf.offset) as u64;
        let writers = core::mem::take(&mut buf.writers_waiting);
        drop(buffers);

        let pids: Vec<u64> = writers.iter().map(|(pid, _)| *pid).collect();
        crate::proc::scheduler::wake_all(&pids);
        events::notify_ready(EventKind::ReadyToWrite, bytes_free, &writers);
        Ok(n as i64)
    }

    /// Write protocol: `BrokenPipe` if read end closed; `WouldBlock` if the
    /// write would overflow the buffer (all-or-block, never partial);
    /// otherwise append, wake every blocked reader and post it a
    /// `ReadyToRead` event for the data this write just made available.
    pub fn write(&self, meta: &FileMetadata, caller_pid: u64, caller_sysfd: SystemFd, data: &[u8]) -> DriverResult {
        let (index, _end) = unpack(meta.driver_data);
        let mut buffers = self.buffers.lock();
        let buf = buffers
            .get_mut(index)
            .and_then(|s| s.as_mut())
            .ok_or(DriverStatus::Error(DriverError::BadFd))?;

        if buf.read_closed {
            return Err(DriverStatus::Error(DriverError::BrokenPipe));
        }

        if buf.offset + data.len() > STREAM_BUFFER_CAPACITY {
            if !buf.writers_waiting.iter().any(|(pid, _)| *pid == caller_pid) {
                buf.writers_waiting.push((caller_pid, caller_sysfd));
            }
            return Err(DriverStatus::WouldBlock);
        }

        buf.data[buf.offset..buf.offset + data.len()].copy_from_slice(data);
        buf.offset += data.len();
        let bytes_available = buf.offset as u64;
        let readers = core::mem::take(&mut buf.readers_waiting);
        drop(buffers);

        let pids: Vec<u64> = readers.iter().map(|(pid, _)| *pid).collect();
        crate::proc::scheduler::wake_all(&pids);
        events::notify_ready(EventKind::ReadyToRead, bytes_available, &readers);
        Ok(data.len() as i64)
    }
}

/// Minimal unsigned-to-decimal-string helper; `alloc::format!` would do but
/// pulls in a heavier formatting path for a one-off counter suffix.
fn itoa(mut n: u64) -> String {
    if n == 0 {
        return String::from("0");
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(b'0' + (n % 10) as u8);
        n /= 10;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_round_trip() {
        let driver = PipeDriver::new();
        let (r, w) = driver.lay_pipe();

        assert_eq!(driver.write(&w, 1, 200, b"hello").unwrap(), 5);

        let mut buf = [0u8; 5];
        assert_eq!(driver.read(&r, 2, 100, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        driver.close(&w);
        let mut buf2 = [0u8; 5];
        assert_eq!(driver.read(&r, 2, 100, &mut buf2).unwrap(), 0);
    }

    #[test]
    fn read_before_write_blocks_then_succeeds() {
        let driver = PipeDriver::new();
        let r = driver.open_named("foo", true).unwrap();
        let w = driver.open_named("foo", false).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(driver.read(&r, 10, 100, &mut buf), Err(DriverStatus::WouldBlock));

        assert_eq!(driver.write(&w, 20, 200, b"abcd").unwrap(), 4);
        assert_eq!(driver.read(&r, 10, 100, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn write_to_closed_read_end_is_broken_pipe() {
        let driver = PipeDriver::new();
        let (r, w) = driver.lay_pipe();
        driver.close(&r);
        assert_eq!(
            driver.write(&w, 1, 200, b"x"),
            Err(DriverStatus::Error(DriverError::BrokenPipe))
        );
    }

    #[test]
    fn write_past_capacity_blocks_all_or_nothing() {
        let driver = PipeDriver::new();
        let (_r, w) = driver.lay_pipe();
        let big = alloc::vec![0xAAu8; STREAM_BUFFER_CAPACITY + 1];
        assert_eq!(driver.write(&w, 5, 200, &big), Err(DriverStatus::WouldBlock));
    }

    #[test]
    fn fifo_ordering_preserved_across_multiple_writes() {
        let driver = PipeDriver::new();
        let (r, w) = driver.lay_pipe();
        driver.write(&w, 1, 200, b"AB").unwrap();
        driver.write(&w, 1, 200, b"CD").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(driver.read(&r, 2, 100, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"ABCD");
    }

    #[test]
    fn write_wakes_blocked_reader_and_posts_ready_to_read_event() {
        let pid = crate::proc::scheduler::spawn("pipe-waiter", None, [0, 0, 0]).unwrap();
        crate::events::register_listener(EventKind::ReadyToRead, pid);
        crate::proc::scheduler::with_process(pid, |p| {
            p.event_queues.push(crate::events::EventQueue::new(0, EventKind::ReadyToRead.filter_bit()));
        });

        let driver = PipeDriver::new();
        let (r, w) = driver.lay_pipe();

        let mut buf = [0u8; 5];
        let reader_sysfd = 7;
        assert_eq!(driver.read(&r, pid, reader_sysfd, &mut buf), Err(DriverStatus::WouldBlock));

        crate::proc::scheduler::with_process(pid, |p| {
            p.fd_table.install_at(3, reader_sysfd);
        });

        assert_eq!(driver.write(&w, 99, 200, b"hello").unwrap(), 5);

        let event = crate::proc::scheduler::with_process(pid, |p| p.event_queues[0].pop())
            .flatten()
            .expect("reader's queue should have received a ReadyToRead event");
        match event {
            crate::events::Event::ReadyToRead { bytes_available, system_fd, process_fd } => {
                assert_eq!(bytes_available, 5);
                assert_eq!(system_fd, reader_sysfd);
                assert_eq!(process_fd, 3);
            }
            other => panic!("expected ReadyToRead, got {other:?}"),
        }
    }

    #[test]
    fn double_close_returns_buffer_to_free_list() {
        let driver = PipeDriver::new();
        let (r, w) = driver.lay_pipe();
        driver.close(&r);
        driver.close(&w);
        assert_eq!(driver.free_list.lock().len(), 1);
    }
}
