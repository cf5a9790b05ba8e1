//! Input driver: the keyboard-to-stdin byte stream.
//!
//! Same shape as the pipe driver (fixed buffer, FIFO discipline, a waiter
//! list) but asymmetric: reads block on empty, writes never block. The
//! producer is the keyboard interrupt path, which must never be made to
//! wait — on overflow a write silently truncates rather than blocking,
//! matching `original_source/kernel/src/storage/filesystem_drivers/input.cpp`
//! (the pipe redesign in §9 does not apply here: there is no writer to
//! block, only an ISR that must always complete).

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::config::STREAM_BUFFER_CAPACITY;
use crate::events::{self, EventKind};
use crate::proc::fd_table::SystemFd;
use crate::storage::errors::{DriverError, DriverResult, DriverStatus};
use crate::storage::metadata::{DriverKind, FileMetadata, FileType};
use crate::sync::SpinLock;

struct InputBuffer {
    data: [u8; STREAM_BUFFER_CAPACITY],
    offset: usize,
    readers_waiting: Vec<(u64, SystemFd)>,
}

impl InputBuffer {
    fn new() -> Self {
        InputBuffer {
            data: [0u8; STREAM_BUFFER_CAPACITY],
            offset: 0,
            readers_waiting: Vec::new(),
        }
    }
}

pub struct InputDriver {
    /// name -> buffer table index, so repeated `open("stdin")` calls share one stream.
    named: SpinLock<BTreeMap<String, usize>>,
    buffers: SpinLock<Vec<InputBuffer>>,
}

pub static INPUT_DRIVER: InputDriver = InputDriver::new();

impl InputDriver {
    pub const fn new() -> Self {
        InputDriver {
            named: SpinLock::new(BTreeMap::new()),
            buffers: SpinLock::new(Vec::new()),
        }
    }

    /// `open(path)`: returns the existing stream's metadata if already opened
    /// under this name, otherwise mints a fresh buffer.
    pub fn open(&self, name: &str) -> Result<FileMetadata, DriverError> {
        let index = {
            let mut named = self.named.lock();
            if let Some(&index) = named.get(name) {
                index
            } else {
                let mut buffers = self.buffers.lock();
                buffers.push(InputBuffer::new());
                let index = buffers.len() - 1;
                named.insert(name.to_string(), index);
                index
            }
        };
        Ok(FileMetadata::new(
            FileType::CharDevice,
            name.to_string(),
            STREAM_BUFFER_CAPACITY as u64,
            DriverKind::Input,
            index as u64,
        ))
    }

    pub fn close(&self, _meta: &FileMetadata) {
        // A single shared stdin stream outlives any one FD; nothing to release.
    }

    /// Blocks (registering `caller_pid`/`caller_sysfd`) when the stream is
    /// empty; otherwise pops up to `out.len()` bytes FIFO-style.
    pub fn read(&self, meta: &FileMetadata, caller_pid: u64, caller_sysfd: SystemFd, out: &mut [u8]) -> DriverResult {
        let index = meta.driver_data as usize;
        let mut buffers = self.buffers.lock();
        let buf = buffers.get_mut(index).ok_or(DriverStatus::Error(DriverError::BadFd))?;

        if buf.offset == 0 {
            if !buf.readers_waiting.iter().any(|(pid, _)| *pid == caller_pid) {
                buf.readers_waiting.push((caller_pid, caller_sysfd));
            }
            return Err(DriverStatus::WouldBlock);
        }

        let n = core::cmp::min(out.len(), buf.offset);
        out[..n].copy_from_slice(&buf.data[..n]);
        buf.data.copy_within(n..buf.offset, 0);
        buf.offset -= n;
        Ok(n as i64)
    }

    /// Never blocks. The keyboard ISR calls this; on overflow, truncates to
    /// remaining capacity rather than waiting, then wakes and notifies every
    /// pending reader that data is now available.
    pub fn write(&self, meta: &FileMetadata, data: &[u8]) -> DriverResult {
        let index = meta.driver_data as usize;
        let mut buffers = self.buffers.lock();
        let buf = buffers.get_mut(index).ok_or(DriverStatus::Error(DriverError::BadFd))?;

        let room = STREAM_BUFFER_CAPACITY - buf.offset;
        let n = core::cmp::min(room, data.len());
        buf.data[buf.offset..buf.offset + n].copy_from_slice(&data[..n]);
        buf.offset += n;
        let bytes_available = buf.offset as u64;

        let readers = core::mem::take(&mut buf.readers_waiting);
        drop(buffers);
        let pids: Vec<u64> = readers.iter().map(|(pid, _)| *pid).collect();
        crate::proc::scheduler::wake_all(&pids);
        events::notify_ready(EventKind::ReadyToRead, bytes_available, &readers);

        Ok(n as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_on_empty_stream_blocks() {
        let driver = InputDriver::new();
        let meta = driver.open("stdin").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(driver.read(&meta, 1, 100, &mut buf), Err(DriverStatus::WouldBlock));
    }

    #[test]
    fn write_never_blocks_and_read_sees_it() {
        let driver = InputDriver::new();
        let meta = driver.open("stdin").unwrap();
        assert_eq!(driver.write(&meta, b"hi").unwrap(), 2);

        let mut buf = [0u8; 2];
        assert_eq!(driver.read(&meta, 1, 100, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn write_wakes_blocked_reader_and_posts_ready_to_read_event() {
        let pid = crate::proc::scheduler::spawn("input-waiter", None, [0, 0, 0]).unwrap();
        crate::events::register_listener(EventKind::ReadyToRead, pid);
        crate::proc::scheduler::with_process(pid, |p| {
            p.event_queues.push(crate::events::EventQueue::new(0, EventKind::ReadyToRead.filter_bit()));
        });

        let driver = InputDriver::new();
        let meta = driver.open("stdin").unwrap();
        let reader_sysfd = 5;
        let mut buf = [0u8; 2];
        assert_eq!(driver.read(&meta, pid, reader_sysfd, &mut buf), Err(DriverStatus::WouldBlock));
        crate::proc::scheduler::with_process(pid, |p| {
            p.fd_table.install_at(3, reader_sysfd);
        });

        assert_eq!(driver.write(&meta, b"hi").unwrap(), 2);

        let event = crate::proc::scheduler::with_process(pid, |p| p.event_queues[0].pop())
            .flatten()
            .expect("reader's queue should have received a ReadyToRead event");
        match event {
            crate::events::Event::ReadyToRead { bytes_available, system_fd, process_fd } => {
                assert_eq!(bytes_available, 2);
                assert_eq!(system_fd, reader_sysfd);
                assert_eq!(process_fd, 3);
            }
            other => panic!("expected ReadyToRead, got {other:?}"),
        }
    }

    #[test]
    fn write_past_capacity_truncates_instead_of_blocking() {
        let driver = InputDriver::new();
        let meta = driver.open("stdin").unwrap();
        let big = alloc::vec![0x41u8; STREAM_BUFFER_CAPACITY + 10];
        assert_eq!(driver.write(&meta, &big).unwrap(), STREAM_BUFFER_CAPACITY as i64);
    }

    #[test]
    fn repeated_open_shares_the_same_stream() {
        let driver = InputDriver::new();
        let a = driver.open("stdin").unwrap();
        let b = driver.open("stdin").unwrap();
        assert_eq!(a.driver_data, b.driver_data);
    }
}
