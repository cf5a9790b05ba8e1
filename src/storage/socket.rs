//! Socket driver: `bind`/`listen`/`accept`/`connect` over in-kernel buffer
//! pairs. Only one address domain is defined, `LENSOR` (§4.4).
//!
//! Client and server share one `SocketBuffers` pair once connected: the
//! client reads TX and writes RX, the server reads RX and writes TX —
//! confirmed against `original_source/kernel/src/storage/filesystem_drivers/socket.cpp`,
//! whose `read`/`write` switch on `ClientServer` with exactly this crossing.

use alloc::vec::Vec;

use crate::config::{SOCKET_ADDR_LEN, SOCKET_BACKLOG_MAX, STREAM_BUFFER_CAPACITY};
use crate::events::{self, EventKind};
use crate::proc::fd_table::SystemFd;
use crate::storage::errors::{DriverError, DriverResult, DriverStatus};
use crate::storage::metadata::{DriverKind, FileMetadata, FileType};
use crate::sync::SpinLock;

/// A `LENSOR`-domain address: a type tag plus up to 16 opaque bytes.
/// Equality is byte-exact after the tag, matching the source's `SocketAddress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketAddress {
    pub tag: u8,
    pub bytes: [u8; SOCKET_ADDR_LEN],
}

impl SocketAddress {
    pub const UNBOUND: SocketAddress = SocketAddress {
        tag: 0,
        bytes: [0; SOCKET_ADDR_LEN],
    };

    pub fn from_slice(tag: u8, data: &[u8]) -> SocketAddress {
        let mut bytes = [0u8; SOCKET_ADDR_LEN];
        let n = core::cmp::min(data.len(), SOCKET_ADDR_LEN);
        bytes[..n].copy_from_slice(&data[..n]);
        SocketAddress { tag, bytes }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    Client,
    Server,
}

/// One direction of a connected socket pair: a fixed byte FIFO with waiter
/// lists, identical in shape to `pipe::PipeBuffer` minus the half-close
/// flags (a socket's lifetime is refcounted, not tracked per-end). Waiters
/// carry their system FD alongside their pid so a state change can tell
/// the event manager exactly which FD became ready for each of them.
struct SocketRing {
    data: [u8; STREAM_BUFFER_CAPACITY],
    offset: usize,
    readers_waiting: Vec<(u64, SystemFd)>,
    writers_waiting: Vec<(u64, SystemFd)>,
}

impl SocketRing {
    fn new() -> Self {
        SocketRing {
            data: [0u8; STREAM_BUFFER_CAPACITY],
            offset: 0,
            readers_waiting: Vec::new(),
            writers_waiting: Vec::new(),
        }
    }

    fn read(&mut self, caller_pid: u64, caller_sysfd: SystemFd, out: &mut [u8]) -> DriverResult {
        if self.offset == 0 {
            if !self.readers_waiting.iter().any(|(pid, _)| *pid == caller_pid) {
                self.readers_waiting.push((caller_pid, caller_sysfd));
            }
            return Err(DriverStatus::WouldBlock);
        }
        let n = core::cmp::min(out.len(), self.offset);
        out[..n].copy_from_slice(&self.data[..n]);
        self.data.copy_within(n..self.offset, 0);
        self.offset -= n;
        let bytes_free = (STREAM_BUFFER_CAPACITY - self.offset) as u64;
        let writers = core::mem::take(&mut self.writers_waiting);
        let pids: Vec<u64> = writers.iter().map(|(pid, _)| *pid).collect();
        crate::proc::scheduler::wake_all(&pids);
        events::notify_ready(EventKind::ReadyToWrite, bytes_free, &writers);
        Ok(n as i64)
    }

    fn write(&mut self, caller_pid: u64, caller_sysfd: SystemFd, data: &[u8]) -> DriverResult {
        if self.offset + data.len() > STREAM_BUFFER_CAPACITY {
            if !self.writers_waiting.iter().any(|(pid, _)| *pid == caller_pid) {
                self.writers_waiting.push((caller_pid, caller_sysfd));
            }
            return Err(DriverStatus::WouldBlock);
        }
        self.data[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        let bytes_available = self.offset as u64;
        let readers = core::mem::take(&mut self.readers_waiting);
        let pids: Vec<u64> = readers.iter().map(|(pid, _)| *pid).collect();
        crate::proc::scheduler::wake_all(&pids);
        events::notify_ready(EventKind::ReadyToRead, bytes_available, &readers);
        Ok(data.len() as i64)
    }
}

struct SocketBuffers {
    rx: SocketRing,
    tx: SocketRing,
    refcount: u32,
}

/// A pending connection, queued on a listening server until `accept` pops it.
struct PendingConnection {
    buffers: usize,
    client_addr: SocketAddress,
}

struct SocketEntry {
    role: Option<SocketRole>,
    buffers: Option<usize>,
    address: Option<SocketAddress>,
    listening: bool,
    backlog: usize,
    pending: Vec<PendingConnection>,
    accept_waiting: Vec<u64>,
}

impl SocketEntry {
    fn new() -> Self {
        SocketEntry {
            role: None,
            buffers: None,
            address: None,
            listening: false,
            backlog: 0,
            pending: Vec::new(),
            accept_waiting: Vec::new(),
        }
    }
}

pub struct SocketDriver {
    sockets: SpinLock<Vec<Option<SocketEntry>>>,
    buffers: SpinLock<Vec<Option<SocketBuffers>>>,
    /// (address, socket table index) for every bound socket. Flat list per §4.4.
    bindings: SpinLock<Vec<(SocketAddress, usize)>>,
}

pub static SOCKET_DRIVER: SocketDriver = SocketDriver::new();

impl SocketDriver {
    pub const fn new() -> Self {
        SocketDriver {
            sockets: SpinLock::new(Vec::new()),
            buffers: SpinLock::new(Vec::new()),
            bindings: SpinLock::new(Vec::new()),
        }
    }

    fn metadata_for(&self, index: usize) -> FileMetadata {
        FileMetadata::new(
            FileType::CharDevice,
            alloc::string::String::from("socket"),
            0,
            DriverKind::Socket,
            index as u64,
        )
    }

    /// `socket(domain, type, protocol)`: only `LENSOR` (tag-addressed) is defined.
    pub fn socket(&self) -> Result<FileMetadata, DriverError> {
        let mut sockets = self.sockets.lock();
        sockets.push(Some(SocketEntry::new()));
        Ok(self.metadata_for(sockets.len() - 1))
    }

    pub fn bind(&self, meta: &FileMetadata, addr: SocketAddress) -> Result<(), DriverError> {
        let index = meta.driver_data as usize;

        {
            let bindings = self.bindings.lock();
            if bindings.iter().any(|(a, _)| *a == addr) {
                return Err(DriverError::AddrInUse);
            }
        }

        let mut sockets = self.sockets.lock();
        let entry = sockets.get_mut(index).and_then(|s| s.as_mut()).ok_or(DriverError::BadFd)?;
        entry.address = Some(addr);
        drop(sockets);

        self.bindings.lock().push((addr, index));
        Ok(())
    }

    pub fn listen(&self, meta: &FileMetadata, backlog: usize) -> Result<(), DriverError> {
        let index = meta.driver_data as usize;
        let mut sockets = self.sockets.lock();
        let entry = sockets.get_mut(index).and_then(|s| s.as_mut()).ok_or(DriverError::BadFd)?;
        entry.listening = true;
        entry.backlog = core::cmp::min(backlog, SOCKET_BACKLOG_MAX);
        Ok(())
    }

    fn alloc_buffers(&self) -> usize {
        let mut buffers = self.buffers.lock();
        buffers.push(Some(SocketBuffers {
            rx: SocketRing::new(),
            tx: SocketRing::new(),
            refcount: 1,
        }));
        buffers.len() - 1
    }

    /// `connect(fd, addr, len)`: finds the listening server bound to `addr`,
    /// mints a fresh buffer pair, enqueues it for `accept`, and returns
    /// immediately (nonblocking connect, matching the source).
    pub fn connect(&self, meta: &FileMetadata, addr: SocketAddress) -> Result<(), DriverError> {
        let index = meta.driver_data as usize;
        let client_addr = {
            let sockets = self.sockets.lock();
            sockets.get(index).and_then(|s| s.as_ref()).and_then(|e| e.address).unwrap_or(SocketAddress::UNBOUND)
        };

        let server_index = {
            let bindings = self.bindings.lock();
            bindings.iter().find(|(a, _)| *a == addr).map(|(_, i)| *i)
        };
        let server_index = server_index.ok_or(DriverError::ConnectionRefused)?;

        let buffers_index = self.alloc_buffers();

        let waiters = {
            let mut sockets = self.sockets.lock();
            let server = sockets.get_mut(server_index).and_then(|s| s.as_mut()).ok_or(DriverError::ConnectionRefused)?;
            if !server.listening {
                return Err(DriverError::ConnectionRefused);
            }
            server.pending.push(PendingConnection { buffers: buffers_index, client_addr });
            core::mem::take(&mut server.accept_waiting)
        };
        // The pending queue now holds a reference to this pair, not just its
        // index: bump the refcount here so a client `close()` racing ahead of
        // `accept` can't free the pair out from under the still-queued entry.
        if let Some(Some(pair)) = self.buffers.lock().get_mut(buffers_index) {
            pair.refcount += 1;
        }
        crate::proc::scheduler::wake_all(&waiters);

        let mut sockets = self.sockets.lock();
        let entry = sockets.get_mut(index).and_then(|s| s.as_mut()).ok_or(DriverError::BadFd)?;
        entry.role = Some(SocketRole::Client);
        entry.buffers = Some(buffers_index);
        Ok(())
    }

    /// `accept(fd, out_addr, inout_len)`: `WouldBlock` if no pending
    /// connection, otherwise pops the oldest and returns a fresh metadata
    /// bound to the same buffer pair, role=Server.
    pub fn accept(&self, meta: &FileMetadata, caller_pid: u64) -> Result<(FileMetadata, SocketAddress), DriverStatus> {
        let index = meta.driver_data as usize;

        let popped = {
            let mut sockets = self.sockets.lock();
            let entry = sockets.get_mut(index).and_then(|s| s.as_mut()).ok_or(DriverStatus::Error(DriverError::BadFd))?;
            if entry.pending.is_empty() {
                if !entry.accept_waiting.contains(&caller_pid) {
                    entry.accept_waiting.push(caller_pid);
                }
                return Err(DriverStatus::WouldBlock);
            }
            entry.pending.remove(0)
        };

        // `connect` bumped the pair's refcount on this pending entry's
        // behalf, so a client `close()` racing ahead of `accept` drops the
        // count but can't free the slot out from under us. Guard anyway
        // instead of unwrapping: a freed slot here means a stale pending
        // entry, which should read as a refused connection, not a panic.
        if self.buffers.lock().get(popped.buffers).and_then(|s| s.as_ref()).is_none() {
            return Err(DriverStatus::Error(DriverError::ConnectionRefused));
        }

        let mut sockets = self.sockets.lock();
        sockets.push(Some(SocketEntry {
            role: Some(SocketRole::Server),
            buffers: Some(popped.buffers),
            address: None,
            listening: false,
            backlog: 0,
            pending: Vec::new(),
            accept_waiting: Vec::new(),
        }));
        let new_index = sockets.len() - 1;
        Ok((self.metadata_for(new_index), popped.client_addr))
    }

    pub fn close(&self, meta: &FileMetadata) {
        let index = meta.driver_data as usize;
        let mut sockets = self.sockets.lock();
        let Some(Some(entry)) = sockets.get_mut(index) else { return };
        let buffers_index = entry.buffers.take();
        let address = entry.address.take();
        let stale_pending = core::mem::take(&mut entry.pending);
        drop(sockets);

        let mut buffers = self.buffers.lock();
        for pending in stale_pending {
            self.release_buffers(&mut buffers, pending.buffers);
        }
        if let Some(bi) = buffers_index {
            let freed = self.release_buffers(&mut buffers, bi);
            if freed {
                if let Some(addr) = address {
                    self.bindings.lock().retain(|(a, _)| *a != addr);
                }
            }
        }
    }

    /// Drops one reference to the buffer pair at `bi`, freeing the slot once
    /// the count hits zero. Shared by a socket's own close and by a listening
    /// socket closing with still-unaccepted connections in its pending queue
    /// (§7: the pending queue's reference must be released if it's ever
    /// dropped without a matching `accept`).
    fn release_buffers(&self, buffers: &mut Vec<Option<SocketBuffers>>, bi: usize) -> bool {
        let freed = if let Some(Some(b)) = buffers.get_mut(bi) {
            b.refcount -= 1;
            b.refcount == 0
        } else {
            false
        };
        if freed {
            buffers[bi] = None;
        }
        freed
    }

    pub fn read(&self, meta: &FileMetadata, caller_pid: u64, caller_sysfd: SystemFd, out: &mut [u8]) -> DriverResult {
        let (role, buffers_index) = self.role_and_buffers(meta)?;
        let mut buffers = self.buffers.lock();
        let buf = buffers.get_mut(buffers_index).and_then(|b| b.as_mut()).ok_or(DriverStatus::Error(DriverError::BadFd))?;
        match role {
            SocketRole::Client => buf.tx.read(caller_pid, caller_sysfd, out),
            SocketRole::Server => buf.rx.read(caller_pid, caller_sysfd, out),
        }
    }

    pub fn write(&self, meta: &FileMetadata, caller_pid: u64, caller_sysfd: SystemFd, data: &[u8]) -> DriverResult {
        let (role, buffers_index) = self.role_and_buffers(meta)?;
        let mut buffers = self.buffers.lock();
        let buf = buffers.get_mut(buffers_index).and_then(|b| b.as_mut()).ok_or(DriverStatus::Error(DriverError::BadFd))?;
        match role {
            SocketRole::Client => buf.rx.write(caller_pid, caller_sysfd, data),
            SocketRole::Server => buf.tx.write(caller_pid, caller_sysfd, data),
        }
    }

    fn role_and_buffers(&self, meta: &FileMetadata) -> Result<(SocketRole, usize), DriverStatus> {
        let index = meta.driver_data as usize;
        let sockets = self.sockets.lock();
        let entry = sockets.get(index).and_then(|s| s.as_ref()).ok_or(DriverStatus::Error(DriverError::BadFd))?;
        let role = entry.role.ok_or(DriverStatus::Error(DriverError::InvalidArgument))?;
        let buffers = entry.buffers.ok_or(DriverStatus::Error(DriverError::InvalidArgument))?;
        Ok((role, buffers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: u8, s: &[u8]) -> SocketAddress {
        SocketAddress::from_slice(tag, s)
    }

    #[test]
    fn bind_duplicate_address_fails() {
        let driver = SocketDriver::new();
        let a = driver.socket().unwrap();
        let b = driver.socket().unwrap();
        driver.bind(&a, addr(1, b"svc")).unwrap();
        assert_eq!(driver.bind(&b, addr(1, b"svc")), Err(DriverError::AddrInUse));
    }

    #[test]
    fn connect_without_listener_is_refused() {
        let driver = SocketDriver::new();
        let client = driver.socket().unwrap();
        assert_eq!(driver.connect(&client, addr(1, b"nope")), Err(DriverError::ConnectionRefused));
    }

    #[test]
    fn accept_blocks_until_connect_then_pairs_client_and_server() {
        let driver = SocketDriver::new();
        let server = driver.socket().unwrap();
        driver.bind(&server, addr(1, b"!Test")).unwrap();
        driver.listen(&server, 32).unwrap();

        let mut out = [0u8; 4];
        assert_eq!(driver.accept(&server, 1), Err(DriverStatus::WouldBlock));

        let client = driver.socket().unwrap();
        driver.connect(&client, addr(1, b"!Test")).unwrap();

        let (accepted, _client_addr) = driver.accept(&server, 1).unwrap();

        driver.write(&client, 1, 100, b"payload!").unwrap();
        assert_eq!(driver.read(&accepted, 2, 200, &mut out).unwrap(), 4);
        assert_eq!(&out, b"payl");
    }

    #[test]
    fn server_reads_rx_and_writes_tx_client_reads_tx_and_writes_rx() {
        let driver = SocketDriver::new();
        let server = driver.socket().unwrap();
        driver.bind(&server, addr(1, b"echo")).unwrap();
        driver.listen(&server, 1).unwrap();

        let client = driver.socket().unwrap();
        driver.connect(&client, addr(1, b"echo")).unwrap();
        let (accepted, _) = driver.accept(&server, 1).unwrap();

        driver.write(&client, 1, 100, b"hello").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(driver.read(&accepted, 2, 200, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        driver.write(&accepted, 2, 200, b"world").unwrap();
        let mut buf2 = [0u8; 5];
        assert_eq!(driver.read(&client, 1, 100, &mut buf2).unwrap(), 5);
        assert_eq!(&buf2, b"world");
    }

    #[test]
    fn close_releases_binding_once_refcount_hits_zero() {
        let driver = SocketDriver::new();
        let server = driver.socket().unwrap();
        driver.bind(&server, addr(1, b"x")).unwrap();
        driver.listen(&server, 1).unwrap();
        let client = driver.socket().unwrap();
        driver.connect(&client, addr(1, b"x")).unwrap();
        let (accepted, _) = driver.accept(&server, 1).unwrap();

        driver.close(&client);
        driver.close(&accepted);

        let second_client = driver.socket().unwrap();
        driver.connect(&second_client, addr(1, b"x")).unwrap();
    }

    #[test]
    fn accept_does_not_panic_when_client_closes_before_accept() {
        let driver = SocketDriver::new();
        let server = driver.socket().unwrap();
        driver.bind(&server, addr(1, b"y")).unwrap();
        driver.listen(&server, 4).unwrap();

        let client = driver.socket().unwrap();
        driver.connect(&client, addr(1, b"y")).unwrap();
        driver.close(&client);

        // The pending entry holds a reference to the pair on the client's
        // behalf, so the close above must not free it out from under the
        // still-queued connection: accept must succeed, not panic.
        let (accepted, _) = driver.accept(&server, 1).unwrap();
        driver.close(&accepted);
    }

    #[test]
    fn accept_refuses_a_connection_whose_buffers_were_already_freed() {
        let driver = SocketDriver::new();
        let server = driver.socket().unwrap();
        driver.bind(&server, addr(1, b"y2")).unwrap();
        driver.listen(&server, 4).unwrap();

        let client = driver.socket().unwrap();
        driver.connect(&client, addr(1, b"y2")).unwrap();

        // Simulate a pending entry whose buffers were freed through some
        // other path: drop the refcount the pending entry itself holds by
        // closing the client twice worth of references directly.
        let buffers_index = {
            let sockets = driver.sockets.lock();
            sockets[client.driver_data as usize].as_ref().unwrap().buffers.unwrap()
        };
        {
            let mut buffers = driver.buffers.lock();
            driver.release_buffers(&mut buffers, buffers_index);
            driver.release_buffers(&mut buffers, buffers_index);
        }

        assert_eq!(driver.accept(&server, 1), Err(DriverStatus::Error(DriverError::ConnectionRefused)));
    }

    #[test]
    fn write_posts_ready_to_read_event_to_the_blocked_peer() {
        let pid = crate::proc::scheduler::spawn("sock-waiter", None, [0, 0, 0]).unwrap();
        crate::events::register_listener(EventKind::ReadyToRead, pid);
        crate::proc::scheduler::with_process(pid, |p| {
            p.event_queues.push(crate::events::EventQueue::new(0, EventKind::ReadyToRead.filter_bit()));
        });

        let driver = SocketDriver::new();
        let server = driver.socket().unwrap();
        driver.bind(&server, addr(1, b"z")).unwrap();
        driver.listen(&server, 1).unwrap();
        let client = driver.socket().unwrap();
        driver.connect(&client, addr(1, b"z")).unwrap();
        let (accepted, _) = driver.accept(&server, 1).unwrap();

        let accepted_sysfd = 9;
        let mut buf = [0u8; 5];
        assert_eq!(driver.read(&accepted, pid, accepted_sysfd, &mut buf), Err(DriverStatus::WouldBlock));
        crate::proc::scheduler::with_process(pid, |p| {
            p.fd_table.install_at(3, accepted_sysfd);
        });

        driver.write(&client, 1, 100, b"hello").unwrap();

        let event = crate::proc::scheduler::with_process(pid, |p| p.event_queues[0].pop())
            .flatten()
            .expect("server's queue should have received a ReadyToRead event");
        match event {
            crate::events::Event::ReadyToRead { bytes_available, system_fd, process_fd } => {
                assert_eq!(bytes_available, 5);
                assert_eq!(system_fd, accepted_sysfd);
                assert_eq!(process_fd, 3);
            }
            other => panic!("expected ReadyToRead, got {other:?}"),
        }
    }
}
