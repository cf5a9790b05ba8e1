//! The VFS (§4.5): mount table, global open-file table, path resolution, and
//! the driver-kind dispatch that turns a system FD into a call against the
//! right built-in driver or mounted filesystem.
//!
//! Built-in device paths never consult the mount table: `pipe:NAME`,
//! `/dev/stdin`, `/dev/stdout`, `/dev/stderr`, `/dev/dbgout`, `/dev/socket`
//! are recognised by `open` before any prefix match is attempted, matching
//! §4.5's "if unmatched, consult a small set of built-in device drivers".

pub mod flags;
pub mod mount;
pub mod ofd;

use alloc::vec::Vec;

use crate::storage::dbgout::DBGOUT_DRIVER;
use crate::storage::driver::FilesystemDriver;
use crate::storage::errors::{DriverError, DriverResult, DriverStatus};
use crate::storage::input::INPUT_DRIVER;
use crate::storage::metadata::{DriverKind, FileMetadata, FileType};
use crate::storage::pipe::PIPE_DRIVER;
use crate::storage::socket::{SocketAddress, SOCKET_DRIVER};
use crate::sync::SpinLock;
use crate::vfs::flags::FdFlags;
use crate::vfs::mount::MountTable;
use crate::vfs::ofd::OpenFileDescription;

static MOUNTS: SpinLock<MountTable> = SpinLock::new(MountTable::new());

/// Append-only, indexed by registration order so a `DriverKind::Filesystem`
/// payload can address its owning driver without holding a live reference
/// inside `FileMetadata` itself (§9's cyclic-ownership note).
static FS_DRIVERS: SpinLock<Vec<&'static dyn FilesystemDriver>> = SpinLock::new(Vec::new());

/// Registers a filesystem driver at `prefix`. Mounts are append-only over the
/// kernel's lifetime; `prefix` participates in longest-prefix-match lookup.
pub fn mount(prefix: &str, driver: &'static dyn FilesystemDriver) {
    FS_DRIVERS.lock().push(driver);
    MOUNTS.lock().mount(prefix, driver);
}

fn fs_index_of(driver: &'static dyn FilesystemDriver) -> usize {
    let ptr = driver as *const dyn FilesystemDriver as *const ();
    FS_DRIVERS
        .lock()
        .iter()
        .position(|d| core::ptr::eq(*d as *const dyn FilesystemDriver as *const (), ptr))
        .expect("filesystem driver opened a path without being mounted first")
}

/// `open(path) -> system FD` (§4.5, syscall #0). `flags` select which end of
/// a named pipe this open represents; they are otherwise ignored by devices
/// that have no notion of read/write-only access.
pub fn open(path: &str, flags: FdFlags) -> Result<usize, DriverError> {
    let meta = resolve_and_open(path, flags)?;
    Ok(ofd::install(meta))
}

fn resolve_and_open(path: &str, flags: FdFlags) -> Result<FileMetadata, DriverError> {
    if let Some(name) = path.strip_prefix("pipe:") {
        let write_end = flags.contains(FdFlags::O_WRONLY) && !flags.contains(FdFlags::O_RDWR);
        return PIPE_DRIVER.open_named(name, !write_end);
    }

    match path {
        "/dev/stdin" => return INPUT_DRIVER.open("stdin"),
        "/dev/stdout" | "/dev/stderr" | "/dev/dbgout" => return Ok(DBGOUT_DRIVER.open()),
        "/dev/socket" => return SOCKET_DRIVER.socket(),
        _ => {}
    }

    let (driver, remainder) = MOUNTS.lock().resolve(path).ok_or(DriverError::BadPath)?;
    let mut meta = driver.open(remainder)?;
    meta.driver = DriverKind::Filesystem(fs_index_of(driver));
    Ok(meta)
}

/// `close(process_fd)` half that already has a system FD in hand (§4.5):
/// drops one reference and, at zero, calls the owning driver's `close`.
pub fn close(sysfd: usize) {
    if let Some(meta) = ofd::release(sysfd) {
        close_driver(&meta);
    }
}

fn close_driver(meta: &FileMetadata) {
    match meta.driver {
        DriverKind::Pipe => PIPE_DRIVER.close(meta),
        DriverKind::Input => INPUT_DRIVER.close(meta),
        DriverKind::Socket => SOCKET_DRIVER.close(meta),
        DriverKind::DebugOut => DBGOUT_DRIVER.close(meta),
        DriverKind::Filesystem(idx) => {
            if let Some(driver) = FS_DRIVERS.lock().get(idx) {
                driver.close(meta);
            }
        }
    }
}

/// `read(process_fd, buf, count)` (§4.5, syscall #2), already FD-translated.
/// `caller_pid` is the PID to register on a resource's waiter list if the
/// driver returns `WouldBlock`.
pub fn read(sysfd: usize, caller_pid: u64, buf: &mut [u8]) -> DriverResult {
    match ofd::with(sysfd, |ofd| read_via(sysfd, ofd, caller_pid, buf)) {
        Some(result) => result,
        None => Err(DriverStatus::Error(DriverError::BadFd)),
    }
}

fn read_via(sysfd: usize, ofd: &mut OpenFileDescription, caller_pid: u64, buf: &mut [u8]) -> DriverResult {
    match ofd.meta.driver {
        DriverKind::Pipe => PIPE_DRIVER.read(&ofd.meta, caller_pid, sysfd, buf),
        DriverKind::Input => INPUT_DRIVER.read(&ofd.meta, caller_pid, sysfd, buf),
        DriverKind::Socket => SOCKET_DRIVER.read(&ofd.meta, caller_pid, sysfd, buf),
        DriverKind::DebugOut => DBGOUT_DRIVER.read(&ofd.meta, buf),
        DriverKind::Filesystem(idx) => {
            let drivers = FS_DRIVERS.lock();
            let driver = drivers.get(idx).ok_or(DriverStatus::Error(DriverError::BadFd))?;
            let n = driver.read(&ofd.meta, ofd.offset, buf.len(), buf)?;
            if n > 0 {
                ofd.offset += n as u64;
            }
            Ok(n)
        }
    }
}

/// `write(process_fd, buf, count)` (§4.5, syscall #3), already FD-translated.
pub fn write(sysfd: usize, caller_pid: u64, data: &[u8]) -> DriverResult {
    match ofd::with(sysfd, |ofd| write_via(sysfd, ofd, caller_pid, data)) {
        Some(result) => result,
        None => Err(DriverStatus::Error(DriverError::BadFd)),
    }
}

fn write_via(sysfd: usize, ofd: &mut OpenFileDescription, caller_pid: u64, data: &[u8]) -> DriverResult {
    match ofd.meta.driver {
        DriverKind::Pipe => PIPE_DRIVER.write(&ofd.meta, caller_pid, sysfd, data),
        DriverKind::Input => INPUT_DRIVER.write(&ofd.meta, data),
        DriverKind::Socket => SOCKET_DRIVER.write(&ofd.meta, caller_pid, sysfd, data),
        DriverKind::DebugOut => DBGOUT_DRIVER.write(&ofd.meta, data),
        DriverKind::Filesystem(idx) => {
            let drivers = FS_DRIVERS.lock();
            let driver = drivers.get(idx).ok_or(DriverStatus::Error(DriverError::BadFd))?;
            let n = driver.write(&ofd.meta, ofd.offset, data.len(), data)?;
            if n > 0 {
                ofd.offset += n as u64;
            }
            Ok(n)
        }
    }
}

/// `seek(fd, offset, whence)` (syscall #24). Only meaningful for
/// filesystem-backed files; streams (pipes/sockets/input) have no offset
/// concept and reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

pub fn seek(sysfd: usize, offset: i64, whence: Whence) -> Result<u64, DriverError> {
    ofd::with(sysfd, |ofd| {
        if !matches!(ofd.meta.driver, DriverKind::Filesystem(_)) {
            return Err(DriverError::InvalidArgument);
        }
        let base = match whence {
            Whence::Start => 0i64,
            Whence::Current => ofd.offset as i64,
            Whence::End => ofd.meta.size as i64,
        };
        let new_offset = base
            .checked_add(offset)
            .filter(|&o| o >= 0)
            .ok_or(DriverError::InvalidArgument)?;
        ofd.offset = new_offset as u64;
        Ok(ofd.offset)
    })
    .unwrap_or(Err(DriverError::BadFd))
}

/// `stat(path, out)` (syscall #25): resolves `path` without installing an
/// open-file-table entry, reports type and size, then releases the driver
/// state it briefly opened to do so.
pub fn stat(path: &str) -> Result<(FileType, u64), DriverError> {
    let meta = resolve_and_open(path, FdFlags::O_RDONLY)?;
    let result = (meta.file_type, meta.size);
    close_driver(&meta);
    Ok(result)
}

/// `directory_data(fd, buf, len)` (syscall #15): lists a directory's
/// children, provided the owning driver supports it.
pub fn list_dir(sysfd: usize) -> Result<Vec<alloc::string::String>, DriverError> {
    let meta = ofd::with(sysfd, |ofd| ofd.meta.clone()).ok_or(DriverError::BadFd)?;
    match meta.driver {
        DriverKind::Filesystem(idx) => {
            let drivers = FS_DRIVERS.lock();
            let driver = drivers.get(idx).ok_or(DriverError::BadFd)?;
            driver.list_dir(&meta)
        }
        _ => Err(DriverError::NotSupported),
    }
}

/// Installs a pre-built `FileMetadata` directly, for syscalls that mint
/// metadata themselves instead of resolving a path (`lay_pipe`, `accept`).
pub fn install(meta: FileMetadata) -> usize {
    ofd::install(meta)
}

/// Bumps a system FD's refcount, for `dup` and the post-`fork` refcount pass.
pub fn retain(sysfd: usize) {
    ofd::retain(sysfd);
}

/// Reads out a copy of a system FD's metadata, for syscalls (socket
/// bind/listen/accept/connect) that need to hand it straight to
/// `storage::socket::SocketDriver` rather than going through `read`/`write`.
pub fn meta_of(sysfd: usize) -> Option<FileMetadata> {
    ofd::with(sysfd, |ofd| ofd.meta.clone())
}

pub use crate::storage::socket::SocketRole;

/// `bind(fd, addr, len)` (syscall #17).
pub fn bind(sysfd: usize, addr: SocketAddress) -> Result<(), DriverError> {
    let meta = meta_of(sysfd).ok_or(DriverError::BadFd)?;
    SOCKET_DRIVER.bind(&meta, addr)
}

/// `listen(fd, backlog)` (syscall #18).
pub fn listen(sysfd: usize, backlog: usize) -> Result<(), DriverError> {
    let meta = meta_of(sysfd).ok_or(DriverError::BadFd)?;
    SOCKET_DRIVER.listen(&meta, backlog)
}

/// `connect(fd, addr, len)` (syscall #20).
pub fn connect(sysfd: usize, addr: SocketAddress) -> Result<(), DriverError> {
    let meta = meta_of(sysfd).ok_or(DriverError::BadFd)?;
    SOCKET_DRIVER.connect(&meta, addr)
}

/// `accept(fd, out_addr, inout_len)` (syscall #19): installs the freshly
/// accepted connection as a new system FD and returns it alongside the
/// client's address.
pub fn accept(sysfd: usize, caller_pid: u64) -> Result<(usize, SocketAddress), DriverStatus> {
    let meta = meta_of(sysfd).ok_or(DriverStatus::Error(DriverError::BadFd))?;
    let (accepted_meta, client_addr) = SOCKET_DRIVER.accept(&meta, caller_pid)?;
    Ok((ofd::install(accepted_meta), client_addr))
}

/// `socket(domain, type, protocol)` (syscall #16).
pub fn socket() -> Result<usize, DriverError> {
    Ok(ofd::install(SOCKET_DRIVER.socket()?))
}

/// `lay_pipe()` (syscall #12): mints an anonymous pipe pair and installs
/// both ends, returning `(read_sysfd, write_sysfd)`.
pub fn lay_pipe() -> (usize, usize) {
    let (r, w) = PIPE_DRIVER.lay_pipe();
    (ofd::install(r), ofd::install(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ramfs::RamFs;

    static RAMFS: RamFs = RamFs::new();

    fn reset() {
        *MOUNTS.lock() = MountTable::new();
        FS_DRIVERS.lock().clear();
        mount("/", &RAMFS);
    }

    #[test]
    fn open_named_pipe_round_trips_through_read_write() {
        reset();
        let r = open("pipe:t1", FdFlags::O_RDONLY).unwrap();
        let w = open("pipe:t1", FdFlags::O_WRONLY).unwrap();

        assert_eq!(write(w, 1, b"hi").unwrap(), 2);
        let mut buf = [0u8; 2];
        assert_eq!(read(r, 2, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");

        close(r);
        close(w);
    }

    #[test]
    fn stdin_stdout_open_by_well_known_path() {
        reset();
        let stdin = open("/dev/stdin", FdFlags::O_RDONLY).unwrap();
        let stdout = open("/dev/stdout", FdFlags::O_WRONLY).unwrap();
        assert_eq!(write(stdout, 1, b"x").unwrap(), 1);
        let mut buf = [0u8; 1];
        assert_eq!(read(stdin, 1, &mut buf), Err(DriverStatus::WouldBlock));
    }

    #[test]
    fn bad_path_with_no_mount_match() {
        *MOUNTS.lock() = MountTable::new();
        FS_DRIVERS.lock().clear();
        assert_eq!(open("/nowhere", FdFlags::O_RDONLY), Err(DriverError::BadPath));
    }

    #[test]
    fn filesystem_open_read_write_and_seek() {
        reset();
        RAMFS.seed_file("/greeting", b"hello");
        let fd = open("/greeting", FdFlags::O_RDWR).unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(read(fd, 1, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        assert_eq!(seek(fd, 0, Whence::Start).unwrap(), 0);
        let mut buf2 = [0u8; 5];
        assert_eq!(read(fd, 1, &mut buf2).unwrap(), 5);
        assert_eq!(&buf2, b"hello");

        close(fd);
    }

    #[test]
    fn stat_reports_size_without_leaking_an_open_file_slot() {
        reset();
        RAMFS.seed_file("/f", b"abcde");
        let (ty, size) = stat("/f").unwrap();
        assert_eq!(ty, FileType::Regular);
        assert_eq!(size, 5);
    }

    #[test]
    fn lay_pipe_mints_a_working_anonymous_pair() {
        reset();
        let (r, w) = lay_pipe();
        assert_eq!(write(w, 1, b"yo").unwrap(), 2);
        let mut buf = [0u8; 2];
        assert_eq!(read(r, 1, &mut buf).unwrap(), 2);
    }
}
