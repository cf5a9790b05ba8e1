//! The syscall dispatcher (§4.8): a dense numbered table, one handler per
//! slot, translating `DriverError`/`DriverStatus` to the raw ssize ABI
//! convention (`0` = EOF, `-2` = would-block, negative = error) only here —
//! everything below this module keeps the richer `Result`/`DriverStatus`
//! types. Shaped after the source's `sys::syscall` dispatch table
//! (`syscall_dispatcher` matching a `SYS_*` constant to a `sys_*` handler,
//! logging each call), generalized from its 16 slots to the full table here.
//!
//! Handlers below operate on already-decoded arguments (paths as `&str`,
//! buffers as `&[u8]`/`&mut [u8]`) so they can be unit tested without a real
//! userspace address space. The raw ABI-facing entry point that turns
//! `(arg1, arg2, arg3)` register values into those slices by walking a
//! process's `memory_regions` is `dispatch`, compiled only outside tests —
//! there is no real MMU mapping to validate against under a hosted `cargo
//! test` run, matching this crate's existing `#[cfg(not(test))]` split for
//! hardware-only code (`mm::allocator`, `panic`).

pub mod numbers;

use alloc::string::String;

use crate::boot::elf;
use crate::events::{self, EventKind, EventQueue};
use crate::proc::fd_table::ProcessFd;
use crate::proc::process::{BlockReason, Process};
use crate::proc::scheduler;
use crate::storage::errors::{DriverError, DriverStatus};
use crate::storage::metadata::FileType;
use crate::storage::socket::SocketAddress;
use crate::vfs;
use crate::vfs::flags::FdFlags;
use crate::vfs::Whence;
#[cfg(not(test))]
use numbers::*;

/// Wire value for a driver that parked the caller on a waiter list.
pub const WOULD_BLOCK: i64 = -2;

/// Maps the internal error taxonomy to the small negative integers the raw
/// ABI reports. `-2` is reserved for `WouldBlock` (see above), so error codes
/// start at `-3` to avoid ever aliasing it.
fn err_code(e: DriverError) -> i64 {
    match e {
        DriverError::BadFd => -3,
        DriverError::BadPath => -4,
        DriverError::NoMemory => -5,
        DriverError::BrokenPipe => -6,
        DriverError::AddrInUse => -7,
        DriverError::ConnectionRefused => -8,
        DriverError::InvalidArgument => -9,
        DriverError::NotSupported => -10,
    }
}

fn status_code(s: DriverStatus) -> i64 {
    match s {
        DriverStatus::WouldBlock => WOULD_BLOCK,
        DriverStatus::Error(e) => err_code(e),
    }
}

fn resolve_sysfd(pid: u64, fd: ProcessFd) -> Result<usize, DriverError> {
    scheduler::with_process(pid, |p| p.fd_table.get(fd))
        .flatten()
        .ok_or(DriverError::BadFd)
}

fn install_fd(pid: u64, sysfd: usize) -> Result<ProcessFd, DriverError> {
    scheduler::with_process(pid, |p| p.fd_table.install(sysfd))
        .flatten()
        .ok_or(DriverError::BadFd)
}

/// §4.8 #0. `open(path) -> FD`.
pub fn sys_open(pid: u64, path: &str, flags: FdFlags) -> i64 {
    let sysfd = match vfs::open(path, flags) {
        Ok(sysfd) => sysfd,
        Err(e) => return err_code(e),
    };
    match install_fd(pid, sysfd) {
        Ok(fd) => fd as i64,
        Err(e) => {
            vfs::close(sysfd);
            err_code(e)
        }
    }
}

/// §4.8 #1. `close(fd) -> 0/err`.
pub fn sys_close(pid: u64, fd: ProcessFd) -> i64 {
    match scheduler::with_process(pid, |p| p.fd_table.remove(fd)).flatten() {
        Some(sysfd) => {
            vfs::close(sysfd);
            0
        }
        None => err_code(DriverError::BadFd),
    }
}

/// §4.8 #2. `read(fd, buf, count) -> ssize`. Blocks on `WouldBlock`.
pub fn sys_read(pid: u64, fd: ProcessFd, buf: &mut [u8]) -> i64 {
    let sysfd = match resolve_sysfd(pid, fd) {
        Ok(s) => s,
        Err(e) => return err_code(e),
    };
    match vfs::read(sysfd, pid, buf) {
        Ok(n) => n,
        Err(DriverStatus::WouldBlock) => {
            let _ = scheduler::block_current(BlockReason::WaitingForRead { fd });
            WOULD_BLOCK
        }
        Err(DriverStatus::Error(e)) => err_code(e),
    }
}

/// §4.8 #3. `write(fd, buf, count) -> ssize`. Same blocking convention as read.
pub fn sys_write(pid: u64, fd: ProcessFd, data: &[u8]) -> i64 {
    let sysfd = match resolve_sysfd(pid, fd) {
        Ok(s) => s,
        Err(e) => return err_code(e),
    };
    match vfs::write(sysfd, pid, data) {
        Ok(n) => n,
        Err(DriverStatus::WouldBlock) => {
            let _ = scheduler::block_current(BlockReason::WaitingForWrite { fd });
            WOULD_BLOCK
        }
        Err(DriverStatus::Error(e)) => err_code(e),
    }
}

/// §4.8 #4. `poke() -> void`, a no-op diagnostic ping matching
/// `original_source`'s `sys$4_poke` (used there to confirm the syscall path
/// is wired up end to end before any real handler existed).
pub fn sys_poke(pid: u64) -> i64 {
    crate::log_debug!("SYSCALL", "poke from pid={}", pid);
    0
}

/// §4.8 #5. `exit(status) -> (noreturn)`. The actual "don't return to
/// userspace" transition is the (out-of-scope) context-switch trampoline's
/// job; this marks the process Dead and wakes any `waitpid`er.
pub fn sys_exit(pid: u64, status: i64) -> i64 {
    let _ = scheduler::exit(pid, status);
    0
}

/// §4.8 #6. `fork() -> pid`, child gets 0 (applied by the trampoline when it
/// resumes the child, not here — this handler only ever runs in the parent).
pub fn sys_fork(pid: u64) -> i64 {
    let child_pid = match scheduler::fork(pid) {
        Ok(p) => p,
        Err(_) => return err_code(DriverError::NoMemory),
    };
    if let Some(fd_table) = scheduler::fd_table_of(child_pid) {
        for (_, sysfd) in fd_table.iter() {
            vfs::retain(sysfd);
        }
    }
    child_pid as i64
}

/// §4.8 #7. `exec(path, argv) -> ssize/noreturn`. `argv` is unused: userspace
/// argument passing rides on the (out-of-scope) stack/register ABI the real
/// context-switch trampoline sets up; this loads the new image's `PT_LOAD`
/// segments over the calling process's `memory_regions` and returns the
/// entry point for that trampoline to jump to.
pub fn sys_exec(pid: u64, path: &str) -> i64 {
    let (file_type, size) = match vfs::stat(path) {
        Ok(v) => v,
        Err(e) => return err_code(e),
    };
    if file_type != FileType::Regular {
        return err_code(DriverError::InvalidArgument);
    }

    let sysfd = match vfs::open(path, FdFlags::O_RDONLY) {
        Ok(fd) => fd,
        Err(e) => return err_code(e),
    };

    let mut image = alloc::vec![0u8; size as usize];
    let mut total = 0usize;
    while total < image.len() {
        match vfs::read(sysfd, pid, &mut image[total..]) {
            Ok(0) => break,
            Ok(n) => total += n as usize,
            Err(status) => {
                vfs::close(sysfd);
                return status_code(status);
            }
        }
    }
    vfs::close(sysfd);

    let result = crate::mm::with_pmm(|pmm| {
        scheduler::with_process(pid, |process| elf::load_elf(&image, pmm, &mut process.memory_regions))
    });

    match result {
        Some(Some(Ok(entry))) => entry as i64,
        Some(Some(Err(_))) => err_code(DriverError::InvalidArgument),
        _ => err_code(DriverError::NoMemory),
    }
}

/// §4.8 #8. `waitpid(pid) -> status`. Blocks on `WaitingForChild` until the
/// target exits, then reaps its zombie record.
pub fn sys_waitpid(pid: u64, target: u64) -> i64 {
    match scheduler::exit_status(target) {
        Some(status) => {
            let _ = scheduler::remove_process(target);
            status
        }
        None => {
            let _ = scheduler::block_current(BlockReason::WaitingForChild { pid: target });
            WOULD_BLOCK
        }
    }
}

/// §4.8 #9. `getpid() -> pid`.
pub fn sys_getpid(pid: u64) -> i64 {
    pid as i64
}

/// §4.8 #10. `sleep(ticks) -> 0`. Blocks on `Sleeping{wake_tick}`.
pub fn sys_sleep(ticks: u64) -> i64 {
    let wake_tick = scheduler::current_tick() + ticks;
    let _ = scheduler::block_current(BlockReason::Sleeping { wake_tick });
    WOULD_BLOCK
}

/// §4.8 #11. `yield() -> 0`. Cooperative yield, no blocked state recorded.
pub fn sys_yield() -> i64 {
    let _ = scheduler::yield_now();
    0
}

/// §4.8 #12. `lay_pipe(out_r, out_w) -> 0/err`: mints an anonymous pipe pair
/// and installs both ends into the caller's FD table.
pub fn sys_lay_pipe(pid: u64) -> Result<(ProcessFd, ProcessFd), i64> {
    let (r_sysfd, w_sysfd) = vfs::lay_pipe();
    let r_fd = install_fd(pid, r_sysfd);
    let w_fd = r_fd.and_then(|_| install_fd(pid, w_sysfd));
    match (r_fd, w_fd) {
        (Ok(r), Ok(w)) => Ok((r, w)),
        (r, w) => {
            if let Ok(r) = r {
                let _ = scheduler::with_process(pid, |p| p.fd_table.remove(r));
            }
            vfs::close(r_sysfd);
            vfs::close(w_sysfd);
            Err(err_code(w.err().or(r.err()).unwrap_or(DriverError::BadFd)))
        }
    }
}

/// §4.8 #13. `dup(fd) -> new fd`. Resolution of the open design question in
/// §9: the duplicate shares the same open-file-table entry (and so the same
/// offset and refcount), matching a POSIX `dup`, not a deep copy.
pub fn sys_dup(pid: u64, fd: ProcessFd) -> i64 {
    let sysfd = match resolve_sysfd(pid, fd) {
        Ok(s) => s,
        Err(e) => return err_code(e),
    };
    match install_fd(pid, sysfd) {
        Ok(new_fd) => {
            vfs::retain(sysfd);
            new_fd as i64
        }
        Err(e) => err_code(e),
    }
}

/// §4.8 #14. `pwd(buf, len) -> ssize`.
pub fn sys_pwd(pid: u64, buf: &mut [u8]) -> i64 {
    let cwd = match scheduler::with_process(pid, |p| p.cwd.clone()) {
        Some(cwd) => cwd,
        None => return err_code(DriverError::BadFd),
    };
    let bytes = cwd.as_bytes();
    if bytes.len() > buf.len() {
        return err_code(DriverError::InvalidArgument);
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    bytes.len() as i64
}

/// §4.8 #15. `directory_data(fd, buf, len) -> ssize`: newline-separated
/// child names, truncated to whatever whole names fit in `buf`.
pub fn sys_directory_data(pid: u64, fd: ProcessFd, buf: &mut [u8]) -> i64 {
    let sysfd = match resolve_sysfd(pid, fd) {
        Ok(s) => s,
        Err(e) => return err_code(e),
    };
    let names = match vfs::list_dir(sysfd) {
        Ok(names) => names,
        Err(e) => return err_code(e),
    };
    let mut written = 0usize;
    for name in &names {
        let bytes = name.as_bytes();
        let needed = bytes.len() + 1;
        if written + needed > buf.len() {
            break;
        }
        buf[written..written + bytes.len()].copy_from_slice(bytes);
        buf[written + bytes.len()] = b'\n';
        written += needed;
    }
    written as i64
}

/// §4.8 #16. `socket(domain, type, protocol) -> fd`. Only the `LENSOR`
/// domain is defined (§4.4); the other two arguments are accepted and
/// ignored, matching the source's single-domain `SocketDriver`.
pub fn sys_socket(pid: u64) -> i64 {
    let sysfd = match vfs::socket() {
        Ok(fd) => fd,
        Err(e) => return err_code(e),
    };
    match install_fd(pid, sysfd) {
        Ok(fd) => fd as i64,
        Err(e) => {
            vfs::close(sysfd);
            err_code(e)
        }
    }
}

fn decode_addr(raw: &[u8]) -> Result<SocketAddress, DriverError> {
    if raw.is_empty() {
        return Err(DriverError::InvalidArgument);
    }
    Ok(SocketAddress::from_slice(raw[0], &raw[1..]))
}

fn encode_addr(addr: SocketAddress, out: &mut [u8]) {
    if out.is_empty() {
        return;
    }
    out[0] = addr.tag;
    let n = core::cmp::min(out.len() - 1, addr.bytes.len());
    out[1..1 + n].copy_from_slice(&addr.bytes[..n]);
}

/// §4.8 #17. `bind(fd, addr, len) -> 0/err`.
pub fn sys_bind(pid: u64, fd: ProcessFd, addr: &[u8]) -> i64 {
    let sysfd = match resolve_sysfd(pid, fd) {
        Ok(s) => s,
        Err(e) => return err_code(e),
    };
    let addr = match decode_addr(addr) {
        Ok(a) => a,
        Err(e) => return err_code(e),
    };
    match vfs::bind(sysfd, addr) {
        Ok(()) => 0,
        Err(e) => err_code(e),
    }
}

/// §4.8 #18. `listen(fd, backlog) -> 0/err`.
pub fn sys_listen(pid: u64, fd: ProcessFd, backlog: usize) -> i64 {
    let sysfd = match resolve_sysfd(pid, fd) {
        Ok(s) => s,
        Err(e) => return err_code(e),
    };
    match vfs::listen(sysfd, backlog) {
        Ok(()) => 0,
        Err(e) => err_code(e),
    }
}

/// §4.8 #19. `accept(fd, out_addr, inout_len) -> fd`. Blocks if no pending
/// connection.
pub fn sys_accept(pid: u64, fd: ProcessFd, out_addr: &mut [u8]) -> i64 {
    let sysfd = match resolve_sysfd(pid, fd) {
        Ok(s) => s,
        Err(e) => return err_code(e),
    };
    match vfs::accept(sysfd, pid) {
        Ok((accepted_sysfd, client_addr)) => match install_fd(pid, accepted_sysfd) {
            Ok(new_fd) => {
                encode_addr(client_addr, out_addr);
                new_fd as i64
            }
            Err(e) => {
                vfs::close(accepted_sysfd);
                err_code(e)
            }
        },
        Err(DriverStatus::WouldBlock) => {
            let _ = scheduler::block_current(BlockReason::WaitingForAccept { fd });
            WOULD_BLOCK
        }
        Err(DriverStatus::Error(e)) => err_code(e),
    }
}

/// §4.8 #20. `connect(fd, addr, len) -> 0/err`.
pub fn sys_connect(pid: u64, fd: ProcessFd, addr: &[u8]) -> i64 {
    let sysfd = match resolve_sysfd(pid, fd) {
        Ok(s) => s,
        Err(e) => return err_code(e),
    };
    let addr = match decode_addr(addr) {
        Ok(a) => a,
        Err(e) => return err_code(e),
    };
    match vfs::connect(sysfd, addr) {
        Ok(()) => 0,
        Err(e) => err_code(e),
    }
}

fn decode_event_kind(raw: u8) -> Option<EventKind> {
    match raw {
        0 => Some(EventKind::ReadyToRead),
        1 => Some(EventKind::ReadyToWrite),
        _ => None,
    }
}

/// §4.8 #21. `register_listener(event_kind) -> 0/err`. Subscribes the
/// calling process and widens its (sole, lazily-created) event queue's
/// filter to accept the kind.
pub fn sys_register_listener(pid: u64, raw_kind: u8) -> i64 {
    let Some(kind) = decode_event_kind(raw_kind) else {
        return err_code(DriverError::InvalidArgument);
    };
    events::register_listener(kind, pid);
    let updated = scheduler::with_process(pid, |p| {
        if p.event_queues.is_empty() {
            p.event_queues.push(EventQueue::new(0, kind.filter_bit()));
        } else {
            let merged = p.event_queues[0].filter() | kind.filter_bit();
            p.event_queues[0].set_filter(merged);
        }
    });
    if updated.is_some() {
        0
    } else {
        err_code(DriverError::BadFd)
    }
}

/// §4.8 #22. `unregister_listener(event_kind) -> 0/err`.
pub fn sys_unregister_listener(pid: u64, raw_kind: u8) -> i64 {
    let Some(kind) = decode_event_kind(raw_kind) else {
        return err_code(DriverError::InvalidArgument);
    };
    events::unregister_listener(kind, pid);
    scheduler::with_process(pid, |p| {
        if let Some(queue) = p.event_queues.get_mut(0) {
            queue.set_filter(queue.filter() & !kind.filter_bit());
        }
    });
    0
}

const EVENT_WIRE_SIZE: usize = 21;

fn encode_event(event: crate::events::Event, out: &mut [u8]) -> i64 {
    use crate::events::Event;
    if out.len() < EVENT_WIRE_SIZE {
        return err_code(DriverError::InvalidArgument);
    }
    let (tag, bytes_available, system_fd, process_fd) = match event {
        Event::ReadyToRead { bytes_available, system_fd, process_fd } => (0u8, bytes_available, system_fd, process_fd),
        Event::ReadyToWrite { bytes_available, system_fd, process_fd } => (1u8, bytes_available, system_fd, process_fd),
    };
    out[0] = tag;
    out[1..9].copy_from_slice(&bytes_available.to_le_bytes());
    out[9..17].copy_from_slice(&(system_fd as u64).to_le_bytes());
    out[17..21].copy_from_slice(&process_fd.to_le_bytes());
    EVENT_WIRE_SIZE as i64
}

/// §4.8 #23. `poll_event() -> Event`. Pops from the current process's
/// (sole) event queue and serializes it into `out`; `0` if the queue is
/// empty, matching the EOF convention used elsewhere in this ABI.
pub fn sys_poll_event(pid: u64, out: &mut [u8]) -> i64 {
    let popped = scheduler::with_process(pid, |p| p.event_queues.get_mut(0).and_then(EventQueue::pop)).flatten();
    match popped {
        Some(event) => encode_event(event, out),
        None => 0,
    }
}

fn whence_from_raw(raw: u8) -> Option<Whence> {
    match raw {
        0 => Some(Whence::Start),
        1 => Some(Whence::Current),
        2 => Some(Whence::End),
        _ => None,
    }
}

/// §4.8 #24. `seek(fd, offset, whence) -> offset`.
pub fn sys_seek(pid: u64, fd: ProcessFd, offset: i64, raw_whence: u8) -> i64 {
    let sysfd = match resolve_sysfd(pid, fd) {
        Ok(s) => s,
        Err(e) => return err_code(e),
    };
    let Some(whence) = whence_from_raw(raw_whence) else {
        return err_code(DriverError::InvalidArgument);
    };
    match vfs::seek(sysfd, offset, whence) {
        Ok(new_offset) => new_offset as i64,
        Err(e) => err_code(e),
    }
}

const STAT_WIRE_SIZE: usize = 9;

/// §4.8 #25. `stat(path, out) -> 0/err`: file type tag + little-endian size,
/// not a full POSIX `struct stat`.
pub fn sys_stat(path: &str, out: &mut [u8]) -> i64 {
    let (file_type, size) = match vfs::stat(path) {
        Ok(v) => v,
        Err(e) => return err_code(e),
    };
    if out.len() < STAT_WIRE_SIZE {
        return err_code(DriverError::InvalidArgument);
    }
    out[0] = match file_type {
        FileType::Regular => 0,
        FileType::Directory => 1,
        FileType::CharDevice => 2,
    };
    out[1..9].copy_from_slice(&size.to_le_bytes());
    0
}

/// Checks that `[ptr, ptr+len)` falls entirely within one of `process`'s
/// mapped memory regions. Shaped after the source's `validate_user_buffer`
/// (`USER_LIMIT` bound check); this kernel has no page tables to walk (§1
/// Non-goals), so the check is against the software-maintained region list
/// `exec` populates instead of a real page-table walk.
fn validate_user_buffer(process: &Process, ptr: usize, len: usize) -> bool {
    if ptr == 0 {
        return false;
    }
    let Some(end) = ptr.checked_add(len) else {
        return false;
    };
    process.memory_regions.iter().any(|region| {
        let region_start = region.vaddr_start as usize;
        let region_end = region_start + region.len as usize;
        ptr >= region_start && end <= region_end
    })
}

/// The interrupt-gate entry point userspace traps into via `int 0x80`. Shaped
/// after the source's `syscall_entry`/`syscall_dispatcher_wrapper` pair: a
/// naked trampoline saves and restores the full register file around a plain
/// `extern "C"` call, so `dispatch` itself never has to know it runs on an
/// interrupt stack. x86-64 System V argument registers: RAX syscall number,
/// RDI/RSI/RDX args 1-3.
#[unsafe(naked)]
#[no_mangle]
#[cfg(not(test))]
pub extern "C" fn syscall_entry() {
    core::arch::naked_asm!(
        "push rax",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push rbx",
        "push rbp",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "cld",
        "mov rdi, rax",
        "mov rsi, [rsp + 80]",
        "mov rdx, [rsp + 88]",
        "mov rcx, [rsp + 96]",
        "call {dispatcher}",
        "mov [rsp + 112], rax",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbp",
        "pop rbx",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rax",
        "iretq",
        dispatcher = sym syscall_dispatcher_wrapper,
    )
}

/// Converts the trampoline's register arguments into `dispatch`'s signature.
/// The caller's PID comes off the scheduler rather than a register — this
/// kernel keeps "current" in `Scheduler`, not a per-CPU pointer.
#[no_mangle]
#[cfg(not(test))]
extern "C" fn syscall_dispatcher_wrapper(syscall_id: usize, arg1: usize, arg2: usize, arg3: usize) -> isize {
    let pid = scheduler::current_pid().unwrap_or(0);
    dispatch(pid, syscall_id, arg1, arg2, arg3) as isize
}

/// The raw ABI entry point: translates `(arg1, arg2, arg3)` register values
/// into the typed arguments the `sys_*` handlers above expect, validating
/// every pointer against the caller's mapped memory regions first. Not
/// compiled under test (see module docs) — the `sys_*` handlers carry the
/// actual logic and are tested directly.
#[cfg(not(test))]
pub fn dispatch(pid: u64, syscall_id: usize, arg1: usize, arg2: usize, arg3: usize) -> i64 {
    crate::log_debug!("SYSCALL", "pid={} {}({:#x}, {:#x}, {:#x})", pid, numbers::name(syscall_id), arg1, arg2, arg3);

    let result = dispatch_inner(pid, syscall_id, arg1, arg2, arg3);

    crate::log_trace!("SYSCALL", "pid={} {} -> {}", pid, numbers::name(syscall_id), result);
    result
}

#[cfg(not(test))]
fn dispatch_inner(pid: u64, syscall_id: usize, arg1: usize, arg2: usize, arg3: usize) -> i64 {
    use core::slice;
    use core::str;

    let valid_buf = |ptr: usize, len: usize| -> bool {
        scheduler::with_process(pid, |p| validate_user_buffer(p, ptr, len)).unwrap_or(false)
    };
    let user_str = |ptr: usize, len: usize| -> Option<String> {
        if !valid_buf(ptr, len) {
            return None;
        }
        let bytes = unsafe { slice::from_raw_parts(ptr as *const u8, len) };
        str::from_utf8(bytes).ok().map(String::from)
    };

    match syscall_id {
        SYS_OPEN => match user_str(arg1, arg2) {
            Some(path) => sys_open(pid, &path, FdFlags::from_bits_truncate(arg3 as u32)),
            None => err_code(DriverError::InvalidArgument),
        },
        SYS_CLOSE => sys_close(pid, arg1 as ProcessFd),
        SYS_READ => {
            if !valid_buf(arg2, arg3) {
                return err_code(DriverError::InvalidArgument);
            }
            let buf = unsafe { slice::from_raw_parts_mut(arg2 as *mut u8, arg3) };
            sys_read(pid, arg1 as ProcessFd, buf)
        }
        SYS_WRITE => {
            if !valid_buf(arg2, arg3) {
                return err_code(DriverError::InvalidArgument);
            }
            let buf = unsafe { slice::from_raw_parts(arg2 as *const u8, arg3) };
            sys_write(pid, arg1 as ProcessFd, buf)
        }
        SYS_POKE => sys_poke(pid),
        SYS_EXIT => sys_exit(pid, arg1 as i64),
        SYS_FORK => sys_fork(pid),
        SYS_EXEC => match user_str(arg1, arg2) {
            Some(path) => sys_exec(pid, &path),
            None => err_code(DriverError::InvalidArgument),
        },
        SYS_WAITPID => sys_waitpid(pid, arg1 as u64),
        SYS_GETPID => sys_getpid(pid),
        SYS_SLEEP => sys_sleep(arg1 as u64),
        SYS_YIELD => sys_yield(),
        SYS_LAY_PIPE => {
            if !valid_buf(arg1, 4) || !valid_buf(arg2, 4) {
                return err_code(DriverError::InvalidArgument);
            }
            match sys_lay_pipe(pid) {
                Ok((r, w)) => {
                    unsafe {
                        (arg1 as *mut u32).write(r);
                        (arg2 as *mut u32).write(w);
                    }
                    0
                }
                Err(code) => code,
            }
        }
        SYS_DUP => sys_dup(pid, arg1 as ProcessFd),
        SYS_PWD => {
            if !valid_buf(arg1, arg2) {
                return err_code(DriverError::InvalidArgument);
            }
            let buf = unsafe { slice::from_raw_parts_mut(arg1 as *mut u8, arg2) };
            sys_pwd(pid, buf)
        }
        SYS_DIRECTORY_DATA => {
            if !valid_buf(arg2, arg3) {
                return err_code(DriverError::InvalidArgument);
            }
            let buf = unsafe { slice::from_raw_parts_mut(arg2 as *mut u8, arg3) };
            sys_directory_data(pid, arg1 as ProcessFd, buf)
        }
        SYS_SOCKET => sys_socket(pid),
        SYS_BIND => {
            if !valid_buf(arg2, arg3) {
                return err_code(DriverError::InvalidArgument);
            }
            let addr = unsafe { slice::from_raw_parts(arg2 as *const u8, arg3) };
            sys_bind(pid, arg1 as ProcessFd, addr)
        }
        SYS_LISTEN => sys_listen(pid, arg1 as ProcessFd, arg2),
        SYS_ACCEPT => {
            if !valid_buf(arg2, arg3) {
                return err_code(DriverError::InvalidArgument);
            }
            let out = unsafe { slice::from_raw_parts_mut(arg2 as *mut u8, arg3) };
            sys_accept(pid, arg1 as ProcessFd, out)
        }
        SYS_CONNECT => {
            if !valid_buf(arg2, arg3) {
                return err_code(DriverError::InvalidArgument);
            }
            let addr = unsafe { slice::from_raw_parts(arg2 as *const u8, arg3) };
            sys_connect(pid, arg1 as ProcessFd, addr)
        }
        SYS_REGISTER_LISTENER => sys_register_listener(pid, arg1 as u8),
        SYS_UNREGISTER_LISTENER => sys_unregister_listener(pid, arg1 as u8),
        SYS_POLL_EVENT => {
            if !valid_buf(arg1, EVENT_WIRE_SIZE) {
                return err_code(DriverError::InvalidArgument);
            }
            let out = unsafe { slice::from_raw_parts_mut(arg1 as *mut u8, EVENT_WIRE_SIZE) };
            sys_poll_event(pid, out)
        }
        SYS_SEEK => sys_seek(pid, arg1 as ProcessFd, arg2 as i64, arg3 as u8),
        SYS_STAT => {
            let Some(path) = user_str(arg1, arg2) else {
                return err_code(DriverError::InvalidArgument);
            };
            if !valid_buf(arg3, STAT_WIRE_SIZE) {
                return err_code(DriverError::InvalidArgument);
            }
            let out = unsafe { slice::from_raw_parts_mut(arg3 as *mut u8, STAT_WIRE_SIZE) };
            sys_stat(&path, out)
        }
        _ => {
            crate::log_warn!("SYSCALL", "pid={} invalid syscall id {}", pid, syscall_id);
            err_code(DriverError::InvalidArgument)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ramfs::RamFs;
    use crate::vfs::mount;

    static RAMFS: RamFs = RamFs::new();

    fn reset() -> u64 {
        RAMFS.seed_file("/greeting", b"hello");
        mount("/", &RAMFS);
        scheduler::spawn("test", None, [0, 0, 0]).unwrap()
    }

    #[test]
    fn open_read_close_round_trips_through_the_table() {
        let pid = reset();
        let fd = sys_open(pid, "/greeting", FdFlags::O_RDONLY);
        assert!(fd >= 0);

        let mut buf = [0u8; 5];
        assert_eq!(sys_read(pid, fd as ProcessFd, &mut buf), 5);
        assert_eq!(&buf, b"hello");

        assert_eq!(sys_close(pid, fd as ProcessFd), 0);
        assert_eq!(sys_read(pid, fd as ProcessFd, &mut buf), err_code(DriverError::BadFd));
    }

    #[test]
    fn read_on_bad_fd_is_an_error_not_a_panic() {
        let pid = reset();
        let mut buf = [0u8; 4];
        assert_eq!(sys_read(pid, 99, &mut buf), err_code(DriverError::BadFd));
    }

    #[test]
    fn lay_pipe_then_dup_shares_the_open_file() {
        let pid = reset();
        let (r, w) = sys_lay_pipe(pid).unwrap();
        assert_eq!(sys_write(pid, w, b"hi"), 2);

        let dup_r = sys_dup(pid, r);
        assert!(dup_r >= 0);

        let mut buf = [0u8; 2];
        assert_eq!(sys_read(pid, r, &mut buf), 2);
    }

    #[test]
    fn getpid_reports_caller() {
        let pid = reset();
        assert_eq!(sys_getpid(pid), pid as i64);
    }

    #[test]
    fn waitpid_blocks_until_child_exits() {
        let pid = reset();
        let child = sys_fork(pid);
        assert!(child > 0);
        assert_eq!(sys_waitpid(pid, child as u64), WOULD_BLOCK);

        sys_exit(child as u64, 9);
        assert_eq!(sys_waitpid(pid, child as u64), 9);
    }

    #[test]
    fn socket_bind_listen_accept_connect_round_trip() {
        let pid = reset();
        let server = sys_socket(pid);
        let addr = [1u8, b'!', b'T', b'e', b's', b't'];
        assert_eq!(sys_bind(pid, server as ProcessFd, &addr), 0);
        assert_eq!(sys_listen(pid, server as ProcessFd, 4), 0);

        let mut out_addr = [0u8; 17];
        assert_eq!(sys_accept(pid, server as ProcessFd, &mut out_addr), WOULD_BLOCK);

        let client = sys_socket(pid);
        assert_eq!(sys_connect(pid, client as ProcessFd, &addr), 0);

        let accepted = sys_accept(pid, server as ProcessFd, &mut out_addr);
        assert!(accepted >= 0);
        assert_eq!(out_addr[0], 1);
    }

    #[test]
    fn register_listener_widens_the_default_queue_filter() {
        let pid = reset();
        assert_eq!(sys_register_listener(pid, 0), 0);
        let accepts = scheduler::with_process(pid, |p| p.event_queues[0].accepts(EventKind::ReadyToRead)).unwrap();
        assert!(accepts);

        assert_eq!(sys_unregister_listener(pid, 0), 0);
        let accepts = scheduler::with_process(pid, |p| p.event_queues[0].accepts(EventKind::ReadyToRead)).unwrap();
        assert!(!accepts);
    }

    #[test]
    fn poll_event_reports_empty_queue_as_zero() {
        let pid = reset();
        sys_register_listener(pid, 0);
        let mut out = [0u8; EVENT_WIRE_SIZE];
        assert_eq!(sys_poll_event(pid, &mut out), 0);
    }

    #[test]
    fn stat_and_seek_agree_on_file_size() {
        let pid = reset();
        let fd = sys_open(pid, "/greeting", FdFlags::O_RDONLY);

        let mut out = [0u8; STAT_WIRE_SIZE];
        assert_eq!(sys_stat("/greeting", &mut out), 0);
        let size = u64::from_le_bytes(out[1..9].try_into().unwrap());
        assert_eq!(size, 5);

        assert_eq!(sys_seek(pid, fd as ProcessFd, 0, 2), size as i64);
    }

    #[test]
    fn pwd_reports_root_for_a_fresh_process() {
        let pid = reset();
        let mut buf = [0u8; 8];
        let n = sys_pwd(pid, &mut buf);
        assert_eq!(n, 1);
        assert_eq!(&buf[..1], b"/");
    }

    #[test]
    fn directory_data_lists_ramfs_children() {
        let pid = reset();
        RAMFS.seed_file("/dir/a", b"1");
        RAMFS.seed_file("/dir/b", b"2");
        let fd = sys_open(pid, "/dir", FdFlags::O_RDONLY);
        assert!(fd >= 0);

        let mut buf = [0u8; 64];
        let n = sys_directory_data(pid, fd as ProcessFd, &mut buf);
        assert!(n > 0);
        let listing = core::str::from_utf8(&buf[..n as usize]).unwrap();
        assert!(listing.contains('a'));
        assert!(listing.contains('b'));
    }
}
