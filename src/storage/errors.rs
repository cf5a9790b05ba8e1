//! Error taxonomy shared by drivers, the VFS, and the syscall dispatcher.

/// Errors returned across the syscall boundary. `Ok(n)`/`WouldBlock`/`Eof`
/// are not represented here because drivers return those as the sign/value
/// of a raw `ssize` (`0` = EOF, `-2` = would-block, `n >= 0` = byte count);
/// `DriverError` is for the `n < 0, n != -2` case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// FD out of range, or never opened by this process.
    BadFd,
    /// Unresolved path: no mount and no matching built-in device driver.
    BadPath,
    /// Allocator exhausted.
    NoMemory,
    /// Write to a pipe whose read end is closed.
    BrokenPipe,
    /// Bind to an address already bound by another open socket.
    AddrInUse,
    /// Connect to an address with no listening server.
    ConnectionRefused,
    /// Malformed syscall arguments, including unaligned buffers.
    InvalidArgument,
    /// E.g. `read_raw` on a driver with no raw backing device.
    NotSupported,
}

/// The ssize convention every driver method returns: `Ok(n>=0)` bytes/FD,
/// `WouldBlock` (the `-2` wire value), or an error. Kept as a proper sum type
/// internally; translated to the raw integer convention only at the syscall
/// ABI boundary (see `sys::dispatch`).
pub type DriverResult = Result<i64, DriverStatus>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    /// The driver parked the caller on a waiter list; dispatcher must block
    /// the calling process and re-enter this same call on wake.
    WouldBlock,
    Error(DriverError),
}

impl From<DriverError> for DriverStatus {
    fn from(e: DriverError) -> Self {
        DriverStatus::Error(e)
    }
}
