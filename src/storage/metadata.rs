//! Per-open-file metadata.
//!
//! `FileMetadata` is deliberately thin: type, name, size, and an opaque
//! driver-private payload. It does *not* hold a reference to the driver
//! itself — that lives one level up, on the `OpenFileDescription` that owns
//! both the metadata and the driver reference (see `vfs::ofd`). This avoids
//! the cyclic driver/metadata ownership the source has (`FileMetadata` owning
//! a strong driver reference while the driver holds weak references back into
//! its own metadata table).

use alloc::string::String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    /// A byte-stream device with no directory semantics: pipe, stdin/stdout, socket.
    CharDevice,
}

/// Which built-in driver (or mounted filesystem) a `driver_data` payload
/// should be interpreted by. Builtins are enum-dispatched singletons per the
/// source's recommended re-architecture (no indirect calls through a vtable);
/// `Filesystem` carries the index of a mounted filesystem driver for
/// everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Pipe,
    Input,
    Socket,
    DebugOut,
    Filesystem(usize),
}

/// Per-open-file state returned by a driver's `open`.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub file_type: FileType,
    pub name: String,
    pub size: u64,
    pub driver: DriverKind,
    /// Driver-private opaque payload: a pipe buffer index, a socket index, an
    /// inode number, etc. Meaningless outside the owning driver.
    pub driver_data: u64,
}

impl FileMetadata {
    pub fn new(file_type: FileType, name: String, size: u64, driver: DriverKind, driver_data: u64) -> Self {
        FileMetadata {
            file_type,
            name,
            size,
            driver,
            driver_data,
        }
    }

    pub fn is_regular(&self) -> bool {
        self.file_type == FileType::Regular
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }
}
