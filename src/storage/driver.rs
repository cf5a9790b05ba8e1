//! The storage-device and filesystem driver contracts.
//!
//! Both driver kinds expose the same five operations and differ only in how
//! a file is identified: a storage-device driver addresses a file by raw
//! byte offset into a block device; a filesystem driver addresses it by a
//! `FileMetadata` value it produced itself from `open`.

use alloc::string::String;
use alloc::vec::Vec;

use crate::storage::errors::{DriverError, DriverResult};
use crate::storage::metadata::FileMetadata;

/// Uniform read/write/open/close over block devices and raw byte streams.
pub trait StorageDeviceDriver: Send + Sync {
    fn open(&self, path: &str) -> Result<FileMetadata, DriverError>;
    fn close(&self, meta: &FileMetadata);
    fn read(&self, meta: &FileMetadata, offset: u64, count: usize, out: &mut [u8]) -> DriverResult;
    fn write(&self, meta: &FileMetadata, offset: u64, count: usize, data: &[u8]) -> DriverResult;
    /// Block-device-level access bypassing filesystem metadata entirely.
    fn read_raw(&self, offset: u64, count: usize, out: &mut [u8]) -> DriverResult;
}

/// Like `StorageDeviceDriver`, but keyed on `FileMetadata` instead of raw offsets.
pub trait FilesystemDriver: Send + Sync {
    fn open(&self, path: &str) -> Result<FileMetadata, DriverError>;
    fn close(&self, meta: &FileMetadata);
    fn read(&self, meta: &FileMetadata, offset: u64, count: usize, out: &mut [u8]) -> DriverResult;
    fn write(&self, meta: &FileMetadata, offset: u64, count: usize, data: &[u8]) -> DriverResult;
    /// Filesystem drivers that own no block device (pipes, sockets, ...) return `NotSupported`.
    fn read_raw(&self, offset: u64, count: usize, out: &mut [u8]) -> DriverResult;

    fn flush(&self, meta: &FileMetadata);
    /// The underlying storage driver, if this filesystem is block-backed.
    fn device(&self) -> Option<&dyn StorageDeviceDriver>;
    fn name(&self) -> &str;

    /// Lists the names of a directory's children, for the `directory_data`
    /// syscall. Filesystems with no directory hierarchy return `NotSupported`.
    fn list_dir(&self, meta: &FileMetadata) -> Result<Vec<String>, DriverError> {
        let _ = meta;
        Err(DriverError::NotSupported)
    }
}
