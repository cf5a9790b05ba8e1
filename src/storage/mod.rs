//! Storage-device and filesystem driver contracts (§4.1), and the built-in
//! "drivers" that live over the VFS rather than a block device: pipes,
//! the keyboard-to-stdin input stream, sockets, and the debug-output sink.

pub mod dbgout;
pub mod driver;
pub mod errors;
pub mod input;
pub mod metadata;
pub mod pipe;
pub mod ramfs;
pub mod socket;

pub use driver::{FilesystemDriver, StorageDeviceDriver};
pub use errors::{DriverError, DriverResult, DriverStatus};
pub use metadata::{DriverKind, FileMetadata, FileType};
