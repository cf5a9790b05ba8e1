//! Debug-output sink: a write-only device backing `/dev/dbgout`, forwarding
//! bytes straight to the serial UART. Reads are not supported; `open` never
//! allocates any driver-private state, matching the source's `DbgOutDriver`.

use crate::storage::errors::{DriverError, DriverResult, DriverStatus};
use crate::storage::metadata::{DriverKind, FileMetadata, FileType};

pub struct DbgOutDriver;

pub static DBGOUT_DRIVER: DbgOutDriver = DbgOutDriver;

impl DbgOutDriver {
    pub fn open(&self) -> FileMetadata {
        FileMetadata::new(FileType::CharDevice, alloc::string::String::from("dbgout"), 0, DriverKind::DebugOut, 0)
    }

    pub fn close(&self, _meta: &FileMetadata) {}

    pub fn read(&self, _meta: &FileMetadata, _out: &mut [u8]) -> DriverResult {
        Err(DriverStatus::Error(DriverError::NotSupported))
    }

    pub fn write(&self, _meta: &FileMetadata, data: &[u8]) -> DriverResult {
        crate::serial_print!("{}", unsafe { core::str::from_utf8_unchecked(data) });
        Ok(data.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_is_not_supported() {
        let meta = DBGOUT_DRIVER.open();
        let mut buf = [0u8; 4];
        assert_eq!(DBGOUT_DRIVER.read(&meta, &mut buf), Err(DriverStatus::Error(DriverError::NotSupported)));
    }

    #[test]
    fn write_reports_full_byte_count() {
        let meta = DBGOUT_DRIVER.open();
        assert_eq!(DBGOUT_DRIVER.write(&meta, b"hi").unwrap(), 2);
    }
}
