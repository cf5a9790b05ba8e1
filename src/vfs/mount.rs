//! The mount table: path-prefix to mounted-filesystem-driver mapping.
//!
//! Grounded on the source's `VfsMount` list (itself unfinished/TODO in
//! `fs/vfs/mount.rs`); this is a from-scratch, working longest-prefix-match
//! table since the source never completed one. Built-in device paths
//! (`pipe:NAME`, `/dev/stdin`, `/dev/stdout`, `/dev/dbgout`, `/dev/socket`)
//! never consult this table — `vfs::open` recognises them first.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::storage::FilesystemDriver;

struct Mount {
    prefix: String,
    driver: &'static dyn FilesystemDriver,
}

/// Append-only list of mounts, checked longest-prefix-first so `/etc` shadows `/`.
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub const fn new() -> Self {
        MountTable { mounts: Vec::new() }
    }

    pub fn mount(&mut self, prefix: &str, driver: &'static dyn FilesystemDriver) {
        self.mounts.push(Mount { prefix: prefix.to_string(), driver });
        self.mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    }

    /// Finds the mount whose prefix matches `path`, returning the driver and
    /// the path remainder (relative to the mount root) passed on to that
    /// driver's `open`.
    pub fn resolve<'a>(&self, path: &'a str) -> Option<(&'static dyn FilesystemDriver, &'a str)> {
        for mount in &self.mounts {
            if mount.prefix == "/" {
                return Some((mount.driver, path));
            }
            if let Some(rest) = path.strip_prefix(mount.prefix.as_str()) {
                if rest.is_empty() || rest.starts_with('/') {
                    let remainder = if rest.is_empty() { "/" } else { rest };
                    return Some((mount.driver, remainder));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ramfs::RamFs;

    static A: RamFs = RamFs::new();
    static B: RamFs = RamFs::new();

    #[test]
    fn longest_prefix_wins() {
        let mut table = MountTable::new();
        table.mount("/", &A);
        table.mount("/mnt/data", &B);

        let (driver, _) = table.resolve("/mnt/data/file").unwrap();
        assert!(core::ptr::eq(driver as *const dyn FilesystemDriver as *const (), &B as *const RamFs as *const ()));

        let (driver, _) = table.resolve("/etc/motd").unwrap();
        assert!(core::ptr::eq(driver as *const dyn FilesystemDriver as *const (), &A as *const RamFs as *const ()));
    }

    #[test]
    fn no_mount_matches_returns_none() {
        let table = MountTable::new();
        assert!(table.resolve("/anything").is_none());
    }
}
