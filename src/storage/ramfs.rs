//! A minimal in-memory filesystem driver, mounted at `/` by default.
//!
//! The source's filesystem drivers parse an on-disk layout (FAT, or the
//! project's own MFS) behind a block device. Building a crash-consistent,
//! on-disk filesystem is explicitly out of scope (§1 Non-goals); this
//! driver exists so the VFS's mount table, longest-prefix matching, and the
//! `directory_data`/`pwd`/`stat` syscalls have something real to resolve
//! against, grounded in the `FilesystemDriver` contract (§4.1) rather than
//! inventing a parallel path.
//!
//! Files and directories live in a flat arena of nodes; a directory holds
//! the arena indices of its children. There is no on-disk representation
//! and no persistence across boots.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::storage::driver::{FilesystemDriver, StorageDeviceDriver};
use crate::storage::errors::{DriverError, DriverResult, DriverStatus};
use crate::storage::metadata::{DriverKind, FileMetadata, FileType};
use crate::sync::SpinLock;

struct RamFsNode {
    name: String,
    is_dir: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    data: Vec<u8>,
}

impl RamFsNode {
    fn root() -> Self {
        RamFsNode { name: String::new(), is_dir: true, parent: None, children: Vec::new(), data: Vec::new() }
    }
}

pub struct RamFs {
    nodes: SpinLock<Vec<RamFsNode>>,
}

const ROOT: usize = 0;

impl RamFs {
    pub const fn new() -> Self {
        RamFs { nodes: SpinLock::new(Vec::new()) }
    }

    fn ensure_root(nodes: &mut Vec<RamFsNode>) {
        if nodes.is_empty() {
            nodes.push(RamFsNode::root());
        }
    }

    fn resolve(nodes: &[RamFsNode], path: &str) -> Option<usize> {
        let mut current = ROOT;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let node = nodes.get(current)?;
            current = *node.children.iter().find(|&&c| nodes[c].name == component)?;
        }
        Some(current)
    }

    /// Seeds a file at `path` with `contents`, creating any missing parent
    /// directories. Used at boot to populate demo content; not exposed as a
    /// syscall (there is no generic `mkdir`/`creat` in the fixed syscall table).
    pub fn seed_file(&self, path: &str, contents: &[u8]) {
        let mut nodes = self.nodes.lock();
        Self::ensure_root(&mut nodes);
        let mut current = ROOT;
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        for (i, component) in components.iter().enumerate() {
            let existing = nodes[current].children.iter().find(|&&c| nodes[c].name == *component).copied();
            let is_last = i == components.len() - 1;
            current = match existing {
                Some(idx) => idx,
                None => {
                    let idx = nodes.len();
                    nodes.push(RamFsNode {
                        name: component.to_string(),
                        is_dir: !is_last,
                        parent: Some(current),
                        children: Vec::new(),
                        data: Vec::new(),
                    });
                    nodes[current].children.push(idx);
                    idx
                }
            };
        }
        nodes[current].data = contents.to_vec();
    }

}

impl FilesystemDriver for RamFs {
    fn open(&self, path: &str) -> Result<FileMetadata, DriverError> {
        let mut nodes = self.nodes.lock();
        Self::ensure_root(&mut nodes);
        let index = Self::resolve(&nodes, path).ok_or(DriverError::BadPath)?;
        let node = &nodes[index];
        let file_type = if node.is_dir { FileType::Directory } else { FileType::Regular };
        Ok(FileMetadata::new(file_type, node.name.clone(), node.data.len() as u64, DriverKind::Filesystem(0), index as u64))
    }

    fn close(&self, _meta: &FileMetadata) {}

    fn read(&self, meta: &FileMetadata, offset: u64, count: usize, out: &mut [u8]) -> DriverResult {
        let nodes = self.nodes.lock();
        let node = nodes.get(meta.driver_data as usize).ok_or(DriverStatus::Error(DriverError::BadFd))?;
        let offset = offset as usize;
        if offset >= node.data.len() {
            return Ok(0);
        }
        let n = core::cmp::min(count, node.data.len() - offset).min(out.len());
        out[..n].copy_from_slice(&node.data[offset..offset + n]);
        Ok(n as i64)
    }

    fn write(&self, meta: &FileMetadata, offset: u64, count: usize, data: &[u8]) -> DriverResult {
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(meta.driver_data as usize).ok_or(DriverStatus::Error(DriverError::BadFd))?;
        if node.is_dir {
            return Err(DriverStatus::Error(DriverError::InvalidArgument));
        }
        let offset = offset as usize;
        let n = core::cmp::min(count, data.len());
        if node.data.len() < offset + n {
            node.data.resize(offset + n, 0);
        }
        node.data[offset..offset + n].copy_from_slice(&data[..n]);
        Ok(n as i64)
    }

    fn read_raw(&self, _offset: u64, _count: usize, _out: &mut [u8]) -> DriverResult {
        Err(DriverStatus::Error(DriverError::NotSupported))
    }

    fn flush(&self, _meta: &FileMetadata) {}

    fn device(&self) -> Option<&dyn StorageDeviceDriver> {
        None
    }

    fn name(&self) -> &str {
        "ramfs"
    }

    fn list_dir(&self, meta: &FileMetadata) -> Result<Vec<String>, DriverError> {
        let nodes = self.nodes.lock();
        let index = meta.driver_data as usize;
        let node = nodes.get(index).ok_or(DriverError::BadFd)?;
        if !node.is_dir {
            return Err(DriverError::InvalidArgument);
        }
        Ok(node.children.iter().map(|&c| nodes[c].name.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_then_open_and_read_round_trips() {
        let fs = RamFs::new();
        fs.seed_file("/etc/motd", b"welcome");
        let meta = fs.open("/etc/motd").unwrap();
        let mut buf = [0u8; 16];
        let n = fs.read(&meta, 0, 16, &mut buf).unwrap();
        assert_eq!(&buf[..n as usize], b"welcome");
    }

    #[test]
    fn open_missing_path_is_bad_path() {
        let fs = RamFs::new();
        assert_eq!(fs.open("/nope"), Err(DriverError::BadPath));
    }

    #[test]
    fn list_dir_returns_child_names() {
        let fs = RamFs::new();
        fs.seed_file("/etc/motd", b"hi");
        fs.seed_file("/etc/hostname", b"lensor");
        let dir = fs.open("/etc").unwrap();
        let mut names = fs.list_dir(&dir).unwrap();
        names.sort();
        assert_eq!(names, alloc::vec!["hostname".to_string(), "motd".to_string()]);
    }

    #[test]
    fn write_past_end_extends_file() {
        let fs = RamFs::new();
        fs.seed_file("/f", b"");
        let meta = fs.open("/f").unwrap();
        assert_eq!(fs.write(&meta, 0, 5, b"hello").unwrap(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(fs.read(&meta, 0, 5, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }
}
