//! The global open-file table: system FD -> driver-agnostic open-file state.
//!
//! Mirrors the source's `FileDescriptor`/open-file-table pair, but holds a
//! running byte offset instead of delegating offset tracking to each driver
//! (§4.5): pipes, the input stream, and sockets are pure byte streams with no
//! offset concept at all, while `FilesystemDriver` implementations (`RamFs`)
//! are addressed by an explicit offset the VFS must track and advance itself.

use alloc::vec::Vec;

use crate::storage::FileMetadata;
use crate::sync::SpinLock;

pub struct OpenFileDescription {
    pub meta: FileMetadata,
    pub offset: u64,
    pub refcount: u32,
}

struct OpenFileTable {
    slots: Vec<Option<OpenFileDescription>>,
}

impl OpenFileTable {
    const fn new() -> Self {
        OpenFileTable { slots: Vec::new() }
    }

    fn install(&mut self, meta: FileMetadata) -> usize {
        let ofd = OpenFileDescription { meta, offset: 0, refcount: 1 };
        if let Some((index, slot)) = self.slots.iter_mut().enumerate().find(|(_, s)| s.is_none()) {
            *slot = Some(ofd);
            index
        } else {
            self.slots.push(Some(ofd));
            self.slots.len() - 1
        }
    }
}

static OPEN_FILES: SpinLock<OpenFileTable> = SpinLock::new(OpenFileTable::new());

pub fn install(meta: FileMetadata) -> usize {
    OPEN_FILES.lock().install(meta)
}

pub fn with<R>(sysfd: usize, f: impl FnOnce(&mut OpenFileDescription) -> R) -> Option<R> {
    OPEN_FILES.lock().slots.get_mut(sysfd).and_then(|s| s.as_mut()).map(f)
}

/// Bumps the refcount of an already-open system FD, for `dup` and for the
/// `fork` syscall's post-copy pass over the child's inherited FD table.
pub fn retain(sysfd: usize) {
    if let Some(slot) = OPEN_FILES.lock().slots.get_mut(sysfd).and_then(|s| s.as_mut()) {
        slot.refcount += 1;
    }
}

/// Drops the refcount, returning the metadata to close/flush through the
/// owning driver when it reaches zero (the caller, not this table, knows
/// how to dispatch `close`/`flush` per `DriverKind`).
pub fn release(sysfd: usize) -> Option<FileMetadata> {
    let mut table = OPEN_FILES.lock();
    let slot = table.slots.get_mut(sysfd)?;
    let done = {
        let ofd = slot.as_mut()?;
        ofd.refcount -= 1;
        ofd.refcount == 0
    };
    if done {
        slot.take().map(|ofd| ofd.meta)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DriverKind, FileType};
    use alloc::string::String;

    fn meta() -> FileMetadata {
        FileMetadata::new(FileType::CharDevice, String::from("t"), 0, DriverKind::Pipe, 0)
    }

    #[test]
    fn install_then_release_frees_on_zero_refcount() {
        let sysfd = install(meta());
        assert!(release(sysfd).is_some());
    }

    #[test]
    fn retain_requires_two_releases() {
        let sysfd = install(meta());
        retain(sysfd);
        assert!(release(sysfd).is_none());
        assert!(release(sysfd).is_some());
    }

    #[test]
    fn offset_mutation_round_trips() {
        let sysfd = install(meta());
        with(sysfd, |ofd| ofd.offset = 42);
        assert_eq!(with(sysfd, |ofd| ofd.offset), Some(42));
        release(sysfd);
    }
}
