//! Open-mode flags passed to syscall #0 (`open`), grounded on the source's
//! `FdFlags`. The fixed-arity `open(path) -> FD` signature in §4.8 doesn't
//! leave room to pick pipe read/write end or request append semantics, so
//! `open`'s third argument carries these bits (SPEC_FULL §4.8).

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FdFlags: u32 {
        const O_WRONLY = 0x0001;
        const O_RDWR = 0x0002;
        const O_APPEND = 0x0008;
        const O_CLOEXEC = 0x0080;
    }
}

impl FdFlags {
    /// `O_RDONLY` is the all-zero-bits mode, same convention as the source.
    pub const O_RDONLY: FdFlags = FdFlags::empty();

    pub fn is_readable(self) -> bool {
        !self.contains(FdFlags::O_WRONLY) || self.contains(FdFlags::O_RDWR)
    }

    pub fn is_writable(self) -> bool {
        self.contains(FdFlags::O_WRONLY) || self.contains(FdFlags::O_RDWR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdonly_is_readable_not_writable() {
        assert!(FdFlags::O_RDONLY.is_readable());
        assert!(!FdFlags::O_RDONLY.is_writable());
    }

    #[test]
    fn rdwr_is_both() {
        let flags = FdFlags::O_RDWR;
        assert!(flags.is_readable());
        assert!(flags.is_writable());
    }
}
