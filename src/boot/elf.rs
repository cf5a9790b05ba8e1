//! ELF64 executable loading.
//!
//! Validates the header, then walks the program-header table mapping each
//! `PT_LOAD` segment into the target address space. Section headers are
//! ignored; only program headers drive loading.

use crate::mm::pmm::{PhysicalMemoryManager, FRAME_SIZE};
use crate::proc::process::MemoryRegion;

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;
pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;
pub const EM_X86_64: u16 = 62;

pub const PT_LOAD: u32 = 1;
pub const PT_GNU_STACK: u32 = 0x6474e551;

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

pub const USER_STACK_TOP: u64 = 0x0000_7FFF_FFFF_0000;
pub const USER_STACK_SIZE: u64 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    InvalidMagic,
    UnsupportedClass,
    UnsupportedEncoding,
    UnsupportedVersion,
    UnsupportedType,
    UnsupportedMachine,
    InvalidEntryPoint,
    InvalidAddress,
    BufferTooSmall,
    OutOfMemory,
    InvalidProgramHeader,
    MappingFailed,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Header {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl Elf64Header {
    /// Parse and validate the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Elf64Header, ElfError> {
        if data.len() < core::mem::size_of::<Elf64Header>() {
            return Err(ElfError::BufferTooSmall);
        }

        let header = unsafe { (data.as_ptr() as *const Elf64Header).read_unaligned() };

        if header.e_ident[0..4] != ELF_MAGIC {
            return Err(ElfError::InvalidMagic);
        }
        if header.e_ident[4] != ELFCLASS64 {
            return Err(ElfError::UnsupportedClass);
        }
        if header.e_ident[5] != ELFDATA2LSB {
            return Err(ElfError::UnsupportedEncoding);
        }
        if header.e_ident[6] != EV_CURRENT {
            return Err(ElfError::UnsupportedVersion);
        }
        if header.e_type != ET_EXEC && header.e_type != ET_DYN {
            return Err(ElfError::UnsupportedType);
        }
        if header.e_machine != EM_X86_64 {
            return Err(ElfError::UnsupportedMachine);
        }
        if header.e_entry == 0 {
            return Err(ElfError::InvalidEntryPoint);
        }

        Ok(header)
    }

    /// Iterate the program-header table.
    pub fn program_headers<'a>(&self, data: &'a [u8]) -> Result<&'a [Elf64ProgramHeader], ElfError> {
        let phoff = self.e_phoff as usize;
        let count = self.e_phnum as usize;
        let entsize = self.e_phentsize as usize;

        if entsize != core::mem::size_of::<Elf64ProgramHeader>() {
            return Err(ElfError::InvalidProgramHeader);
        }
        let total = count
            .checked_mul(entsize)
            .ok_or(ElfError::InvalidProgramHeader)?;
        if phoff.checked_add(total).ok_or(ElfError::InvalidProgramHeader)? > data.len() {
            return Err(ElfError::BufferTooSmall);
        }

        let ptr = unsafe { data.as_ptr().add(phoff) } as *const Elf64ProgramHeader;
        Ok(unsafe { core::slice::from_raw_parts(ptr, count) })
    }
}

/// Translate `PF_R`/`PF_W`/`PF_X` into the three booleans a page-table entry cares about.
pub fn segment_protection(flags: u32) -> (bool, bool, bool) {
    (flags & PF_R != 0, flags & PF_W != 0, flags & PF_X != 0)
}

/// Load every `PT_LOAD` segment of `image` into `regions`, allocating backing
/// frames from `pmm`. Returns the entry point on success.
///
/// This models page-table population abstractly as a list of mapped
/// `MemoryRegion`s (address range + protection) rather than walking real x86
/// page tables, matching the process record's own bookkeeping
/// (`Process::memory_regions`); `crate::arch` is responsible for turning
/// those regions into actual PTEs when a process is scheduled in, which is
/// out of scope here.
pub fn load_elf(
    image: &[u8],
    pmm: &mut PhysicalMemoryManager,
    regions: &mut alloc::vec::Vec<MemoryRegion>,
) -> Result<u64, ElfError> {
    let header = Elf64Header::parse(image)?;
    let phdrs = header.program_headers(image)?;

    regions.clear();

    for ph in phdrs {
        if ph.p_type != PT_LOAD {
            continue;
        }

        if ph.p_filesz > ph.p_memsz {
            return Err(ElfError::InvalidProgramHeader);
        }

        let page_offset = (ph.p_vaddr as usize) % FRAME_SIZE;
        let vaddr_start = (ph.p_vaddr as usize) - page_offset;
        let mapped_len = (ph.p_memsz as usize + page_offset).div_ceil(FRAME_SIZE) * FRAME_SIZE;
        let (readable, writable, executable) = segment_protection(ph.p_flags);

        let frame_count = mapped_len / FRAME_SIZE;
        let mut frames = alloc::vec::Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            let frame = pmm.alloc_frame().ok_or(ElfError::OutOfMemory)?;
            frames.push(frame);
        }

        let file_start = ph.p_offset as usize;
        let file_end = file_start
            .checked_add(ph.p_filesz as usize)
            .ok_or(ElfError::InvalidProgramHeader)?;
        if file_end > image.len() {
            return Err(ElfError::BufferTooSmall);
        }

        copy_segment_into_frames(
            &image[file_start..file_end],
            page_offset,
            ph.p_memsz as usize,
            &frames,
        );

        crate::log_debug!(
            "ELF",
            "PT_LOAD vaddr={:#x} memsz={:#x} r={} w={} x={}",
            ph.p_vaddr,
            ph.p_memsz,
            readable,
            writable,
            executable
        );

        regions.push(MemoryRegion {
            vaddr_start: vaddr_start as u64,
            len: mapped_len as u64,
            frames,
            writable,
            executable,
        });
    }

    Ok(header.e_entry)
}

#[cfg(not(test))]
fn copy_segment_into_frames(src: &[u8], page_offset: usize, memsz: usize, frames: &[crate::mm::PhysAddr]) {
    use crate::mm::phys_to_virt;

    let mut written = 0usize;
    let mut remaining_zero = memsz;
    for (i, &frame) in frames.iter().enumerate() {
        let dst = phys_to_virt(frame) as *mut u8;
        let frame_off = if i == 0 { page_offset } else { 0 };
        let frame_room = FRAME_SIZE - frame_off;

        let copy_len = core::cmp::min(frame_room, src.len().saturating_sub(written));
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr().add(written), dst.add(frame_off), copy_len);
        }
        written += copy_len;

        let zero_len = core::cmp::min(frame_room - copy_len, remaining_zero);
        unsafe {
            core::ptr::write_bytes(dst.add(frame_off + copy_len), 0, zero_len);
        }
        remaining_zero = remaining_zero.saturating_sub(copy_len + zero_len);
    }
}

/// Test builds never touch the HHDM-backed frames returned by the
/// allocator-under-test (see `mm::pmm` tests), so segment population is a
/// no-op; loader tests assert on the returned `MemoryRegion` metadata instead.
#[cfg(test)]
fn copy_segment_into_frames(_src: &[u8], _page_offset: usize, _memsz: usize, _frames: &[crate::mm::PhysAddr]) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header(e_type: u16, magic_ok: bool, class: u8, machine: u16) -> [u8; 64] {
        let mut buf = [0u8; 64];
        if magic_ok {
            buf[0..4].copy_from_slice(&ELF_MAGIC);
        }
        buf[4] = class;
        buf[5] = ELFDATA2LSB;
        buf[6] = EV_CURRENT;
        buf[16..18].copy_from_slice(&e_type.to_le_bytes());
        buf[18..20].copy_from_slice(&machine.to_le_bytes());
        buf[24..32].copy_from_slice(&0x401000u64.to_le_bytes()); // e_entry
        buf
    }

    #[test]
    fn rejects_invalid_magic() {
        let buf = make_header(ET_EXEC, false, ELFCLASS64, EM_X86_64);
        assert_eq!(Elf64Header::parse(&buf), Err(ElfError::InvalidMagic));
    }

    #[test]
    fn rejects_wrong_class() {
        let buf = make_header(ET_EXEC, true, 1, EM_X86_64);
        assert_eq!(Elf64Header::parse(&buf), Err(ElfError::UnsupportedClass));
    }

    #[test]
    fn rejects_wrong_machine() {
        let buf = make_header(ET_EXEC, true, ELFCLASS64, 3);
        assert_eq!(Elf64Header::parse(&buf), Err(ElfError::UnsupportedMachine));
    }

    #[test]
    fn accepts_valid_header() {
        let buf = make_header(ET_EXEC, true, ELFCLASS64, EM_X86_64);
        let header = Elf64Header::parse(&buf).unwrap();
        assert_eq!(header.e_entry, 0x401000);
    }

    #[test]
    fn segment_flag_mapping_is_bitwise() {
        assert_eq!(segment_protection(PF_R), (true, false, false));
        assert_eq!(segment_protection(PF_R | PF_X), (true, false, true));
        assert_eq!(segment_protection(PF_R | PF_W), (true, true, false));
        assert_eq!(segment_protection(0), (false, false, false));
    }

    #[test]
    fn two_segment_image_maps_both_ranges() {
        // Minimal two-PT_LOAD image: header + two program headers, no file
        // content (filesz=0 for both, so no bytes need to be readable past
        // the header), matching scenario S4's two ranges.
        let ehsize = core::mem::size_of::<Elf64Header>();
        let phentsize = core::mem::size_of::<Elf64ProgramHeader>();
        let phoff = ehsize;
        let mut image = alloc::vec![0u8; phoff + phentsize * 2];

        let header = make_header(ET_EXEC, true, ELFCLASS64, EM_X86_64);
        image[0..ehsize].copy_from_slice(&header);
        // e_phoff at offset 32, e_phnum at offset 56 in Elf64Header layout.
        image[32..40].copy_from_slice(&(phoff as u64).to_le_bytes());
        image[54..56].copy_from_slice(&(phentsize as u16).to_le_bytes());
        image[56..58].copy_from_slice(&2u16.to_le_bytes());

        let ph0 = Elf64ProgramHeader {
            p_type: PT_LOAD,
            p_flags: PF_R | PF_X,
            p_offset: 0,
            p_vaddr: 0x400000,
            p_paddr: 0,
            p_filesz: 0,
            p_memsz: FRAME_SIZE as u64,
            p_align: FRAME_SIZE as u64,
        };
        let ph1 = Elf64ProgramHeader {
            p_type: PT_LOAD,
            p_flags: PF_R | PF_W,
            p_offset: 0,
            p_vaddr: 0x600000,
            p_paddr: 0,
            p_filesz: 0,
            p_memsz: FRAME_SIZE as u64,
            p_align: FRAME_SIZE as u64,
        };
        unsafe {
            let dst = image.as_mut_ptr().add(phoff) as *mut Elf64ProgramHeader;
            dst.write_unaligned(ph0);
            dst.add(1).write_unaligned(ph1);
        }

        let mut pmm = crate::mm::pmm::test_instance(64);
        let mut regions = alloc::vec::Vec::new();
        let entry = load_elf(&image, &mut pmm, &mut regions).unwrap();

        assert_eq!(entry, 0x401000);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].vaddr_start, 0x400000);
        assert!(regions[0].executable && !regions[0].writable);
        assert_eq!(regions[1].vaddr_start, 0x600000);
        assert!(regions[1].writable && !regions[1].executable);
    }
}
