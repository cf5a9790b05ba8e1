//! Boot-info handoff record.
//!
//! The kernel entry point receives these fields from the bootloader. The
//! framebuffer and font are borrowed for the lifetime the bootloader
//! guarantees (until the kernel relocates itself); the kernel never frees
//! them itself.

use crate::mm::PhysAddr;

/// Pixel layout of the boot framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub red_mask_shift: u8,
    pub green_mask_shift: u8,
    pub blue_mask_shift: u8,
    pub bits_per_pixel: u16,
}

/// Framebuffer descriptor handed off by the bootloader.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferInfo {
    pub base: VirtAddrPtr,
    pub width: u64,
    pub height: u64,
    /// Bytes per scanline; may exceed `width * bpp / 8` for alignment.
    pub pitch: u64,
    pub format: PixelFormat,
}

/// Raw pointer into bootloader-owned memory; not dereferenced by this crate,
/// only forwarded to the (out-of-scope) glyph renderer.
pub type VirtAddrPtr = usize;

/// A PSF1 bitmap font, borrowed from the bootloader's module list.
#[derive(Debug, Clone, Copy)]
pub struct Psf1Font {
    pub glyph_buffer: VirtAddrPtr,
    pub glyph_count: u32,
    pub bytes_per_glyph: u32,
}

/// One entry of the UEFI memory map, matching the fourteen enumerated UEFI
/// memory types (`ReservedMemoryType` through `PalCode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum UefiMemoryType {
    Reserved = 0,
    LoaderCode = 1,
    LoaderData = 2,
    BootServicesCode = 3,
    BootServicesData = 4,
    RuntimeServicesCode = 5,
    RuntimeServicesData = 6,
    Conventional = 7,
    Unusable = 8,
    AcpiReclaim = 9,
    AcpiNvs = 10,
    MemoryMappedIo = 11,
    MemoryMappedIoPortSpace = 12,
    PalCode = 13,
}

impl UefiMemoryType {
    /// Whether the physical allocator may claim this region. `BootServices*`
    /// is only safe to reclaim after `ExitBootServices` has run, which the
    /// bootloader guarantees by the time the kernel sees this map.
    pub fn available_to_pmm(self) -> bool {
        matches!(
            self,
            UefiMemoryType::Conventional
                | UefiMemoryType::BootServicesCode
                | UefiMemoryType::BootServicesData
        )
    }
}

/// A single UEFI memory descriptor.
#[derive(Debug, Clone, Copy)]
pub struct UefiMemoryDescriptor {
    pub ty: UefiMemoryType,
    pub physical_start: PhysAddr,
    pub number_of_pages: u64,
}

/// The UEFI memory map, as handed off: a descriptor array plus the stride
/// between entries (descriptor size may exceed `size_of::<UefiMemoryDescriptor>()`
/// if the firmware appends vendor fields).
pub struct UefiMemoryMap<'a> {
    pub descriptors: &'a [UefiMemoryDescriptor],
    pub descriptor_size: usize,
}

/// The full boot-info record passed to kernel entry.
pub struct BootInfo<'a> {
    pub framebuffer: Option<FramebufferInfo>,
    pub font: Option<Psf1Font>,
    pub memory_map: UefiMemoryMap<'a>,
    /// Physical address of the ACPI 2.0 RSDP, if the firmware is UEFI/ACPI 2.0+.
    pub acpi_rsdp: Option<PhysAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_services_memory_is_claimable_after_handoff() {
        assert!(UefiMemoryType::Conventional.available_to_pmm());
        assert!(UefiMemoryType::BootServicesCode.available_to_pmm());
        assert!(UefiMemoryType::BootServicesData.available_to_pmm());
        assert!(!UefiMemoryType::Reserved.available_to_pmm());
        assert!(!UefiMemoryType::AcpiNvs.available_to_pmm());
        assert!(!UefiMemoryType::MemoryMappedIo.available_to_pmm());
    }
}
