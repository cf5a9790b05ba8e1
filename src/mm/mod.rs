//! Memory management: physical frame allocator, page tables, kernel heap.

pub mod allocator;
pub mod pmm;

use limine::request::HhdmRequest;

use crate::mm::pmm::PhysicalMemoryManager;
use crate::sync::SpinLock;

/// A physical memory address.
pub type PhysAddr = usize;

/// A virtual memory address.
pub type VirtAddr = usize;

#[used]
#[link_section = ".requests"]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

/// The kernel's one physical frame allocator instance, built once at boot from
/// the bootloader's memory map and shared by every subsystem that needs
/// frames (the heap's backing region, `exec`'s `PT_LOAD` segments).
static PMM: SpinLock<Option<PhysicalMemoryManager>> = SpinLock::new(None);

/// Installs the frame allocator built during boot. Must run exactly once.
pub fn init_pmm(pmm: PhysicalMemoryManager) {
    *PMM.lock() = Some(pmm);
}

/// Runs `f` against the global frame allocator, if it has been initialized.
pub fn with_pmm<R>(f: impl FnOnce(&mut PhysicalMemoryManager) -> R) -> Option<R> {
    PMM.lock().as_mut().map(f)
}

/// Offset of the higher-half direct map established by the bootloader.
/// Physical address 0 is mapped at this virtual address, and so on linearly;
/// this lets the kernel touch any physical frame without building page tables
/// for it first.
static mut HHDM_OFFSET: u64 = 0;

/// Record the bootloader-provided HHDM offset. Must run once, before any
/// other code in this module is used.
pub fn init_hhdm() {
    let offset = HHDM_REQUEST
        .get_response()
        .map(|r| r.offset())
        .unwrap_or(0);
    unsafe {
        HHDM_OFFSET = offset;
    }
}

/// Translate a physical address to its HHDM virtual alias.
#[inline]
pub fn phys_to_virt(phys: PhysAddr) -> VirtAddr {
    phys + unsafe { HHDM_OFFSET } as usize
}

/// Translate an HHDM virtual address back to its physical address.
#[inline]
pub fn virt_to_phys(virt: VirtAddr) -> PhysAddr {
    virt - unsafe { HHDM_OFFSET } as usize
}
