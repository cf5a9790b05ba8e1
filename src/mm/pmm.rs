//! Physical frame allocator.
//!
//! A bitmap allocator: one bit per 4 KiB frame, `0` = free, `1` = used. Scans
//! start from the last allocation point so sequential allocations are cheap.
//! Guarded by a spinlock at the call site (`pmm::PMM`) because it must be
//! reachable from the page-fault path, which may run while another context
//! holds no locks but interrupts are enabled.

#![allow(dead_code)]

use crate::mm::{phys_to_virt, PhysAddr};
use limine::memory_map::EntryType;
use limine::response::MemoryMapResponse;

/// Size of a physical frame.
pub const FRAME_SIZE: usize = 4096;

/// Zero a freshly-allocated physical frame through its HHDM alias.
///
/// Under `cfg(test)` there is no HHDM mapping backing these addresses (the
/// allocator under test is a plain heap-backed bitmap, not one built from a
/// real memory map), so zeroing is skipped; the bitmap bookkeeping is what
/// the tests verify.
#[cfg(not(test))]
fn zero_frame(phys_addr: PhysAddr, len: usize) {
    let virt_addr = phys_to_virt(phys_addr);
    unsafe { core::ptr::write_bytes(virt_addr as *mut u8, 0, len) };
}

#[cfg(test)]
fn zero_frame(_phys_addr: PhysAddr, _len: usize) {}

/// Bitmap-backed physical frame allocator.
pub struct PhysicalMemoryManager {
    /// One bit per frame. 0 = free, 1 = used.
    bitmap: &'static mut [u8],
    total_frames: usize,
    free_frames: usize,
    memory_end: PhysAddr,
    /// Last allocated frame index, so sequential allocation stays cheap.
    last_alloc: usize,
}

impl PhysicalMemoryManager {
    /// Build the allocator from the bootloader's memory map, reserving the
    /// kernel image and the bitmap's own storage.
    pub fn init(memory_map: &MemoryMapResponse, kernel_start: PhysAddr, kernel_end: PhysAddr) -> Self {
        let mut highest_addr = 0usize;
        for entry in memory_map.entries() {
            if entry.entry_type == EntryType::USABLE {
                let entry_end = entry.base as usize + entry.length as usize;
                if entry_end > highest_addr {
                    highest_addr = entry_end;
                }
            }
        }

        let total_frames = highest_addr / FRAME_SIZE;
        let bitmap_size = total_frames.div_ceil(8);

        let bitmap_start = (kernel_end + FRAME_SIZE - 1) & !(FRAME_SIZE - 1);
        let bitmap_virt = phys_to_virt(bitmap_start);
        let bitmap = unsafe { core::slice::from_raw_parts_mut(bitmap_virt as *mut u8, bitmap_size) };
        for byte in bitmap.iter_mut() {
            *byte = 0xFF;
        }

        let mut pmm = PhysicalMemoryManager {
            bitmap,
            total_frames,
            free_frames: 0,
            memory_end: highest_addr,
            last_alloc: 0,
        };

        for entry in memory_map.entries() {
            if entry.entry_type == EntryType::USABLE {
                let start_frame = (entry.base as usize) / FRAME_SIZE;
                let end_frame =
                    (entry.base as usize + entry.length as usize).div_ceil(FRAME_SIZE);
                for frame in start_frame..end_frame {
                    if frame < total_frames {
                        pmm.mark_frame_free(frame);
                    }
                }
            }
        }

        for frame in (kernel_start / FRAME_SIZE)..(kernel_end.div_ceil(FRAME_SIZE)) {
            if frame < total_frames {
                pmm.mark_frame_used(frame);
            }
        }

        let bitmap_end = bitmap_start + bitmap_size;
        for frame in (bitmap_start / FRAME_SIZE)..(bitmap_end.div_ceil(FRAME_SIZE)) {
            if frame < total_frames {
                pmm.mark_frame_used(frame);
            }
        }

        crate::log_info!(
            "PMM",
            "{} MiB total, {} MiB free",
            (pmm.total_frames * FRAME_SIZE) / (1024 * 1024),
            (pmm.free_frames * FRAME_SIZE) / (1024 * 1024)
        );

        pmm
    }

    fn mark_frame_free(&mut self, frame: usize) {
        let (byte_index, bit_index) = (frame / 8, frame % 8);
        if byte_index < self.bitmap.len() {
            let was_used = (self.bitmap[byte_index] & (1 << bit_index)) != 0;
            self.bitmap[byte_index] &= !(1 << bit_index);
            if was_used {
                self.free_frames += 1;
            }
        }
    }

    fn mark_frame_used(&mut self, frame: usize) {
        let (byte_index, bit_index) = (frame / 8, frame % 8);
        if byte_index < self.bitmap.len() {
            let was_free = (self.bitmap[byte_index] & (1 << bit_index)) == 0;
            self.bitmap[byte_index] |= 1 << bit_index;
            if was_free {
                self.free_frames -= 1;
            }
        }
    }

    fn is_frame_free(&self, frame: usize) -> bool {
        let (byte_index, bit_index) = (frame / 8, frame % 8);
        byte_index < self.bitmap.len() && (self.bitmap[byte_index] & (1 << bit_index)) == 0
    }

    /// Allocate and zero one physical frame.
    pub fn alloc_frame(&mut self) -> Option<PhysAddr> {
        if self.free_frames == 0 {
            crate::log_warn!("PMM", "out of physical memory");
            return None;
        }

        let start_frame = self.last_alloc;
        for offset in 0..self.total_frames {
            let frame = (start_frame + offset) % self.total_frames;
            if self.is_frame_free(frame) {
                self.mark_frame_used(frame);
                self.last_alloc = frame;

                let phys_addr = frame * FRAME_SIZE;
                zero_frame(phys_addr, FRAME_SIZE);
                return Some(phys_addr);
            }
        }
        None
    }

    /// Release a previously allocated frame back to the free pool.
    pub fn free_frame(&mut self, phys_addr: PhysAddr) {
        if phys_addr % FRAME_SIZE != 0 {
            return;
        }
        let frame = phys_addr / FRAME_SIZE;
        if frame >= self.total_frames || self.is_frame_free(frame) {
            return;
        }
        self.mark_frame_free(frame);
    }

    /// Allocate `count` contiguous, `align`-aligned frames (for DMA buffers).
    pub fn alloc_contiguous(&mut self, count: usize, align: usize) -> Option<PhysAddr> {
        if align == 0 || (align & (align - 1)) != 0 || self.free_frames < count {
            return None;
        }

        let align_frames = align / FRAME_SIZE;
        let mut start_frame = 0;

        while start_frame < self.total_frames {
            if align_frames > 1 {
                start_frame = (start_frame + align_frames - 1) & !(align_frames - 1);
            }
            if start_frame + count > self.total_frames {
                break;
            }

            let mut all_free = true;
            for offset in 0..count {
                if !self.is_frame_free(start_frame + offset) {
                    all_free = false;
                    start_frame += offset + 1;
                    break;
                }
            }

            if all_free {
                for offset in 0..count {
                    self.mark_frame_used(start_frame + offset);
                }
                let phys_addr = start_frame * FRAME_SIZE;
                zero_frame(phys_addr, count * FRAME_SIZE);
                return Some(phys_addr);
            }
        }
        None
    }

    pub fn total_memory_mb(&self) -> usize {
        (self.total_frames * FRAME_SIZE) / (1024 * 1024)
    }

    pub fn free_memory_mb(&self) -> usize {
        (self.free_frames * FRAME_SIZE) / (1024 * 1024)
    }
}

/// Build a manager over a heap-backed (not HHDM-backed) bitmap, large enough
/// to exercise allocation/free without touching real physical memory. Used
/// by this module's own tests and by other modules (the ELF loader) that
/// need a real `PhysicalMemoryManager` to drive in a test build.
#[cfg(test)]
pub(crate) fn test_instance(total_frames: usize) -> PhysicalMemoryManager {
    let bitmap_size = total_frames.div_ceil(8);
    let bitmap: &'static mut [u8] =
        alloc::boxed::Box::leak(alloc::vec![0u8; bitmap_size].into_boxed_slice());
    PhysicalMemoryManager {
        bitmap,
        total_frames,
        free_frames: total_frames,
        memory_end: total_frames * FRAME_SIZE,
        last_alloc: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pmm(total_frames: usize) -> PhysicalMemoryManager {
        test_instance(total_frames)
    }

    #[test]
    fn alloc_marks_frame_used() {
        let mut pmm = test_pmm(64);
        assert!(pmm.is_frame_free(0));
        let frame0 = pmm.alloc_frame().unwrap();
        assert_eq!(frame0, 0);
        assert!(!pmm.is_frame_free(0));
        assert_eq!(pmm.free_frames, 63);
    }

    #[test]
    fn free_then_realloc_reuses_frame() {
        let mut pmm = test_pmm(4);
        let f0 = pmm.alloc_frame().unwrap();
        let _f1 = pmm.alloc_frame().unwrap();
        pmm.free_frame(f0);
        assert!(pmm.is_frame_free(f0 / FRAME_SIZE));
        assert_eq!(pmm.free_frames, 3);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut pmm = test_pmm(2);
        assert!(pmm.alloc_frame().is_some());
        assert!(pmm.alloc_frame().is_some());
        assert!(pmm.alloc_frame().is_none());
    }

    #[test]
    fn contiguous_allocation_respects_alignment() {
        let mut pmm = test_pmm(16);
        let addr = pmm.alloc_contiguous(4, FRAME_SIZE * 4).unwrap();
        assert_eq!(addr % (FRAME_SIZE * 4), 0);
        for frame in (addr / FRAME_SIZE)..(addr / FRAME_SIZE + 4) {
            assert!(!pmm.is_frame_free(frame));
        }
    }

    #[test]
    fn double_free_is_a_no_op() {
        let mut pmm = test_pmm(4);
        let f0 = pmm.alloc_frame().unwrap();
        pmm.free_frame(f0);
        let before = pmm.free_frames;
        pmm.free_frame(f0);
        assert_eq!(pmm.free_frames, before);
    }
}
