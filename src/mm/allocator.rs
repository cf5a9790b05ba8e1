//! Kernel heap.
//!
//! The source describes a doubly-linked first-fit heap guarded only by the
//! single-runner invariant (no allocation from ISR context). `linked_list_allocator`
//! implements exactly that algorithm and is used here as the `#[global_allocator]`,
//! rather than hand-rolling the buddy scheme the pre-transformation tree used.

use linked_list_allocator::LockedHeap;

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[cfg(test)]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Give the allocator its backing region. Must be called exactly once, after
/// the physical frame allocator has handed the kernel a mapped virtual range
/// to use as heap space, and before any `alloc`/`Box`/`Vec` use.
///
/// # Safety
/// `start..start+size` must be a valid, exclusively-owned, mapped virtual
/// address range with no other live references into it.
pub unsafe fn init_heap(start: usize, size: usize) {
    ALLOCATOR.lock().init(start as *mut u8, size);
    crate::log_info!("HEAP", "initialized, {} KiB", size / 1024);
}

/// Bytes currently in use on the kernel heap.
pub fn allocated_bytes() -> usize {
    let heap = ALLOCATOR.lock();
    heap.used()
}

/// Bytes still available on the kernel heap.
pub fn free_bytes() -> usize {
    let heap = ALLOCATOR.lock();
    heap.free()
}
