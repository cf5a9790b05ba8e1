//! Kernel entry point.
//!
//! Shaped after the source's `_start`: a handful of `#[link_section =
//! ".requests"]` statics the Limine bootloader scans for before handing
//! control here, then a linear boot sequence with no return. Generalized
//! from the source's "clear the framebuffer and print a greeting" body to
//! the full sequence this kernel's subsystems need: serial first (so every
//! later step can log), the physical frame allocator built from the
//! bootloader's memory map, the kernel heap carved out of it, the root
//! filesystem mounted, and an init process spawned with its stdio wired to
//! the built-in device drivers.
#![no_std]
#![no_main]

extern crate alloc;

use limine::request::{ExecutableAddressRequest, FramebufferRequest, MemoryMapRequest};

use lensor_core::mm::pmm::{PhysicalMemoryManager, FRAME_SIZE};
use lensor_core::proc::scheduler;
use lensor_core::storage::ramfs::RamFs;
use lensor_core::vfs::flags::FdFlags;
use lensor_core::{log_info, mm, serial, vfs};

#[used]
#[link_section = ".requests"]
static FRAMEBUFFER_REQUEST: FramebufferRequest = FramebufferRequest::new();

#[used]
#[link_section = ".requests"]
static MEMORY_MAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

#[used]
#[link_section = ".requests"]
static EXECUTABLE_ADDRESS_REQUEST: ExecutableAddressRequest = ExecutableAddressRequest::new();

/// Number of heap frames handed to `linked_list_allocator`. One page per
/// frame, so this is 8 MiB of kernel heap.
const HEAP_FRAMES: usize = 2048;

/// The kernel image's extent, provided by the link script and read back
/// through the symbols' own addresses. Shaped after the source's
/// `map_kernel_sections`, which reads the same `__text_start`/`__data_end`
/// pair to size the mappings it builds; here they size the PMM's reserved
/// range instead, since this kernel keeps everything in the HHDM rather
/// than building page tables of its own (§1 Non-goals).
extern "C" {
    static __text_start: u8;
    static __data_end: u8;
}

/// Root filesystem, mounted at `/` for the lifetime of the kernel.
static ROOT_FS: RamFs = RamFs::new();

/// Kernel entry point called by the Limine bootloader.
#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial::SERIAL.lock().init();
    log_info!("BOOT", "lensor-core starting");

    mm::init_hhdm();

    let memory_map = MEMORY_MAP_REQUEST
        .get_response()
        .expect("Limine did not provide a memory map");
    let exec_addr = EXECUTABLE_ADDRESS_REQUEST
        .get_response()
        .expect("Limine did not provide the kernel's executable address");

    let virtual_base = exec_addr.virtual_base() as usize;
    let physical_base = exec_addr.physical_base() as usize;
    let kernel_start_virt = &__text_start as *const u8 as usize;
    let kernel_end_virt = &__data_end as *const u8 as usize;
    let kernel_start = physical_base + (kernel_start_virt - virtual_base);
    let kernel_end = physical_base + (kernel_end_virt - virtual_base);

    let mut pmm = PhysicalMemoryManager::init(memory_map, kernel_start, kernel_end);

    let heap_phys = pmm
        .alloc_contiguous(HEAP_FRAMES, FRAME_SIZE)
        .expect("not enough physical memory for the kernel heap");
    let heap_virt = mm::phys_to_virt(heap_phys);
    unsafe { mm::allocator::init_heap(heap_virt, HEAP_FRAMES * FRAME_SIZE) };

    mm::init_pmm(pmm);

    if FRAMEBUFFER_REQUEST.get_response().is_none() {
        log_info!("BOOT", "no framebuffer available, running headless");
    }

    vfs::mount("/", &ROOT_FS);
    ROOT_FS.seed_file("/README", b"lensor-core\n");

    let stdin = vfs::open("/dev/stdin", FdFlags::O_RDONLY).expect("failed to open /dev/stdin");
    let stdout = vfs::open("/dev/stdout", FdFlags::O_WRONLY).expect("failed to open /dev/stdout");
    let stderr = vfs::open("/dev/stderr", FdFlags::O_WRONLY).expect("failed to open /dev/stderr");

    let init_pid = scheduler::spawn("init", None, [stdin, stdout, stderr])
        .expect("failed to spawn the init process");
    log_info!("BOOT", "spawned init as pid {}", init_pid);

    loop {
        scheduler::tick();
        unsafe { core::arch::asm!("hlt") };
    }
}
