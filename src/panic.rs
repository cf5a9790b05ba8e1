//! Kernel panic handler.
//!
//! Invariant violations in kernel data structures are not recoverable: print
//! the message and location to the diagnostic UART, dump whatever process and
//! register state is available, and halt.

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

static PANIC_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    use crate::serial_println;

    if PANIC_IN_PROGRESS.swap(true, Ordering::SeqCst) {
        serial_println!("RECURSIVE PANIC DETECTED! Halting immediately.");
        loop {
            unsafe { core::arch::asm!("cli; hlt") };
        }
    }

    unsafe { core::arch::asm!("cli") };

    serial_println!("================================================================");
    serial_println!("KERNEL PANIC");
    serial_println!("================================================================");

    if let Some(location) = info.location() {
        serial_println!(
            "Location: {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    serial_println!("Message: {}", info.message());

    if let Some(pid) = crate::proc::scheduler::current_pid_for_log() {
        serial_println!("Current process: pid={}", pid);
    } else {
        serial_println!("Current process: none (early boot or idle)");
    }

    let cr2: u64;
    unsafe { core::arch::asm!("mov {}, cr2", out(reg) cr2) };
    serial_println!("CR2 (fault addr): {:#018x}", cr2);

    serial_println!("================================================================");
    serial_println!("System halted.");

    loop {
        unsafe { core::arch::asm!("hlt") };
    }
}
