//! Synchronization primitives.
//!
//! The kernel is single-CPU and cooperatively scheduled, so almost all shared
//! state is protected by the single-runner invariant alone. The exception is
//! the small set of structures touched from interrupt context (the keyboard
//! buffer, the PIT tick counter, driver waiter lists reachable from an ISR),
//! which use the spinlocks below.

mod spin;

pub use spin::{IrqSpinLock, IrqSpinLockGuard, SpinLock, SpinLockGuard};
