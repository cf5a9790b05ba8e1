//! Low-level I/O primitives shared by the (out-of-scope) hardware drivers:
//! safe wrappers over x86 port I/O. The UART, PIT, and keyboard controller
//! all sit behind this module; their interrupt-handling logic is conventional
//! hardware plumbing (§1) and lives outside this crate's core.

pub mod port;
