//! Boot handoff and the external-collaborator contracts described by the boot
//! protocol: framebuffer/font/memory-map/RSDP handoff, ELF64 loading, ACPI
//! table checksums, and GPT partition decoding. The hardware drivers that
//! consume these (AHCI, e1000, framebuffer glyph rendering) are out of scope;
//! only the data contracts and the pure, testable parsing logic live here.

pub mod acpi;
pub mod elf;
pub mod gpt;
pub mod info;
