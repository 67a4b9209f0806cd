// =============================================================================
// MinimalOS NextGen — Architecture Abstraction
// =============================================================================
//
// Re-exports the current architecture's HAL. The rest of the kernel uses
// `crate::arch::*` / `crate::pal::*` and never references `target_arch`
// directly.
//
// `gdt`/`idt`/`tss` are the hand-rolled x86_64 table builders (IDT gate
// descriptors, GDT segment/TSS descriptors) that the fault sentinel and
// IRQ dispatcher build on top of; they are x86_64-specific by nature (a
// future aarch64 port swaps them for a GICv2/v3 driver, not a sibling
// file with the same name).
// =============================================================================

#[cfg(target_arch = "x86_64")]
pub mod gdt;
#[cfg(target_arch = "x86_64")]
pub mod idt;
#[cfg(target_arch = "x86_64")]
pub mod tss;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::*;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

#[cfg(target_arch = "aarch64")]
pub use aarch64::*;
