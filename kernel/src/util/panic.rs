// =============================================================================
// MinimalOS NextGen — Kernel Panic Handler
// =============================================================================
//
// PHILOSOPHY:
//   A panic in this kernel is FATAL. It indicates a kernel bug — a violated
//   invariant, corrupted state, an impossible condition. Unlike the CPU
//   exceptions the fault sentinel catches (see traps::fault_sentinel), a
//   panic is Rust-level: an assertion, an unwrap on None, an explicit
//   panic!().
//
// WHAT WE DO:
//   1. Log the panic message and location via klog (our serial console).
//   2. Halt the CPU permanently.
//
// WHY halt_forever() AND NOT A REBOOT?
//   So the message stays readable on serial for inspection instead of
//   vanishing into a reboot loop.
// =============================================================================

use crate::arch::cpu;
use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    klog::error!("==========================================================");
    klog::error!("KERNEL PANIC");
    if let Some(location) = info.location() {
        klog::error!("  at {}:{}", location.file(), location.line());
    } else {
        klog::error!("  at <unknown location>");
    }
    klog::error!("  {}", info.message());
    klog::error!("==========================================================");

    cpu::halt_forever()
}
