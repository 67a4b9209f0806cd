//! Fault sentinel: handlers for CPU exception vectors 0x00-0x1F.
//!
//! Installed before any higher-level code runs (see `main::_start`). Every
//! exception handler here shares one reporting routine: log the vector,
//! any CPU-pushed error code, and the faulting instruction pointer over
//! serial, then halt forever. This turns what would otherwise be an
//! invisible triple-fault into an observable, stopped state. None of these
//! handlers recover — per spec, `CpuException` is fatal.

use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};

fn report(vector: u8, name: &str, error_code: Option<u64>, frame: &InterruptStackFrame) {
    klog::error!("=== FAULT SENTINEL: vector 0x{:02x} ({}) ===", vector, name);
    if let Some(code) = error_code {
        klog::error!("  error code: 0x{:x}", code);
    }
    klog::error!("  rip: {:#x}", frame.instruction_pointer.as_u64());
    klog::error!("  cs:  {:#x}", frame.code_segment.0);
    klog::error!("  rflags: {:#x}", frame.cpu_flags.bits());
    klog::error!("  rsp: {:#x}", frame.stack_pointer.as_u64());
    klog::error!("kernel halted — CPU exception is fatal");
}

macro_rules! define_handler {
    ($fn_name:ident, $vector:expr, $name:expr) => {
        pub extern "x86-interrupt" fn $fn_name(frame: InterruptStackFrame) {
            report($vector, $name, None, &frame);
            crate::arch::cpu::halt_forever()
        }
    };
}

macro_rules! define_handler_with_code {
    ($fn_name:ident, $vector:expr, $name:expr) => {
        pub extern "x86-interrupt" fn $fn_name(frame: InterruptStackFrame, error_code: u64) {
            report($vector, $name, Some(error_code), &frame);
            crate::arch::cpu::halt_forever()
        }
    };
}

define_handler!(divide_by_zero, 0x00, "divide-by-zero");
define_handler!(debug, 0x01, "debug");
define_handler!(nmi, 0x02, "non-maskable-interrupt");
define_handler!(breakpoint, 0x03, "breakpoint");
define_handler!(overflow, 0x04, "overflow");
define_handler!(bound_range, 0x05, "bound-range-exceeded");
define_handler!(invalid_opcode, 0x06, "invalid-opcode");
define_handler!(device_not_available, 0x07, "device-not-available");

/// Double fault (vector 8) is reported but, unusually, never reaches
/// `report` via the macro path: it runs on the IST1 stack set up in the
/// TSS, and the handler itself must diverge per the `x86_64` crate's
/// signature for this one vector.
pub extern "x86-interrupt" fn double_fault(frame: InterruptStackFrame, error_code: u64) -> ! {
    report(0x08, "double-fault", Some(error_code), &frame);
    crate::arch::cpu::halt_forever()
}

define_handler_with_code!(invalid_tss, 0x0A, "invalid-tss");
define_handler_with_code!(segment_not_present, 0x0B, "segment-not-present");
define_handler_with_code!(stack_fault, 0x0C, "stack-fault");
define_handler_with_code!(general_protection, 0x0D, "general-protection");

pub extern "x86-interrupt" fn page_fault(
    frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let cr2 = crate::arch::cpu::read_cr2();
    klog::error!("=== FAULT SENTINEL: vector 0x0e (page-fault) ===");
    klog::error!("  faulting address (cr2): {:#x}", cr2);
    klog::error!("  error code: {:?}", error_code);
    klog::error!("  rip: {:#x}", frame.instruction_pointer.as_u64());
    klog::error!("kernel halted — CPU exception is fatal");
    crate::arch::cpu::halt_forever()
}

define_handler!(x87_fpu, 0x10, "x87-floating-point");
define_handler_with_code!(alignment_check, 0x11, "alignment-check");
define_handler!(machine_check, 0x12, "machine-check");
define_handler!(simd_fpu, 0x13, "simd-floating-point");

/// Vectors 0x09 and 0x14-0x1F are reserved by Intel or (0x09) obsolete;
/// one shared catch-all covers them so the IDT has no silent gaps in the
/// exception range.
pub extern "x86-interrupt" fn reserved(frame: InterruptStackFrame) {
    report(0xFF, "reserved-exception", None, &frame);
    crate::arch::cpu::halt_forever()
}

/// Catch-all for any vector 0x20-0xFE with no registered IRQ handler.
/// Not part of the fault sentinel's fatal range — these are spurious or
/// unexpected interrupts and are simply EOI'd and logged once.
pub extern "x86-interrupt" fn unhandled_vector(_frame: InterruptStackFrame) {
    klog::warn!("unhandled interrupt vector (no handler registered)");
}
