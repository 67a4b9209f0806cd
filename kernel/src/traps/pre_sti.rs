//! Pre-STI safety harness.
//!
//! Runs once, immediately before the kernel's first `sti`, in the fixed
//! order the spec requires: disable NMI, clear any residual EOI latch,
//! verify the GDT, verify the IDT, verify both PIC masks are all-ones,
//! and snapshot registers for the log. A failed check is logged but does
//! not itself abort — see `run_checks`'s return value if a caller wants
//! stricter behavior.
//!
//! Idempotent: running it twice produces the same checks and the same
//! (harmless) side effects.

use core::arch::asm;

use khal::port::{inb, outb};
use x86_64::instructions::tables::{sgdt, sidt};

/// CMOS index port; bit 7 gates NMI delivery when set on writes to 0x70.
const CMOS_INDEX: u16 = 0x70;

/// Disable non-maskable interrupts via the CMOS-index port bit-7 gate.
fn disable_nmi() {
    unsafe {
        let current = inb(CMOS_INDEX);
        outb(CMOS_INDEX, current | 0x80);
    }
}

/// Send EOI to both legacy PICs to clear any residual edge-triggered
/// latch left over from before the kernel installed its own handlers.
fn clear_pending_irqs() {
    khal::pic::eoi(0);
    khal::pic::eoi(8);
}

fn verify_gdt() -> bool {
    let gdtr = sgdt();
    let base = gdtr.base.as_u64();
    let ok = base != 0;
    klog::info!(
        "pre-sti: GDT base={:#x} limit={:#x} -> {}",
        base,
        gdtr.limit,
        if ok { "OK" } else { "FAIL" }
    );
    ok
}

fn verify_idt() -> bool {
    let idtr = sidt();
    let base = idtr.base.as_u64();
    let ok = base != 0 && idtr.limit >= 0x100;
    klog::info!(
        "pre-sti: IDT base={:#x} limit={:#x} -> {}",
        base,
        idtr.limit,
        if ok { "OK" } else { "FAIL" }
    );
    ok
}

fn verify_pic_masks() -> bool {
    let (m1, m2) = khal::pic::read_masks();
    let ok = m1 == 0xFF && m2 == 0xFF;
    klog::info!(
        "pre-sti: PIC masks master={:#04x} slave={:#04x} -> {}",
        m1,
        m2,
        if ok { "OK" } else { "FAIL" }
    );
    ok
}

fn dump_regs() {
    let rsp: u64;
    let rflags: u64;
    unsafe {
        asm!("mov {}, rsp", out(reg) rsp, options(nomem, nostack, preserves_flags));
        asm!("pushfq; pop {}", out(reg) rflags, options(nomem, preserves_flags));
    }
    klog::info!("pre-sti: register snapshot rsp={:#x} rflags={:#x}", rsp, rflags);
}

/// Run the full pre-STI checklist in order. Returns `true` iff every
/// verification check passed; the caller decides whether a `false` should
/// abort boot (the spec leaves this to the implementer).
pub fn run_checks() -> bool {
    klog::info!("pre-sti: running safety harness");
    disable_nmi();
    klog::info!("pre-sti: NMI disabled");
    clear_pending_irqs();
    klog::info!("pre-sti: pending IRQs EOI'd");

    let gdt_ok = verify_gdt();
    let idt_ok = verify_idt();
    let pic_ok = verify_pic_masks();
    dump_regs();

    let all_ok = gdt_ok && idt_ok && pic_ok;
    klog::info!(
        "pre-sti: harness complete -> {}",
        if all_ok { "all green" } else { "one or more checks FAILED" }
    );
    all_ok
}

/// Re-enable NMI delivery after STI, mirroring `disable_nmi`'s gate bit.
pub fn post_sti_confirm() {
    unsafe {
        let current = inb(CMOS_INDEX);
        outb(CMOS_INDEX, current & 0x7F);
    }
    klog::info!("post-sti: NMI re-enabled, interrupts live");
}
