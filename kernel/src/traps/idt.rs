//! IDT construction: wires the fault sentinel (vectors 0x00-0x1F), the
//! legacy IRQ stubs (0x20-0x2F), and a catch-all for everything else into
//! one 256-entry table, then loads it.

use spin::Once;

use crate::arch::gdt::Gdt;
use crate::arch::idt::{EntryOptions, GateType, Idt};
use crate::arch::tss::Tss;

use super::{fault_sentinel as fs, irq};

static IDT: Once<Idt> = Once::new();
static TSS: Once<Tss> = Once::new();
static GDT: Once<Gdt> = Once::new();

/// IST slot used by the double-fault handler's dedicated stack.
const DOUBLE_FAULT_IST_INDEX: u8 = 1;

/// Build the GDT/TSS, then the full IDT (fault sentinel + IRQ stubs +
/// catch-all), and load both. Interrupts remain disabled on return —
/// `traps::pre_sti::run_checks` and the caller's `sti` happen after this.
pub fn init() {
    let tss_ref = TSS.call_once(|| {
        let mut tss = Tss::new();
        tss.init();
        tss
    });

    let (gdt, selectors) = Gdt::new(tss_ref);
    let gdt_ref = GDT.call_once(|| gdt);
    unsafe { gdt_ref.load(&selectors) };
    klog::debug!(
        "GDT loaded (CS=0x{:04x}, DS=0x{:04x}, TSS=0x{:04x})",
        selectors.kernel_code,
        selectors.kernel_data,
        selectors.tss
    );

    let mut idt = Idt::new();
    let cs = selectors.kernel_code;

    let trap_opts = EntryOptions::new()
        .set_present(true)
        .set_gate_type(GateType::Interrupt);

    macro_rules! set_fault {
        ($vector:expr, $handler:expr) => {
            idt.set_handler($vector, $handler as usize, cs, trap_opts);
        };
    }

    set_fault!(0x00, fs::divide_by_zero);
    set_fault!(0x01, fs::debug);
    set_fault!(0x02, fs::nmi);
    set_fault!(0x03, fs::breakpoint);
    set_fault!(0x04, fs::overflow);
    set_fault!(0x05, fs::bound_range);
    set_fault!(0x06, fs::invalid_opcode);
    set_fault!(0x07, fs::device_not_available);

    let df_opts = trap_opts.set_stack_index(DOUBLE_FAULT_IST_INDEX);
    idt.set_handler(0x08, fs::double_fault as usize, cs, df_opts);

    set_fault!(0x0A, fs::invalid_tss);
    set_fault!(0x0B, fs::segment_not_present);
    set_fault!(0x0C, fs::stack_fault);
    set_fault!(0x0D, fs::general_protection);
    set_fault!(0x0E, fs::page_fault);
    set_fault!(0x10, fs::x87_fpu);
    set_fault!(0x11, fs::alignment_check);
    set_fault!(0x12, fs::machine_check);
    set_fault!(0x13, fs::simd_fpu);

    for vector in [0x09u8, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F] {
        idt.set_handler(vector, fs::reserved as usize, cs, trap_opts);
    }

    macro_rules! set_irq {
        ($vector:expr, $handler:expr) => {
            idt.set_handler($vector, $handler as usize, cs, trap_opts);
        };
    }
    set_irq!(irq::IRQ_BASE_VECTOR, irq::irq0);
    set_irq!(irq::IRQ_BASE_VECTOR + 1, irq::irq1);
    set_irq!(irq::IRQ_BASE_VECTOR + 2, irq::irq2);
    set_irq!(irq::IRQ_BASE_VECTOR + 3, irq::irq3);
    set_irq!(irq::IRQ_BASE_VECTOR + 4, irq::irq4);
    set_irq!(irq::IRQ_BASE_VECTOR + 5, irq::irq5);
    set_irq!(irq::IRQ_BASE_VECTOR + 6, irq::irq6);
    set_irq!(irq::IRQ_BASE_VECTOR + 7, irq::irq7);
    set_irq!(irq::IRQ_BASE_VECTOR + 8, irq::irq8);
    set_irq!(irq::IRQ_BASE_VECTOR + 9, irq::irq9);
    set_irq!(irq::IRQ_BASE_VECTOR + 10, irq::irq10);
    set_irq!(irq::IRQ_BASE_VECTOR + 11, irq::irq11);
    set_irq!(irq::IRQ_BASE_VECTOR + 12, irq::irq12);
    set_irq!(irq::IRQ_BASE_VECTOR + 13, irq::irq13);
    set_irq!(irq::IRQ_BASE_VECTOR + 14, irq::irq14);
    set_irq!(irq::IRQ_BASE_VECTOR + 15, irq::irq15);

    for vector in 0x30u16..=0xFE {
        idt.set_handler(vector as u8, fs::unhandled_vector as usize, cs, trap_opts);
    }
    idt.set_handler(0xFF, fs::unhandled_vector as usize, cs, trap_opts);

    let idt_ref = IDT.call_once(|| idt);
    idt_ref.load();
    klog::info!("IDT loaded: fault sentinel (0x00-0x1f), IRQ stubs (0x20-0x2f)");
}
