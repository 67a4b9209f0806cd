// =============================================================================
// MinimalOS NextGen — x86_64 Platform Abstraction primitives
// =============================================================================
//
// The concrete x86_64 bodies behind `crate::pal`. Nothing outside
// `arch::x86_64` should call these directly — go through `crate::pal` so
// the rest of the kernel never branches on architecture.
// =============================================================================

use core::arch::asm;
use core::sync::atomic::{AtomicU64, Ordering};

use khal::port::{inb, outb};

/// 1 kHz PIT/APIC tick counter, incremented by the timer IRQ handler.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Saved interrupt-enable state, as returned by `irq_disable`.
pub type Flags = u64;

/// Disable interrupts, returning the previous RFLAGS so the caller can
/// restore the exact enable state later (not just blindly re-enable).
#[inline]
pub fn irq_disable() -> Flags {
    let flags: u64;
    unsafe {
        asm!("pushfq; pop {}", out(reg) flags, options(nomem, preserves_flags));
        asm!("cli", options(nomem, nostack));
    }
    flags
}

/// Restore the interrupt-enable state saved by a matching `irq_disable`.
/// Re-enables interrupts iff they were enabled when `flags` was captured.
#[inline]
pub fn irq_restore(flags: Flags) {
    const IF_BIT: u64 = 1 << 9;
    if flags & IF_BIT != 0 {
        unsafe { asm!("sti", options(nomem, nostack)) };
    }
}

/// Halt until the next interrupt.
#[inline]
pub fn halt() {
    unsafe { asm!("hlt", options(nomem, nostack)) };
}

/// Full memory barrier (`mfence`).
#[inline]
pub fn mb() {
    unsafe { asm!("mfence", options(nostack, preserves_flags)) };
}

/// Uniprocessor: always core 0. SMP bring-up is out of scope for this
/// kernel's single-threaded cooperative model (see spec §5).
#[inline]
pub fn cpu_id() -> u32 {
    0
}

#[inline]
pub unsafe fn port_inb(port: u16) -> u8 {
    unsafe { inb(port) }
}

#[inline]
pub unsafe fn port_outb(port: u16, value: u8) {
    unsafe { outb(port, value) }
}

#[inline]
pub unsafe fn port_inw(port: u16) -> u16 {
    let value: u16;
    unsafe {
        asm!("in ax, dx", in("dx") port, out("ax") value, options(nomem, nostack, preserves_flags));
    }
    value
}

#[inline]
pub unsafe fn port_outw(port: u16, value: u16) {
    unsafe {
        asm!("out dx, ax", in("dx") port, in("ax") value, options(nomem, nostack, preserves_flags));
    }
}

#[inline]
pub unsafe fn port_inl(port: u16) -> u32 {
    let value: u32;
    unsafe {
        asm!("in eax, dx", in("dx") port, out("eax") value, options(nomem, nostack, preserves_flags));
    }
    value
}

#[inline]
pub unsafe fn port_outl(port: u16, value: u32) {
    unsafe {
        asm!("out dx, eax", in("dx") port, in("eax") value, options(nomem, nostack, preserves_flags));
    }
}

/// Volatile MMIO read, with an explicit compiler fence either side so the
/// access cannot be hoisted or sunk across a barrier by the optimizer.
#[inline]
pub unsafe fn mmio_read32(addr: *const u32) -> u32 {
    let v = unsafe { core::ptr::read_volatile(addr) };
    core::sync::atomic::compiler_fence(Ordering::SeqCst);
    v
}

#[inline]
pub unsafe fn mmio_write32(addr: *mut u32, value: u32) {
    core::sync::atomic::compiler_fence(Ordering::SeqCst);
    unsafe { core::ptr::write_volatile(addr, value) };
}

/// `int3` — architecture trap used for debugger breakpoints.
#[inline]
pub fn breakpoint() {
    unsafe { asm!("int3", options(nomem, nostack)) };
}

/// Called by the timer IRQ handler on every tick.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Monotonic tick count since boot (platform timer rate, not 60 Hz).
#[inline]
pub fn timer_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Busy-wait approximately `us` microseconds by polling the tick counter.
/// Coarse (bounded by the 1 kHz tick rate) but sufficient for the short
/// delays the kernel needs outside of IRQ-driven timing.
pub fn timer_usleep(us: u64) {
    let ticks_needed = (us / 1000).max(1);
    let start = timer_ticks();
    while timer_ticks().saturating_sub(start) < ticks_needed {
        halt();
    }
}
