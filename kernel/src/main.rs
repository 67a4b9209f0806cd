#![no_std]
#![no_main]
#![feature(alloc_error_handler)]

extern crate alloc;

mod arch;
mod block;
mod dispatch;
mod drivers;
mod error;
mod event;
mod fs;
mod geom;
mod input;
mod memory;
mod pal;
mod raster;
mod region;
mod sync;
mod traps;
mod util;
mod window;

use khal::ata::{Bus, Drive};
use limine::BaseRevision;

use block::ata::AtaDisk;
use block::BlockDevice;
use event::queue::EventMask;

/// Base revision supported by this kernel.
#[used]
#[link_section = ".limine_requests"]
static BASE_REVISION: BaseRevision = BaseRevision::new();

/// Screen color the Window Manager clears to once the framebuffer is
/// live (spec §2 boot sequence step 11, Testable Property scenario 1).
const DESKTOP_GRAY: (u8, u8, u8) = (0xC0, 0xC0, 0xC0);

/// Probe every block device backend this kernel knows, in order, and
/// try to mount a filesystem on the first one that's ready. Failure at
/// any stage is logged and is not fatal — the kernel keeps booting
/// without storage (spec §7: "log via serial and continue").
fn probe_storage() {
    if let Some(disk) = AtaDisk::probe(Bus::Primary, Drive::Master) {
        if disk.ready() {
            match fs::mount_any(&disk) {
                Ok(_) => klog::info!("fs: mounted a volume on ATA primary/master"),
                Err(e) => klog::warn!("fs: no recognized filesystem on ATA primary/master: {e}"),
            }
            // The mounted handle doesn't outlive this function in the
            // current boot sequence; a later stage that needs the root
            // volume re-mounts it once a VFS layer owns the `AtaDisk`.
            return;
        }
    }
    klog::warn!("fs: no ATA drive responded to IDENTIFY; storage unavailable this boot");
}

/// Kernel entry point called by the Limine bootloader.
#[no_mangle]
unsafe extern "C" fn _start() -> ! {
    assert!(BASE_REVISION.is_supported(), "unsupported Limine base revision");

    // Step 2: serial first, so every later step can log.
    klog::init();
    klog::info!("=== MinimalOS kernel core booting ===");

    // Step 3+4+7: GDT/TSS, fault sentinel (0x00-0x1f), IRQ stubs
    // (0x20-0x2f), catch-all, all loaded together by traps::init.
    traps::init();

    // Step 5: physical/virtual memory manager and heap bring-up.
    let hhdm_offset = arch::x86_64::boot::get_hhdm_offset();
    memory::address::init_hhdm(hhdm_offset);
    memory::pmm::init(arch::x86_64::boot::get_memory_map());
    memory::heap::init();
    klog::info!(
        "memory: heap ready ({} KiB of {} KiB in use)",
        memory::heap::allocated_bytes() / 1024,
        memory::heap::total_bytes() / 1024
    );

    // Step 6: interrupt controller programmed, everything masked.
    khal::pic::init();

    // Step 7 (cont'd): wire the IRQ lines this kernel cares about.
    // Handlers run with interrupts disabled, post to the bounded event
    // queue, and must not block or allocate (spec §4.2/§5).
    traps::irq_register(0, pal::tick);
    input::ps2::init();
    traps::irq_register(1, input::ps2::keyboard_irq_handler);
    traps::irq_register(12, input::ps2::mouse_irq_handler);

    // Step 8: pre-STI safety harness. Logged, not fatal on failure.
    traps::pre_sti::run_checks();

    // Step 9: enable interrupts, unmask the lines we just wired, and
    // start the 1 kHz tick source the event loop's timing is built on.
    khal::pit::set_frequency(1000);
    khal::pic::unmask_irq(0);
    khal::pic::unmask_irq(1);
    khal::pic::unmask_irq(2); // cascade line, required for IRQ8-15 to reach the CPU
    khal::pic::unmask_irq(12);
    core::arch::asm!("sti");
    klog::info!("interrupts enabled, timer at 1 kHz");

    // Step 10: storage probe + opportunistic filesystem mount.
    probe_storage();

    // Step 11: framebuffer geometry, window manager bring-up, clear
    // to the classic desktop gray.
    let mut wm = window::WindowManager::new();
    match arch::x86_64::boot::get_framebuffer_info() {
        Some(info) => {
            let fb = drivers::framebuffer::init(info);
            input::set_display_bounds(fb.width as i16, fb.height as i16);
            let packed = fb.format.pack(DESKTOP_GRAY.0, DESKTOP_GRAY.1, DESKTOP_GRAY.2);
            fb.clear(packed);
            klog::info!("framebuffer: {}x{} @ 32 bpp, cleared to desktop gray", fb.width, fb.height);
        }
        None => klog::warn!("no framebuffer available from Limine; running headless"),
    }

    klog::info!("=== boot complete, entering event loop ===");

    // Step 12: cooperative event loop. `pump` is where idle work (none
    // yet) would run; today it just halts until the next interrupt.
    loop {
        let event = event::queue::wait_next_event(EventMask::ALL, 60, || pal::halt());
        let _ = dispatch::dispatch(&mut wm, &event);
    }
}
