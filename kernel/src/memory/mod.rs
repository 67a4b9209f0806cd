// =============================================================================
// MinimalOS NextGen — Memory Subsystem
// =============================================================================
//
// The memory subsystem manages all physical and virtual memory in the kernel.
// It's organized into layers:
//
//   address.rs  — PhysAddr/VirtAddr newtypes (type safety for addresses)
//   pmm.rs      — Physical Memory Manager (bitmap allocator for frames)
//   vmm.rs      — Virtual Memory Manager (page table operations)
//   paging.rs   — HHDM offset bookkeeping and page flag helpers
//   heap.rs     — Kernel heap allocator (Box, Vec, etc.)
//
// This module only exposes what's needed. Internal details stay private.
// Ambient infrastructure: none of it is one of the four core subsystems,
// but the region/window arenas and the HFS cache buffer pool both need
// `alloc`, so the heap has to come up during boot regardless.
// =============================================================================

pub mod address;
pub mod heap;
pub mod paging;
pub mod pmm;
pub mod vmm;
